use axum::extract::{Extension, State};
use axum::Json;
use netwatch_audit::AuditRecord;
use netwatch_store::DurableStore;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::AppState;
use crate::auth::identity::CallerIdentity;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
}

/// `POST /auth/login` (§6.3, public).
pub async fn login<S: DurableStore>(
    State(state): State<AppState<S>>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let login_result = state.auth.login(&body.username, &body.password).await;

    let (pair, user) = match login_result {
        Ok(pair_and_user) => pair_and_user,
        Err(e) => {
            let _ = state.audit.record(AuditRecord::new(None, "login.failed", &body.username)).await;
            return Err(ApiError::Unauthorized(e));
        }
    };
    let _ = state.audit.record(AuditRecord::new(Some(user.id), "login", &user.username)).await;

    Ok(Json(TokenResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        token_type: "bearer",
        expires_in: pair.expires_in,
    }))
}

/// `POST /auth/refresh` (§6.3, public): rotates the token pair.
pub async fn refresh<S: DurableStore>(
    State(state): State<AppState<S>>,
    Json(body): Json<RefreshRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let pair = state.auth.refresh(&body.refresh_token).map_err(ApiError::Unauthorized)?;

    Ok(Json(TokenResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        token_type: "bearer",
        expires_in: pair.expires_in,
    }))
}

/// `GET /auth/me` (§6.3, any authenticated caller).
pub async fn me<S: DurableStore>(
    State(state): State<AppState<S>>,
    Extension(identity): Extension<CallerIdentity>,
) -> Result<Json<Value>, ApiError> {
    let user_id = uuid::Uuid::parse_str(&identity.id).map_err(|_| ApiError::Unauthorized("invalid caller id".to_owned()))?;
    let user = state.store.get_user(user_id).await?.ok_or(ApiError::NotFound)?;

    Ok(Json(json!({
        "id": user.id,
        "username": user.username,
        "email": user.email,
        "role": user.role.to_string(),
        "is_active": user.is_active,
    })))
}
