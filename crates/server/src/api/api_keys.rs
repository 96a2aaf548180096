use axum::extract::{Extension, State};
use axum::Json;
use chrono::{DateTime, Utc};
use netwatch_audit::AuditRecord;
use netwatch_store::{ApiKey, DurableStore, Role};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AppState;
use crate::auth::api_key::{generate_api_key, hash_api_key, key_prefix};
use crate::auth::identity::CallerIdentity;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct ApiKeyRequest {
    pub name: String,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct ApiKeyCreatedResponse {
    #[serde(flatten)]
    pub key: ApiKey,
    /// The raw key. Returned exactly once — only the hash is persisted.
    pub raw_key: String,
}

/// `GET /api-keys` (§6.3): own keys for a regular caller, every key for
/// an admin.
pub async fn list<S: DurableStore>(
    State(state): State<AppState<S>>,
    Extension(identity): Extension<CallerIdentity>,
) -> Result<Json<Vec<ApiKey>>, ApiError> {
    let user_id = if identity.role == Role::Admin {
        None
    } else {
        Some(Uuid::parse_str(&identity.id).map_err(|_| ApiError::Unauthorized("invalid caller id".to_owned()))?)
    };
    Ok(Json(state.store.list_api_keys(user_id).await?))
}

/// `POST /api-keys` (§6.3): returns the raw key exactly once.
pub async fn create<S: DurableStore>(
    State(state): State<AppState<S>>,
    Extension(identity): Extension<CallerIdentity>,
    Json(body): Json<ApiKeyRequest>,
) -> Result<Json<ApiKeyCreatedResponse>, ApiError> {
    let user_id = Uuid::parse_str(&identity.id).map_err(|_| ApiError::Unauthorized("invalid caller id".to_owned()))?;

    let raw_key = generate_api_key();
    let key = ApiKey {
        id: Uuid::new_v4(),
        user_id,
        name: body.name,
        key_hash: hash_api_key(&raw_key),
        key_prefix: key_prefix(&raw_key),
        is_active: true,
        created_at: Utc::now(),
        last_used_at: None,
        expires_at: body.expires_at,
    };
    state.store.create_api_key(&key).await?;
    let _ = state.audit.record(AuditRecord::new(Some(user_id), "api_key.create", &key.name)).await;

    Ok(Json(ApiKeyCreatedResponse { key, raw_key }))
}
