use axum::extract::{Extension, Path, State};
use axum::Json;
use chrono::Utc;
use netwatch_audit::AuditRecord;
use netwatch_store::{DurableStore, Role, User};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use super::{require_role, AppState};
use crate::auth::identity::CallerIdentity;
use crate::auth::password::hash_password;
use crate::error::ApiError;

const PROTECTED_USERNAME: &str = "admin";

#[derive(Debug, Deserialize)]
pub struct UserRequest {
    pub username: String,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Role,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// `GET /users` (§6.3, admin).
pub async fn list<S: DurableStore>(
    State(state): State<AppState<S>>,
    Extension(identity): Extension<CallerIdentity>,
) -> Result<Json<Vec<User>>, ApiError> {
    require_role(&identity, Role::Admin)?;
    Ok(Json(state.store.list_users().await?))
}

/// `GET /users/{id}` (§6.3, admin).
pub async fn get<S: DurableStore>(
    State(state): State<AppState<S>>,
    Extension(identity): Extension<CallerIdentity>,
    Path(id): Path<Uuid>,
) -> Result<Json<User>, ApiError> {
    require_role(&identity, Role::Admin)?;
    let user = state.store.get_user(id).await?.ok_or(ApiError::NotFound)?;
    Ok(Json(user))
}

/// `POST /users` (§6.3, admin).
pub async fn create<S: DurableStore>(
    State(state): State<AppState<S>>,
    Extension(identity): Extension<CallerIdentity>,
    Json(body): Json<UserRequest>,
) -> Result<Json<User>, ApiError> {
    require_role(&identity, Role::Admin)?;

    let password = body.password.ok_or_else(|| ApiError::BadRequest("password is required".to_owned()))?;
    let user = User {
        id: Uuid::new_v4(),
        username: body.username,
        email: body.email,
        password_hash: hash_password(&password),
        role: body.role,
        is_active: body.is_active,
        created_at: Utc::now(),
        last_login: None,
    };
    state.store.create_user(&user).await?;
    let _ = state
        .audit
        .record(AuditRecord::new(caller_id(&identity), "user.create", &user.username))
        .await;
    Ok(Json(user))
}

/// `PUT /users/{id}` (§6.3, admin).
pub async fn update<S: DurableStore>(
    State(state): State<AppState<S>>,
    Extension(identity): Extension<CallerIdentity>,
    Path(id): Path<Uuid>,
    Json(body): Json<UserRequest>,
) -> Result<Json<User>, ApiError> {
    require_role(&identity, Role::Admin)?;

    let existing = state.store.get_user(id).await?.ok_or(ApiError::NotFound)?;
    let password_hash = match body.password {
        Some(password) => hash_password(&password),
        None => existing.password_hash,
    };
    let user = User {
        id,
        username: body.username,
        email: body.email,
        password_hash,
        role: body.role,
        is_active: body.is_active,
        created_at: existing.created_at,
        last_login: existing.last_login,
    };
    if !state.store.update_user(&user).await? {
        return Err(ApiError::NotFound);
    }
    let _ = state
        .audit
        .record(AuditRecord::new(caller_id(&identity), "user.update", &user.username))
        .await;
    Ok(Json(user))
}

/// `DELETE /users/{id}` (§6.3, admin): the `admin` user cannot be deleted.
pub async fn delete<S: DurableStore>(
    State(state): State<AppState<S>>,
    Extension(identity): Extension<CallerIdentity>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    require_role(&identity, Role::Admin)?;

    let existing = state.store.get_user(id).await?.ok_or(ApiError::NotFound)?;
    if existing.username == PROTECTED_USERNAME {
        return Err(ApiError::BadRequest("the admin user cannot be deleted".to_owned()));
    }

    if !state.store.delete_user(id).await? {
        return Err(ApiError::NotFound);
    }
    let _ = state
        .audit
        .record(AuditRecord::new(caller_id(&identity), "user.delete", &existing.username))
        .await;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

/// Best-effort caller id for an audit entry; `None` if the identity's id is
/// not (as always expected) a valid UUID.
fn caller_id(identity: &CallerIdentity) -> Option<Uuid> {
    Uuid::parse_str(&identity.id).ok()
}
