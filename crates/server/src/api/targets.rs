use axum::extract::{Extension, Path, State};
use axum::Json;
use netwatch_audit::AuditRecord;
use netwatch_core::Target;
use netwatch_store::{DurableStore, Role};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use super::{require_role, AppState};
use crate::auth::identity::CallerIdentity;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct TargetRequest {
    pub name: String,
    pub ip_address: String,
    pub addon_id: Option<String>,
    #[serde(default)]
    pub poll_interval_seconds: Option<i64>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub config: Value,
}

fn default_enabled() -> bool {
    true
}

const DEFAULT_POLL_INTERVAL_SECONDS: i64 = 300;

/// `GET /targets` (§6.3, viewer+).
pub async fn list<S: DurableStore>(State(state): State<AppState<S>>) -> Result<Json<Vec<Target>>, ApiError> {
    Ok(Json(state.store.list_targets().await?))
}

/// `GET /targets/{id}` (§6.3, viewer+).
pub async fn get<S: DurableStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Target>, ApiError> {
    let target = state.store.get_target(id).await?.ok_or(ApiError::NotFound)?;
    Ok(Json(target))
}

/// `POST /targets` (§6.3, operator+): 409 on duplicate `(ip_address, addon_id)`.
pub async fn create<S: DurableStore>(
    State(state): State<AppState<S>>,
    Extension(identity): Extension<CallerIdentity>,
    Json(body): Json<TargetRequest>,
) -> Result<Json<Target>, ApiError> {
    require_role(&identity, Role::Operator)?;

    if let Some(addon_id) = body.addon_id.as_deref()
        && state.store.find_target_by_ip_addon(&body.ip_address, addon_id).await?.is_some()
    {
        return Err(ApiError::Conflict("target already exists for this ip_address and addon_id".to_owned()));
    }

    let target = Target {
        id: Uuid::new_v4(),
        name: body.name,
        ip_address: body.ip_address,
        addon_id: body.addon_id,
        poll_interval_seconds: body.poll_interval_seconds.unwrap_or(DEFAULT_POLL_INTERVAL_SECONDS),
        enabled: body.enabled,
        config: body.config,
        last_poll_at: None,
    };
    state.store.create_target(&target).await?;
    let _ = state.audit.record(AuditRecord::new(caller_id(&identity), "target.create", &target.name)).await;
    Ok(Json(target))
}

/// `PUT /targets/{id}` (§6.3, operator+).
pub async fn update<S: DurableStore>(
    State(state): State<AppState<S>>,
    Extension(identity): Extension<CallerIdentity>,
    Path(id): Path<Uuid>,
    Json(body): Json<TargetRequest>,
) -> Result<Json<Target>, ApiError> {
    require_role(&identity, Role::Operator)?;

    let existing = state.store.get_target(id).await?.ok_or(ApiError::NotFound)?;
    let target = Target {
        id,
        name: body.name,
        ip_address: body.ip_address,
        addon_id: body.addon_id,
        poll_interval_seconds: body.poll_interval_seconds.unwrap_or(existing.poll_interval_seconds),
        enabled: body.enabled,
        config: body.config,
        last_poll_at: existing.last_poll_at,
    };
    if !state.store.update_target(&target).await? {
        return Err(ApiError::NotFound);
    }
    let _ = state.audit.record(AuditRecord::new(caller_id(&identity), "target.update", &target.name)).await;
    Ok(Json(target))
}

/// `DELETE /targets/{id}` (§6.3, admin).
pub async fn delete<S: DurableStore>(
    State(state): State<AppState<S>>,
    Extension(identity): Extension<CallerIdentity>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    require_role(&identity, Role::Admin)?;

    if !state.store.delete_target(id).await? {
        return Err(ApiError::NotFound);
    }
    let _ = state.audit.record(AuditRecord::new(caller_id(&identity), "target.delete", id.to_string())).await;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

/// `POST /targets/{id}/poll` (§6.3, operator+): runs an immediate poll.
pub async fn poll_now<S: DurableStore + 'static>(
    State(state): State<AppState<S>>,
    Extension(identity): Extension<CallerIdentity>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    require_role(&identity, Role::Operator)?;

    let polled = state
        .poll_ingestor
        .poll_now(id)
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    if !polled {
        return Err(ApiError::NotFound);
    }

    let _ = state.audit.record(AuditRecord::new(caller_id(&identity), "target.poll", id.to_string())).await;
    Ok(Json(serde_json::json!({ "polled": true })))
}

fn caller_id(identity: &CallerIdentity) -> Option<Uuid> {
    Uuid::parse_str(&identity.id).ok()
}
