use std::str::FromStr;

use axum::extract::{Extension, Path, Query, State};
use axum::Json;
use netwatch_audit::AuditRecord;
use netwatch_core::{AlertFilters, AlertStatus};
use netwatch_store::{DurableStore, Role};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{require_role, AppState};
use crate::auth::identity::CallerIdentity;
use crate::error::ApiError;

/// Raw query string for `GET /alerts` (§6.3): `status`/`severity` accept
/// comma-separated values.
#[derive(Debug, Deserialize)]
pub struct AlertQuery {
    pub status: Option<String>,
    pub severity: Option<String>,
    pub addon_id: Option<String>,
    pub device_ip: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl AlertQuery {
    fn into_filters(self) -> Result<AlertFilters, ApiError> {
        let status = parse_list(self.status.as_deref())?;
        let severity = parse_list(self.severity.as_deref())?;
        Ok(AlertFilters {
            status,
            severity,
            addon_id: self.addon_id,
            device_ip: self.device_ip,
            limit: self.limit.unwrap_or_default(),
            offset: self.offset.unwrap_or_default(),
        })
    }
}

fn parse_list<T: FromStr>(raw: Option<&str>) -> Result<Vec<T>, ApiError>
where
    T::Err: std::fmt::Display,
{
    let Some(raw) = raw.filter(|s| !s.is_empty()) else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(|part| T::from_str(part.trim()).map_err(|e| ApiError::BadRequest(e.to_string())))
        .collect()
}

#[derive(Debug, Serialize)]
pub struct AlertListResponse {
    pub alerts: Vec<netwatch_core::Alert>,
    pub total: i64,
}

/// `GET /alerts` (§6.3, any authenticated caller).
pub async fn list<S: DurableStore>(
    State(state): State<AppState<S>>,
    Query(query): Query<AlertQuery>,
) -> Result<Json<AlertListResponse>, ApiError> {
    let filters = query.into_filters()?;
    let (alerts, total) = state.engine.list(&filters).await?;
    Ok(Json(AlertListResponse { alerts, total }))
}

/// `GET /alerts/stats` (§6.3, any authenticated caller).
pub async fn stats<S: DurableStore>(
    State(state): State<AppState<S>>,
) -> Result<Json<netwatch_core::AlertStats>, ApiError> {
    Ok(Json(state.engine.stats().await?))
}

/// `GET /alerts/{id}` (§6.3, any authenticated caller).
pub async fn get<S: DurableStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
) -> Result<Json<netwatch_core::Alert>, ApiError> {
    let alert = state.engine.get(id).await?.ok_or(ApiError::NotFound)?;
    Ok(Json(alert))
}

/// `POST /alerts/{id}/acknowledge` (§6.3, operator+): 400 if not active.
pub async fn acknowledge<S: DurableStore>(
    State(state): State<AppState<S>>,
    Extension(identity): Extension<CallerIdentity>,
    Path(id): Path<Uuid>,
) -> Result<Json<netwatch_core::Alert>, ApiError> {
    require_role(&identity, Role::Operator)?;

    let current = state.engine.get(id).await?.ok_or(ApiError::NotFound)?;
    if current.status != AlertStatus::Active {
        return Err(ApiError::BadRequest("alert is not active".to_owned()));
    }

    let alert = state.engine.acknowledge(id).await?;
    let _ = state
        .audit
        .record(AuditRecord::new(caller_id(&identity), "alert.acknowledge", alert.id.to_string()))
        .await;
    Ok(Json(alert))
}

/// `POST /alerts/{id}/resolve` (§6.3, operator+): 400 if already resolved.
pub async fn resolve<S: DurableStore>(
    State(state): State<AppState<S>>,
    Extension(identity): Extension<CallerIdentity>,
    Path(id): Path<Uuid>,
) -> Result<Json<netwatch_core::Alert>, ApiError> {
    require_role(&identity, Role::Operator)?;

    let current = state.engine.get(id).await?.ok_or(ApiError::NotFound)?;
    if current.status.is_resolved() {
        return Err(ApiError::BadRequest("alert is already resolved".to_owned()));
    }

    let alert = state.engine.resolve(id, "api").await?;
    let _ = state
        .audit
        .record(AuditRecord::new(caller_id(&identity), "alert.resolve", alert.id.to_string()))
        .await;
    Ok(Json(alert))
}

/// `DELETE /alerts/{id}` (§6.3, admin): hard delete, bypasses the Engine
/// since it exposes no delete operation of its own.
pub async fn delete<S: DurableStore>(
    State(state): State<AppState<S>>,
    Extension(identity): Extension<CallerIdentity>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_role(&identity, Role::Admin)?;

    if !state.store.delete_alert(id).await? {
        return Err(ApiError::NotFound);
    }
    let _ = state.audit.record(AuditRecord::new(caller_id(&identity), "alert.delete", id.to_string())).await;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

fn caller_id(identity: &CallerIdentity) -> Option<Uuid> {
    Uuid::parse_str(&identity.id).ok()
}
