use axum::extract::{Extension, State};
use axum::Json;
use chrono::Utc;
use netwatch_store::DurableStore;
use serde_json::{json, Value};

use super::AppState;
use crate::auth::identity::CallerIdentity;
use crate::error::ApiError;

/// `GET /health` (§6.3, public): `healthy` iff the store is reachable.
pub async fn health<S: DurableStore>(State(state): State<AppState<S>>) -> Json<Value> {
    let reachable = state.store.health_check().await.is_ok();
    Json(json!({
        "status": if reachable { "healthy" } else { "degraded" },
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().to_rfc3339(),
        "components": {
            "store": if reachable { "up" } else { "down" },
        },
    }))
}

/// `GET /stats` (§6.3): aggregates from the Alert Engine (§4.3) and the
/// trap ingestor's counters (§4.5).
pub async fn stats<S: DurableStore + 'static>(
    State(state): State<AppState<S>>,
    Extension(_identity): Extension<CallerIdentity>,
) -> Result<Json<Value>, ApiError> {
    let alert_stats = state.engine.stats().await?;
    let (received, processed, dropped, errors) = state.trap_ingestor.stats().snapshot();

    Ok(Json(json!({
        "alerts": alert_stats,
        "traps": {
            "received": received,
            "processed": processed,
            "dropped": dropped,
            "errors": errors,
        },
    })))
}
