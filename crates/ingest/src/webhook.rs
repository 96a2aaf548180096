//! Webhook ingestor (§4.6): one HTTP endpoint, `/webhooks/{path}`, shared
//! across every addon that declares a `webhook` transport.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use axum::routing::post;
use axum::Router;
use netwatch_engine::Engine;
use netwatch_registry::Registry;
use netwatch_store::DurableStore;
use serde_json::{json, Value};

/// Bounded wait for downstream processing before falling back to `202`
/// (§4.6 step 4).
const PROCESSING_TIMEOUT: Duration = Duration::from_secs(30);

pub struct WebhookState<S: DurableStore> {
    pub registry: Arc<Registry<S>>,
    pub engine: Arc<Engine<S>>,
}

/// Build the router exposing `POST /webhooks/{path}`. Nest under the
/// server's own router at `/webhooks`.
pub fn router<S: DurableStore + 'static>(state: Arc<WebhookState<S>>) -> Router {
    Router::new().route("/{path}", post(handle_webhook)).with_state(state)
}

async fn handle_webhook<S: DurableStore + 'static>(
    State(state): State<Arc<WebhookState<S>>>,
    Path(path): Path<String>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let webhook_path = format!("/webhooks/{path}");
    let Some(addon) = state.registry.find_by_webhook(&webhook_path) else {
        return (StatusCode::NOT_FOUND, Json(json!({"error": "no addon for this webhook path"}))).into_response();
    };

    let is_json = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));

    let mut payload = if is_json {
        match serde_json::from_slice::<Value>(&body) {
            Ok(value) => value,
            Err(_) => {
                return (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({"error": "invalid json body"}))).into_response();
            }
        }
    } else {
        match serde_urlencoded::from_bytes::<Vec<(String, String)>>(&body) {
            Ok(pairs) => Value::Object(pairs.into_iter().map(|(k, v)| (k, Value::String(v))).collect()),
            Err(_) => {
                return (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Json(json!({"error": "invalid form-encoded body"})),
                )
                    .into_response();
            }
        }
    };

    if let Value::Object(map) = &mut payload {
        map.insert("source_ip".to_string(), Value::String(remote.ip().to_string()));
    }

    let process = process_payload(state, addon, payload);
    match tokio::time::timeout(PROCESSING_TIMEOUT, process).await {
        Ok(()) => (StatusCode::OK, Json(json!({"accepted": true}))).into_response(),
        Err(_) => {
            tracing::warn!("webhook processing exceeded bounded timeout, continuing asynchronously");
            (StatusCode::ACCEPTED, Json(json!({"accepted": true}))).into_response()
        }
    }
}

async fn process_payload<S: DurableStore + 'static>(
    state: Arc<WebhookState<S>>,
    addon: netwatch_core::Addon,
    payload: Value,
) {
    let Some(parsed) = netwatch_parser::parse(&payload, &addon.manifest, &addon.id) else {
        tracing::debug!(addon_id = %addon.id, "webhook payload did not parse into an alert");
        return;
    };

    if let Err(err) = state.engine.process(parsed, &addon).await {
        tracing::error!(error = %err, addon_id = %addon.id, "engine error processing webhook alert");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netwatch_bus::EventBus;
    use netwatch_core::manifest::{ParserConfig, RawAlertMappings, Transport};
    use netwatch_core::AddonManifest;
    use netwatch_store_memory::MemoryStore;
    use std::collections::HashMap;

    async fn test_state() -> Arc<WebhookState<MemoryStore>> {
        let store = Arc::new(MemoryStore::default());
        let manifest = AddonManifest {
            id: "prtg".into(),
            name: "PRTG".into(),
            version: "1.0.0".into(),
            category: "monitoring".into(),
            description: None,
            parser: ParserConfig::Json {
                field_mappings: HashMap::from([
                    ("alert_type".to_string(), "status".to_string()),
                    ("device_ip".to_string(), "ip".to_string()),
                ]),
                transformations: vec![],
            },
            transport: Transport::Webhook { endpoint_path: "/webhooks/prtg".into() },
            raw_alert_mappings: RawAlertMappings::default(),
            clear_events: None,
        };
        store.upsert_addon(&netwatch_core::Addon::from_manifest(manifest, true, chrono::Utc::now())).await.unwrap();

        let registry = Arc::new(Registry::new(store.clone()).await.unwrap());
        let engine = Arc::new(Engine::new(store, Arc::new(EventBus::new())));
        Arc::new(WebhookState { registry, engine })
    }

    fn json_request(path: &str, body: Value) -> axum::http::Request<axum::body::Body> {
        let addr: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        axum::http::Request::builder()
            .method("POST")
            .uri(path)
            .header(axum::http::header::CONTENT_TYPE, "application/json")
            .extension(ConnectInfo(addr))
            .body(axum::body::Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap()
    }

    #[tokio::test]
    async fn unknown_path_is_404() {
        use tower::ServiceExt;
        let state = test_state().await;
        let app = router(state);

        let response = app.oneshot(json_request("/unknown", json!({"status": "down"}))).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn known_path_produces_alert_and_returns_200() {
        use tower::ServiceExt;
        let state = test_state().await;
        let engine = Arc::clone(&state.engine);
        let app = router(state);

        let response = app
            .oneshot(json_request("/prtg", json!({"status": "link_down", "ip": "10.0.0.1"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let (_, total) = engine.list(&netwatch_core::AlertFilters::default()).await.unwrap();
        assert_eq!(total, 1);
    }
}
