pub mod alerts;
pub mod api_keys;
pub mod auth;
pub mod health;
pub mod stream;
pub mod targets;
pub mod users;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use chrono::{DateTime, Utc};
use netwatch_audit::AuditStore;
use netwatch_bus::EventBus;
use netwatch_engine::Engine;
use netwatch_ingest::{PollIngestor, TrapIngestor};
use netwatch_registry::Registry;
use netwatch_store::{DurableStore, Role};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::identity::CallerIdentity;
use crate::auth::middleware::AuthLayer;
use crate::auth::AuthProvider;
use crate::error::ApiError;

/// Shared application state passed to every handler (§6.3).
pub struct AppState<S: DurableStore> {
    pub store: Arc<S>,
    pub registry: Arc<Registry<S>>,
    pub engine: Arc<Engine<S>>,
    pub bus: Arc<EventBus>,
    pub auth: Arc<AuthProvider<S>>,
    pub audit: Arc<dyn AuditStore>,
    pub trap_ingestor: Arc<TrapIngestor<S>>,
    pub poll_ingestor: Arc<PollIngestor<S>>,
    pub started_at: DateTime<Utc>,
}

impl<S: DurableStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            registry: self.registry.clone(),
            engine: self.engine.clone(),
            bus: self.bus.clone(),
            auth: self.auth.clone(),
            audit: self.audit.clone(),
            trap_ingestor: self.trap_ingestor.clone(),
            poll_ingestor: self.poll_ingestor.clone(),
            started_at: self.started_at,
        }
    }
}

/// `require_role(r)` (§6.5): grants access iff the caller's level ≥ `role`.
///
/// # Errors
///
/// Returns [`ApiError::Forbidden`] if the caller's role is insufficient.
pub fn require_role(identity: &CallerIdentity, role: Role) -> Result<(), ApiError> {
    if identity.role.satisfies(role) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(format!("requires {role} or higher")))
    }
}

/// Build the full `/api/v1` router plus the bare `/health` and `/socket.io`
/// mounts. Webhook ingestion (`/webhooks/*`) is mounted separately by the
/// caller since it shares no auth model with this surface (§4.6).
#[must_use]
pub fn router<S: DurableStore + 'static>(state: AppState<S>) -> Router {
    let public = Router::new()
        .route("/health", get(health::health))
        .route("/api/v1/auth/login", post(auth::login))
        .route("/api/v1/auth/refresh", post(auth::refresh));

    let protected = Router::new()
        .route("/api/v1/auth/me", get(auth::me))
        .route("/api/v1/stats", get(health::stats))
        .route("/api/v1/alerts", get(alerts::list))
        .route("/api/v1/alerts/stats", get(alerts::stats))
        .route("/api/v1/alerts/{id}", get(alerts::get).delete(alerts::delete))
        .route("/api/v1/alerts/{id}/acknowledge", post(alerts::acknowledge))
        .route("/api/v1/alerts/{id}/resolve", post(alerts::resolve))
        .route(
            "/api/v1/targets",
            get(targets::list).post(targets::create),
        )
        .route(
            "/api/v1/targets/{id}",
            get(targets::get).put(targets::update).delete(targets::delete),
        )
        .route("/api/v1/targets/{id}/poll", post(targets::poll_now))
        .route("/api/v1/users", get(users::list).post(users::create))
        .route(
            "/api/v1/users/{id}",
            get(users::get).put(users::update).delete(users::delete),
        )
        .route("/api/v1/api-keys", get(api_keys::list).post(api_keys::create))
        .route("/socket.io", get(stream::stream))
        .layer(AuthLayer::new(state.auth.clone()));

    Router::new()
        .merge(public)
        .merge(protected)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
