use std::sync::Arc;

use axum::body::Body;
use axum::http::{self, Request, StatusCode};
use chrono::Utc;
use netwatch_audit_memory::MemoryAuditStore;
use netwatch_bus::EventBus;
use netwatch_engine::Engine;
use netwatch_ingest::{PollIngestor, TrapIngestor};
use netwatch_registry::Registry;
use netwatch_server::api::{router, AppState};
use netwatch_server::auth::password::hash_password;
use netwatch_server::auth::AuthProvider;
use netwatch_store::{DurableStore, Role, User};
use netwatch_store_memory::MemoryStore;
use tower::ServiceExt;
use uuid::Uuid;

async fn build_state() -> AppState<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    let registry = Arc::new(Registry::new(store.clone()).await.unwrap());
    let bus = Arc::new(EventBus::new());
    let engine = Arc::new(Engine::new(store.clone(), bus.clone()));
    let audit = Arc::new(MemoryAuditStore::new());
    let auth = Arc::new(AuthProvider::new(store.clone(), "test-secret"));
    let trap_ingestor = Arc::new(TrapIngestor::new(registry.clone(), engine.clone()));
    let poll_ingestor = Arc::new(PollIngestor::new(store.clone(), registry.clone(), engine.clone()));

    AppState {
        store,
        registry,
        engine,
        bus,
        auth,
        audit,
        trap_ingestor,
        poll_ingestor,
        started_at: Utc::now(),
    }
}

async fn seed_user(state: &AppState<MemoryStore>, username: &str, role: Role) -> User {
    let user = User {
        id: Uuid::new_v4(),
        username: username.to_owned(),
        email: None,
        password_hash: hash_password("password123"),
        role,
        is_active: true,
        created_at: Utc::now(),
        last_login: None,
    };
    state.store.create_user(&user).await.unwrap();
    user
}

async fn login(state: &AppState<MemoryStore>, username: &str) -> String {
    let app = router(state.clone());
    let body = serde_json::json!({ "username": username, "password": "password123" });
    let response = app
        .oneshot(
            Request::builder()
                .method(http::Method::POST)
                .uri("/api/v1/auth/login")
                .header(http::header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    json["access_token"].as_str().unwrap().to_owned()
}

#[tokio::test]
async fn health_returns_healthy_without_auth() {
    let state = build_state().await;
    let app = router(state);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["status"], "healthy");
}

#[tokio::test]
async fn protected_route_without_credentials_is_401() {
    let state = build_state().await;
    let app = router(state);

    let response = app
        .oneshot(Request::builder().uri("/api/v1/alerts").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_with_wrong_password_is_401() {
    let state = build_state().await;
    seed_user(&state, "alice", Role::Viewer).await;
    let app = router(state);

    let body = serde_json::json!({ "username": "alice", "password": "wrong" });
    let response = app
        .oneshot(
            Request::builder()
                .method(http::Method::POST)
                .uri("/api/v1/auth/login")
                .header(http::header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_then_list_alerts_succeeds() {
    let state = build_state().await;
    seed_user(&state, "viewer", Role::Viewer).await;
    let token = login(&state, "viewer").await;

    let app = router(state);
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/alerts")
                .header(http::header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["total"], 0);
    assert!(json["alerts"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn viewer_cannot_create_target() {
    let state = build_state().await;
    seed_user(&state, "viewer", Role::Viewer).await;
    let token = login(&state, "viewer").await;

    let app = router(state);
    let body = serde_json::json!({ "name": "switch-1", "ip_address": "10.0.0.5" });
    let response = app
        .oneshot(
            Request::builder()
                .method(http::Method::POST)
                .uri("/api/v1/targets")
                .header(http::header::AUTHORIZATION, format!("Bearer {token}"))
                .header(http::header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn operator_can_create_and_duplicate_target_is_conflict() {
    let state = build_state().await;
    seed_user(&state, "op", Role::Operator).await;
    let token = login(&state, "op").await;

    let body = serde_json::json!({ "name": "switch-1", "ip_address": "10.0.0.5" });

    let app = router(state.clone());
    let response = app
        .oneshot(
            Request::builder()
                .method(http::Method::POST)
                .uri("/api/v1/targets")
                .header(http::header::AUTHORIZATION, format!("Bearer {token}"))
                .header(http::header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let app2 = router(state);
    let response = app2
        .oneshot(
            Request::builder()
                .method(http::Method::POST)
                .uri("/api/v1/targets")
                .header(http::header::AUTHORIZATION, format!("Bearer {token}"))
                .header(http::header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn admin_can_create_and_delete_user() {
    let state = build_state().await;
    seed_user(&state, "root", Role::Admin).await;
    let token = login(&state, "root").await;

    let body = serde_json::json!({
        "username": "newop",
        "role": "operator",
        "password": "changeme123",
    });

    let app = router(state.clone());
    let response = app
        .oneshot(
            Request::builder()
                .method(http::Method::POST)
                .uri("/api/v1/users")
                .header(http::header::AUTHORIZATION, format!("Bearer {token}"))
                .header(http::header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let created: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    let new_id = created["id"].as_str().unwrap();

    let app2 = router(state);
    let response = app2
        .oneshot(
            Request::builder()
                .method(http::Method::DELETE)
                .uri(format!("/api/v1/users/{new_id}"))
                .header(http::header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn get_alert_not_found_is_404() {
    let state = build_state().await;
    seed_user(&state, "viewer", Role::Viewer).await;
    let token = login(&state, "viewer").await;

    let app = router(state);
    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/alerts/{}", Uuid::new_v4()))
                .header(http::header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
