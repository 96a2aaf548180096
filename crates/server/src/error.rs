use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors surfaced at the REST boundary (§7). Every variant maps to an
/// HTTP status and the `{"detail": "..."}` envelope §6.3 specifies.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found")]
    NotFound,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("engine error: {0}")]
    Engine(#[from] netwatch_engine::EngineError),

    #[error("registry error: {0}")]
    Registry(#[from] netwatch_registry::RegistryError),

    #[error("store error: {0}")]
    Store(#[from] netwatch_store::StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self {
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            Self::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            Self::Engine(netwatch_engine::EngineError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, self.to_string())
            }
            Self::Engine(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            Self::Registry(netwatch_registry::RegistryError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, self.to_string())
            }
            Self::Registry(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            Self::Store(netwatch_store::StoreError::Conflict(msg)) => (StatusCode::CONFLICT, msg.clone()),
            Self::Store(netwatch_store::StoreError::NotFound) => (StatusCode::NOT_FOUND, self.to_string()),
            Self::Store(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        };

        (status, axum::Json(serde_json::json!({ "detail": detail }))).into_response()
    }
}
