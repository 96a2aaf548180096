use thiserror::Error;

/// Errors raised by a [`crate::DurableStore`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("backend error: {0}")]
    Backend(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("unique constraint violated: {0}")]
    Conflict(String),

    #[error("not found")]
    NotFound,
}
