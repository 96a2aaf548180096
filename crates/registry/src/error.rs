/// Errors raised by registry mutation operations (§4.1).
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown ingest method: {0}")]
    UnknownMethod(String),

    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("webhook path {0:?} is already registered to addon {1:?}")]
    DuplicateWebhookPath(String, String),

    #[error("no addon with id {0:?}")]
    NotFound(String),

    #[error("store error: {0}")]
    Store(#[from] netwatch_store::StoreError),
}

impl From<netwatch_core::ManifestError> for RegistryError {
    fn from(err: netwatch_core::ManifestError) -> Self {
        Self::InvalidManifest(err.to_string())
    }
}
