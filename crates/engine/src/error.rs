use uuid::Uuid;

/// Errors surfaced by `netwatch-engine` (§7). Database errors are not
/// retried here; the ingestor that called `process` retries per its own
/// policy (§4.3 "Failure semantics").
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("alert {0} not found")]
    NotFound(Uuid),
    #[error("store error: {0}")]
    Store(#[from] netwatch_store::StoreError),
}
