/// Errors surfaced by `netwatch-ingest` (§7). Per-datagram/per-request
/// failures inside the trap, webhook, and poll loops are logged and
/// counted rather than propagated — a single malformed trap or a single
/// unreachable target must never stop the ingestor.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("engine error: {0}")]
    Engine(#[from] netwatch_engine::EngineError),
    #[error("registry error: {0}")]
    Registry(#[from] netwatch_registry::RegistryError),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("socket bind failed: {0}")]
    Bind(#[source] std::io::Error),
}
