use async_trait::async_trait;

use crate::error::AuditError;
use crate::record::{AuditPage, AuditQuery, AuditRecord};

/// Trait for audit record storage backends (§3.5).
///
/// Implementations must be `Send + Sync` to be shared across async tasks.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn record(&self, entry: AuditRecord) -> Result<(), AuditError>;

    /// Query audit records with filters and pagination, newest first.
    async fn query(&self, query: &AuditQuery) -> Result<AuditPage, AuditError>;
}
