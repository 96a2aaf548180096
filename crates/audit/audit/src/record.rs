use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An append-only log entry for an authentication or administrative action
/// (§3.5). Never written on the alert ingest/dedupe/resolve hot path.
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    /// `None` for actions with no authenticated caller (e.g. a failed login).
    pub user_id: Option<Uuid>,
    /// e.g. `"login"`, `"addon.install"`, `"target.delete"`, `"alert.acknowledge"`.
    pub action: String,
    pub details: String,
    pub created_at: DateTime<Utc>,
}

impl AuditRecord {
    #[must_use]
    pub fn new(user_id: Option<Uuid>, action: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            action: action.into(),
            details: details.into(),
            created_at: Utc::now(),
        }
    }
}

/// Filters accepted by [`crate::store::AuditStore::query`].
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AuditQuery {
    pub user_id: Option<Uuid>,
    pub action: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl AuditQuery {
    const DEFAULT_LIMIT: u32 = 50;
    const MAX_LIMIT: u32 = 1000;

    #[must_use]
    pub fn effective_limit(&self) -> u32 {
        self.limit.unwrap_or(Self::DEFAULT_LIMIT).clamp(1, Self::MAX_LIMIT)
    }

    #[must_use]
    pub fn effective_offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }
}

/// A paginated page of audit records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditPage {
    pub records: Vec<AuditRecord>,
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
}
