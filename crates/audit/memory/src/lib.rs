//! In-memory [`AuditStore`](netwatch_audit::AuditStore) for development and
//! tests. No source existed for this backend in the retrieval pack; built
//! fresh following the `DashMap`-per-table convention used by
//! `netwatch-store-memory`.

use async_trait::async_trait;
use dashmap::DashMap;
use netwatch_audit::{AuditError, AuditPage, AuditQuery, AuditRecord, AuditStore};
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryAuditStore {
    records: DashMap<Uuid, AuditRecord>,
}

impl MemoryAuditStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn record(&self, entry: AuditRecord) -> Result<(), AuditError> {
        self.records.insert(entry.id, entry);
        Ok(())
    }

    async fn query(&self, query: &AuditQuery) -> Result<AuditPage, AuditError> {
        let mut matching: Vec<AuditRecord> = self
            .records
            .iter()
            .map(|e| e.value().clone())
            .filter(|r| query.user_id.is_none_or(|id| r.user_id == Some(id)))
            .filter(|r| query.action.as_deref().is_none_or(|a| r.action == a))
            .filter(|r| query.from.is_none_or(|from| r.created_at >= from))
            .filter(|r| query.to.is_none_or(|to| r.created_at <= to))
            .collect();

        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = matching.len() as u64;

        let offset = query.effective_offset() as usize;
        let limit = query.effective_limit() as usize;
        let records = matching.into_iter().skip(offset).take(limit).collect();

        Ok(AuditPage {
            records,
            total,
            limit: query.effective_limit(),
            offset: query.effective_offset(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_are_returned_newest_first() {
        let store = MemoryAuditStore::new();
        let mut first = AuditRecord::new(None, "login", "ok");
        first.created_at = chrono::Utc::now() - chrono::Duration::seconds(10);
        let second = AuditRecord::new(None, "login", "ok");
        store.record(first).await.unwrap();
        store.record(second.clone()).await.unwrap();

        let page = store.query(&AuditQuery::default()).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.records[0].id, second.id);
    }

    #[tokio::test]
    async fn filters_by_action() {
        let store = MemoryAuditStore::new();
        store.record(AuditRecord::new(None, "login", "ok")).await.unwrap();
        store
            .record(AuditRecord::new(None, "addon.install", "siklu"))
            .await
            .unwrap();

        let page = store
            .query(&AuditQuery { action: Some("login".into()), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(page.total, 1);
    }
}
