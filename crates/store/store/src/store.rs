use async_trait::async_trait;
use chrono::{DateTime, Utc};
use netwatch_core::{Addon, Alert, AlertFilters, AlertStats, Target};
use uuid::Uuid;

use crate::error::StoreError;
use crate::user::{ApiKey, User};

/// Persists addon manifests, targets, alerts, users, api keys, and system
/// settings (§2 C1, §6.6).
///
/// Implementations must be `Send + Sync` for use across async tasks. The
/// Alert Engine and the registry writer are the only components that
/// acquire a connection from this store directly; ingestors never hold one
/// between ticks (§5).
#[async_trait]
pub trait DurableStore: Send + Sync {
    // -- Addons --
    async fn list_addons(&self) -> Result<Vec<Addon>, StoreError>;
    async fn list_enabled_addons(&self) -> Result<Vec<Addon>, StoreError>;
    async fn get_addon(&self, id: &str) -> Result<Option<Addon>, StoreError>;
    /// Upsert on `id` (§4.1 `install`).
    async fn upsert_addon(&self, addon: &Addon) -> Result<(), StoreError>;
    async fn delete_addon(&self, id: &str) -> Result<bool, StoreError>;
    async fn set_addon_enabled(&self, id: &str, enabled: bool) -> Result<bool, StoreError>;

    // -- Targets --
    async fn list_targets(&self) -> Result<Vec<Target>, StoreError>;
    async fn get_target(&self, id: Uuid) -> Result<Option<Target>, StoreError>;
    async fn find_target_by_ip_addon(
        &self,
        ip_address: &str,
        addon_id: &str,
    ) -> Result<Option<Target>, StoreError>;
    /// Fails with [`StoreError::Conflict`] on duplicate `(ip_address, addon_id)` (§3.2).
    async fn create_target(&self, target: &Target) -> Result<(), StoreError>;
    async fn update_target(&self, target: &Target) -> Result<bool, StoreError>;
    async fn delete_target(&self, id: Uuid) -> Result<bool, StoreError>;
    /// Targets where `enabled AND (last_poll_at IS NULL OR last_poll_at + poll_interval < now)` (§4.7).
    async fn due_targets(&self, now: DateTime<Utc>) -> Result<Vec<Target>, StoreError>;
    async fn mark_polled(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError>;

    // -- Alerts --
    async fn get_alert(&self, id: Uuid) -> Result<Option<Alert>, StoreError>;
    /// The non-resolved alert for this fingerprint, if any (§3.3 invariant:
    /// at most one per fingerprint at any instant).
    async fn find_active_by_fingerprint(&self, fingerprint: &str) -> Result<Option<Alert>, StoreError>;
    async fn insert_alert(&self, alert: &Alert) -> Result<(), StoreError>;
    async fn update_alert(&self, alert: &Alert) -> Result<(), StoreError>;
    async fn delete_alert(&self, id: Uuid) -> Result<bool, StoreError>;
    /// Ordered by `occurred_at DESC`; returns `(page, total matching)` (§4.3).
    async fn list_alerts(&self, filters: &AlertFilters) -> Result<(Vec<Alert>, i64), StoreError>;
    async fn alert_stats(&self) -> Result<AlertStats, StoreError>;
    /// Maintenance job (`cleanup_resolved_alerts`, SPEC_FULL.md §4.3): deletes
    /// resolved alerts with `resolved_at < before`, returns rows removed.
    async fn delete_resolved_before(&self, before: DateTime<Utc>) -> Result<u64, StoreError>;

    // -- Users / API keys --
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;
    async fn list_users(&self) -> Result<Vec<User>, StoreError>;
    async fn create_user(&self, user: &User) -> Result<(), StoreError>;
    async fn update_user(&self, user: &User) -> Result<bool, StoreError>;
    async fn delete_user(&self, id: Uuid) -> Result<bool, StoreError>;
    async fn touch_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError>;

    async fn create_api_key(&self, key: &ApiKey) -> Result<(), StoreError>;
    async fn list_api_keys(&self, user_id: Option<Uuid>) -> Result<Vec<ApiKey>, StoreError>;
    async fn find_api_key_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, StoreError>;
    async fn touch_api_key(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError>;

    // -- System settings --
    async fn get_setting(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set_setting(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Used by `GET /health` (§6.3): `healthy` iff this succeeds.
    async fn health_check(&self) -> Result<(), StoreError>;
}
