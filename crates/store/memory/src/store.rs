//! In-memory [`DurableStore`] implementation for development and tests.
//!
//! Grounded on `acteon-state-memory`'s `DashMap`-backed store: one `DashMap`
//! per table rather than a single generic key/value map, since this store
//! is typed per entity instead of a generic KV abstraction (see
//! `DESIGN.md`).

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use netwatch_core::{Addon, Alert, AlertFilters, AlertStats, Target};
use netwatch_store::{ApiKey, DurableStore, StoreError, User};
use uuid::Uuid;

/// An in-memory [`DurableStore`]. Cheaply `Clone`-able; all tables are
/// reference-counted.
#[derive(Default)]
pub struct MemoryStore {
    addons: DashMap<String, Addon>,
    targets: DashMap<Uuid, Target>,
    alerts: DashMap<Uuid, Alert>,
    users: DashMap<Uuid, User>,
    api_keys: DashMap<Uuid, ApiKey>,
    settings: DashMap<String, String>,
    login_counter: AtomicI64,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn list_addons(&self) -> Result<Vec<Addon>, StoreError> {
        Ok(self.addons.iter().map(|e| e.value().clone()).collect())
    }

    async fn list_enabled_addons(&self) -> Result<Vec<Addon>, StoreError> {
        Ok(self
            .addons
            .iter()
            .filter(|e| e.value().enabled)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn get_addon(&self, id: &str) -> Result<Option<Addon>, StoreError> {
        Ok(self.addons.get(id).map(|e| e.value().clone()))
    }

    async fn upsert_addon(&self, addon: &Addon) -> Result<(), StoreError> {
        self.addons.insert(addon.id.clone(), addon.clone());
        Ok(())
    }

    async fn delete_addon(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.addons.remove(id).is_some())
    }

    async fn set_addon_enabled(&self, id: &str, enabled: bool) -> Result<bool, StoreError> {
        match self.addons.get_mut(id) {
            Some(mut addon) => {
                addon.enabled = enabled;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_targets(&self) -> Result<Vec<Target>, StoreError> {
        Ok(self.targets.iter().map(|e| e.value().clone()).collect())
    }

    async fn get_target(&self, id: Uuid) -> Result<Option<Target>, StoreError> {
        Ok(self.targets.get(&id).map(|e| e.value().clone()))
    }

    async fn find_target_by_ip_addon(
        &self,
        ip_address: &str,
        addon_id: &str,
    ) -> Result<Option<Target>, StoreError> {
        Ok(self
            .targets
            .iter()
            .find(|e| e.value().ip_address == ip_address && e.value().addon_id.as_deref() == Some(addon_id))
            .map(|e| e.value().clone()))
    }

    async fn create_target(&self, target: &Target) -> Result<(), StoreError> {
        if let Some(addon_id) = &target.addon_id {
            if self
                .find_target_by_ip_addon(&target.ip_address, addon_id)
                .await?
                .is_some()
            {
                return Err(StoreError::Conflict(format!(
                    "target for ({}, {addon_id}) already exists",
                    target.ip_address
                )));
            }
        }
        self.targets.insert(target.id, target.clone());
        Ok(())
    }

    async fn update_target(&self, target: &Target) -> Result<bool, StoreError> {
        if self.targets.contains_key(&target.id) {
            self.targets.insert(target.id, target.clone());
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn delete_target(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.targets.remove(&id).is_some())
    }

    async fn due_targets(&self, now: DateTime<Utc>) -> Result<Vec<Target>, StoreError> {
        Ok(self
            .targets
            .iter()
            .filter(|e| e.value().is_due(now))
            .map(|e| e.value().clone())
            .collect())
    }

    async fn mark_polled(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        if let Some(mut target) = self.targets.get_mut(&id) {
            target.last_poll_at = Some(at);
        }
        Ok(())
    }

    async fn get_alert(&self, id: Uuid) -> Result<Option<Alert>, StoreError> {
        Ok(self.alerts.get(&id).map(|e| e.value().clone()))
    }

    async fn find_active_by_fingerprint(&self, fingerprint: &str) -> Result<Option<Alert>, StoreError> {
        Ok(self
            .alerts
            .iter()
            .find(|e| e.value().fingerprint == fingerprint && !e.value().status.is_resolved())
            .map(|e| e.value().clone()))
    }

    async fn insert_alert(&self, alert: &Alert) -> Result<(), StoreError> {
        self.alerts.insert(alert.id, alert.clone());
        Ok(())
    }

    async fn update_alert(&self, alert: &Alert) -> Result<(), StoreError> {
        self.alerts.insert(alert.id, alert.clone());
        Ok(())
    }

    async fn delete_alert(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.alerts.remove(&id).is_some())
    }

    async fn list_alerts(&self, filters: &AlertFilters) -> Result<(Vec<Alert>, i64), StoreError> {
        let mut matching: Vec<Alert> = self
            .alerts
            .iter()
            .map(|e| e.value().clone())
            .filter(|a| filters.status.is_empty() || filters.status.contains(&a.status))
            .filter(|a| filters.severity.is_empty() || filters.severity.contains(&a.severity))
            .filter(|a| filters.addon_id.as_deref().is_none_or(|id| id == a.addon_id))
            .filter(|a| filters.device_ip.as_deref().is_none_or(|ip| ip == a.device_ip))
            .collect();

        matching.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
        let total = i64::try_from(matching.len()).unwrap_or(i64::MAX);

        let offset = usize::try_from(filters.offset.max(0)).unwrap_or(0);
        let limit = usize::try_from(filters.effective_limit()).unwrap_or(usize::MAX);
        let page = matching.into_iter().skip(offset).take(limit).collect();

        Ok((page, total))
    }

    async fn alert_stats(&self) -> Result<AlertStats, StoreError> {
        let mut stats = AlertStats::default();
        for entry in &self.alerts {
            let alert = entry.value();
            *stats.by_severity.entry(alert.severity.to_string()).or_insert(0) += 1;
            *stats.by_status.entry(alert.status.to_string()).or_insert(0) += 1;
            *stats.by_addon.entry(alert.addon_id.clone()).or_insert(0) += 1;
            if matches!(alert.status, netwatch_core::AlertStatus::Active) {
                stats.total_active += 1;
            }
        }
        Ok(stats)
    }

    async fn delete_resolved_before(&self, before: DateTime<Utc>) -> Result<u64, StoreError> {
        let to_remove: Vec<Uuid> = self
            .alerts
            .iter()
            .filter(|e| {
                e.value().status.is_resolved()
                    && e.value().resolved_at.is_some_and(|r| r < before)
            })
            .map(|e| *e.key())
            .collect();
        let removed = to_remove.len() as u64;
        for id in to_remove {
            self.alerts.remove(&id);
        }
        Ok(removed)
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users.get(&id).map(|e| e.value().clone()))
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .users
            .iter()
            .find(|e| e.value().username == username)
            .map(|e| e.value().clone()))
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        Ok(self.users.iter().map(|e| e.value().clone()).collect())
    }

    async fn create_user(&self, user: &User) -> Result<(), StoreError> {
        if self.get_user_by_username(&user.username).await?.is_some() {
            return Err(StoreError::Conflict(format!(
                "username {} already exists",
                user.username
            )));
        }
        self.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn update_user(&self, user: &User) -> Result<bool, StoreError> {
        if self.users.contains_key(&user.id) {
            self.users.insert(user.id, user.clone());
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.users.remove(&id).is_some())
    }

    async fn touch_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.login_counter.fetch_add(1, Ordering::Relaxed);
        if let Some(mut user) = self.users.get_mut(&id) {
            user.last_login = Some(at);
        }
        Ok(())
    }

    async fn create_api_key(&self, key: &ApiKey) -> Result<(), StoreError> {
        self.api_keys.insert(key.id, key.clone());
        Ok(())
    }

    async fn list_api_keys(&self, user_id: Option<Uuid>) -> Result<Vec<ApiKey>, StoreError> {
        Ok(self
            .api_keys
            .iter()
            .filter(|e| user_id.is_none_or(|id| e.value().user_id == id))
            .map(|e| e.value().clone())
            .collect())
    }

    async fn find_api_key_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, StoreError> {
        Ok(self
            .api_keys
            .iter()
            .find(|e| e.value().key_hash == key_hash)
            .map(|e| e.value().clone()))
    }

    async fn touch_api_key(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        if let Some(mut key) = self.api_keys.get_mut(&id) {
            key.last_used_at = Some(at);
        }
        Ok(())
    }

    async fn get_setting(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.settings.get(key).map(|v| v.clone()))
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.settings.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netwatch_core::{AlertStatus, Severity};

    fn sample_alert(fingerprint: &str) -> Alert {
        let now = Utc::now();
        Alert {
            id: Uuid::new_v4(),
            addon_id: "siklu".into(),
            fingerprint: fingerprint.into(),
            device_ip: "10.0.0.5".into(),
            device_name: None,
            alert_type: "link_down".into(),
            severity: Severity::Critical,
            category: "link".into(),
            title: "Link down".into(),
            message: None,
            status: AlertStatus::Active,
            is_clear: false,
            occurred_at: now,
            received_at: now,
            resolved_at: None,
            occurrence_count: 1,
            raw_data: serde_json::Value::Null,
            created_at: now,
        }
    }

    #[tokio::test]
    async fn insert_and_find_active_by_fingerprint() {
        let store = MemoryStore::new();
        let alert = sample_alert("abc");
        store.insert_alert(&alert).await.unwrap();
        let found = store.find_active_by_fingerprint("abc").await.unwrap();
        assert_eq!(found.unwrap().id, alert.id);
    }

    #[tokio::test]
    async fn resolved_alert_is_not_found_as_active() {
        let store = MemoryStore::new();
        let mut alert = sample_alert("abc");
        alert.status = AlertStatus::Resolved;
        store.insert_alert(&alert).await.unwrap();
        assert!(store.find_active_by_fingerprint("abc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_target_is_conflict() {
        let store = MemoryStore::new();
        let target = Target {
            id: Uuid::new_v4(),
            name: "t1".into(),
            ip_address: "10.0.0.1".into(),
            addon_id: Some("siklu".into()),
            poll_interval_seconds: 60,
            enabled: true,
            config: serde_json::Value::Null,
            last_poll_at: None,
        };
        store.create_target(&target).await.unwrap();
        let dup = Target { id: Uuid::new_v4(), ..target };
        let err = store.create_target(&dup).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn list_alerts_paginates_and_orders_by_occurred_at_desc() {
        let store = MemoryStore::new();
        for i in 0..3 {
            let mut alert = sample_alert(&format!("fp{i}"));
            alert.occurred_at = Utc::now() + chrono::Duration::seconds(i);
            store.insert_alert(&alert).await.unwrap();
        }
        let (page, total) = store
            .list_alerts(&AlertFilters { limit: 2, ..Default::default() })
            .await
            .unwrap();
        assert_eq!(total, 3);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].fingerprint, "fp2");
    }
}
