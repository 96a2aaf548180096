use std::sync::Arc;

use chrono::Utc;
use netwatch_core::{
    Addon, Alert, AlertEvent, AlertEventType, AlertFilters, AlertStats, AlertStatus, ParsedAlert,
    compute_fingerprint,
};
use netwatch_bus::EventBus;
use netwatch_store::DurableStore;
use uuid::Uuid;

use crate::error::EngineError;
use crate::lock::FingerprintLocks;

/// The only component that mutates alert state (§4.3).
pub struct Engine<S: DurableStore> {
    store: Arc<S>,
    bus: Arc<EventBus>,
    locks: FingerprintLocks,
}

impl<S: DurableStore> Engine<S> {
    #[must_use]
    pub fn new(store: Arc<S>, bus: Arc<EventBus>) -> Self {
        Self { store, bus, locks: FingerprintLocks::new() }
    }

    /// `process(parsed, addon) → Alert?` (§4.3 steps 1-8). Serializes
    /// mutations for `parsed`'s fingerprint behind a per-fingerprint lock
    /// (§5); events are only emitted after the write commits.
    pub async fn process(&self, parsed: ParsedAlert, addon: &Addon) -> Result<Option<Alert>, EngineError> {
        if !addon.is_alert_enabled(&parsed.alert_type) {
            return Ok(None);
        }

        let fingerprint = compute_fingerprint(&addon.id, &parsed.alert_type, &parsed.device_ip);
        let _guard = self.locks.lock(&fingerprint).await;

        match self.store.find_active_by_fingerprint(&fingerprint).await? {
            Some(existing) => self.process_existing(existing, parsed, addon).await,
            None => self.process_new(fingerprint, parsed, addon).await,
        }
    }

    async fn process_existing(
        &self,
        mut alert: Alert,
        parsed: ParsedAlert,
        _addon: &Addon,
    ) -> Result<Option<Alert>, EngineError> {
        alert.occurrence_count += 1;
        if let Some(message) = parsed.message.filter(|m| !m.is_empty()) {
            alert.message = Some(message);
        }
        alert.raw_data = parsed.raw_data;

        self.store.update_alert(&alert).await?;
        self.emit(AlertEventType::AlertUpdated, alert.clone()).await;

        if parsed.is_clear && !alert.status.is_resolved() {
            let resolved = self.resolve_locked(alert).await?;
            return Ok(Some(resolved));
        }

        Ok(Some(alert))
    }

    async fn process_new(
        &self,
        fingerprint: String,
        parsed: ParsedAlert,
        addon: &Addon,
    ) -> Result<Option<Alert>, EngineError> {
        let now = Utc::now();
        let severity = addon.severity_for(&parsed.alert_type);
        let category = addon.category_for(&parsed.alert_type);
        let title = addon.title_for(&parsed.alert_type, &parsed.device_ip, parsed.device_name.as_deref());

        let alert = Alert {
            id: Uuid::new_v4(),
            addon_id: addon.id.clone(),
            fingerprint,
            device_ip: parsed.device_ip,
            device_name: parsed.device_name,
            alert_type: parsed.alert_type,
            severity,
            category,
            title,
            message: parsed.message,
            status: AlertStatus::Active,
            is_clear: parsed.is_clear,
            occurred_at: parsed.timestamp.unwrap_or(now),
            received_at: now,
            resolved_at: None,
            occurrence_count: 1,
            raw_data: parsed.raw_data,
            created_at: now,
        };

        self.store.insert_alert(&alert).await?;
        self.emit(AlertEventType::AlertCreated, alert.clone()).await;

        if alert.is_clear {
            let resolved = self.resolve_locked(alert).await?;
            return Ok(Some(resolved));
        }

        Ok(Some(alert))
    }

    /// Transitions only from `active` (§4.3); emits `alert_updated`.
    pub async fn acknowledge(&self, alert_id: Uuid) -> Result<Alert, EngineError> {
        let mut alert = self.store.get_alert(alert_id).await?.ok_or(EngineError::NotFound(alert_id))?;
        let _guard = self.locks.lock(&alert.fingerprint).await;

        if alert.status == AlertStatus::Active {
            alert.status = AlertStatus::Acknowledged;
            self.store.update_alert(&alert).await?;
            self.emit(AlertEventType::AlertUpdated, alert.clone()).await;
        }

        Ok(alert)
    }

    /// Unconditional non-resolved → resolved transition (§4.3); emits
    /// `alert_resolved`. `source` is accepted for parity with the original
    /// audit trail but is not currently persisted on [`Alert`].
    pub async fn resolve(&self, alert_id: Uuid, _source: &str) -> Result<Alert, EngineError> {
        let alert = self.store.get_alert(alert_id).await?.ok_or(EngineError::NotFound(alert_id))?;
        let _guard = self.locks.lock(&alert.fingerprint).await;
        self.resolve_locked(alert).await
    }

    /// Caller already holds the fingerprint lock.
    async fn resolve_locked(&self, mut alert: Alert) -> Result<Alert, EngineError> {
        if !alert.status.is_resolved() {
            alert.status = AlertStatus::Resolved;
            alert.resolved_at = Some(Utc::now());
            self.store.update_alert(&alert).await?;
            self.emit(AlertEventType::AlertResolved, alert.clone()).await;
        }
        Ok(alert)
    }

    /// Resolves the matching active alert if any; returns whether one was
    /// resolved. Called by poll ingestors on success following a prior
    /// failure (§4.3, §4.7).
    pub async fn auto_resolve(&self, addon_id: &str, alert_type: &str, device_ip: &str) -> Result<bool, EngineError> {
        let fingerprint = compute_fingerprint(addon_id, alert_type, device_ip);
        let _guard = self.locks.lock(&fingerprint).await;

        match self.store.find_active_by_fingerprint(&fingerprint).await? {
            Some(alert) if !alert.status.is_resolved() => {
                self.resolve_locked(alert).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Alert>, EngineError> {
        Ok(self.store.get_alert(id).await?)
    }

    /// Ordered by `occurred_at DESC`; returns `(page, total matching)` (§4.3).
    pub async fn list(&self, filters: &AlertFilters) -> Result<(Vec<Alert>, i64), EngineError> {
        Ok(self.store.list_alerts(filters).await?)
    }

    pub async fn stats(&self) -> Result<AlertStats, EngineError> {
        Ok(self.store.alert_stats().await?)
    }

    /// Maintenance job (SPEC_FULL.md §4.3): deletes resolved alerts older
    /// than `before`, returns the number removed.
    pub async fn cleanup_resolved(&self, before: chrono::DateTime<Utc>) -> Result<u64, EngineError> {
        Ok(self.store.delete_resolved_before(before).await?)
    }

    async fn emit(&self, event_type: AlertEventType, alert: Alert) {
        self.bus.publish(AlertEvent { event_type, alert }).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netwatch_core::manifest::{ParserConfig, RawAlertMappings, Transport};
    use netwatch_core::AddonManifest;
    use netwatch_store_memory::MemoryStore;
    use std::collections::HashMap;

    fn test_addon() -> Addon {
        let manifest = AddonManifest {
            id: "siklu".into(),
            name: "Siklu".into(),
            version: "1.0.0".into(),
            category: "wireless".into(),
            description: None,
            parser: ParserConfig::Json { field_mappings: HashMap::new(), transformations: vec![] },
            transport: Transport::Webhook { endpoint_path: "/webhooks/siklu".into() },
            raw_alert_mappings: RawAlertMappings::default(),
            clear_events: None,
        };
        Addon::from_manifest(manifest, true, Utc::now())
    }

    fn engine() -> Engine<MemoryStore> {
        let store = Arc::new(MemoryStore::default());
        let bus = Arc::new(EventBus::new());
        Engine::new(store, bus)
    }

    #[tokio::test]
    async fn first_occurrence_creates_active_alert() {
        let engine = engine();
        let addon = test_addon();
        let parsed = ParsedAlert::new("siklu", "link_down", "10.0.0.5");

        let alert = engine.process(parsed, &addon).await.unwrap().unwrap();
        assert_eq!(alert.status, AlertStatus::Active);
        assert_eq!(alert.occurrence_count, 1);
    }

    #[tokio::test]
    async fn repeated_occurrence_increments_count_without_duplicating() {
        let engine = engine();
        let addon = test_addon();

        engine.process(ParsedAlert::new("siklu", "link_down", "10.0.0.5"), &addon).await.unwrap();
        let second = engine
            .process(ParsedAlert::new("siklu", "link_down", "10.0.0.5"), &addon)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(second.occurrence_count, 2);
        let (page, total) = engine.list(&AlertFilters::default()).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(page.len(), 1);
    }

    #[tokio::test]
    async fn clear_event_resolves_existing_active_alert() {
        let engine = engine();
        let addon = test_addon();

        engine.process(ParsedAlert::new("siklu", "link_down", "10.0.0.5"), &addon).await.unwrap();

        let mut clear = ParsedAlert::new("siklu", "link_down", "10.0.0.5");
        clear.is_clear = true;
        let resolved = engine.process(clear, &addon).await.unwrap().unwrap();

        assert_eq!(resolved.status, AlertStatus::Resolved);
        assert!(resolved.resolved_at.is_some());
    }

    #[tokio::test]
    async fn cold_clear_produces_already_resolved_row() {
        let engine = engine();
        let addon = test_addon();

        let mut parsed = ParsedAlert::new("siklu", "link_down", "10.0.0.5");
        parsed.is_clear = true;
        let alert = engine.process(parsed, &addon).await.unwrap().unwrap();

        assert_eq!(alert.status, AlertStatus::Resolved);
    }

    #[tokio::test]
    async fn acknowledge_then_resolve_transitions() {
        let engine = engine();
        let addon = test_addon();
        let alert = engine.process(ParsedAlert::new("siklu", "link_down", "10.0.0.5"), &addon).await.unwrap().unwrap();

        let acked = engine.acknowledge(alert.id).await.unwrap();
        assert_eq!(acked.status, AlertStatus::Acknowledged);

        let resolved = engine.resolve(alert.id, "manual").await.unwrap();
        assert_eq!(resolved.status, AlertStatus::Resolved);
    }

    #[tokio::test]
    async fn auto_resolve_resolves_matching_active_alert() {
        let engine = engine();
        let addon = test_addon();
        engine.process(ParsedAlert::new("siklu", "link_down", "10.0.0.5"), &addon).await.unwrap();

        let resolved = engine.auto_resolve("siklu", "link_down", "10.0.0.5").await.unwrap();
        assert!(resolved);

        let again = engine.auto_resolve("siklu", "link_down", "10.0.0.5").await.unwrap();
        assert!(!again);
    }

    #[tokio::test]
    async fn disabled_alert_type_is_dropped() {
        let engine = engine();
        let mut addon = test_addon();
        let entry = netwatch_core::manifest::AlertMappingEntry {
            severity: None,
            category: None,
            title: None,
            description: None,
            enabled: false,
        };
        addon.manifest.raw_alert_mappings.alert_mappings =
            vec![netwatch_core::manifest::AlertMappingGroup { alerts: HashMap::from([("link_down".to_string(), entry)]) }];

        let dropped = engine.process(ParsedAlert::new("siklu", "link_down", "10.0.0.5"), &addon).await.unwrap();
        assert!(dropped.is_none());
    }
}
