use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use netwatch_core::{Addon, AddonManifest, IngestMethod};
use netwatch_store::DurableStore;

use crate::error::RegistryError;

/// An immutable point-in-time view of all enabled addons, indexed three
/// ways. Readers always see one fully-built snapshot; `reload` builds a
/// new one and swaps it in under the write lock (§4.1).
struct Snapshot {
    by_id: HashMap<String, Addon>,
    /// `(enterprise_oid, addon_id)`, kept sorted longest-prefix-first so
    /// `find_by_oid` can return on the first match.
    oid_index: Vec<(String, String)>,
    by_webhook_path: HashMap<String, String>,
}

impl Snapshot {
    fn build(addons: Vec<Addon>) -> Result<Self, RegistryError> {
        let mut by_id = HashMap::new();
        let mut oid_index: Vec<(String, String)> = Vec::new();
        let mut by_webhook_path: HashMap<String, String> = HashMap::new();

        for addon in addons {
            if let Some(oid) = addon.manifest.enterprise_oid() {
                oid_index.push((oid.to_string(), addon.id.clone()));
            }
            if let Some(path) = addon.manifest.webhook_path() {
                if let Some(existing) = by_webhook_path.insert(path.to_string(), addon.id.clone()) {
                    if existing != addon.id {
                        return Err(RegistryError::DuplicateWebhookPath(path.to_string(), existing));
                    }
                }
            }
            by_id.insert(addon.id.clone(), addon);
        }

        // Longest prefix first; ties broken by lexicographic addon id so
        // `find_by_oid` is deterministic (§4.1, corrects the original's
        // unordered linear `startswith` scan — see DESIGN.md).
        oid_index.sort_by(|(a_oid, a_id), (b_oid, b_id)| {
            b_oid.len().cmp(&a_oid.len()).then_with(|| a_id.cmp(b_id))
        });

        Ok(Self { by_id, oid_index, by_webhook_path })
    }
}

/// Single-writer, many-reader addon registry (§4.1 C2).
pub struct Registry<S: DurableStore> {
    store: Arc<S>,
    snapshot: RwLock<Arc<Snapshot>>,
}

impl<S: DurableStore> Registry<S> {
    /// Build an empty registry and load the initial snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Store`] if the initial load fails, or
    /// [`RegistryError::DuplicateWebhookPath`] if two enabled addons share
    /// a webhook path.
    pub async fn new(store: Arc<S>) -> Result<Self, RegistryError> {
        let snapshot = Snapshot::build(store.list_enabled_addons().await?)?;
        Ok(Self { store, snapshot: RwLock::new(Arc::new(snapshot)) })
    }

    fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(std::sync::PoisonError::into_inner))
    }

    /// Rebuild the snapshot from the durable store and atomically swap it
    /// in. On failure the previous snapshot remains active (§4.1).
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Store`] or [`RegistryError::DuplicateWebhookPath`].
    pub async fn reload(&self) -> Result<(), RegistryError> {
        let next = Snapshot::build(self.store.list_enabled_addons().await?)?;
        let mut guard = self.snapshot.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = Arc::new(next);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Addon> {
        self.snapshot().by_id.get(id).cloned()
    }

    /// Longest-prefix match against registered `enterprise_oid` entries;
    /// ties broken lexicographically by addon id (§4.1).
    #[must_use]
    pub fn find_by_oid(&self, oid: &str) -> Option<Addon> {
        let snapshot = self.snapshot();
        snapshot
            .oid_index
            .iter()
            .find(|(prefix, _)| oid.starts_with(prefix.as_str()))
            .and_then(|(_, id)| snapshot.by_id.get(id).cloned())
    }

    #[must_use]
    pub fn find_by_webhook(&self, path: &str) -> Option<Addon> {
        let snapshot = self.snapshot();
        snapshot
            .by_webhook_path
            .get(path)
            .and_then(|id| snapshot.by_id.get(id).cloned())
    }

    #[must_use]
    pub fn list_enabled(&self) -> Vec<Addon> {
        self.snapshot().by_id.values().cloned().collect()
    }

    #[must_use]
    pub fn list_by_method(&self, method: IngestMethod) -> Vec<Addon> {
        self.snapshot()
            .by_id
            .values()
            .filter(|a| a.method == method)
            .cloned()
            .collect()
    }

    /// Validate, upsert in the durable store, and reload. Installing with
    /// an unknown method or a malformed manifest fails with
    /// [`RegistryError::InvalidManifest`]; a duplicate webhook path among
    /// enabled addons fails with [`RegistryError::DuplicateWebhookPath`].
    /// In both cases the previous snapshot remains active (§4.1).
    ///
    /// # Errors
    ///
    /// See above.
    pub async fn install(&self, manifest: AddonManifest) -> Result<Addon, RegistryError> {
        manifest.validate()?;
        let addon = Addon::from_manifest(manifest, true, now());
        self.store.upsert_addon(&addon).await?;
        self.reload().await?;
        Ok(addon)
    }

    /// # Errors
    ///
    /// Returns [`RegistryError::Store`] on a backend failure.
    pub async fn uninstall(&self, id: &str) -> Result<bool, RegistryError> {
        let removed = self.store.delete_addon(id).await?;
        self.reload().await?;
        Ok(removed)
    }

    /// # Errors
    ///
    /// Returns [`RegistryError::Store`] on a backend failure.
    pub async fn enable(&self, id: &str) -> Result<bool, RegistryError> {
        let updated = self.store.set_addon_enabled(id, true).await?;
        self.reload().await?;
        Ok(updated)
    }

    /// # Errors
    ///
    /// Returns [`RegistryError::Store`] on a backend failure.
    pub async fn disable(&self, id: &str) -> Result<bool, RegistryError> {
        let updated = self.store.set_addon_enabled(id, false).await?;
        self.reload().await?;
        Ok(updated)
    }
}

fn now() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;
    use netwatch_core::manifest::{ParserConfig, Transport};
    use netwatch_store_memory::MemoryStore;

    fn trap_manifest(id: &str, oid: &str) -> AddonManifest {
        AddonManifest {
            id: id.into(),
            name: id.into(),
            version: "1.0.0".into(),
            category: "wireless".into(),
            description: None,
            parser: ParserConfig::Snmp { varbind_mappings: HashMap::new(), transformations: vec![] },
            transport: Transport::SnmpTrap { enterprise_oid: oid.into(), trap_definitions: HashMap::new() },
            raw_alert_mappings: Default::default(),
            clear_events: None,
        }
    }

    async fn registry_with(manifests: Vec<AddonManifest>) -> Registry<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        for manifest in manifests {
            let addon = Addon::from_manifest(manifest, true, now());
            store.upsert_addon(&addon).await.unwrap();
        }
        Registry::new(store).await.unwrap()
    }

    #[tokio::test]
    async fn find_by_oid_prefers_longest_prefix() {
        let registry = registry_with(vec![
            trap_manifest("vendor-short", "1.3.6.1.4.1.31926"),
            trap_manifest("vendor-long", "1.3.6.1.4.1.31926.1"),
        ])
        .await;

        let found = registry.find_by_oid("1.3.6.1.4.1.31926.1.1.2").unwrap();
        assert_eq!(found.id, "vendor-long");
    }

    #[tokio::test]
    async fn find_by_oid_ties_break_lexicographically() {
        let registry = registry_with(vec![
            trap_manifest("zzz", "1.3.6.1.4.1.1"),
            trap_manifest("aaa", "1.3.6.1.4.1.1"),
        ])
        .await;

        let found = registry.find_by_oid("1.3.6.1.4.1.1.9").unwrap();
        assert_eq!(found.id, "aaa");
    }

    #[tokio::test]
    async fn install_duplicate_webhook_path_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let registry = Registry::new(Arc::clone(&store)).await.unwrap();

        let first = AddonManifest {
            id: "a".into(),
            name: "a".into(),
            version: "1.0.0".into(),
            category: "x".into(),
            description: None,
            parser: ParserConfig::KeyValue { delimiter: ":".into(), trim: true, field_mappings: HashMap::new(), transformations: vec![] },
            transport: Transport::Webhook { endpoint_path: "/webhooks/prtg".into() },
            raw_alert_mappings: Default::default(),
            clear_events: None,
        };
        let mut second = first.clone();
        second.id = "b".into();

        registry.install(first).await.unwrap();
        let err = registry.install(second).await.unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateWebhookPath(_, _)));
        // previous snapshot stays active
        assert!(registry.get("a").is_some());
        assert!(registry.get("b").is_none());
    }
}
