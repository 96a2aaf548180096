//! SNMP trap ingestor (§4.5): listens on UDP, decodes v1/v2c traps, and
//! hands the result to the Parse Engine then the Alert Engine.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use netwatch_core::manifest::Transport;
use netwatch_core::Addon;
use netwatch_engine::Engine;
use netwatch_registry::Registry;
use netwatch_store::DurableStore;
use serde_json::json;
use tokio::net::UdpSocket;

use crate::error::IngestError;
use crate::snmp_ber::decode_trap;

/// Counters exposed on `/stats` (§4.5).
#[derive(Debug, Default)]
pub struct TrapStats {
    pub traps_received: AtomicU64,
    pub traps_processed: AtomicU64,
    pub traps_dropped: AtomicU64,
    pub errors: AtomicU64,
}

impl TrapStats {
    #[must_use]
    pub fn snapshot(&self) -> (u64, u64, u64, u64) {
        (
            self.traps_received.load(Ordering::Relaxed),
            self.traps_processed.load(Ordering::Relaxed),
            self.traps_dropped.load(Ordering::Relaxed),
            self.errors.load(Ordering::Relaxed),
        )
    }
}

pub struct TrapIngestor<S: DurableStore> {
    registry: Arc<Registry<S>>,
    engine: Arc<Engine<S>>,
    stats: Arc<TrapStats>,
}

impl<S: DurableStore + 'static> TrapIngestor<S> {
    #[must_use]
    pub fn new(registry: Arc<Registry<S>>, engine: Arc<Engine<S>>) -> Self {
        Self { registry, engine, stats: Arc::new(TrapStats::default()) }
    }

    #[must_use]
    pub fn stats(&self) -> Arc<TrapStats> {
        Arc::clone(&self.stats)
    }

    /// Bind to `port` on all interfaces and process datagrams until the
    /// socket errors out. Each datagram's handling is isolated: a
    /// malformed trap increments a counter and is dropped, never panics
    /// and never stops the loop (§4.5).
    pub async fn run(&self, port: u16) -> Result<(), IngestError> {
        let socket = UdpSocket::bind(("0.0.0.0", port)).await.map_err(IngestError::Bind)?;
        tracing::info!(port, "snmp trap ingestor listening");

        let mut buf = [0u8; 65_535];
        loop {
            let (len, source) = match socket.recv_from(&mut buf).await {
                Ok(pair) => pair,
                Err(err) => {
                    tracing::warn!(error = %err, "trap socket recv error");
                    self.stats.errors.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
            };

            self.stats.traps_received.fetch_add(1, Ordering::Relaxed);
            self.handle_datagram(&buf[..len], source).await;
        }
    }

    async fn handle_datagram(&self, data: &[u8], source: SocketAddr) {
        let Some(decoded) = decode_trap(data) else {
            tracing::debug!(%source, "dropping malformed trap datagram");
            self.stats.errors.fetch_add(1, Ordering::Relaxed);
            return;
        };

        let addon = self
            .registry
            .find_by_oid(&decoded.enterprise_oid)
            .or_else(|| self.registry.find_by_oid(&decoded.trap_oid));

        let Some(addon) = addon else {
            tracing::debug!(enterprise_oid = %decoded.enterprise_oid, "no addon for trap oid, dropping");
            self.stats.traps_dropped.fetch_add(1, Ordering::Relaxed);
            return;
        };

        let is_clear = is_clear_trap(&addon, &decoded.trap_oid);

        let varbinds: serde_json::Map<String, serde_json::Value> = decoded
            .varbinds
            .iter()
            .map(|(oid, value)| (oid.clone(), serde_json::Value::String(value.to_display_string())))
            .collect();

        let raw = json!({
            "source_ip": source.ip().to_string(),
            "trap_oid": decoded.trap_oid,
            "enterprise_oid": decoded.enterprise_oid,
            "varbinds": varbinds,
            "_is_clear": is_clear,
        });

        let Some(parsed) = netwatch_parser::parse(&raw, &addon.manifest, &addon.id) else {
            tracing::warn!(addon_id = %addon.id, %source, "failed to parse trap");
            self.stats.errors.fetch_add(1, Ordering::Relaxed);
            return;
        };

        match self.engine.process(parsed, &addon).await {
            Ok(_) => {
                self.stats.traps_processed.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                tracing::error!(error = %err, addon_id = %addon.id, "engine error processing trap");
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
            }
        };
    }
}

/// §4.5 step 5: a trap is a clear event if its OID is declared as some
/// trap definition's `clear_oid` on this addon.
fn is_clear_trap(addon: &Addon, trap_oid: &str) -> bool {
    let Transport::SnmpTrap { trap_definitions, .. } = &addon.manifest.transport else {
        return false;
    };
    trap_definitions.values().any(|def| def.clear_oid.as_deref() == Some(trap_oid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use netwatch_bus::EventBus;
    use netwatch_core::manifest::{ParserConfig, RawAlertMappings, TrapDefinition};
    use netwatch_core::AddonManifest;
    use netwatch_store_memory::MemoryStore;
    use std::collections::HashMap;

    fn addon_with_clear() -> Addon {
        let mut trap_definitions = HashMap::new();
        trap_definitions.insert(
            "1.3.6.1.4.1.1.1".to_string(),
            TrapDefinition {
                alert_type: "link_down".into(),
                description: Some("Link down".into()),
                clear_oid: Some("1.3.6.1.4.1.1.2".into()),
            },
        );
        let manifest = AddonManifest {
            id: "siklu".into(),
            name: "Siklu".into(),
            version: "1.0.0".into(),
            category: "wireless".into(),
            description: None,
            parser: ParserConfig::Snmp { varbind_mappings: HashMap::new(), transformations: vec![] },
            transport: Transport::SnmpTrap { enterprise_oid: "1.3.6.1.4.1.1".into(), trap_definitions },
            raw_alert_mappings: RawAlertMappings::default(),
            clear_events: None,
        };
        Addon::from_manifest(manifest, true, chrono::Utc::now())
    }

    #[test]
    fn clear_oid_is_detected() {
        let addon = addon_with_clear();
        assert!(is_clear_trap(&addon, "1.3.6.1.4.1.1.2"));
        assert!(!is_clear_trap(&addon, "1.3.6.1.4.1.1.1"));
    }

    #[tokio::test]
    async fn unmatched_oid_is_dropped_without_panicking() {
        let store = Arc::new(MemoryStore::default());
        let registry = Arc::new(Registry::new(store.clone()).await.unwrap());
        let engine = Arc::new(Engine::new(store, Arc::new(EventBus::new())));
        let ingestor = TrapIngestor::new(registry, engine);

        ingestor.handle_datagram(b"not a valid trap", "127.0.0.1:1".parse().unwrap()).await;
        let (_, _, dropped, errors) = ingestor.stats().snapshot();
        assert_eq!(dropped, 0);
        assert_eq!(errors, 1);
    }
}
