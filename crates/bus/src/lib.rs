//! The Event Bus (§4.4): a process-local broadcast of [`AlertEvent`]s plus
//! an optional cross-process publisher, composed behind one `publish` call.

use std::sync::Arc;

use async_trait::async_trait;
use netwatch_core::AlertEvent;
use tokio::sync::broadcast;

/// A cross-process transport the bus fans `AlertEvent`s out to (the
/// WebSocket gateway subscribes on the other end). Failure is logged and
/// swallowed — in-process delivery must not depend on it (§4.4).
#[async_trait]
pub trait ExternalPublisher: Send + Sync {
    async fn publish(&self, event: &AlertEvent) -> Result<(), String>;
}

/// Default capacity for the broadcast channel; slow subscribers fall behind
/// and see [`broadcast::error::RecvError::Lagged`] rather than stalling
/// publishers.
const CHANNEL_CAPACITY: usize = 1024;

/// Process-local fan-out of [`AlertEvent`]s, with an optional external
/// publisher for cross-process delivery.
///
/// Grounded in the reference stack's `stream_tx: broadcast::Sender<..>`
/// field on its gateway: subscribers call [`EventBus::subscribe`] to get a
/// receiver, and `publish` is fire-and-forget — a channel with no
/// subscribers is not an error.
pub struct EventBus {
    tx: broadcast::Sender<AlertEvent>,
    external: Option<Arc<dyn ExternalPublisher>>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx, external: None }
    }

    #[must_use]
    pub fn with_external(external: Arc<dyn ExternalPublisher>) -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx, external: Some(external) }
    }

    /// Subscribe to the process-local stream, e.g. for WebSocket fan-out.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AlertEvent> {
        self.tx.subscribe()
    }

    /// Emit on the local bus, then best-effort forward to the external
    /// publisher. Never returns an error: a lack of local subscribers and a
    /// failed external publish are both expected, logged outcomes (§4.4).
    pub async fn publish(&self, event: AlertEvent) {
        // `send` only errors when there are zero receivers; that is normal
        // when nothing has subscribed yet.
        let _ = self.tx.send(event.clone());

        if let Some(external) = &self.external {
            if let Err(err) = external.publish(&event).await {
                tracing::warn!(error = %err, event_type = %event.event_type, "external event publish failed");
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netwatch_core::{Alert, AlertEventType, AlertStatus, Severity};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    fn sample_alert() -> Alert {
        let now = chrono::Utc::now();
        Alert {
            id: Uuid::new_v4(),
            addon_id: "siklu".into(),
            fingerprint: "abc123".into(),
            device_ip: "10.0.0.5".into(),
            device_name: None,
            alert_type: "link_down".into(),
            severity: Severity::Warning,
            category: "wireless".into(),
            title: "Siklu: Link Down on 10.0.0.5".into(),
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
    async fn subscribers_receive_published_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.publish(AlertEvent { event_type: AlertEventType::AlertCreated, alert: sample_alert() }).await;

        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_type, AlertEventType::AlertCreated);
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_error() {
        let bus = EventBus::new();
        bus.publish(AlertEvent { event_type: AlertEventType::AlertUpdated, alert: sample_alert() }).await;
    }

    struct CountingPublisher {
        count: AtomicUsize,
    }

    #[async_trait]
    impl ExternalPublisher for CountingPublisher {
        async fn publish(&self, _event: &AlertEvent) -> Result<(), String> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn external_publisher_is_invoked() {
        let publisher = Arc::new(CountingPublisher { count: AtomicUsize::new(0) });
        let bus = EventBus::with_external(publisher.clone());

        bus.publish(AlertEvent { event_type: AlertEventType::AlertResolved, alert: sample_alert() }).await;

        assert_eq!(publisher.count.load(Ordering::SeqCst), 1);
    }
}
