use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A device registered for periodic polling by some addon (§3.2).
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub id: Uuid,
    pub name: String,
    pub ip_address: String,
    pub addon_id: Option<String>,
    pub poll_interval_seconds: i64,
    pub enabled: bool,
    /// Target-specific overrides (credentials, port, community string).
    pub config: serde_json::Value,
    pub last_poll_at: Option<DateTime<Utc>>,
}

impl Target {
    /// Whether this target is due for polling (§4.7): `enabled AND
    /// (last_poll_at IS NULL OR last_poll_at + poll_interval < now)`.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if !self.enabled {
            return false;
        }
        match self.last_poll_at {
            None => true,
            Some(last) => last + chrono::Duration::seconds(self.poll_interval_seconds) < now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(last_poll_at: Option<DateTime<Utc>>, enabled: bool) -> Target {
        Target {
            id: Uuid::new_v4(),
            name: "t".into(),
            ip_address: "10.0.0.1".into(),
            addon_id: Some("siklu".into()),
            poll_interval_seconds: 60,
            enabled,
            config: serde_json::Value::Null,
            last_poll_at,
        }
    }

    #[test]
    fn never_polled_is_due() {
        assert!(target(None, true).is_due(Utc::now()));
    }

    #[test]
    fn disabled_is_never_due() {
        assert!(!target(None, false).is_due(Utc::now()));
    }

    #[test]
    fn recently_polled_is_not_due() {
        let t = target(Some(Utc::now()), true);
        assert!(!t.is_due(Utc::now()));
    }

    #[test]
    fn overdue_poll_is_due() {
        let t = target(Some(Utc::now() - chrono::Duration::seconds(120)), true);
        assert!(t.is_due(Utc::now()));
    }
}
