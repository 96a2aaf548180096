use serde::{Deserialize, Serialize};

use crate::alert::Alert;

/// Event types emitted by the Alert Engine (§4.4, §6.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertEventType {
    AlertCreated,
    AlertUpdated,
    AlertResolved,
}

impl std::fmt::Display for AlertEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::AlertCreated => "alert_created",
            Self::AlertUpdated => "alert_updated",
            Self::AlertResolved => "alert_resolved",
        };
        f.write_str(s)
    }
}

/// The payload carried on the Event Bus: `{event_type, alert}` (§4.4, §6.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    pub event_type: AlertEventType,
    pub alert: Alert,
}
