use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::severity::Severity;
use crate::status::AlertStatus;

/// The central persisted entity (§3.3).
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub addon_id: String,
    /// 32 hex characters; see [`crate::fingerprint::compute_fingerprint`].
    pub fingerprint: String,
    pub device_ip: String,
    pub device_name: Option<String>,
    pub alert_type: String,
    pub severity: Severity,
    pub category: String,
    pub title: String,
    pub message: Option<String>,
    pub status: AlertStatus,
    pub is_clear: bool,
    pub occurred_at: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    /// Always ≥ 1, non-decreasing over the alert's lifetime (§8).
    pub occurrence_count: i64,
    pub raw_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// The uniform record produced by the Parse Engine and consumed by the
/// Alert Engine (§3.4). Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedAlert {
    pub addon_id: String,
    pub alert_type: String,
    pub device_ip: String,
    pub device_name: Option<String>,
    pub message: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub is_clear: bool,
    pub raw_data: serde_json::Value,
    pub fields: std::collections::HashMap<String, String>,
}

impl ParsedAlert {
    /// Fields extracted by the Parse Engine, ready for the Alert Engine's
    /// severity/category/title resolution (§4.3).
    #[must_use]
    pub fn new(addon_id: impl Into<String>, alert_type: impl Into<String>, device_ip: impl Into<String>) -> Self {
        Self {
            addon_id: addon_id.into(),
            alert_type: alert_type.into(),
            device_ip: device_ip.into(),
            device_name: None,
            message: None,
            timestamp: None,
            is_clear: false,
            raw_data: serde_json::Value::Null,
            fields: std::collections::HashMap::new(),
        }
    }
}

/// Filters accepted by `Engine::list` (§4.3).
#[derive(Debug, Clone, Default)]
pub struct AlertFilters {
    pub status: Vec<AlertStatus>,
    pub severity: Vec<Severity>,
    pub addon_id: Option<String>,
    pub device_ip: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl AlertFilters {
    const DEFAULT_LIMIT: i64 = 50;
    const MAX_LIMIT: i64 = 500;

    /// Clamp `limit` into `1..=500`, defaulting to 50 when unset (mirrors
    /// the original `alerts.py` route's pagination defaults).
    #[must_use]
    pub fn effective_limit(&self) -> i64 {
        if self.limit <= 0 {
            Self::DEFAULT_LIMIT
        } else {
            self.limit.min(Self::MAX_LIMIT)
        }
    }
}

/// Aggregate counts returned by `Engine::stats` (§4.3).
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AlertStats {
    pub by_severity: std::collections::HashMap<String, i64>,
    pub by_status: std::collections::HashMap<String, i64>,
    pub by_addon: std::collections::HashMap<String, i64>,
    pub total_active: i64,
}
