//! Addon manifest types (§3.1).
//!
//! Modeled as a tagged union on `method` rather than the original's
//! duck-typed dict (§9 "Dynamic dispatch on manifest field types... replace
//! with a tagged union"). `AlertMappings` normalizes the two
//! semantically-equivalent wire forms (grouped / flat) behind one accessor
//! (§9 "Legacy flat vs. grouped alert-mapping manifests").

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ManifestError;

/// `method` discriminator (§3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestMethod {
    SnmpTrap,
    Webhook,
    ApiPoll,
    SnmpPoll,
    Ssh,
}

impl std::fmt::Display for IngestMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::SnmpTrap => "snmp_trap",
            Self::Webhook => "webhook",
            Self::ApiPoll => "api_poll",
            Self::SnmpPoll => "snmp_poll",
            Self::Ssh => "ssh",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for IngestMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "snmp_trap" => Ok(Self::SnmpTrap),
            "webhook" => Ok(Self::Webhook),
            "api_poll" => Ok(Self::ApiPoll),
            "snmp_poll" => Ok(Self::SnmpPoll),
            "ssh" => Ok(Self::Ssh),
            other => Err(format!("unknown ingest method: {other}")),
        }
    }
}

/// Parser block (§3.1, dispatch rules in §4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParserConfig {
    Json {
        field_mappings: HashMap<String, String>,
        #[serde(default)]
        transformations: Vec<Transformation>,
    },
    Snmp {
        #[serde(default)]
        varbind_mappings: HashMap<String, String>,
        #[serde(default)]
        transformations: Vec<Transformation>,
    },
    Regex {
        pattern: String,
        fields: Vec<String>,
        #[serde(default)]
        transformations: Vec<Transformation>,
    },
    Grok {
        grok_pattern: String,
        #[serde(default)]
        custom_patterns: HashMap<String, String>,
        #[serde(default)]
        transformations: Vec<Transformation>,
    },
    KeyValue {
        #[serde(default = "default_delimiter")]
        delimiter: String,
        #[serde(default = "default_true")]
        trim: bool,
        #[serde(default)]
        field_mappings: HashMap<String, String>,
        #[serde(default)]
        transformations: Vec<Transformation>,
    },
}

fn default_delimiter() -> String {
    ":".to_string()
}

const fn default_true() -> bool {
    true
}

impl ParserConfig {
    #[must_use]
    pub fn transformations(&self) -> &[Transformation] {
        match self {
            Self::Json { transformations, .. }
            | Self::Snmp { transformations, .. }
            | Self::Regex { transformations, .. }
            | Self::Grok { transformations, .. }
            | Self::KeyValue { transformations, .. } => transformations,
        }
    }
}

/// A post-extraction field transformation (§4.2), applied in declared order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Transformation {
    Lookup {
        field: String,
        map: HashMap<String, String>,
    },
    Datetime {
        field: String,
        format: String,
    },
    ExtractIp {
        field: String,
        #[serde(default)]
        pattern: Option<String>,
    },
    Lowercase {
        field: String,
    },
    Uppercase {
        field: String,
    },
}

/// `snmp_trap.trap_definitions` entry (§3.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrapDefinition {
    pub alert_type: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub clear_oid: Option<String>,
}

/// `api_poll.endpoints[]` entry (§3.1, §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEndpoint {
    pub path: String,
    #[serde(default = "default_get")]
    pub method: String,
    #[serde(default)]
    pub alert_on_failure: Option<String>,
}

fn default_get() -> String {
    "GET".to_string()
}

/// `alert_conditions[]` comparison operator (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Contains,
}

/// `snmp_poll.poll_groups[].alert_conditions[]` entry (§3.1, §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertCondition {
    pub field: String,
    pub operator: ConditionOperator,
    pub value: serde_json::Value,
    pub alert_type: String,
}

/// `snmp_poll.poll_groups[]` entry (§3.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollGroup {
    pub oids: Vec<String>,
    #[serde(default)]
    pub alert_conditions: Vec<AlertCondition>,
}

/// `ssh.commands[]` entry (§3.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshCommand {
    pub command: String,
    pub parse_as: String,
}

/// Transport block; exactly one variant matches `manifest.method` (§3.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    SnmpTrap {
        enterprise_oid: String,
        #[serde(default)]
        trap_definitions: HashMap<String, TrapDefinition>,
    },
    Webhook {
        endpoint_path: String,
    },
    ApiPoll {
        base_url_template: String,
        #[serde(default)]
        endpoints: Vec<ApiEndpoint>,
        auth_type: String,
        #[serde(default)]
        default_credentials: Option<serde_json::Value>,
    },
    SnmpPoll {
        #[serde(default)]
        poll_groups: Vec<PollGroup>,
    },
    Ssh {
        #[serde(default)]
        commands: Vec<SshCommand>,
    },
}

impl Transport {
    #[must_use]
    pub const fn method(&self) -> IngestMethod {
        match self {
            Self::SnmpTrap { .. } => IngestMethod::SnmpTrap,
            Self::Webhook { .. } => IngestMethod::Webhook,
            Self::ApiPoll { .. } => IngestMethod::ApiPoll,
            Self::SnmpPoll { .. } => IngestMethod::SnmpPoll,
            Self::Ssh { .. } => IngestMethod::Ssh,
        }
    }
}

/// One entry of the normalized alert-mapping accessor (§3.1, §9).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertMappingEntry {
    pub severity: Option<String>,
    pub category: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Grouped wire form (§3.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertMappingGroup {
    #[serde(default)]
    pub alerts: HashMap<String, AlertMappingEntry>,
}

/// The raw, wire-level alert-mapping block before normalization: accepts
/// either the grouped or flat form (§3.1), or both left empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawAlertMappings {
    #[serde(default)]
    pub alert_mappings: Vec<AlertMappingGroup>,
    #[serde(default)]
    pub severity_mappings: HashMap<String, String>,
    #[serde(default)]
    pub category_mappings: HashMap<String, String>,
    #[serde(default)]
    pub title_templates: HashMap<String, String>,
    #[serde(default)]
    pub description_templates: HashMap<String, String>,
    #[serde(default)]
    pub disabled_alert_types: Vec<String>,
}

/// Single accessor normalizing both the grouped and flat wire forms; no
/// ingestion code branches on manifest version (§9).
#[derive(Debug, Clone, Default)]
pub struct AlertMappings(HashMap<String, AlertMappingEntry>);

impl From<RawAlertMappings> for AlertMappings {
    fn from(raw: RawAlertMappings) -> Self {
        let mut merged: HashMap<String, AlertMappingEntry> = HashMap::new();

        for group in raw.alert_mappings {
            for (alert_type, entry) in group.alerts {
                merged.insert(alert_type, entry);
            }
        }

        for (alert_type, severity) in raw.severity_mappings {
            merged.entry(alert_type).or_default().severity = Some(severity);
        }
        for (alert_type, category) in raw.category_mappings {
            merged.entry(alert_type).or_default().category = Some(category);
        }
        for (alert_type, title) in raw.title_templates {
            merged.entry(alert_type).or_default().title = Some(title);
        }
        for (alert_type, description) in raw.description_templates {
            merged.entry(alert_type).or_default().description = Some(description);
        }
        for alert_type in raw.disabled_alert_types {
            merged.entry(alert_type).or_default().enabled = false;
        }

        Self(merged)
    }
}

impl AlertMappings {
    #[must_use]
    pub fn severity(&self, alert_type: &str) -> Option<&str> {
        self.0.get(alert_type).and_then(|e| e.severity.as_deref())
    }

    #[must_use]
    pub fn category(&self, alert_type: &str) -> Option<&str> {
        self.0.get(alert_type).and_then(|e| e.category.as_deref())
    }

    #[must_use]
    pub fn title(&self, alert_type: &str) -> Option<&str> {
        self.0.get(alert_type).and_then(|e| e.title.as_deref())
    }

    /// Whether `alert_type` is enabled. Alert types with no mapping entry
    /// at all default to enabled (only explicit `enabled: false` mutes).
    #[must_use]
    pub fn is_enabled(&self, alert_type: &str) -> bool {
        self.0.get(alert_type).is_none_or(|e| e.enabled)
    }
}

/// Clear-event detection policy (§3.1, §4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ClearEvents {
    Suffix { clear_suffix: String },
    FieldValue { clear_field: String, clear_values: Vec<String> },
    OidPair,
}

/// The full addon manifest (§3.1), immutable after install.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddonManifest {
    pub id: String,
    pub name: String,
    pub version: String,
    pub category: String,
    #[serde(default)]
    pub description: Option<String>,
    pub parser: ParserConfig,
    pub transport: Transport,
    #[serde(flatten)]
    pub raw_alert_mappings: RawAlertMappings,
    #[serde(default)]
    pub clear_events: Option<ClearEvents>,
}

impl AddonManifest {
    /// Validate the §3.1 invariants. Does not check cross-addon invariants
    /// (global webhook-path uniqueness); that requires the registry
    /// snapshot and lives in `netwatch-registry`.
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.id.trim().is_empty() {
            return Err(ManifestError::EmptyId);
        }
        match &self.transport {
            Transport::SnmpTrap { enterprise_oid, .. } if enterprise_oid.trim().is_empty() => {
                Err(ManifestError::MissingEnterpriseOid)
            }
            Transport::Webhook { endpoint_path } if endpoint_path.trim().is_empty() => {
                Err(ManifestError::MissingEndpointPath)
            }
            _ => Ok(()),
        }
    }

    #[must_use]
    pub fn method(&self) -> IngestMethod {
        self.transport.method()
    }

    #[must_use]
    pub fn alert_mappings(&self) -> AlertMappings {
        self.raw_alert_mappings.clone().into()
    }

    /// Enterprise OID used for trap dispatch, if this is an `snmp_trap` addon.
    #[must_use]
    pub fn enterprise_oid(&self) -> Option<&str> {
        match &self.transport {
            Transport::SnmpTrap { enterprise_oid, .. } => Some(enterprise_oid),
            _ => None,
        }
    }

    /// Webhook path used for dispatch, if this is a `webhook` addon.
    #[must_use]
    pub fn webhook_path(&self) -> Option<&str> {
        match &self.transport {
            Transport::Webhook { endpoint_path } => Some(endpoint_path),
            _ => None,
        }
    }
}

/// A row in the `addons` table (§6.6): identity/lifecycle metadata wrapping
/// the immutable manifest document.
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Addon {
    pub id: String,
    pub name: String,
    pub version: String,
    pub method: IngestMethod,
    pub category: String,
    pub description: Option<String>,
    pub manifest: AddonManifest,
    pub enabled: bool,
    pub installed_at: DateTime<Utc>,
}

impl Addon {
    #[must_use]
    pub fn from_manifest(manifest: AddonManifest, enabled: bool, installed_at: DateTime<Utc>) -> Self {
        Self {
            id: manifest.id.clone(),
            name: manifest.name.clone(),
            version: manifest.version.clone(),
            method: manifest.method(),
            category: manifest.category.clone(),
            description: manifest.description.clone(),
            enabled,
            manifest,
            installed_at,
        }
    }

    #[must_use]
    pub fn is_alert_enabled(&self, alert_type: &str) -> bool {
        self.manifest.alert_mappings().is_enabled(alert_type)
    }

    #[must_use]
    pub fn severity_for(&self, alert_type: &str) -> crate::severity::Severity {
        self.manifest
            .alert_mappings()
            .severity(alert_type)
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(crate::severity::Severity::default_unmapped)
    }

    #[must_use]
    pub fn category_for(&self, alert_type: &str) -> String {
        self.manifest
            .alert_mappings()
            .category(alert_type)
            .map(str::to_string)
            .unwrap_or_else(|| self.category.clone())
    }

    /// `defaultTitle(parsed, addon)` from §4.3 step 4, used when the
    /// manifest has no explicit `title_mappings` entry for `alert_type`.
    #[must_use]
    pub fn default_title(&self, alert_type: &str, device_ip: &str, device_name: Option<&str>) -> String {
        let device = (!device_ip.is_empty())
            .then_some(device_ip)
            .or_else(|| device_name.filter(|s| !s.is_empty()))
            .unwrap_or("Unknown");
        format!("{}: {} on {}", self.name, titlecase(alert_type), device)
    }

    #[must_use]
    pub fn title_for(&self, alert_type: &str, device_ip: &str, device_name: Option<&str>) -> String {
        self.manifest
            .alert_mappings()
            .title(alert_type)
            .map(str::to_string)
            .unwrap_or_else(|| self.default_title(alert_type, device_ip, device_name))
    }
}

/// Title-case a snake_case alert type, e.g. `link_down` → `Link Down`.
fn titlecase(s: &str) -> String {
    s.split(['_', '-'])
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_manifest() -> AddonManifest {
        let json = serde_json::json!({
            "id": "siklu",
            "name": "Siklu Radio",
            "version": "1.0.0",
            "category": "wireless",
            "parser": { "type": "snmp", "varbind_mappings": {} },
            "transport": {
                "snmp_trap": {
                    "enterprise_oid": "1.3.6.1.4.1.31926",
                    "trap_definitions": {
                        "1.3.6.1.4.1.31926.1.1.2.1.1": { "alert_type": "link_down" }
                    }
                }
            },
            "severity_mappings": { "link_down": "critical" }
        });
        serde_json::from_value(json).expect("manifest should deserialize")
    }

    #[test]
    fn validates_snmp_trap_manifest() {
        let manifest = sample_manifest();
        assert!(manifest.validate().is_ok());
        assert_eq!(manifest.method(), IngestMethod::SnmpTrap);
    }

    #[test]
    fn missing_enterprise_oid_is_invalid() {
        let json = serde_json::json!({
            "id": "x",
            "name": "X",
            "version": "1.0.0",
            "category": "c",
            "parser": { "type": "snmp" },
            "transport": { "snmp_trap": { "enterprise_oid": "", "trap_definitions": {} } }
        });
        let manifest: AddonManifest = serde_json::from_value(json).unwrap();
        assert_eq!(manifest.validate(), Err(ManifestError::MissingEnterpriseOid));
    }

    #[test]
    fn flat_and_grouped_mappings_are_equivalent() {
        let flat = sample_manifest().alert_mappings();
        assert_eq!(flat.severity("link_down"), Some("critical"));

        let grouped_json = serde_json::json!({
            "id": "siklu2",
            "name": "Siklu Radio",
            "version": "1.0.0",
            "category": "wireless",
            "parser": { "type": "snmp" },
            "transport": { "snmp_trap": { "enterprise_oid": "1.3.6.1.4.1.31926", "trap_definitions": {} } },
            "alert_mappings": [
                { "alerts": { "link_down": { "severity": "critical", "enabled": true } } }
            ]
        });
        let grouped: AddonManifest = serde_json::from_value(grouped_json).unwrap();
        assert_eq!(grouped.alert_mappings().severity("link_down"), Some("critical"));
    }

    #[test]
    fn disabled_alert_type_is_not_enabled() {
        let json = serde_json::json!({
            "id": "x",
            "name": "X",
            "version": "1.0.0",
            "category": "c",
            "parser": { "type": "json", "field_mappings": {} },
            "transport": { "webhook": { "endpoint_path": "/webhooks/x" } },
            "alert_mappings": [
                { "alerts": { "cpu_high": { "enabled": false } } }
            ]
        });
        let manifest: AddonManifest = serde_json::from_value(json).unwrap();
        assert!(!manifest.alert_mappings().is_enabled("cpu_high"));
        assert!(manifest.alert_mappings().is_enabled("anything_else"));
    }

    #[test]
    fn default_title_format() {
        let manifest = sample_manifest();
        let addon = Addon::from_manifest(manifest, true, Utc::now());
        assert_eq!(
            addon.default_title("link_down", "10.0.0.5", None),
            "Siklu Radio: Link Down on 10.0.0.5"
        );
    }

    #[test]
    fn default_title_prefers_device_ip_over_device_name() {
        let manifest = sample_manifest();
        let addon = Addon::from_manifest(manifest, true, Utc::now());
        assert_eq!(
            addon.default_title("link_down", "10.0.0.5", Some("core-switch")),
            "Siklu Radio: Link Down on 10.0.0.5"
        );
    }
}
