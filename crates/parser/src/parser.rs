use std::collections::HashMap;

use netwatch_core::manifest::{ClearEvents, ParserConfig, Transformation, Transport};
use netwatch_core::{AddonManifest, ParsedAlert};
use regex::Regex;
use serde_json::Value;

use crate::{grok, json_path, timestamp};

/// Pure, stateless: apply `manifest.parser` to `raw`, run transformations,
/// detect clear events, and build a [`ParsedAlert`] (§4.2).
///
/// Returns `None` if no fields are extracted or `alert_type` cannot be
/// determined; the caller (an ingestor) logs and drops the event.
#[must_use]
pub fn parse(raw: &Value, manifest: &AddonManifest, addon_id: &str) -> Option<ParsedAlert> {
    let mut fields = match &manifest.parser {
        ParserConfig::Json { field_mappings, .. } => parse_json(raw, field_mappings),
        ParserConfig::Snmp { varbind_mappings, .. } => parse_snmp(raw, &manifest.transport, varbind_mappings),
        ParserConfig::Regex { pattern, fields, .. } => parse_regex(raw, pattern, fields),
        ParserConfig::Grok { grok_pattern, custom_patterns, .. } => parse_grok(raw, grok_pattern, custom_patterns),
        ParserConfig::KeyValue { delimiter, trim, field_mappings, .. } => {
            parse_key_value(raw, delimiter, *trim, field_mappings)
        }
    };

    if fields.is_empty() {
        return None;
    }

    apply_transformations(&mut fields, manifest.parser.transformations());

    let alert_type = fields.remove("alert_type")?;
    let device_ip = fields.remove("device_ip").unwrap_or_default();
    let device_name = fields.remove("device_name");
    let message = fields.remove("message");
    let timestamp = fields.get("timestamp").and_then(|v| timestamp::parse(v));

    let is_clear = is_clear_event(&alert_type, &fields, raw, manifest.clear_events.as_ref());

    let raw_data = if raw.is_object() { raw.clone() } else { serde_json::json!({ "raw": raw }) };

    Some(ParsedAlert {
        addon_id: addon_id.to_string(),
        alert_type,
        device_ip,
        device_name,
        message,
        timestamp,
        is_clear,
        raw_data,
        fields,
    })
}

fn parse_json(raw: &Value, field_mappings: &HashMap<String, String>) -> HashMap<String, String> {
    let mut result = HashMap::new();
    let Value::Object(_) = raw else { return result };

    for (target_field, path) in field_mappings {
        if let Some(value) = json_path::extract(raw, path) {
            if !value.is_null() {
                result.insert(target_field.clone(), json_path::value_to_string(value));
            }
        }
    }
    result
}

fn parse_snmp(
    raw: &Value,
    transport: &Transport,
    varbind_mappings: &HashMap<String, String>,
) -> HashMap<String, String> {
    let mut result = HashMap::new();

    if let Some(source_ip) = raw.get("source_ip").and_then(Value::as_str) {
        result.insert("device_ip".to_string(), source_ip.to_string());
    }

    let trap_oid = raw
        .get("trap_oid")
        .or_else(|| raw.get("oid"))
        .and_then(Value::as_str)
        .unwrap_or_default();

    if let Transport::SnmpTrap { trap_definitions, .. } = transport {
        if let Some(def) = trap_definitions.get(trap_oid) {
            result.insert("alert_type".to_string(), def.alert_type.clone());
            if let Some(description) = &def.description {
                result.insert("message".to_string(), description.clone());
            }
        }
    }

    if let Some(varbinds) = raw.get("varbinds").and_then(Value::as_object) {
        for (oid, field_name) in varbind_mappings {
            if let Some(value) = varbinds.get(oid) {
                if !value.is_null() {
                    result.insert(field_name.clone(), json_path::value_to_string(value));
                }
            }
        }
    }

    result
}

fn as_text(raw: &Value) -> String {
    match raw {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_regex(raw: &Value, pattern: &str, field_names: &[String]) -> HashMap<String, String> {
    let mut result = HashMap::new();
    let Ok(re) = Regex::new(pattern) else { return result };
    let text = as_text(raw);

    let Some(caps) = re.captures(&text) else { return result };
    for (i, field_name) in field_names.iter().enumerate() {
        if let Some(m) = caps.get(i + 1) {
            result.insert(field_name.clone(), m.as_str().to_string());
        }
    }
    result
}

fn parse_grok(raw: &Value, grok_pattern: &str, custom_patterns: &HashMap<String, String>) -> HashMap<String, String> {
    let mut result = HashMap::new();
    let pattern = grok::to_regex_pattern(grok_pattern, custom_patterns);
    let Ok(re) = Regex::new(&pattern) else { return result };
    let text = as_text(raw);

    let Some(caps) = re.captures(&text) else { return result };
    for name in re.capture_names().flatten() {
        if let Some(m) = caps.name(name) {
            result.insert(name.to_string(), m.as_str().to_string());
        }
    }
    result
}

fn parse_key_value(
    raw: &Value,
    delimiter: &str,
    trim: bool,
    field_mappings: &HashMap<String, String>,
) -> HashMap<String, String> {
    let mut result = HashMap::new();
    let text = as_text(raw);

    for line in text.lines() {
        let Some((key, value)) = line.split_once(delimiter) else { continue };
        let (key, value) = if trim { (key.trim(), value.trim()) } else { (key, value) };
        let target_field = field_mappings.get(key).map_or(key, String::as_str);
        result.insert(target_field.to_string(), value.to_string());
    }
    result
}

fn apply_transformations(fields: &mut HashMap<String, String>, transformations: &[Transformation]) {
    for transformation in transformations {
        let field_name = match transformation {
            Transformation::Lookup { field, .. }
            | Transformation::Datetime { field, .. }
            | Transformation::ExtractIp { field, .. }
            | Transformation::Lowercase { field }
            | Transformation::Uppercase { field } => field,
        };

        let Some(value) = fields.get(field_name) else { continue };

        let new_value = match transformation {
            Transformation::Lookup { map, .. } => map.get(value).cloned(),
            Transformation::Datetime { format, .. } => {
                chrono::NaiveDateTime::parse_from_str(value, format)
                    .ok()
                    .map(|dt| dt.format(format).to_string())
            }
            Transformation::ExtractIp { pattern, .. } => {
                let pattern = pattern.as_deref().unwrap_or(r"(\d+\.\d+\.\d+\.\d+)");
                Regex::new(pattern)
                    .ok()
                    .and_then(|re| re.captures(value))
                    .and_then(|caps| caps.get(1).map(|m| m.as_str().to_string()))
            }
            Transformation::Lowercase { .. } => Some(value.to_lowercase()),
            Transformation::Uppercase { .. } => Some(value.to_uppercase()),
        };

        if let Some(new_value) = new_value {
            fields.insert(field_name.clone(), new_value);
        }
    }
}

fn is_clear_event(alert_type: &str, fields: &HashMap<String, String>, raw: &Value, clear_events: Option<&ClearEvents>) -> bool {
    match clear_events {
        Some(ClearEvents::Suffix { clear_suffix }) => alert_type.ends_with(clear_suffix.as_str()),
        Some(ClearEvents::FieldValue { clear_field, clear_values }) => fields
            .get(clear_field)
            .is_some_and(|value| clear_values.iter().any(|v| v.eq_ignore_ascii_case(value))),
        Some(ClearEvents::OidPair) | None => raw.get("_is_clear").and_then(Value::as_bool).unwrap_or(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netwatch_core::manifest::{RawAlertMappings, TrapDefinition};
    use serde_json::json;

    fn manifest_with(parser: ParserConfig, transport: Transport, clear_events: Option<ClearEvents>) -> AddonManifest {
        AddonManifest {
            id: "siklu".into(),
            name: "Siklu".into(),
            version: "1.0.0".into(),
            category: "wireless".into(),
            description: None,
            parser,
            transport,
            raw_alert_mappings: RawAlertMappings::default(),
            clear_events,
        }
    }

    #[test]
    fn json_parser_extracts_dotted_path() {
        let manifest = manifest_with(
            ParserConfig::Json {
                field_mappings: HashMap::from([
                    ("alert_type".to_string(), "$.event.type".to_string()),
                    ("device_ip".to_string(), "ip".to_string()),
                ]),
                transformations: vec![],
            },
            Transport::Webhook { endpoint_path: "/webhooks/siklu".into() },
            None,
        );
        let raw = json!({"event": {"type": "link_down"}, "ip": "10.0.0.5"});

        let parsed = parse(&raw, &manifest, "siklu").unwrap();
        assert_eq!(parsed.alert_type, "link_down");
        assert_eq!(parsed.device_ip, "10.0.0.5");
    }

    #[test]
    fn snmp_parser_maps_trap_oid_and_varbinds() {
        let mut trap_definitions = HashMap::new();
        trap_definitions.insert(
            "1.3.6.1.4.1.1.1".to_string(),
            TrapDefinition { alert_type: "link_down".into(), description: Some("Link down".into()), clear_oid: None },
        );
        let manifest = manifest_with(
            ParserConfig::Snmp {
                varbind_mappings: HashMap::from([("1.3.6.1.2.1.2.2.1.2".to_string(), "interface".to_string())]),
                transformations: vec![],
            },
            Transport::SnmpTrap { enterprise_oid: "1.3.6.1.4.1.1".into(), trap_definitions },
            None,
        );
        let raw = json!({
            "source_ip": "10.0.0.9",
            "trap_oid": "1.3.6.1.4.1.1.1",
            "varbinds": {"1.3.6.1.2.1.2.2.1.2": "eth0"},
        });

        let parsed = parse(&raw, &manifest, "siklu").unwrap();
        assert_eq!(parsed.alert_type, "link_down");
        assert_eq!(parsed.device_ip, "10.0.0.9");
        assert_eq!(parsed.fields.get("interface"), Some(&"eth0".to_string()));
    }

    #[test]
    fn missing_alert_type_yields_none() {
        let manifest = manifest_with(
            ParserConfig::Json {
                field_mappings: HashMap::from([("device_ip".to_string(), "ip".to_string())]),
                transformations: vec![],
            },
            Transport::Webhook { endpoint_path: "/webhooks/x".into() },
            None,
        );
        let raw = json!({"ip": "10.0.0.1"});
        assert!(parse(&raw, &manifest, "x").is_none());
    }

    #[test]
    fn suffix_clear_detection() {
        let manifest = manifest_with(
            ParserConfig::Json {
                field_mappings: HashMap::from([("alert_type".to_string(), "type".to_string())]),
                transformations: vec![],
            },
            Transport::Webhook { endpoint_path: "/webhooks/x".into() },
            Some(ClearEvents::Suffix { clear_suffix: "_clear".into() }),
        );
        let raw = json!({"type": "link_down_clear"});
        let parsed = parse(&raw, &manifest, "x").unwrap();
        assert!(parsed.is_clear);
    }

    #[test]
    fn key_value_parser_splits_once_and_trims() {
        let manifest = manifest_with(
            ParserConfig::KeyValue {
                delimiter: ":".into(),
                trim: true,
                field_mappings: HashMap::new(),
                transformations: vec![],
            },
            Transport::Webhook { endpoint_path: "/webhooks/x".into() },
            None,
        );
        let raw = json!("alert_type: link_down\ndevice_ip: 10.0.0.1\nmessage: a: b");
        let parsed = parse(&raw, &manifest, "x").unwrap();
        assert_eq!(parsed.alert_type, "link_down");
        assert_eq!(parsed.message, Some("a: b".to_string()));
    }

    #[test]
    fn grok_parser_extracts_named_groups() {
        let manifest = manifest_with(
            ParserConfig::Grok {
                grok_pattern: "%{WORD:alert_type} on %{IP:device_ip}".into(),
                custom_patterns: HashMap::new(),
                transformations: vec![],
            },
            Transport::Webhook { endpoint_path: "/webhooks/x".into() },
            None,
        );
        let raw = json!("linkDown on 10.0.0.7");
        let parsed = parse(&raw, &manifest, "x").unwrap();
        assert_eq!(parsed.alert_type, "linkDown");
        assert_eq!(parsed.device_ip, "10.0.0.7");
    }
}
