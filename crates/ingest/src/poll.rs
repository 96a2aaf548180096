//! Active polling ingestor (§4.7): a periodic driver that selects due
//! targets and, per `addon.method`, performs an HTTP poll, an SNMP GET,
//! or an SSH command run, feeding whatever comes back to the Parse
//! Engine and the Alert Engine.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use netwatch_core::manifest::{ApiEndpoint, ConditionOperator, PollGroup, SshCommand, Transport};
use netwatch_core::{Addon, ParsedAlert, Target};
use netwatch_engine::Engine;
use netwatch_registry::Registry;
use netwatch_store::DurableStore;
use serde_json::{json, Value};
use tokio::sync::Semaphore;

use crate::snmp_ber::{decode_get_response, encode_get_request};

/// Default tick interval of the polling driver (§4.7).
const TICK_INTERVAL: Duration = Duration::from_secs(60);
/// Worker pool caps (§4.7, §5): parallel SNMP polls, parallel SSH
/// sessions. `api_poll` shares the SNMP cap; nothing in the spec singles
/// it out for a lower limit.
const SNMP_CONCURRENCY: usize = 200;
const API_CONCURRENCY: usize = 200;
const SSH_CONCURRENCY: usize = 20;
/// Per-protocol deadlines (§4.7, §5): SNMP gets a tight 5s budget with 0
/// retries (the scheduler just repeats on the next tick); HTTP and SSH
/// get more room since a slow device shouldn't starve the SNMP pool.
const SNMP_DEADLINE: Duration = Duration::from_secs(5);
const API_DEADLINE: Duration = Duration::from_secs(10);
const SSH_DEADLINE: Duration = Duration::from_secs(15);

/// Credentials consulted for `api_poll`/`snmp_poll`/`ssh` targets (§1,
/// §4.7 expansion). Kept deliberately opaque: callers interpret the
/// JSON shape according to `auth_type`.
pub type Credentials = Value;

/// The vault lookup the spec keeps out of scope ("consulted via a
/// `resolve(ip, type) -> credentials` lookup"). This workspace defines
/// only the trait and a trivial pass-through that always misses,
/// leaving target/addon config as the effective credential source.
pub trait CredentialResolver: Send + Sync {
    fn resolve(&self, ip: &str, auth_type: &str) -> Option<Credentials>;
}

/// Always misses; target-level `config` and the addon's
/// `default_credentials` are consulted around it.
pub struct NoopCredentialResolver;

impl CredentialResolver for NoopCredentialResolver {
    fn resolve(&self, _ip: &str, _auth_type: &str) -> Option<Credentials> {
        None
    }
}

/// Fallback order (§4.7 expansion): target-level override, then the
/// vault resolver, then the addon's declared default.
fn resolve_credentials(
    resolver: &dyn CredentialResolver,
    target: &Target,
    default_credentials: Option<&Value>,
    auth_type: &str,
) -> Option<Value> {
    if let Some(overrides) = target.config.get("credentials") {
        return Some(overrides.clone());
    }
    if let Some(found) = resolver.resolve(&target.ip_address, auth_type) {
        return Some(found);
    }
    default_credentials.cloned()
}

pub struct PollIngestor<S: DurableStore> {
    store: Arc<S>,
    registry: Arc<Registry<S>>,
    engine: Arc<Engine<S>>,
    http: reqwest::Client,
    credentials: Arc<dyn CredentialResolver>,
    snmp_permits: Arc<Semaphore>,
    api_permits: Arc<Semaphore>,
    ssh_permits: Arc<Semaphore>,
    next_request_id: AtomicI32,
}

impl<S: DurableStore + 'static> PollIngestor<S> {
    #[must_use]
    pub fn new(store: Arc<S>, registry: Arc<Registry<S>>, engine: Arc<Engine<S>>) -> Self {
        Self::with_credential_resolver(store, registry, engine, Arc::new(NoopCredentialResolver))
    }

    #[must_use]
    pub fn with_credential_resolver(
        store: Arc<S>,
        registry: Arc<Registry<S>>,
        engine: Arc<Engine<S>>,
        credentials: Arc<dyn CredentialResolver>,
    ) -> Self {
        Self {
            store,
            registry,
            engine,
            http: reqwest::Client::new(),
            credentials,
            snmp_permits: Arc::new(Semaphore::new(SNMP_CONCURRENCY)),
            api_permits: Arc::new(Semaphore::new(API_CONCURRENCY)),
            ssh_permits: Arc::new(Semaphore::new(SSH_CONCURRENCY)),
            next_request_id: AtomicI32::new(1),
        }
    }

    /// Run the tick loop forever: every `TICK_INTERVAL`, select due
    /// targets and dispatch one poll job per target. Never returns under
    /// normal operation.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }

    /// Poll one target immediately, outside the regular tick cadence
    /// (`POST /targets/{id}/poll`, §6.3). Returns `false` if the target
    /// does not exist.
    pub async fn poll_now(&self, target_id: uuid::Uuid) -> Result<bool, crate::error::IngestError> {
        let Some(target) = self.store.get_target(target_id).await.map_err(|e| {
            crate::error::IngestError::Transport(e.to_string())
        })?
        else {
            return Ok(false);
        };
        self.poll_target(target).await;
        Ok(true)
    }

    async fn tick(self: &Arc<Self>) {
        let due = match self.store.due_targets(Utc::now()).await {
            Ok(targets) => targets,
            Err(err) => {
                tracing::error!(error = %err, "failed to load due targets");
                return;
            }
        };

        for target in due {
            let ingestor = Arc::clone(self);
            tokio::spawn(async move { ingestor.poll_target(target).await });
        }
    }

    async fn poll_target(&self, target: Target) {
        let Some(addon_id) = target.addon_id.as_deref() else {
            return;
        };
        let Some(addon) = self.registry.get(addon_id) else {
            tracing::debug!(addon_id, "polling target with no resolvable addon");
            return;
        };

        match &addon.manifest.transport {
            Transport::ApiPoll { .. } => self.poll_api(&target, &addon).await,
            Transport::SnmpPoll { .. } => self.poll_snmp(&target, &addon).await,
            Transport::Ssh { .. } => self.poll_ssh(&target, &addon).await,
            _ => tracing::warn!(addon_id, "target's addon is not a polling transport"),
        }

        if let Err(err) = self.store.mark_polled(target.id, Utc::now()).await {
            tracing::error!(error = %err, target_id = %target.id, "failed to record poll timestamp");
        }
    }

    /// §4.7 `api_poll`: iterate `endpoints[]`, stopping at the first
    /// unreachable one (the device is down, further endpoints would just
    /// time out too).
    async fn poll_api(&self, target: &Target, addon: &Addon) {
        let Transport::ApiPoll { base_url_template, endpoints, auth_type, default_credentials } =
            &addon.manifest.transport
        else {
            return;
        };

        let _permit = self.api_permits.acquire().await;
        let credentials = resolve_credentials(self.credentials.as_ref(), target, default_credentials.as_ref(), auth_type);

        for endpoint in endpoints {
            let url = build_url(base_url_template, &target.ip_address, endpoint);
            let outcome = self.call_endpoint(&url, endpoint, credentials.as_ref()).await;

            match outcome {
                Ok(body) => {
                    if let Some(parsed) = netwatch_parser::parse(&body, &addon.manifest, &addon.id) {
                        if let Err(err) = self.engine.process(parsed, addon).await {
                            tracing::error!(error = %err, addon_id = %addon.id, "engine error processing poll result");
                        }
                    }
                    if let Some(alert_type) = &endpoint.alert_on_failure {
                        match self.engine.auto_resolve(&addon.id, alert_type, &target.ip_address).await {
                            Ok(_) => {}
                            Err(err) => tracing::error!(error = %err, addon_id = %addon.id, "auto-resolve failed"),
                        }
                    }
                }
                Err(error) => {
                    tracing::warn!(%url, %error, "api poll endpoint unreachable");
                    if let Some(alert_type) = &endpoint.alert_on_failure {
                        let mut failure = ParsedAlert::new(addon.id.clone(), alert_type.clone(), target.ip_address.clone());
                        failure.message = Some(format!("Failed to reach {url}: {error}"));
                        failure.is_clear = false;
                        if let Err(err) = self.engine.process(failure, addon).await {
                            tracing::error!(error = %err, addon_id = %addon.id, "engine error processing poll failure");
                        }
                    }
                    // The device is unreachable; further endpoints would only time out too.
                    break;
                }
            }
        }
    }

    async fn call_endpoint(
        &self,
        url: &str,
        endpoint: &ApiEndpoint,
        credentials: Option<&Value>,
    ) -> Result<Value, String> {
        let method = reqwest::Method::from_bytes(endpoint.method.as_bytes()).unwrap_or(reqwest::Method::GET);
        let mut request = self.http.request(method, url).timeout(API_DEADLINE);
        if let Some(creds) = credentials {
            if let Some(token) = creds.get("bearer_token").and_then(Value::as_str) {
                request = request.bearer_auth(token);
            } else if let (Some(user), Some(pass)) =
                (creds.get("username").and_then(Value::as_str), creds.get("password").and_then(Value::as_str))
            {
                request = request.basic_auth(user, Some(pass));
            }
        }

        let response = request.send().await.map_err(|err| err.to_string())?;
        if !response.status().is_success() {
            return Err(format!("http {}", response.status()));
        }
        response.json::<Value>().await.map_err(|err| err.to_string())
    }

    /// §4.7 `snmp_poll`: GET each group's OIDs, evaluate its
    /// `alert_conditions` against the fetched values.
    async fn poll_snmp(&self, target: &Target, addon: &Addon) {
        let Transport::SnmpPoll { poll_groups } = &addon.manifest.transport else {
            return;
        };

        let _permit = self.snmp_permits.acquire().await;
        let community = target
            .config
            .get("community")
            .and_then(Value::as_str)
            .unwrap_or("public")
            .to_string();

        for group in poll_groups {
            match self.fetch_group(target, &community, group).await {
                Ok(values) => self.evaluate_group(target, addon, group, &values).await,
                Err(error) => tracing::warn!(ip = %target.ip_address, %error, "snmp poll group unreachable"),
            }
        }
    }

    async fn fetch_group(
        &self,
        target: &Target,
        community: &str,
        group: &PollGroup,
    ) -> Result<Vec<(String, crate::snmp_ber::SnmpValue)>, String> {
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let request = encode_get_request(community, request_id, &group.oids);

        let socket = tokio::net::UdpSocket::bind("0.0.0.0:0").await.map_err(|err| err.to_string())?;
        socket.connect((target.ip_address.as_str(), 161)).await.map_err(|err| err.to_string())?;
        socket.send(&request).await.map_err(|err| err.to_string())?;

        let mut buf = [0u8; 4096];
        let len = tokio::time::timeout(SNMP_DEADLINE, socket.recv(&mut buf))
            .await
            .map_err(|_| "timed out".to_string())?
            .map_err(|err| err.to_string())?;

        decode_get_response(&buf[..len]).ok_or_else(|| "malformed get-response".to_string())
    }

    async fn evaluate_group(
        &self,
        target: &Target,
        addon: &Addon,
        group: &PollGroup,
        values: &[(String, crate::snmp_ber::SnmpValue)],
    ) {
        for condition in &group.alert_conditions {
            let Some((_, value)) = values.iter().find(|(oid, _)| oid == &condition.field) else {
                continue;
            };
            if !condition_matches(value, &condition.operator, &condition.value) {
                continue;
            }

            let parsed =
                ParsedAlert::new(addon.id.clone(), condition.alert_type.clone(), target.ip_address.clone());
            if let Err(err) = self.engine.process(parsed, addon).await {
                tracing::error!(error = %err, addon_id = %addon.id, "engine error processing snmp poll condition");
            }
        }
    }

    /// §4.7 `ssh`: run each declared command over one interactive
    /// session and feed its stdout to the Parse Engine.
    async fn poll_ssh(&self, target: &Target, addon: &Addon) {
        let Transport::Ssh { commands } = &addon.manifest.transport else {
            return;
        };

        let _permit = self.ssh_permits.acquire().await;
        let credentials = resolve_credentials(self.credentials.as_ref(), target, None, "ssh");
        let Some(credentials) = credentials else {
            tracing::debug!(ip = %target.ip_address, "no ssh credentials resolved, skipping poll");
            return;
        };

        for command in commands {
            match run_ssh_command(&target.ip_address, &credentials, command).await {
                Ok(output) => self.process_ssh_output(addon, target, command, &output).await,
                Err(error) => tracing::warn!(ip = %target.ip_address, %error, "ssh poll command failed"),
            }
        }
    }

    async fn process_ssh_output(&self, addon: &Addon, target: &Target, command: &SshCommand, output: &str) {
        let raw = match command.parse_as.as_str() {
            "json" => serde_json::from_str::<Value>(output).unwrap_or_else(|_| json!({ "output": output })),
            _ => json!({ "output": output }),
        };

        let Some(parsed) = netwatch_parser::parse(&raw, &addon.manifest, &addon.id) else {
            return;
        };
        let mut parsed = parsed;
        if parsed.device_ip.is_empty() {
            parsed.device_ip = target.ip_address.clone();
        }

        if let Err(err) = self.engine.process(parsed, addon).await {
            tracing::error!(error = %err, addon_id = %addon.id, "engine error processing ssh poll result");
        }
    }
}

fn build_url(base_url_template: &str, ip: &str, endpoint: &ApiEndpoint) -> String {
    let base = base_url_template.replace("{ip}", ip);
    format!("{}{}", base.trim_end_matches('/'), endpoint.path)
}

fn condition_matches(value: &crate::snmp_ber::SnmpValue, operator: &ConditionOperator, expected: &Value) -> bool {
    let actual = value.to_display_string();
    match operator {
        ConditionOperator::Equals => Some(actual.as_str()) == expected.as_str(),
        ConditionOperator::NotEquals => Some(actual.as_str()) != expected.as_str(),
        ConditionOperator::Contains => expected.as_str().is_some_and(|needle| actual.contains(needle)),
        ConditionOperator::GreaterThan => numeric_compare(&actual, expected).is_some_and(|ord| ord.is_gt()),
        ConditionOperator::LessThan => numeric_compare(&actual, expected).is_some_and(|ord| ord.is_lt()),
    }
}

fn numeric_compare(actual: &str, expected: &Value) -> Option<std::cmp::Ordering> {
    let actual: f64 = actual.parse().ok()?;
    let expected = expected.as_f64()?;
    actual.partial_cmp(&expected)
}

async fn run_ssh_command(ip: &str, credentials: &Value, command: &SshCommand) -> Result<String, String> {
    use russh::client::{self, Handle};
    use russh_keys::key;

    struct Client;

    #[async_trait::async_trait]
    impl client::Handler for Client {
        type Error = russh::Error;

        async fn check_server_key(self, _server_public_key: &key::PublicKey) -> Result<(Self, bool), Self::Error> {
            Ok((self, true))
        }
    }

    let username = credentials.get("username").and_then(Value::as_str).ok_or("missing ssh username")?;
    let password = credentials.get("password").and_then(Value::as_str);

    let config = Arc::new(client::Config::default());
    let mut session: Handle<Client> = tokio::time::timeout(
        SSH_DEADLINE,
        client::connect(config, (ip, 22), Client),
    )
    .await
    .map_err(|_| "ssh connect timed out".to_string())?
    .map_err(|err| err.to_string())?;

    let authenticated = match password {
        Some(password) => session.authenticate_password(username, password).await.map_err(|err| err.to_string())?,
        None => return Err("no ssh auth method available".to_string()),
    };
    if !authenticated {
        return Err("ssh authentication rejected".to_string());
    }

    let mut channel = session.channel_open_session().await.map_err(|err| err.to_string())?;
    channel.exec(true, command.command.as_str()).await.map_err(|err| err.to_string())?;

    let mut output = Vec::new();
    while let Some(message) = channel.wait().await {
        match message {
            russh::ChannelMsg::Data { data } => output.extend_from_slice(&data),
            russh::ChannelMsg::Eof | russh::ChannelMsg::Close => break,
            _ => {}
        }
    }

    Ok(String::from_utf8_lossy(&output).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use netwatch_bus::EventBus;
    use netwatch_core::manifest::{AlertCondition, ParserConfig, RawAlertMappings};
    use netwatch_core::AddonManifest;
    use netwatch_store_memory::MemoryStore;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn target(ip: &str, addon_id: &str) -> Target {
        Target {
            id: Uuid::new_v4(),
            name: "device".into(),
            ip_address: ip.into(),
            addon_id: Some(addon_id.into()),
            poll_interval_seconds: 60,
            enabled: true,
            config: json!({}),
            last_poll_at: None,
        }
    }

    fn snmp_addon() -> Addon {
        let manifest = AddonManifest {
            id: "axis".into(),
            name: "Axis".into(),
            version: "1.0.0".into(),
            category: "camera".into(),
            description: None,
            parser: ParserConfig::Json { field_mappings: HashMap::new(), transformations: vec![] },
            transport: Transport::SnmpPoll {
                poll_groups: vec![PollGroup {
                    oids: vec!["1.3.6.1.2.1.1.3.0".into()],
                    alert_conditions: vec![AlertCondition {
                        field: "1.3.6.1.2.1.1.3.0".into(),
                        operator: ConditionOperator::GreaterThan,
                        value: json!(100),
                        alert_type: "high_uptime".into(),
                    }],
                }],
            },
            raw_alert_mappings: RawAlertMappings::default(),
            clear_events: None,
        };
        Addon::from_manifest(manifest, true, chrono::Utc::now())
    }

    #[test]
    fn credential_fallback_prefers_target_override() {
        let mut target = target("10.0.0.1", "axis");
        target.config = json!({ "credentials": { "username": "override" } });
        let resolved =
            resolve_credentials(&NoopCredentialResolver, &target, Some(&json!({ "username": "default" })), "basic");
        assert_eq!(resolved.unwrap()["username"], "override");
    }

    #[test]
    fn credential_fallback_falls_through_to_addon_default() {
        let target = target("10.0.0.1", "axis");
        let resolved =
            resolve_credentials(&NoopCredentialResolver, &target, Some(&json!({ "username": "default" })), "basic");
        assert_eq!(resolved.unwrap()["username"], "default");
    }

    #[test]
    fn condition_matches_greater_than() {
        let value = crate::snmp_ber::SnmpValue::Integer(150);
        assert!(condition_matches(&value, &ConditionOperator::GreaterThan, &json!(100)));
        assert!(!condition_matches(&value, &ConditionOperator::GreaterThan, &json!(200)));
    }

    #[test]
    fn condition_matches_contains() {
        let value = crate::snmp_ber::SnmpValue::OctetString("eth0-down".into());
        assert!(condition_matches(&value, &ConditionOperator::Contains, &json!("down")));
    }

    #[tokio::test]
    async fn snmp_poll_group_evaluates_condition_on_fetched_value() {
        let store = Arc::new(MemoryStore::default());
        let addon = snmp_addon();
        store.upsert_addon(&addon).await.unwrap();

        let registry = Arc::new(Registry::new(store.clone()).await.unwrap());
        let engine = Arc::new(Engine::new(store.clone(), Arc::new(EventBus::new())));
        let ingestor = PollIngestor::new(store, registry, engine.clone());

        let values = vec![("1.3.6.1.2.1.1.3.0".to_string(), crate::snmp_ber::SnmpValue::Integer(500))];
        let target = target("10.0.0.1", "axis");
        let Transport::SnmpPoll { poll_groups } = &addon.manifest.transport else { unreachable!() };
        ingestor.evaluate_group(&target, &addon, &poll_groups[0], &values).await;

        let (_, total) = engine.list(&netwatch_core::AlertFilters::default()).await.unwrap();
        assert_eq!(total, 1);
    }
}
