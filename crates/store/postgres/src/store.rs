use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sqlx::types::Json;
use sqlx::PgPool;

use netwatch_core::{
    Addon, AddonManifest, Alert, AlertFilters, AlertStats, AlertStatus, IngestMethod, Severity,
    Target,
};
use netwatch_store::{ApiKey, DurableStore, Role, StoreError, User};
use uuid::Uuid;

use crate::config::PostgresConfig;
use crate::migrations;

/// Build `PgConnectOptions` from a [`PostgresConfig`], applying SSL settings
/// when configured.
pub(crate) fn build_connect_options(
    config: &PostgresConfig,
) -> Result<sqlx::postgres::PgConnectOptions, StoreError> {
    let mut options: sqlx::postgres::PgConnectOptions = config
        .url
        .parse()
        .map_err(|e: sqlx::Error| StoreError::Connection(e.to_string()))?;

    if let Some(ref mode) = config.ssl_mode {
        let ssl_mode = match mode.as_str() {
            "disable" => sqlx::postgres::PgSslMode::Disable,
            "prefer" => sqlx::postgres::PgSslMode::Prefer,
            "require" => sqlx::postgres::PgSslMode::Require,
            "verify-ca" => sqlx::postgres::PgSslMode::VerifyCa,
            "verify-full" => sqlx::postgres::PgSslMode::VerifyFull,
            other => return Err(StoreError::Connection(format!("unknown ssl_mode: {other}"))),
        };
        options = options.ssl_mode(ssl_mode);
    }
    if let Some(ref path) = config.ssl_root_cert {
        options = options.ssl_root_cert(path);
    }
    if let Some(ref path) = config.ssl_cert {
        options = options.ssl_client_cert(path);
    }
    if let Some(ref path) = config.ssl_key {
        options = options.ssl_client_key(path);
    }
    Ok(options)
}

fn parse_severity(s: &str) -> Result<Severity, StoreError> {
    s.parse().map_err(StoreError::Serialization)
}

fn parse_status(s: &str) -> Result<AlertStatus, StoreError> {
    s.parse().map_err(StoreError::Serialization)
}

fn parse_role(s: &str) -> Result<Role, StoreError> {
    s.parse().map_err(StoreError::Serialization)
}

fn parse_method(s: &str) -> Result<IngestMethod, StoreError> {
    s.parse().map_err(StoreError::Serialization)
}

#[derive(sqlx::FromRow)]
struct AddonRow {
    id: String,
    name: String,
    version: String,
    method: String,
    category: String,
    description: String,
    manifest: Json<AddonManifest>,
    enabled: bool,
    installed_at: DateTime<Utc>,
}

impl TryFrom<AddonRow> for Addon {
    type Error = StoreError;

    fn try_from(row: AddonRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            name: row.name,
            version: row.version,
            method: parse_method(&row.method)?,
            category: row.category,
            description: (!row.description.is_empty()).then_some(row.description),
            manifest: row.manifest.0,
            enabled: row.enabled,
            installed_at: row.installed_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TargetRow {
    id: Uuid,
    name: String,
    ip_address: String,
    addon_id: Option<String>,
    poll_interval_seconds: i64,
    enabled: bool,
    config: Json<serde_json::Value>,
    last_poll_at: Option<DateTime<Utc>>,
}

impl From<TargetRow> for Target {
    fn from(row: TargetRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            ip_address: row.ip_address,
            addon_id: row.addon_id,
            poll_interval_seconds: row.poll_interval_seconds,
            enabled: row.enabled,
            config: row.config.0,
            last_poll_at: row.last_poll_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct AlertRow {
    id: Uuid,
    addon_id: String,
    fingerprint: String,
    device_ip: String,
    device_name: Option<String>,
    alert_type: String,
    severity: String,
    category: String,
    title: String,
    message: Option<String>,
    status: String,
    is_clear: bool,
    occurred_at: DateTime<Utc>,
    received_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
    occurrence_count: i64,
    raw_data: Json<serde_json::Value>,
    created_at: DateTime<Utc>,
}

impl TryFrom<AlertRow> for Alert {
    type Error = StoreError;

    fn try_from(row: AlertRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            addon_id: row.addon_id,
            fingerprint: row.fingerprint,
            device_ip: row.device_ip,
            device_name: row.device_name,
            alert_type: row.alert_type,
            severity: parse_severity(&row.severity)?,
            category: row.category,
            title: row.title,
            message: row.message,
            status: parse_status(&row.status)?,
            is_clear: row.is_clear,
            occurred_at: row.occurred_at,
            received_at: row.received_at,
            resolved_at: row.resolved_at,
            occurrence_count: row.occurrence_count,
            raw_data: row.raw_data.0,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    email: String,
    password_hash: String,
    role: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    last_login: Option<DateTime<Utc>>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            username: row.username,
            email: (!row.email.is_empty()).then_some(row.email),
            password_hash: row.password_hash,
            role: parse_role(&row.role)?,
            is_active: row.is_active,
            created_at: row.created_at,
            last_login: row.last_login,
        })
    }
}

/// `PostgreSQL`-backed implementation of [`DurableStore`] (§2 C1, §6.6).
///
/// Uses `sqlx::PgPool` for connection pooling. Manifests and free-form JSON
/// columns round-trip through `sqlx::types::Json`.
pub struct PostgresStore {
    pool: PgPool,
    config: Arc<PostgresConfig>,
    /// In-process `system_settings` cache (§3, §6.6), mirroring the
    /// reference stack's `_settings_cache`: populated on read, updated
    /// directly on write rather than merely invalidated.
    settings_cache: DashMap<String, String>,
}

impl PostgresStore {
    /// Connect, create the pool, and run migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] if pool creation fails, or
    /// [`StoreError::Backend`] if migrations fail.
    pub async fn new(config: PostgresConfig) -> Result<Self, StoreError> {
        let connect_options = build_connect_options(&config)?;
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.pool_size)
            .connect_with(connect_options)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        migrations::run_migrations(&pool, &config)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(Self { pool, config: Arc::new(config), settings_cache: DashMap::new() })
    }

    /// Share an existing pool across stores, running migrations on creation.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if migrations fail.
    pub async fn from_pool(pool: PgPool, config: PostgresConfig) -> Result<Self, StoreError> {
        migrations::run_migrations(&pool, &config)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self { pool, config: Arc::new(config), settings_cache: DashMap::new() })
    }
}

#[async_trait]
impl DurableStore for PostgresStore {
    async fn list_addons(&self) -> Result<Vec<Addon>, StoreError> {
        let table = self.config.table("addons");
        let rows: Vec<AddonRow> = sqlx::query_as(&format!("SELECT * FROM {table} ORDER BY id"))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        rows.into_iter().map(Addon::try_from).collect()
    }

    async fn list_enabled_addons(&self) -> Result<Vec<Addon>, StoreError> {
        let table = self.config.table("addons");
        let rows: Vec<AddonRow> =
            sqlx::query_as(&format!("SELECT * FROM {table} WHERE enabled ORDER BY id"))
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;
        rows.into_iter().map(Addon::try_from).collect()
    }

    async fn get_addon(&self, id: &str) -> Result<Option<Addon>, StoreError> {
        let table = self.config.table("addons");
        let row: Option<AddonRow> = sqlx::query_as(&format!("SELECT * FROM {table} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        row.map(Addon::try_from).transpose()
    }

    async fn upsert_addon(&self, addon: &Addon) -> Result<(), StoreError> {
        let table = self.config.table("addons");
        sqlx::query(&format!(
            "INSERT INTO {table} (id, name, version, method, category, description, manifest, enabled, installed_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (id) DO UPDATE SET \
                name = EXCLUDED.name, version = EXCLUDED.version, method = EXCLUDED.method, \
                category = EXCLUDED.category, description = EXCLUDED.description, \
                manifest = EXCLUDED.manifest, enabled = EXCLUDED.enabled"
        ))
        .bind(&addon.id)
        .bind(&addon.name)
        .bind(&addon.version)
        .bind(addon.method.to_string())
        .bind(&addon.category)
        .bind(addon.description.clone().unwrap_or_default())
        .bind(Json(&addon.manifest))
        .bind(addon.enabled)
        .bind(addon.installed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn delete_addon(&self, id: &str) -> Result<bool, StoreError> {
        let table = self.config.table("addons");
        let result = sqlx::query(&format!("DELETE FROM {table} WHERE id = $1"))
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_addon_enabled(&self, id: &str, enabled: bool) -> Result<bool, StoreError> {
        let table = self.config.table("addons");
        let result = sqlx::query(&format!("UPDATE {table} SET enabled = $1 WHERE id = $2"))
            .bind(enabled)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_targets(&self) -> Result<Vec<Target>, StoreError> {
        let table = self.config.table("targets");
        let rows: Vec<TargetRow> = sqlx::query_as(&format!("SELECT * FROM {table} ORDER BY name"))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(rows.into_iter().map(Target::from).collect())
    }

    async fn get_target(&self, id: Uuid) -> Result<Option<Target>, StoreError> {
        let table = self.config.table("targets");
        let row: Option<TargetRow> = sqlx::query_as(&format!("SELECT * FROM {table} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(row.map(Target::from))
    }

    async fn find_target_by_ip_addon(
        &self,
        ip_address: &str,
        addon_id: &str,
    ) -> Result<Option<Target>, StoreError> {
        let table = self.config.table("targets");
        let row: Option<TargetRow> = sqlx::query_as(&format!(
            "SELECT * FROM {table} WHERE ip_address = $1 AND addon_id = $2"
        ))
        .bind(ip_address)
        .bind(addon_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(row.map(Target::from))
    }

    async fn create_target(&self, target: &Target) -> Result<(), StoreError> {
        let table = self.config.table("targets");
        sqlx::query(&format!(
            "INSERT INTO {table} (id, name, ip_address, addon_id, poll_interval_seconds, enabled, config, last_poll_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
        ))
        .bind(target.id)
        .bind(&target.name)
        .bind(&target.ip_address)
        .bind(&target.addon_id)
        .bind(target.poll_interval_seconds)
        .bind(target.enabled)
        .bind(Json(&target.config))
        .bind(target.last_poll_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if e.as_database_error().is_some_and(sqlx::error::DatabaseError::is_unique_violation) {
                StoreError::Conflict(format!(
                    "target for ({}, {:?}) already exists",
                    target.ip_address, target.addon_id
                ))
            } else {
                StoreError::Backend(e.to_string())
            }
        })?;
        Ok(())
    }

    async fn update_target(&self, target: &Target) -> Result<bool, StoreError> {
        let table = self.config.table("targets");
        let result = sqlx::query(&format!(
            "UPDATE {table} SET name = $1, ip_address = $2, addon_id = $3, \
             poll_interval_seconds = $4, enabled = $5, config = $6, last_poll_at = $7 \
             WHERE id = $8"
        ))
        .bind(&target.name)
        .bind(&target.ip_address)
        .bind(&target.addon_id)
        .bind(target.poll_interval_seconds)
        .bind(target.enabled)
        .bind(Json(&target.config))
        .bind(target.last_poll_at)
        .bind(target.id)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_target(&self, id: Uuid) -> Result<bool, StoreError> {
        let table = self.config.table("targets");
        let result = sqlx::query(&format!("DELETE FROM {table} WHERE id = $1"))
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    async fn due_targets(&self, now: DateTime<Utc>) -> Result<Vec<Target>, StoreError> {
        let table = self.config.table("targets");
        let rows: Vec<TargetRow> = sqlx::query_as(&format!(
            "SELECT * FROM {table} WHERE enabled \
             AND (last_poll_at IS NULL OR last_poll_at + (poll_interval_seconds || ' seconds')::interval < $1)"
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(rows.into_iter().map(Target::from).collect())
    }

    async fn mark_polled(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        let table = self.config.table("targets");
        sqlx::query(&format!("UPDATE {table} SET last_poll_at = $1 WHERE id = $2"))
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn get_alert(&self, id: Uuid) -> Result<Option<Alert>, StoreError> {
        let table = self.config.table("alerts");
        let row: Option<AlertRow> = sqlx::query_as(&format!("SELECT * FROM {table} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        row.map(Alert::try_from).transpose()
    }

    async fn find_active_by_fingerprint(&self, fingerprint: &str) -> Result<Option<Alert>, StoreError> {
        let table = self.config.table("alerts");
        let row: Option<AlertRow> = sqlx::query_as(&format!(
            "SELECT * FROM {table} WHERE fingerprint = $1 AND status != 'resolved'"
        ))
        .bind(fingerprint)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        row.map(Alert::try_from).transpose()
    }

    async fn insert_alert(&self, alert: &Alert) -> Result<(), StoreError> {
        let table = self.config.table("alerts");
        sqlx::query(&format!(
            "INSERT INTO {table} (id, addon_id, fingerprint, device_ip, device_name, alert_type, \
             severity, category, title, message, status, is_clear, occurred_at, received_at, \
             resolved_at, occurrence_count, raw_data, created_at) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18)"
        ))
        .bind(alert.id)
        .bind(&alert.addon_id)
        .bind(&alert.fingerprint)
        .bind(&alert.device_ip)
        .bind(&alert.device_name)
        .bind(&alert.alert_type)
        .bind(alert.severity.to_string())
        .bind(&alert.category)
        .bind(&alert.title)
        .bind(&alert.message)
        .bind(alert.status.to_string())
        .bind(alert.is_clear)
        .bind(alert.occurred_at)
        .bind(alert.received_at)
        .bind(alert.resolved_at)
        .bind(alert.occurrence_count)
        .bind(Json(&alert.raw_data))
        .bind(alert.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if e.as_database_error().is_some_and(sqlx::error::DatabaseError::is_unique_violation) {
                StoreError::Conflict(format!("active alert for fingerprint {} already exists", alert.fingerprint))
            } else {
                StoreError::Backend(e.to_string())
            }
        })?;
        Ok(())
    }

    async fn update_alert(&self, alert: &Alert) -> Result<(), StoreError> {
        let table = self.config.table("alerts");
        sqlx::query(&format!(
            "UPDATE {table} SET severity = $1, category = $2, title = $3, message = $4, \
             status = $5, is_clear = $6, resolved_at = $7, occurrence_count = $8, \
             device_name = $9, raw_data = $10 WHERE id = $11"
        ))
        .bind(alert.severity.to_string())
        .bind(&alert.category)
        .bind(&alert.title)
        .bind(&alert.message)
        .bind(alert.status.to_string())
        .bind(alert.is_clear)
        .bind(alert.resolved_at)
        .bind(alert.occurrence_count)
        .bind(&alert.device_name)
        .bind(Json(&alert.raw_data))
        .bind(alert.id)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn delete_alert(&self, id: Uuid) -> Result<bool, StoreError> {
        let table = self.config.table("alerts");
        let result = sqlx::query(&format!("DELETE FROM {table} WHERE id = $1"))
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_alerts(&self, filters: &AlertFilters) -> Result<(Vec<Alert>, i64), StoreError> {
        let table = self.config.table("alerts");

        let statuses: Vec<String> = filters.status.iter().map(ToString::to_string).collect();
        let severities: Vec<String> = filters.severity.iter().map(ToString::to_string).collect();

        let where_clause = "WHERE ($1::text[] IS NULL OR status = ANY($1)) \
             AND ($2::text[] IS NULL OR severity = ANY($2)) \
             AND ($3::text IS NULL OR addon_id = $3) \
             AND ($4::text IS NULL OR device_ip = $4)";

        let total: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table} {where_clause}"))
            .bind(non_empty(&statuses))
            .bind(non_empty(&severities))
            .bind(&filters.addon_id)
            .bind(&filters.device_ip)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let rows: Vec<AlertRow> = sqlx::query_as(&format!(
            "SELECT * FROM {table} {where_clause} ORDER BY occurred_at DESC LIMIT $5 OFFSET $6"
        ))
        .bind(non_empty(&statuses))
        .bind(non_empty(&severities))
        .bind(&filters.addon_id)
        .bind(&filters.device_ip)
        .bind(filters.effective_limit())
        .bind(filters.offset.max(0))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        let alerts = rows.into_iter().map(Alert::try_from).collect::<Result<Vec<_>, _>>()?;
        Ok((alerts, total.0))
    }

    async fn alert_stats(&self) -> Result<AlertStats, StoreError> {
        let table = self.config.table("alerts");

        let by_severity: Vec<(String, i64)> = sqlx::query_as(&format!(
            "SELECT severity, COUNT(*) FROM {table} WHERE status != 'resolved' GROUP BY severity"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        let by_status: Vec<(String, i64)> =
            sqlx::query_as(&format!("SELECT status, COUNT(*) FROM {table} GROUP BY status"))
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;

        let by_addon: Vec<(String, i64)> = sqlx::query_as(&format!(
            "SELECT addon_id, COUNT(*) FROM {table} WHERE status != 'resolved' GROUP BY addon_id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        let total_active: (i64,) = sqlx::query_as(&format!(
            "SELECT COUNT(*) FROM {table} WHERE status = 'active'"
        ))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(AlertStats {
            by_severity: by_severity.into_iter().collect(),
            by_status: by_status.into_iter().collect(),
            by_addon: by_addon.into_iter().collect(),
            total_active: total_active.0,
        })
    }

    async fn delete_resolved_before(&self, before: DateTime<Utc>) -> Result<u64, StoreError> {
        let table = self.config.table("alerts");
        let result = sqlx::query(&format!(
            "DELETE FROM {table} WHERE status = 'resolved' AND resolved_at < $1"
        ))
        .bind(before)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let table = self.config.table("users");
        let row: Option<UserRow> = sqlx::query_as(&format!("SELECT * FROM {table} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        row.map(User::try_from).transpose()
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let table = self.config.table("users");
        let row: Option<UserRow> = sqlx::query_as(&format!("SELECT * FROM {table} WHERE username = $1"))
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        row.map(User::try_from).transpose()
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let table = self.config.table("users");
        let rows: Vec<UserRow> = sqlx::query_as(&format!("SELECT * FROM {table} ORDER BY username"))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        rows.into_iter().map(User::try_from).collect()
    }

    async fn create_user(&self, user: &User) -> Result<(), StoreError> {
        let table = self.config.table("users");
        sqlx::query(&format!(
            "INSERT INTO {table} (id, username, email, password_hash, role, is_active, created_at, last_login) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8)"
        ))
        .bind(user.id)
        .bind(&user.username)
        .bind(user.email.clone().unwrap_or_default())
        .bind(&user.password_hash)
        .bind(user.role.to_string())
        .bind(user.is_active)
        .bind(user.created_at)
        .bind(user.last_login)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if e.as_database_error().is_some_and(sqlx::error::DatabaseError::is_unique_violation) {
                StoreError::Conflict(format!("username {} already exists", user.username))
            } else {
                StoreError::Backend(e.to_string())
            }
        })?;
        Ok(())
    }

    async fn update_user(&self, user: &User) -> Result<bool, StoreError> {
        let table = self.config.table("users");
        let result = sqlx::query(&format!(
            "UPDATE {table} SET email = $1, password_hash = $2, role = $3, is_active = $4 WHERE id = $5"
        ))
        .bind(user.email.clone().unwrap_or_default())
        .bind(&user.password_hash)
        .bind(user.role.to_string())
        .bind(user.is_active)
        .bind(user.id)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, StoreError> {
        let table = self.config.table("users");
        let result = sqlx::query(&format!("DELETE FROM {table} WHERE id = $1"))
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    async fn touch_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        let table = self.config.table("users");
        sqlx::query(&format!("UPDATE {table} SET last_login = $1 WHERE id = $2"))
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn create_api_key(&self, key: &ApiKey) -> Result<(), StoreError> {
        let table = self.config.table("api_keys");
        sqlx::query(&format!(
            "INSERT INTO {table} (id, user_id, name, key_hash, key_prefix, is_active, created_at, last_used_at, expires_at) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)"
        ))
        .bind(key.id)
        .bind(key.user_id)
        .bind(&key.name)
        .bind(&key.key_hash)
        .bind(&key.key_prefix)
        .bind(key.is_active)
        .bind(key.created_at)
        .bind(key.last_used_at)
        .bind(key.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn list_api_keys(&self, user_id: Option<Uuid>) -> Result<Vec<ApiKey>, StoreError> {
        let table = self.config.table("api_keys");
        let rows: Vec<ApiKey> = sqlx::query_as(&format!(
            "SELECT * FROM {table} WHERE ($1::uuid IS NULL OR user_id = $1) ORDER BY created_at"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(rows)
    }

    async fn find_api_key_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, StoreError> {
        let table = self.config.table("api_keys");
        let row: Option<ApiKey> = sqlx::query_as(&format!("SELECT * FROM {table} WHERE key_hash = $1"))
            .bind(key_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(row)
    }

    async fn touch_api_key(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        let table = self.config.table("api_keys");
        sqlx::query(&format!("UPDATE {table} SET last_used_at = $1 WHERE id = $2"))
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn get_setting(&self, key: &str) -> Result<Option<String>, StoreError> {
        if let Some(cached) = self.settings_cache.get(key) {
            return Ok(Some(cached.clone()));
        }

        let table = self.config.table("system_settings");
        let row: Option<(String,)> = sqlx::query_as(&format!("SELECT value FROM {table} WHERE key = $1"))
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        if let Some((value,)) = &row {
            self.settings_cache.insert(key.to_string(), value.clone());
        }
        Ok(row.map(|(v,)| v))
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let table = self.config.table("system_settings");
        sqlx::query(&format!(
            "INSERT INTO {table} (key, value) VALUES ($1, $2) \
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value"
        ))
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        self.settings_cache.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(())
    }
}

/// `sqlx` treats an empty slice and a missing filter the same way here: bind
/// `None` so the `IS NULL` branch of the `ANY($n)` guard is taken instead of
/// matching zero rows.
fn non_empty(values: &[String]) -> Option<&[String]> {
    (!values.is_empty()).then_some(values)
}

#[cfg(all(test, feature = "integration"))]
mod integration_tests {
    use super::*;

    fn test_config() -> PostgresConfig {
        PostgresConfig {
            url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost:5432/netwatch_test".to_string()),
            schema: format!("test_{}", uuid::Uuid::new_v4().simple()),
            ..PostgresConfig::default()
        }
    }

    #[tokio::test]
    async fn health_check_succeeds() {
        let store = PostgresStore::new(test_config())
            .await
            .expect("pool creation should succeed");
        store.health_check().await.expect("health check should pass");
    }
}
