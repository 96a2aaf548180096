use sqlx::PgPool;

use crate::config::PostgresConfig;

/// Create the Durable Store's tables if they do not exist (§6.6).
///
/// # Errors
///
/// Returns a [`sqlx::Error`] if any DDL statement fails.
pub async fn run_migrations(pool: &PgPool, config: &PostgresConfig) -> Result<(), sqlx::Error> {
    let addons = config.table("addons");
    let targets = config.table("targets");
    let alerts = config.table("alerts");
    let users = config.table("users");
    let api_keys = config.table("api_keys");
    let system_settings = config.table("system_settings");

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {addons} (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            version TEXT NOT NULL,
            method TEXT NOT NULL,
            category TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            manifest JSONB NOT NULL,
            enabled BOOLEAN NOT NULL DEFAULT TRUE,
            installed_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )"
    ))
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {targets} (
            id UUID PRIMARY KEY,
            name TEXT NOT NULL,
            ip_address TEXT NOT NULL,
            addon_id TEXT REFERENCES {addons}(id) ON DELETE SET NULL,
            poll_interval_seconds BIGINT NOT NULL,
            enabled BOOLEAN NOT NULL DEFAULT TRUE,
            config JSONB NOT NULL DEFAULT '{{}}',
            last_poll_at TIMESTAMPTZ,
            UNIQUE (ip_address, addon_id)
        )"
    ))
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {alerts} (
            id UUID PRIMARY KEY,
            addon_id TEXT NOT NULL,
            fingerprint TEXT NOT NULL,
            device_ip TEXT NOT NULL,
            device_name TEXT,
            alert_type TEXT NOT NULL,
            severity TEXT NOT NULL,
            category TEXT NOT NULL,
            title TEXT NOT NULL,
            message TEXT,
            status TEXT NOT NULL,
            is_clear BOOLEAN NOT NULL DEFAULT FALSE,
            occurred_at TIMESTAMPTZ NOT NULL,
            received_at TIMESTAMPTZ NOT NULL,
            resolved_at TIMESTAMPTZ,
            occurrence_count BIGINT NOT NULL DEFAULT 1,
            raw_data JSONB NOT NULL DEFAULT 'null',
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )"
    ))
    .execute(pool)
    .await?;

    // At most one non-resolved alert per fingerprint (§3.3 invariant); a
    // partial unique index lets resolved history accumulate freely.
    sqlx::query(&format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS {}_active_fingerprint_idx \
         ON {alerts} (fingerprint) WHERE status != 'resolved'",
        config.schema.replace('.', "_")
    ))
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        "CREATE INDEX IF NOT EXISTS netwatch_alerts_status_idx ON {alerts} (status)"
    ))
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {users} (
            id UUID PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL,
            is_active BOOLEAN NOT NULL DEFAULT TRUE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            last_login TIMESTAMPTZ
        )"
    ))
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {api_keys} (
            id UUID PRIMARY KEY,
            user_id UUID NOT NULL REFERENCES {users}(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            key_hash TEXT NOT NULL UNIQUE,
            key_prefix TEXT NOT NULL,
            is_active BOOLEAN NOT NULL DEFAULT TRUE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            last_used_at TIMESTAMPTZ,
            expires_at TIMESTAMPTZ
        )"
    ))
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {system_settings} (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )"
    ))
    .execute(pool)
    .await?;

    Ok(())
}
