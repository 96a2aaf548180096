use sqlx::PgPool;

use crate::config::PostgresAuditConfig;

/// Create the `audit_log` table if it does not exist (§6.6).
///
/// # Errors
///
/// Returns a [`sqlx::Error`] if the DDL statement fails.
pub async fn run_migrations(pool: &PgPool, config: &PostgresAuditConfig) -> Result<(), sqlx::Error> {
    let audit_log = config.table();

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {audit_log} (
            id UUID PRIMARY KEY,
            user_id UUID,
            action TEXT NOT NULL,
            details TEXT NOT NULL DEFAULT '',
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )"
    ))
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        "CREATE INDEX IF NOT EXISTS netwatch_audit_log_action_idx ON {audit_log} (action)"
    ))
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        "CREATE INDEX IF NOT EXISTS netwatch_audit_log_created_at_idx ON {audit_log} (created_at DESC)"
    ))
    .execute(pool)
    .await?;

    Ok(())
}
