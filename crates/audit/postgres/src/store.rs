use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use netwatch_audit::{AuditError, AuditPage, AuditQuery, AuditRecord, AuditStore};

use crate::config::PostgresAuditConfig;
use crate::migrations;

/// `PostgreSQL`-backed [`AuditStore`], so login/acknowledge/resolve/user and
/// target mutations (§3.5, §6.6) survive a restart the way the Durable Store
/// does, instead of living only in process memory.
pub struct PostgresAuditStore {
    pool: PgPool,
    config: PostgresAuditConfig,
}

impl PostgresAuditStore {
    /// Connect, create the pool, and run migrations.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Storage`] if pool creation or migrations fail.
    pub async fn new(config: PostgresAuditConfig) -> Result<Self, AuditError> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.pool_size)
            .connect(&config.url)
            .await
            .map_err(|e| AuditError::Storage(e.to_string()))?;

        migrations::run_migrations(&pool, &config)
            .await
            .map_err(|e| AuditError::Storage(e.to_string()))?;

        Ok(Self { pool, config })
    }

    /// Share an existing pool across stores, running migrations on creation.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Storage`] if migrations fail.
    pub async fn from_pool(pool: PgPool, config: PostgresAuditConfig) -> Result<Self, AuditError> {
        migrations::run_migrations(&pool, &config)
            .await
            .map_err(|e| AuditError::Storage(e.to_string()))?;
        Ok(Self { pool, config })
    }
}

#[async_trait]
impl AuditStore for PostgresAuditStore {
    async fn record(&self, entry: AuditRecord) -> Result<(), AuditError> {
        let table = self.config.table();
        sqlx::query(&format!(
            "INSERT INTO {table} (id, user_id, action, details, created_at) VALUES ($1, $2, $3, $4, $5)"
        ))
        .bind(entry.id)
        .bind(entry.user_id)
        .bind(&entry.action)
        .bind(&entry.details)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AuditError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn query(&self, query: &AuditQuery) -> Result<AuditPage, AuditError> {
        let table = self.config.table();
        let limit = query.effective_limit();
        let offset = query.effective_offset();

        let rows: Vec<(Uuid, Option<Uuid>, String, String, chrono::DateTime<chrono::Utc>)> = sqlx::query_as(&format!(
            "SELECT id, user_id, action, details, created_at FROM {table}
             WHERE ($1::UUID IS NULL OR user_id = $1)
               AND ($2::TEXT IS NULL OR action = $2)
               AND ($3::TIMESTAMPTZ IS NULL OR created_at >= $3)
               AND ($4::TIMESTAMPTZ IS NULL OR created_at <= $4)
             ORDER BY created_at DESC
             LIMIT $5 OFFSET $6"
        ))
        .bind(query.user_id)
        .bind(&query.action)
        .bind(query.from)
        .bind(query.to)
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AuditError::Storage(e.to_string()))?;

        let total: (i64,) = sqlx::query_as(&format!(
            "SELECT COUNT(*) FROM {table}
             WHERE ($1::UUID IS NULL OR user_id = $1)
               AND ($2::TEXT IS NULL OR action = $2)
               AND ($3::TIMESTAMPTZ IS NULL OR created_at >= $3)
               AND ($4::TIMESTAMPTZ IS NULL OR created_at <= $4)"
        ))
        .bind(query.user_id)
        .bind(&query.action)
        .bind(query.from)
        .bind(query.to)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AuditError::Storage(e.to_string()))?;

        let records = rows
            .into_iter()
            .map(|(id, user_id, action, details, created_at)| AuditRecord { id, user_id, action, details, created_at })
            .collect();

        Ok(AuditPage { records, total: total.0.max(0) as u64, limit, offset })
    }
}
