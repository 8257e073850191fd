//! Metadata storage using SQLite
//!
//! This module handles all local metadata storage including:
//! - Tenants (registered sources, index fingerprint and size)
//! - Registration runs (history and outcome of every rebuild)
//!
//! Connection credentials are never stored.

mod schema;

pub use schema::*;

use crate::config::Config;
use crate::error::{Error, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

/// Registration run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Running => write!(f, "running"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for RunStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            _ => Err(Error::Config(format!("Unknown run status: {}", s))),
        }
    }
}

/// What a registration run rebuilt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOperation {
    Register,
    Examples,
}

impl std::fmt::Display for RunOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOperation::Register => write!(f, "register"),
            RunOperation::Examples => write!(f, "examples"),
        }
    }
}

/// A registered tenant
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TenantRecord {
    pub tenant_id: String,
    pub database_name: String,
    pub dialect: String,
    /// Host and port, or file path for SQLite
    pub location: String,
    pub schema_fingerprint: String,
    pub chunk_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl TenantRecord {
    pub fn new(
        tenant_id: String,
        database_name: String,
        dialect: String,
        location: String,
        schema_fingerprint: String,
        chunk_count: i64,
    ) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            tenant_id,
            database_name,
            dialect,
            location,
            schema_fingerprint,
            chunk_count,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// A registration run record
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RegistrationRun {
    pub id: String,
    pub tenant_id: String,
    pub operation: String,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub status: String,
    pub chunks_indexed: i64,
    pub schema_changed: Option<bool>,
    pub error_text: Option<String>,
}

impl RegistrationRun {
    pub fn new(tenant_id: String, operation: RunOperation) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tenant_id,
            operation: operation.to_string(),
            started_at: Utc::now().to_rfc3339(),
            completed_at: None,
            status: RunStatus::Running.to_string(),
            chunks_indexed: 0,
            schema_changed: None,
            error_text: None,
        }
    }
}

/// Global statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalStats {
    pub tenant_count: usize,
    pub chunk_count: usize,
    pub failed_runs: usize,
}

/// Metadata database handle
#[derive(Clone)]
pub struct MetaDb {
    pool: SqlitePool,
}

impl MetaDb {
    /// Connect to the metadata database
    pub async fn connect(config: &Config) -> Result<Self> {
        Self::open(&config.paths.db_file).await
    }

    /// Connect and make sure the schema exists
    pub async fn new(db_path: &Path) -> Result<Self> {
        let db = Self::open(db_path).await?;
        if !db.is_initialized().await? {
            db.init_schema().await?;
        }
        Ok(db)
    }

    async fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        debug!("Connecting to SQLite database at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Initialize the database schema
    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing database schema");
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Check if database is initialized
    pub async fn is_initialized(&self) -> Result<bool> {
        let result: Option<(i32,)> =
            sqlx::query_as("SELECT 1 FROM sqlite_master WHERE type='table' AND name='tenants'")
                .fetch_optional(&self.pool)
                .await?;
        Ok(result.is_some())
    }

    // ===== Tenant Operations =====

    /// Insert a tenant, or refresh it keeping the original creation time
    pub async fn upsert_tenant(&self, tenant: &TenantRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tenants (tenant_id, database_name, dialect, location, schema_fingerprint, chunk_count, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(tenant_id) DO UPDATE SET
                database_name = excluded.database_name,
                dialect = excluded.dialect,
                location = excluded.location,
                schema_fingerprint = excluded.schema_fingerprint,
                chunk_count = excluded.chunk_count,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&tenant.tenant_id)
        .bind(&tenant.database_name)
        .bind(&tenant.dialect)
        .bind(&tenant.location)
        .bind(&tenant.schema_fingerprint)
        .bind(tenant.chunk_count)
        .bind(&tenant.created_at)
        .bind(&tenant.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_tenant(&self, tenant_id: &str) -> Result<Option<TenantRecord>> {
        let tenant =
            sqlx::query_as::<_, TenantRecord>("SELECT * FROM tenants WHERE tenant_id = ?")
                .bind(tenant_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(tenant)
    }

    pub async fn list_tenants(&self) -> Result<Vec<TenantRecord>> {
        let tenants =
            sqlx::query_as::<_, TenantRecord>("SELECT * FROM tenants ORDER BY tenant_id")
                .fetch_all(&self.pool)
                .await?;
        Ok(tenants)
    }

    /// Delete a tenant; returns whether it existed. Run history is kept unless
    /// `with_history` is set.
    pub async fn delete_tenant(&self, tenant_id: &str, with_history: bool) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tenants WHERE tenant_id = ?")
            .bind(tenant_id)
            .execute(&self.pool)
            .await?;

        if with_history {
            sqlx::query("DELETE FROM registration_runs WHERE tenant_id = ?")
                .bind(tenant_id)
                .execute(&self.pool)
                .await?;
        }

        Ok(result.rows_affected() > 0)
    }

    // ===== Registration Run Operations =====

    /// Start a new registration run
    pub async fn start_run(
        &self,
        tenant_id: &str,
        operation: RunOperation,
    ) -> Result<RegistrationRun> {
        let run = RegistrationRun::new(tenant_id.to_string(), operation);
        sqlx::query(
            r#"
            INSERT INTO registration_runs (id, tenant_id, operation, started_at, status, chunks_indexed)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&run.id)
        .bind(&run.tenant_id)
        .bind(&run.operation)
        .bind(&run.started_at)
        .bind(&run.status)
        .bind(run.chunks_indexed)
        .execute(&self.pool)
        .await?;
        Ok(run)
    }

    /// Complete a registration run
    pub async fn complete_run(
        &self,
        id: &str,
        status: RunStatus,
        chunks_indexed: i64,
        schema_changed: Option<bool>,
        error_text: Option<String>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE registration_runs SET
                completed_at = ?,
                status = ?,
                chunks_indexed = ?,
                schema_changed = ?,
                error_text = ?
            WHERE id = ?
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(status.to_string())
        .bind(chunks_indexed)
        .bind(schema_changed)
        .bind(error_text)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_latest_run(&self, tenant_id: &str) -> Result<Option<RegistrationRun>> {
        let run = sqlx::query_as::<_, RegistrationRun>(
            "SELECT * FROM registration_runs WHERE tenant_id = ? ORDER BY started_at DESC LIMIT 1",
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(run)
    }

    pub async fn list_runs(&self, limit: i64) -> Result<Vec<RegistrationRun>> {
        let runs = sqlx::query_as::<_, RegistrationRun>(
            "SELECT * FROM registration_runs ORDER BY started_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(runs)
    }

    // ===== Statistics =====

    pub async fn get_global_stats(&self) -> Result<GlobalStats> {
        let tenant_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tenants")
            .fetch_one(&self.pool)
            .await?;

        let chunk_count: i64 =
            sqlx::query_scalar("SELECT COALESCE(SUM(chunk_count), 0) FROM tenants")
                .fetch_one(&self.pool)
                .await?;

        let failed_runs: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM registration_runs WHERE status = 'failed'")
                .fetch_one(&self.pool)
                .await?;

        Ok(GlobalStats {
            tenant_count: tenant_count as usize,
            chunk_count: chunk_count as usize,
            failed_runs: failed_runs as usize,
        })
    }
}
