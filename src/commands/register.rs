//! Register command implementation

use crate::chunk::{chunk_schema, count_by_type, fingerprint, Chunk};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::meta::{MetaDb, RegistrationRun, RunOperation, RunStatus, TenantRecord};
use crate::reflect::{self, reflect_schema, ConnectionDescriptor, Reflector, SchemaSnapshot};
use crate::store::{validate_tenant_id, TenantIndexStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Outcome of a successful registration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationReport {
    pub tenant_id: String,
    pub database_name: String,
    pub dialect: String,
    pub tables: usize,
    pub views: usize,
    pub relationships: usize,
    pub chunk_count: usize,
    pub chunks_by_type: BTreeMap<String, usize>,
    pub fingerprint: String,
    /// `None` on first registration
    pub schema_changed: Option<bool>,
}

/// Connect to the source described by `descriptor` and (re)build the tenant's index
pub async fn cmd_register(
    config: &Config,
    db: &MetaDb,
    store: &TenantIndexStore,
    tenant_id: &str,
    descriptor: &ConnectionDescriptor,
) -> Result<RegistrationReport> {
    validate_tenant_id(tenant_id)?;
    let run = db.start_run(tenant_id, RunOperation::Register).await?;

    let outcome = async {
        let reflector = reflect::connect(descriptor, &config.source).await?;
        index_tenant(store, tenant_id, reflector.as_ref()).await
    }
    .await;

    finish_registration(db, store, tenant_id, descriptor, &run, outcome).await
}

/// Register a tenant from an already-open reflector
pub async fn register_tenant(
    db: &MetaDb,
    store: &TenantIndexStore,
    tenant_id: &str,
    descriptor: &ConnectionDescriptor,
    reflector: &dyn Reflector,
) -> Result<RegistrationReport> {
    validate_tenant_id(tenant_id)?;
    let run = db.start_run(tenant_id, RunOperation::Register).await?;
    let outcome = index_tenant(store, tenant_id, reflector).await;
    finish_registration(db, store, tenant_id, descriptor, &run, outcome).await
}

async fn index_tenant(
    store: &TenantIndexStore,
    tenant_id: &str,
    reflector: &dyn Reflector,
) -> Result<(SchemaSnapshot, Vec<Chunk>)> {
    let snapshot = reflect_schema(reflector).await?;
    let chunks = chunk_schema(&snapshot);
    info!("Indexing {} chunks for tenant {}", chunks.len(), tenant_id);
    store.replace_tenant_index(tenant_id, &chunks).await?;
    Ok((snapshot, chunks))
}

async fn finish_registration(
    db: &MetaDb,
    store: &TenantIndexStore,
    tenant_id: &str,
    descriptor: &ConnectionDescriptor,
    run: &RegistrationRun,
    outcome: Result<(SchemaSnapshot, Vec<Chunk>)>,
) -> Result<RegistrationReport> {
    let recorded = match outcome {
        Ok((snapshot, chunks)) => {
            record_registration(db, tenant_id, descriptor, run, snapshot, chunks).await
        }
        Err(e) => Err(e),
    };

    match recorded {
        Ok(report) => Ok(report),
        Err(e) => Err(abandon_registration(db, store, tenant_id, run, e).await),
    }
}

/// Persist the tenant record and the completed run for a freshly built index
async fn record_registration(
    db: &MetaDb,
    tenant_id: &str,
    descriptor: &ConnectionDescriptor,
    run: &RegistrationRun,
    snapshot: SchemaSnapshot,
    chunks: Vec<Chunk>,
) -> Result<RegistrationReport> {
    let digest = fingerprint(&chunks);
    let previous = db.get_tenant(tenant_id).await?;
    let schema_changed = previous
        .as_ref()
        .map(|p| p.schema_fingerprint != digest);

    db.upsert_tenant(&TenantRecord::new(
        tenant_id.to_string(),
        snapshot.database_name.clone(),
        snapshot.dialect.clone(),
        descriptor.location(),
        digest.clone(),
        chunks.len() as i64,
    ))
    .await?;

    db.complete_run(
        &run.id,
        RunStatus::Completed,
        chunks.len() as i64,
        schema_changed,
        None,
    )
    .await?;

    match schema_changed {
        Some(true) => info!("Tenant {} re-registered; schema changed", tenant_id),
        Some(false) => info!("Tenant {} re-registered; schema unchanged", tenant_id),
        None => info!("Tenant {} registered", tenant_id),
    }

    Ok(RegistrationReport {
        tenant_id: tenant_id.to_string(),
        database_name: snapshot.database_name,
        dialect: snapshot.dialect,
        tables: snapshot.tables.len(),
        views: snapshot.views.len(),
        relationships: snapshot.relationships.len(),
        chunk_count: chunks.len(),
        chunks_by_type: count_by_type(&chunks)
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
        fingerprint: digest,
        schema_changed,
    })
}

/// Make sure nothing of a failed registration stays queryable, record the
/// failure, and hand back the original error
async fn abandon_registration(
    db: &MetaDb,
    store: &TenantIndexStore,
    tenant_id: &str,
    run: &RegistrationRun,
    error: Error,
) -> Error {
    warn!("Registration of {} failed: {}", tenant_id, error);

    if let Err(e) = store.drop_tenant(tenant_id).await {
        warn!("Could not drop index for {}: {}", tenant_id, e);
    }
    if let Err(e) = db.delete_tenant(tenant_id, false).await {
        warn!("Could not remove tenant record for {}: {}", tenant_id, e);
    }
    if let Err(e) = db
        .complete_run(&run.id, RunStatus::Failed, 0, None, Some(error.to_string()))
        .await
    {
        warn!("Could not record failed run for {}: {}", tenant_id, e);
    }

    error
}

pub fn print_registration(report: &RegistrationReport) {
    println!("✓ Tenant '{}' registered", report.tenant_id);
    println!(
        "  Database: {} ({})",
        report.database_name, report.dialect
    );
    println!(
        "  Tables: {}  Views: {}  Relationships: {}",
        report.tables, report.views, report.relationships
    );
    println!("  Chunks indexed: {}", report.chunk_count);
    for (chunk_type, count) in &report.chunks_by_type {
        println!("    {:<18} {}", chunk_type, count);
    }
    match report.schema_changed {
        Some(true) => println!("  Schema changed since last registration"),
        Some(false) => println!("  Schema unchanged since last registration"),
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::HashingEmbedder;
    use crate::reflect::SqliteReflector;
    use crate::store::{MemoryIndex, TenantRegistry};
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use sqlx::SqlitePool;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn source_pool(tmp: &TempDir) -> (SqlitePool, String) {
        let path = tmp.path().join("shop.db");
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(
                SqliteConnectOptions::new()
                    .filename(&path)
                    .create_if_missing(true),
            )
            .await
            .unwrap();
        for ddl in [
            "CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
            "CREATE TABLE orders (id INTEGER PRIMARY KEY, customer_id INTEGER REFERENCES customers(id))",
        ] {
            sqlx::query(ddl).execute(&pool).await.unwrap();
        }
        (pool, path.display().to_string())
    }

    async fn setup(tmp: &TempDir) -> (MetaDb, TenantIndexStore) {
        let db = MetaDb::new(&tmp.path().join("metadata.db")).await.unwrap();
        let store = TenantIndexStore::new(
            Arc::new(MemoryIndex::new()),
            Arc::new(HashingEmbedder::new(64)),
            Arc::new(TenantRegistry::new()),
            "__sql_examples",
            16,
        );
        (db, store)
    }

    #[tokio::test]
    async fn test_register_records_tenant_and_run() {
        let tmp = TempDir::new().unwrap();
        let (db, store) = setup(&tmp).await;
        let (pool, path) = source_pool(&tmp).await;
        let reflector = SqliteReflector::from_pool(pool, "shop");
        let descriptor = ConnectionDescriptor::sqlite(path);

        let report = register_tenant(&db, &store, "acme", &descriptor, &reflector)
            .await
            .unwrap();

        // 1 overview + 2 tables + 4 columns + 1 relationship
        assert_eq!(report.chunk_count, 8);
        assert_eq!(report.chunks_by_type["relationship"], 1);
        assert_eq!(report.schema_changed, None);

        let record = db.get_tenant("acme").await.unwrap().unwrap();
        assert_eq!(record.chunk_count, 8);
        assert_eq!(record.schema_fingerprint, report.fingerprint);

        let run = db.get_latest_run("acme").await.unwrap().unwrap();
        assert_eq!(run.status, "completed");
        assert_eq!(store.tenant_chunk_count("acme").await.unwrap(), Some(8));
    }

    #[tokio::test]
    async fn test_reregistration_reports_unchanged_schema() {
        let tmp = TempDir::new().unwrap();
        let (db, store) = setup(&tmp).await;
        let (pool, path) = source_pool(&tmp).await;
        let reflector = SqliteReflector::from_pool(pool, "shop");
        let descriptor = ConnectionDescriptor::sqlite(path);

        let first = register_tenant(&db, &store, "acme", &descriptor, &reflector)
            .await
            .unwrap();
        let second = register_tenant(&db, &store, "acme", &descriptor, &reflector)
            .await
            .unwrap();

        assert_eq!(second.schema_changed, Some(false));
        assert_eq!(first.chunk_count, second.chunk_count);
        assert_eq!(first.chunks_by_type, second.chunks_by_type);
    }

    #[tokio::test]
    async fn test_invalid_tenant_has_no_side_effects() {
        let tmp = TempDir::new().unwrap();
        let (db, store) = setup(&tmp).await;
        let (pool, path) = source_pool(&tmp).await;
        let reflector = SqliteReflector::from_pool(pool, "shop");

        let result = register_tenant(
            &db,
            &store,
            "__sql_examples",
            &ConnectionDescriptor::sqlite(path),
            &reflector,
        )
        .await;

        assert!(matches!(result, Err(Error::InvalidTenant(_))));
        assert!(db.list_runs(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_reregistration_drops_old_index() {
        let tmp = TempDir::new().unwrap();
        let (db, store) = setup(&tmp).await;
        let (pool, path) = source_pool(&tmp).await;
        let reflector = SqliteReflector::from_pool(pool.clone(), "shop");
        let descriptor = ConnectionDescriptor::sqlite(path);

        register_tenant(&db, &store, "acme", &descriptor, &reflector)
            .await
            .unwrap();

        pool.close().await;
        let result = register_tenant(&db, &store, "acme", &descriptor, &reflector).await;
        assert!(result.is_err());

        assert!(db.get_tenant("acme").await.unwrap().is_none());
        assert!(matches!(
            store.query_tenant_index("acme", "orders", 5).await,
            Err(Error::IndexNotFound(_))
        ));
        let run = db.get_latest_run("acme").await.unwrap().unwrap();
        assert_eq!(run.status, "failed");
        assert!(run.error_text.is_some());
    }

    #[tokio::test]
    async fn test_metadata_failure_leaves_nothing_queryable() {
        let tmp = TempDir::new().unwrap();
        let (db, store) = setup(&tmp).await;
        let (pool, path) = source_pool(&tmp).await;
        let reflector = SqliteReflector::from_pool(pool, "shop");
        let descriptor = ConnectionDescriptor::sqlite(path);

        sqlx::query(
            "CREATE TRIGGER reject_tenants BEFORE INSERT ON tenants \
             BEGIN SELECT RAISE(ABORT, 'disk full'); END",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let result = register_tenant(&db, &store, "acme", &descriptor, &reflector).await;
        assert!(matches!(result, Err(Error::Database(_))));

        assert!(matches!(
            store.query_tenant_index("acme", "orders", 5).await,
            Err(Error::IndexNotFound(_))
        ));
        assert!(db.get_tenant("acme").await.unwrap().is_none());
        let run = db.get_latest_run("acme").await.unwrap().unwrap();
        assert_eq!(run.status, "failed");
        assert!(run.error_text.unwrap().contains("disk full"));
    }

    #[tokio::test]
    async fn test_cmd_register_unreachable_source() {
        let tmp = TempDir::new().unwrap();
        let (db, store) = setup(&tmp).await;
        let config = Config::default();
        let descriptor =
            ConnectionDescriptor::sqlite(tmp.path().join("missing.db").display().to_string());

        let result = cmd_register(&config, &db, &store, "acme", &descriptor).await;
        assert!(matches!(result, Err(Error::Connection(_))));
        assert!(!store.registry().contains("acme").await);
    }
}
