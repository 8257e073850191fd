//! Tenant listing and removal

use crate::error::{Error, Result};
use crate::meta::MetaDb;
use crate::store::{validate_tenant_id, TenantIndexStore, TenantState};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Tenant information with index state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantInfo {
    pub tenant_id: String,
    pub database_name: String,
    pub dialect: String,
    pub location: String,
    pub chunk_count: i64,
    /// Points actually present in the index, if it was reachable
    pub indexed_chunks: Option<u64>,
    pub queryable: bool,
    pub last_run_status: Option<String>,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemovalReport {
    pub tenant_id: String,
    pub collection_deleted: bool,
    pub record_deleted: bool,
}

/// List all registered tenants
pub async fn cmd_list_tenants(db: &MetaDb, store: &TenantIndexStore) -> Result<Vec<TenantInfo>> {
    info!("Listing tenants");

    let mut tenants = Vec::new();
    for record in db.list_tenants().await? {
        let indexed_chunks = match store.tenant_chunk_count(&record.tenant_id).await {
            Ok(count) => count,
            Err(e) => {
                tracing::debug!("Index count error for {}: {:?}", record.tenant_id, e);
                None
            }
        };
        let queryable = matches!(
            store.registry().state(&record.tenant_id).await,
            Some(TenantState::Ready)
        ) && indexed_chunks.is_some();
        let last_run_status = db
            .get_latest_run(&record.tenant_id)
            .await?
            .map(|run| run.status);

        tenants.push(TenantInfo {
            tenant_id: record.tenant_id,
            database_name: record.database_name,
            dialect: record.dialect,
            location: record.location,
            chunk_count: record.chunk_count,
            indexed_chunks,
            queryable,
            last_run_status,
            updated_at: record.updated_at,
        });
    }

    Ok(tenants)
}

/// Remove a tenant's index, record and run history
pub async fn cmd_remove_tenant(
    db: &MetaDb,
    store: &TenantIndexStore,
    tenant_id: &str,
) -> Result<RemovalReport> {
    validate_tenant_id(tenant_id)?;
    info!("Removing tenant {}", tenant_id);

    let collection_deleted = store.drop_tenant(tenant_id).await?;
    let record_deleted = db.delete_tenant(tenant_id, true).await?;

    if !collection_deleted && !record_deleted {
        return Err(Error::IndexNotFound(format!(
            "tenant '{}' is not registered",
            tenant_id
        )));
    }

    Ok(RemovalReport {
        tenant_id: tenant_id.to_string(),
        collection_deleted,
        record_deleted,
    })
}

pub fn print_tenants(tenants: &[TenantInfo]) {
    if tenants.is_empty() {
        println!("No tenants registered.");
        println!("\nUse 'sqlingo register <tenant> --url <connection-url>' to add one.");
        return;
    }

    println!("Registered tenants:\n");
    for tenant in tenants {
        let marker = if tenant.queryable { "●" } else { "○" };
        println!("{} {}", marker, tenant.tenant_id);
        println!(
            "    Database: {} ({}) at {}",
            tenant.database_name, tenant.dialect, tenant.location
        );
        match tenant.indexed_chunks {
            Some(indexed) => println!("    Chunks: {} ({} indexed)", tenant.chunk_count, indexed),
            None => println!("    Chunks: {} (index missing)", tenant.chunk_count),
        }
        if let Some(status) = &tenant.last_run_status {
            println!("    Last run: {}", status);
        }
        println!("    Updated: {}", tenant.updated_at);
    }
}
