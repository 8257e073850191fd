//! CLI commands implementation

pub mod examples;
pub mod init;
pub mod inspect;
pub mod query;
pub mod register;
pub mod status;
pub mod tenants;

pub use examples::*;
pub use init::*;
pub use inspect::*;
pub use query::*;
pub use register::*;
pub use status::*;
pub use tenants::*;

use crate::config::Config;
use crate::embed::create_embedder;
use crate::error::Result;
use crate::meta::MetaDb;
use crate::store::{open_index, TenantIndexStore, TenantRegistry};
use std::sync::Arc;
use tracing::debug;

/// Open the configured vector index and embedder, with the tenant registry
/// seeded from tenants recorded in the metadata database
pub async fn open_store(config: &Config, db: &MetaDb) -> Result<Arc<TenantIndexStore>> {
    let index = open_index(config).await?;
    let embedder = create_embedder(&config.embedding)?;

    let registry = Arc::new(TenantRegistry::new());
    let tenants = db.list_tenants().await?;
    debug!("Seeding registry with {} tenants", tenants.len());
    registry
        .seed(tenants.into_iter().map(|t| t.tenant_id))
        .await;

    Ok(Arc::new(TenantIndexStore::new(
        index,
        embedder,
        registry,
        config.store.example_collection.clone(),
        config.embedding.batch_size,
    )))
}
