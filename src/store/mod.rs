//! Tenant index store
//!
//! This module owns every persisted chunk collection:
//! - One collection per tenant, named by the tenant id
//! - One shared example collection under a reserved name
//! - Drop-and-recreate replacement guarded per tenant
//! - Top-K similarity queries

mod memory;
mod payload;
mod qdrant;
mod registry;

pub use memory::MemoryIndex;
pub use payload::*;
pub use qdrant::QdrantIndex;
pub use registry::*;

use crate::chunk::Chunk;
use crate::config::{Config, RESERVED_COLLECTION_PREFIX};
use crate::embed::{embed_in_batches, Embedder};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Longest accepted tenant id
pub const MAX_TENANT_ID_LEN: usize = 100;

/// A stored point returned by a similarity query
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub id: u64,
    pub score: f32,
    pub payload: ChunkPayload,
}

/// A retrieved chunk with its similarity score
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk_id: String,
    pub score: f32,
    pub chunk: Chunk,
}

/// Collection-scoped nearest-neighbour index
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn collection_exists(&self, name: &str) -> Result<bool>;

    async fn create_collection(&self, name: &str, dimension: usize) -> Result<()>;

    /// Delete a collection; returns whether it existed
    async fn delete_collection(&self, name: &str) -> Result<bool>;

    async fn insert(&self, name: &str, points: Vec<ChunkPoint>) -> Result<()>;

    /// Up to `limit` points ranked by similarity, best first
    async fn query(&self, name: &str, vector: Vec<f32>, limit: usize) -> Result<Vec<SearchResult>>;

    async fn count(&self, name: &str) -> Result<u64>;

    async fn list_collections(&self) -> Result<Vec<String>>;
}

/// Open the vector index configured for this installation
pub async fn open_index(config: &Config) -> Result<Arc<dyn VectorIndex>> {
    match config.store.backend.as_str() {
        "qdrant" => Ok(Arc::new(QdrantIndex::new(
            &config.qdrant_url,
            config.qdrant_api_key(),
        )?)),
        "memory" => Ok(Arc::new(
            MemoryIndex::open(&config.paths.base_dir.join("index")).await?,
        )),
        other => Err(Error::Config(format!("Unsupported store backend '{}'", other))),
    }
}

/// Check a tenant id against the allowed alphabet and the reserved namespace
pub fn validate_tenant_id(tenant_id: &str) -> Result<()> {
    if tenant_id.is_empty() || tenant_id.chars().count() > MAX_TENANT_ID_LEN {
        return Err(Error::InvalidTenant(format!(
            "'{}' must be 1-{} characters long",
            tenant_id, MAX_TENANT_ID_LEN
        )));
    }

    if let Some(bad) = tenant_id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(Error::InvalidTenant(format!(
            "'{}' contains '{}'; only letters, digits, '_' and '-' are allowed",
            tenant_id, bad
        )));
    }

    if tenant_id.starts_with(RESERVED_COLLECTION_PREFIX) {
        return Err(Error::InvalidTenant(format!(
            "'{}' uses the reserved prefix '{}'",
            tenant_id, RESERVED_COLLECTION_PREFIX
        )));
    }

    Ok(())
}

/// Per-tenant schema collections plus the shared example collection
pub struct TenantIndexStore {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    registry: Arc<TenantRegistry>,
    example_collection: String,
    example_lock: RwLock<()>,
    batch_size: usize,
}

impl TenantIndexStore {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        registry: Arc<TenantRegistry>,
        example_collection: impl Into<String>,
        batch_size: usize,
    ) -> Self {
        Self {
            index,
            embedder,
            registry,
            example_collection: example_collection.into(),
            example_lock: RwLock::new(()),
            batch_size,
        }
    }

    pub fn registry(&self) -> &Arc<TenantRegistry> {
        &self.registry
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    pub fn example_collection(&self) -> &str {
        &self.example_collection
    }

    /// Replace a tenant's collection with `chunks`. On failure the tenant is
    /// dropped and its collection removed, so no partial index stays queryable.
    pub async fn replace_tenant_index(&self, tenant_id: &str, chunks: &[Chunk]) -> Result<usize> {
        validate_tenant_id(tenant_id)?;

        let guard = self.registry.begin_rebuild(tenant_id).await;
        match self.rebuild_collection(tenant_id, chunks).await {
            Ok(count) => {
                self.registry.commit(guard).await;
                info!("Tenant {} index rebuilt with {} chunks", tenant_id, count);
                Ok(count)
            }
            Err(e) => {
                if let Err(cleanup) = self.index.delete_collection(tenant_id).await {
                    warn!("Could not remove partial index for {}: {}", tenant_id, cleanup);
                }
                self.registry.abort(guard).await;
                Err(e)
            }
        }
    }

    /// Replace the shared example collection
    pub async fn replace_example_index(&self, chunks: &[Chunk]) -> Result<usize> {
        let _lock = self.example_lock.write().await;
        let result = self
            .rebuild_collection(&self.example_collection, chunks)
            .await;
        if result.is_err() {
            if let Err(cleanup) = self.index.delete_collection(&self.example_collection).await {
                warn!("Could not remove partial example index: {}", cleanup);
            }
        }
        result
    }

    /// Top-`k` chunks from a tenant's collection
    pub async fn query_tenant_index(
        &self,
        tenant_id: &str,
        text: &str,
        k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let _read = self.registry.read(tenant_id).await?;
        if !self.index.collection_exists(tenant_id).await? {
            return Err(Error::IndexNotFound(format!(
                "tenant '{}' has no stored index",
                tenant_id
            )));
        }
        self.search(tenant_id, text, k).await
    }

    /// Top-`k` chunks from the shared example collection
    pub async fn query_example_index(&self, text: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let _lock = self.example_lock.read().await;
        if !self.index.collection_exists(&self.example_collection).await? {
            return Err(Error::IndexNotFound(format!(
                "example collection '{}' has not been loaded",
                self.example_collection
            )));
        }
        self.search(&self.example_collection, text, k).await
    }

    /// Remove a tenant and its collection; returns whether anything existed
    pub async fn drop_tenant(&self, tenant_id: &str) -> Result<bool> {
        validate_tenant_id(tenant_id)?;

        let guard = self.registry.begin_rebuild(tenant_id).await;
        let deleted = self.index.delete_collection(tenant_id).await;
        self.registry.abort(guard).await;
        deleted
    }

    /// Number of stored chunks for a tenant, or `None` if it has no collection
    pub async fn tenant_chunk_count(&self, tenant_id: &str) -> Result<Option<u64>> {
        if !self.index.collection_exists(tenant_id).await? {
            return Ok(None);
        }
        Ok(Some(self.index.count(tenant_id).await?))
    }

    pub async fn example_count(&self) -> Result<Option<u64>> {
        if !self.index.collection_exists(&self.example_collection).await? {
            return Ok(None);
        }
        Ok(Some(self.index.count(&self.example_collection).await?))
    }

    async fn rebuild_collection(&self, name: &str, chunks: &[Chunk]) -> Result<usize> {
        if self.index.delete_collection(name).await? {
            debug!("Dropped existing collection {}", name);
        }

        self.index
            .create_collection(name, self.embedder.dimension())
            .await?;

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embed_in_batches(self.embedder.as_ref(), texts, self.batch_size).await?;

        let points: Vec<ChunkPoint> = vectors
            .into_iter()
            .zip(chunks)
            .enumerate()
            .map(|(position, (vector, chunk))| ChunkPoint::new(position, vector, chunk))
            .collect();

        let count = points.len();
        for batch in points.chunks(self.batch_size.max(1)) {
            self.index.insert(name, batch.to_vec()).await?;
        }

        Ok(count)
    }

    async fn search(&self, collection: &str, text: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let mut vectors = self.embedder.embed(vec![text.to_string()]).await?;
        let vector = vectors
            .pop()
            .ok_or_else(|| Error::Embedding("Embedder returned no vector for query".to_string()))?;

        let results = self.index.query(collection, vector, k).await?;

        Ok(results
            .into_iter()
            .filter_map(|result| match result.payload.to_chunk() {
                Some(chunk) => Some(ScoredChunk {
                    chunk_id: result.payload.chunk_id.clone(),
                    score: result.score,
                    chunk,
                }),
                None => {
                    warn!(
                        "Skipping point {} in {} with unknown type '{}'",
                        result.id, collection, result.payload.chunk_type
                    );
                    None
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkType;
    use crate::embed::HashingEmbedder;
    use std::collections::BTreeMap;

    fn store() -> TenantIndexStore {
        TenantIndexStore::new(
            Arc::new(MemoryIndex::new()),
            Arc::new(HashingEmbedder::new(128)),
            Arc::new(TenantRegistry::new()),
            "__sql_examples",
            4,
        )
    }

    fn chunk(text: &str, chunk_type: ChunkType) -> Chunk {
        Chunk {
            text: text.to_string(),
            chunk_type,
            attributes: BTreeMap::new(),
        }
    }

    #[test]
    fn test_validate_tenant_id() {
        assert!(validate_tenant_id("acme").is_ok());
        assert!(validate_tenant_id("user-42_prod").is_ok());
        assert!(validate_tenant_id(&"a".repeat(100)).is_ok());

        for bad in ["", "__sql_examples", "__x", "acme corp", "a/b", "ünicode"] {
            assert!(
                matches!(validate_tenant_id(bad), Err(Error::InvalidTenant(_))),
                "{bad:?} should be rejected"
            );
        }
        assert!(validate_tenant_id(&"a".repeat(101)).is_err());
    }

    #[tokio::test]
    async fn test_unregistered_tenant_is_not_found() {
        let store = store();
        let result = store.query_tenant_index("ghost", "orders", 5).await;
        assert!(matches!(result, Err(Error::IndexNotFound(_))));
    }

    #[tokio::test]
    async fn test_tenant_isolation() {
        let store = store();
        store
            .replace_tenant_index(
                "acme",
                &[chunk("Table 'orders' has 2 columns", ChunkType::TableOverview)],
            )
            .await
            .unwrap();
        store
            .replace_tenant_index(
                "globex",
                &[chunk("Table 'shipments' has 4 columns", ChunkType::TableOverview)],
            )
            .await
            .unwrap();

        let results = store.query_tenant_index("acme", "shipments", 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].chunk.text.contains("orders"));
    }

    #[tokio::test]
    async fn test_replace_is_idempotent_and_positional() {
        let store = store();
        let chunks: Vec<Chunk> = (0..6)
            .map(|i| chunk(&format!("Column 'c{}' in table 't'", i), ChunkType::ColumnDetail))
            .collect();

        assert_eq!(store.replace_tenant_index("acme", &chunks).await.unwrap(), 6);
        assert_eq!(store.replace_tenant_index("acme", &chunks).await.unwrap(), 6);
        assert_eq!(store.tenant_chunk_count("acme").await.unwrap(), Some(6));

        let results = store.query_tenant_index("acme", "c3", 6).await.unwrap();
        let mut ids: Vec<String> = results.iter().map(|r| r.chunk_id.clone()).collect();
        ids.sort();
        assert_eq!(
            ids,
            (0..6).map(|i| format!("chunk_{}", i)).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn test_query_returns_at_most_k() {
        let store = store();
        let chunks: Vec<Chunk> = (0..10)
            .map(|i| chunk(&format!("fragment {}", i), ChunkType::ColumnDetail))
            .collect();
        store.replace_tenant_index("acme", &chunks).await.unwrap();

        let results = store.query_tenant_index("acme", "fragment", 3).await.unwrap();
        assert_eq!(results.len(), 3);
    }

    #[tokio::test]
    async fn test_reserved_tenant_rejected_before_side_effects() {
        let store = store();
        let result = store
            .replace_tenant_index("__sql_examples", &[chunk("x", ChunkType::View)])
            .await;
        assert!(matches!(result, Err(Error::InvalidTenant(_))));
        assert!(!store.index().collection_exists("__sql_examples").await.unwrap());
    }

    #[tokio::test]
    async fn test_example_index_lifecycle() {
        let store = store();
        assert!(matches!(
            store.query_example_index("count", 5).await,
            Err(Error::IndexNotFound(_))
        ));

        let examples = vec![
            chunk("Count rows\nHow many\nSELECT COUNT(*) FROM t;", ChunkType::Example),
            chunk("Latest\nNewest row\nSELECT * FROM t ORDER BY id DESC LIMIT 1;", ChunkType::Example),
        ];
        assert_eq!(store.replace_example_index(&examples).await.unwrap(), 2);
        assert_eq!(store.replace_example_index(&examples).await.unwrap(), 2);
        assert_eq!(store.example_count().await.unwrap(), Some(2));

        let results = store.query_example_index("count rows", 1).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.chunk_type, ChunkType::Example);
    }

    #[tokio::test]
    async fn test_drop_tenant() {
        let store = store();
        store
            .replace_tenant_index("acme", &[chunk("orders", ChunkType::TableOverview)])
            .await
            .unwrap();

        assert!(store.drop_tenant("acme").await.unwrap());
        assert!(!store.registry().contains("acme").await);
        assert!(matches!(
            store.query_tenant_index("acme", "orders", 5).await,
            Err(Error::IndexNotFound(_))
        ));
        assert!(!store.drop_tenant("acme").await.unwrap());
    }

    #[tokio::test]
    async fn test_query_during_rebuild_is_not_found() {
        let store = store();
        store
            .replace_tenant_index("acme", &[chunk("orders", ChunkType::TableOverview)])
            .await
            .unwrap();

        let guard = store.registry().begin_rebuild("acme").await;
        assert!(matches!(
            store.query_tenant_index("acme", "orders", 5).await,
            Err(Error::IndexNotFound(_))
        ));
        store.registry().commit(guard).await;
        assert!(store.query_tenant_index("acme", "orders", 5).await.is_ok());
    }
}
