//! In-process vector index with optional on-disk persistence
//!
//! Each collection is held in memory and, when a directory is configured,
//! mirrored to `<dir>/<collection>.json` after every mutation.

use super::{ChunkPoint, SearchResult, VectorIndex};
use crate::embed::cosine_similarity;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct MemoryCollection {
    dimension: usize,
    points: Vec<ChunkPoint>,
}

pub struct MemoryIndex {
    collections: RwLock<HashMap<String, MemoryCollection>>,
    persist_dir: Option<PathBuf>,
}

impl MemoryIndex {
    /// Purely in-memory index
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            persist_dir: None,
        }
    }

    /// Index persisted under `dir`, loading any collections already there
    pub async fn open(dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(dir).await?;

        let mut collections = HashMap::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let content = tokio::fs::read_to_string(&path).await?;
            let collection: MemoryCollection = serde_json::from_str(&content)?;
            debug!("Loaded collection {} ({} points)", name, collection.points.len());
            collections.insert(name.to_string(), collection);
        }

        info!("Opened local index at {:?} with {} collections", dir, collections.len());

        Ok(Self {
            collections: RwLock::new(collections),
            persist_dir: Some(dir.to_path_buf()),
        })
    }

    fn collection_path(&self, name: &str) -> Option<PathBuf> {
        self.persist_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.json", name)))
    }

    async fn persist(&self, name: &str, collection: &MemoryCollection) -> Result<()> {
        if let Some(path) = self.collection_path(name) {
            let content = serde_json::to_vec(collection)?;
            tokio::fs::write(path, content).await?;
        }
        Ok(())
    }

    fn missing(name: &str) -> Error {
        Error::IndexNotFound(format!("collection '{}' does not exist", name))
    }
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn collection_exists(&self, name: &str) -> Result<bool> {
        Ok(self.collections.read().await.contains_key(name))
    }

    async fn create_collection(&self, name: &str, dimension: usize) -> Result<()> {
        let mut collections = self.collections.write().await;
        if collections.contains_key(name) {
            return Err(Error::Other(format!("Collection '{}' already exists", name)));
        }
        let collection = MemoryCollection {
            dimension,
            points: Vec::new(),
        };
        self.persist(name, &collection).await?;
        collections.insert(name.to_string(), collection);
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<bool> {
        let mut collections = self.collections.write().await;
        let existed = collections.remove(name).is_some();
        if let Some(path) = self.collection_path(name) {
            if path.exists() {
                tokio::fs::remove_file(path).await?;
            }
        }
        Ok(existed)
    }

    async fn insert(&self, name: &str, points: Vec<ChunkPoint>) -> Result<()> {
        let mut collections = self.collections.write().await;
        let collection = collections.get_mut(name).ok_or_else(|| Self::missing(name))?;

        if let Some(mismatch) = points.iter().find(|p| p.vector.len() != collection.dimension) {
            return Err(Error::Other(format!(
                "Vector dimension mismatch for collection '{}': expected {}, got {}",
                name,
                collection.dimension,
                mismatch.vector.len()
            )));
        }

        collection.points.retain(|p| !points.iter().any(|n| n.id == p.id));
        collection.points.extend(points);
        collection.points.sort_by_key(|p| p.id);
        self.persist(name, collection).await
    }

    async fn query(&self, name: &str, vector: Vec<f32>, limit: usize) -> Result<Vec<SearchResult>> {
        let collections = self.collections.read().await;
        let collection = collections.get(name).ok_or_else(|| Self::missing(name))?;

        let mut scored: Vec<SearchResult> = collection
            .points
            .iter()
            .map(|p| SearchResult {
                id: p.id,
                score: cosine_similarity(&vector, &p.vector),
                payload: p.payload.clone(),
            })
            .collect();

        // Stable sort keeps insertion order among equal scores
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn count(&self, name: &str) -> Result<u64> {
        let collections = self.collections.read().await;
        let collection = collections.get(name).ok_or_else(|| Self::missing(name))?;
        Ok(collection.points.len() as u64)
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.collections.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}
