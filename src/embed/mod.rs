//! Embedding generation
//!
//! This module provides an abstraction over embedding models with:
//! - A trait for different embedding backends
//! - Local FastEmbed, HTTP sidecar and feature-hashing backends
//! - Batch processing with progress reporting

#[cfg(feature = "local-embed")]
mod fastembed_impl;
mod hashing;
mod http_backend;

#[cfg(feature = "local-embed")]
pub use fastembed_impl::*;
pub use hashing::*;
pub use http_backend::*;

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};
use crate::progress::{advance_progress, finish_progress, start_progress_bar};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub fn normalize_embedding(vector: &[f32]) -> Vec<f32> {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return vector.to_vec();
    }
    vector.iter().map(|v| v / norm).collect()
}

/// Cosine similarity of two vectors of equal length
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Trait for embedding providers
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Create an embedder based on configuration
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    debug!("Creating '{}' embedder for model {}", config.backend, config.model);

    match config.backend.as_str() {
        #[cfg(feature = "local-embed")]
        "fastembed" => Ok(Arc::new(FastEmbedder::new(config)?)),
        #[cfg(not(feature = "local-embed"))]
        "fastembed" => Err(Error::Config(
            "embedding.backend 'fastembed' requires the 'local-embed' feature".to_string(),
        )),
        "http" => Ok(Arc::new(HttpEmbedder::new(config)?)),
        "hashing" => Ok(Arc::new(HashingEmbedder::new(config.dimension))),
        other => Err(Error::Config(format!(
            "Unsupported embedding backend '{}'",
            other
        ))),
    }
}

/// Embed texts in batches, with a progress bar for larger sets
pub async fn embed_in_batches(
    embedder: &dyn Embedder,
    texts: Vec<String>,
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    let batch_size = batch_size.max(1);
    let mut all_embeddings = Vec::with_capacity(texts.len());
    let pb = if texts.len() > batch_size {
        start_progress_bar(texts.len(), "Embedding chunks")
    } else {
        None
    };

    for chunk in texts.chunks(batch_size) {
        let embeddings = embedder.embed(chunk.to_vec()).await?;
        if embeddings.len() != chunk.len() {
            return Err(Error::Embedding(format!(
                "Embedder returned {} vectors for {} inputs",
                embeddings.len(),
                chunk.len()
            )));
        }
        advance_progress(&pb, chunk.len() as u64);
        all_embeddings.extend(embeddings);
    }

    finish_progress(pb, "Embedded");
    Ok(all_embeddings)
}
