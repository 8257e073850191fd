//! Status command implementation

use crate::config::Config;
use crate::error::Result;
use crate::meta::{GlobalStats, MetaDb};
use crate::store::TenantIndexStore;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Status information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusInfo {
    pub config_path: String,
    pub db_path: String,
    pub store_backend: String,
    pub qdrant_url: String,
    pub example_collection: String,
    pub embedding_backend: String,
    pub embedding_model: String,
    pub generation_model: String,
    pub generation_key_present: bool,
    pub index_reachable: bool,
    pub collections: usize,
    /// `None` when the example corpus has not been loaded
    pub example_chunks: Option<u64>,
    pub db_stats: GlobalStats,
}

/// Get system status
pub async fn cmd_status(config: &Config, db: &MetaDb, store: &TenantIndexStore) -> Result<StatusInfo> {
    info!("Getting status");

    let db_stats = db.get_global_stats().await?;

    let (index_reachable, collections, example_chunks) =
        match store.index().list_collections().await {
            Ok(names) => {
                let example_chunks = match store.example_count().await {
                    Ok(count) => count,
                    Err(e) => {
                        tracing::debug!("Example count error: {:?}", e);
                        None
                    }
                };
                (true, names.len(), example_chunks)
            }
            Err(e) => {
                tracing::debug!("Vector index connection error: {:?}", e);
                (false, 0, None)
            }
        };

    Ok(StatusInfo {
        config_path: config.paths.config_file.display().to_string(),
        db_path: config.paths.db_file.display().to_string(),
        store_backend: config.store.backend.clone(),
        qdrant_url: config.qdrant_url.clone(),
        example_collection: config.store.example_collection.clone(),
        embedding_backend: config.embedding.backend.clone(),
        embedding_model: config.embedding.model.clone(),
        generation_model: config.generation.model.clone(),
        generation_key_present: config.generation_api_key().is_some(),
        index_reachable,
        collections,
        example_chunks,
        db_stats,
    })
}

pub fn print_status(status: &StatusInfo) {
    println!("sqlingo status\n");
    println!("Config: {}", status.config_path);
    println!("Database: {}", status.db_path);

    if status.store_backend == "qdrant" {
        println!("\nVector index: qdrant at {}", status.qdrant_url);
    } else {
        println!("\nVector index: {}", status.store_backend);
    }
    if status.index_reachable {
        println!("  Reachable: ✓ ({} collections)", status.collections);
    } else {
        println!("  Reachable: ✗");
    }
    match status.example_chunks {
        Some(count) => println!("  Examples ({}): {}", status.example_collection, count),
        None => println!(
            "  Examples ({}): not loaded, run 'sqlingo examples load'",
            status.example_collection
        ),
    }

    println!(
        "\nEmbedding: {} ({})",
        status.embedding_model, status.embedding_backend
    );
    println!(
        "Generation: {} (API key {})",
        status.generation_model,
        if status.generation_key_present {
            "set"
        } else {
            "missing"
        }
    );

    println!("\nTenants: {}", status.db_stats.tenant_count);
    println!("Chunks: {}", status.db_stats.chunk_count);
    if status.db_stats.failed_runs > 0 {
        println!("Failed runs: {}", status.db_stats.failed_runs);
    }
}
