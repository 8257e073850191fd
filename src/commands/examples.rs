//! Example corpus loading

use crate::chunk::{chunk_examples, load_corpus};
use crate::config::Config;
use crate::error::Result;
use crate::meta::{MetaDb, RunOperation, RunStatus};
use crate::store::TenantIndexStore;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExampleLoadReport {
    pub corpus_path: String,
    pub collection: String,
    pub chunk_count: usize,
}

/// Rebuild the shared example collection from the corpus file
/// (`path`, or the configured corpus when `None`)
pub async fn cmd_load_examples(
    config: &Config,
    db: &MetaDb,
    store: &TenantIndexStore,
    path: Option<&Path>,
) -> Result<ExampleLoadReport> {
    let corpus_path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config.examples_path());

    let run = db
        .start_run(store.example_collection(), RunOperation::Examples)
        .await?;

    let outcome = async {
        let entries = load_corpus(&corpus_path)?;
        let chunks = chunk_examples(&entries);
        store.replace_example_index(&chunks).await
    }
    .await;

    match outcome {
        Ok(count) => {
            db.complete_run(&run.id, RunStatus::Completed, count as i64, None, None)
                .await?;
            info!("Loaded {} examples from {:?}", count, corpus_path);
            Ok(ExampleLoadReport {
                corpus_path: corpus_path.display().to_string(),
                collection: store.example_collection().to_string(),
                chunk_count: count,
            })
        }
        Err(e) => {
            if let Err(record) = db
                .complete_run(&run.id, RunStatus::Failed, 0, None, Some(e.to_string()))
                .await
            {
                warn!("Could not record failed example load: {}", record);
            }
            Err(e)
        }
    }
}

pub fn print_example_load(report: &ExampleLoadReport) {
    println!("✓ Example corpus loaded");
    println!("  Corpus: {}", report.corpus_path);
    println!("  Collection: {}", report.collection);
    println!("  Examples indexed: {}", report.chunk_count);
}
