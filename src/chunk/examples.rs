//! Example corpus loading and chunking

use super::{Chunk, ChunkType};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// One worked question/SQL pair from the example corpus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExampleEntry {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub sql: String,
}

/// Load the example corpus (a JSON array of entries)
pub fn load_corpus(path: &Path) -> Result<Vec<ExampleEntry>> {
    if !path.exists() {
        return Err(Error::Config(format!(
            "Example corpus not found: {}",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(path)?;
    let entries: Vec<ExampleEntry> = serde_json::from_str(&content)?;
    debug!("Loaded {} examples from {:?}", entries.len(), path);
    Ok(entries)
}

/// One `example` chunk per corpus entry, in corpus order
pub fn chunk_examples(entries: &[ExampleEntry]) -> Vec<Chunk> {
    entries
        .iter()
        .map(|entry| {
            let mut attributes = BTreeMap::new();
            attributes.insert("title".to_string(), entry.title.clone());
            Chunk {
                text: format!("{}\n{}\n{}", entry.title, entry.description, entry.sql),
                chunk_type: ChunkType::Example,
                attributes,
            }
        })
        .collect()
}
