//! Retrieval orchestration
//!
//! Answers a natural-language question for one tenant:
//! - Top-K schema chunks from the tenant's collection
//! - Top-K example chunks from the shared example collection
//! - One prompt, each chunk set capped to a byte budget
//! - A single generation call, returned verbatim

use crate::config::RetrievalConfig;
use crate::error::{Error, Result};
use crate::generate::Generator;
use crate::store::{ScoredChunk, TenantIndexStore};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Placeholder used when the tenant index returns nothing
pub const NO_SCHEMA_CONTEXT: &str = "(no schema context was found for this question)";

/// Placeholder used when no example query matches
pub const NO_EXAMPLE_CONTEXT: &str = "(no example queries were found for this question)";

const CHUNK_SEPARATOR: &str = "\n\n";

/// Chunks retrieved for one question
#[derive(Debug, Clone, Default)]
pub struct RetrievedContext {
    pub schema: Vec<ScoredChunk>,
    pub examples: Vec<ScoredChunk>,
}

/// Summary of a composed prompt, for logging and `--json` output
#[derive(Debug, Clone, Serialize)]
pub struct PromptStats {
    pub schema_chunks: usize,
    pub example_chunks: usize,
    pub prompt_bytes: usize,
}

pub struct Orchestrator {
    store: Arc<TenantIndexStore>,
    generator: Arc<dyn Generator>,
    top_k: usize,
    max_context_bytes: usize,
}

impl Orchestrator {
    pub fn new(
        store: Arc<TenantIndexStore>,
        generator: Arc<dyn Generator>,
        config: &RetrievalConfig,
    ) -> Self {
        Self {
            store,
            generator,
            top_k: config.top_k,
            max_context_bytes: config.max_context_bytes,
        }
    }

    /// Fetch both chunk sets for `query`. An unregistered tenant is an error;
    /// a missing example collection only yields an empty example set.
    pub async fn retrieve(&self, tenant_id: &str, query: &str) -> Result<RetrievedContext> {
        let schema = self
            .store
            .query_tenant_index(tenant_id, query, self.top_k)
            .await?;

        let examples = match self.store.query_example_index(query, self.top_k).await {
            Ok(examples) => examples,
            Err(Error::IndexNotFound(reason)) => {
                warn!("Answering without examples: {}", reason);
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        debug!(
            "Retrieved {} schema and {} example chunks for {}",
            schema.len(),
            examples.len(),
            tenant_id
        );

        Ok(RetrievedContext { schema, examples })
    }

    /// Build the prompt for `query` without calling the generator
    pub async fn prompt_for(&self, tenant_id: &str, query: &str) -> Result<(String, PromptStats)> {
        let retrieved = self.retrieve(tenant_id, query).await?;

        let context = render_context(&retrieved.schema, self.max_context_bytes, NO_SCHEMA_CONTEXT);
        let examples =
            render_context(&retrieved.examples, self.max_context_bytes, NO_EXAMPLE_CONTEXT);
        let prompt = compose_prompt(&context, &examples, query);

        let stats = PromptStats {
            schema_chunks: retrieved.schema.len(),
            example_chunks: retrieved.examples.len(),
            prompt_bytes: prompt.len(),
        };
        Ok((prompt, stats))
    }

    /// Retrieve, compose and generate; returns the raw generated text
    pub async fn answer(&self, tenant_id: &str, query: &str) -> Result<String> {
        let (prompt, stats) = self.prompt_for(tenant_id, query).await?;

        info!(
            "Generating with {} ({} schema chunks, {} examples, {} bytes)",
            self.generator.model_name(),
            stats.schema_chunks,
            stats.example_chunks,
            stats.prompt_bytes
        );

        self.generator.generate(&prompt).await
    }
}

/// Join chunk texts in rank order, keeping whole chunks while they fit in
/// `max_bytes`. A first chunk larger than the budget is cut at a char boundary.
pub fn render_context(chunks: &[ScoredChunk], max_bytes: usize, empty_marker: &str) -> String {
    let mut rendered = String::new();

    for scored in chunks {
        let text = scored.chunk.text.as_str();
        if rendered.is_empty() {
            rendered.push_str(truncate_to_boundary(text, max_bytes));
            continue;
        }
        if rendered.len() + CHUNK_SEPARATOR.len() + text.len() > max_bytes {
            break;
        }
        rendered.push_str(CHUNK_SEPARATOR);
        rendered.push_str(text);
    }

    if rendered.is_empty() {
        empty_marker.to_string()
    } else {
        rendered
    }
}

/// Fill the generation prompt template
pub fn compose_prompt(context: &str, examples: &str, query: &str) -> String {
    format!(
        "Based on the following context, answer the question.\n\n\
         Context:\n{context}\n\n\
         Question: sql query for {query}\n\
         Example:{examples}\n\
         Answer:"
    )
}

fn truncate_to_boundary(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
