//! Query command implementation

use crate::error::{Error, Result};
use crate::postprocess::normalize_sql;
use crate::retrieve::{Orchestrator, PromptStats};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Longest accepted question, in characters
pub const MAX_QUERY_CHARS: usize = 100;

/// A normalized SQL answer to one question
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryAnswer {
    pub tenant_id: String,
    pub query: String,
    pub sql: String,
    pub created_at: DateTime<Utc>,
}

/// The prompt that would be sent for a question
#[derive(Debug, Clone, Serialize)]
pub struct PromptPreview {
    pub tenant_id: String,
    pub prompt: String,
    pub stats: PromptStats,
}

fn validate_query(query: &str) -> Result<&str> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidQuery("query must not be empty".to_string()));
    }
    if trimmed.chars().count() > MAX_QUERY_CHARS {
        return Err(Error::InvalidQuery(format!(
            "query is longer than {} characters",
            MAX_QUERY_CHARS
        )));
    }
    Ok(trimmed)
}

/// Answer a question against a tenant's schema
pub async fn cmd_query(
    orchestrator: &Orchestrator,
    tenant_id: &str,
    query: &str,
) -> Result<QueryAnswer> {
    let query = validate_query(query)?;
    info!("Answering for tenant {}: {}", tenant_id, query);

    let raw = orchestrator.answer(tenant_id, query).await?;
    let sql = normalize_sql(&raw);

    Ok(QueryAnswer {
        tenant_id: tenant_id.to_string(),
        query: query.to_string(),
        sql,
        created_at: Utc::now(),
    })
}

/// Compose the prompt for a question without calling the generation service
pub async fn cmd_preview_prompt(
    orchestrator: &Orchestrator,
    tenant_id: &str,
    query: &str,
) -> Result<PromptPreview> {
    let query = validate_query(query)?;
    let (prompt, stats) = orchestrator.prompt_for(tenant_id, query).await?;
    Ok(PromptPreview {
        tenant_id: tenant_id.to_string(),
        prompt,
        stats,
    })
}

pub fn print_query_answer(answer: &QueryAnswer) {
    println!("{}", answer.sql);
}

pub fn print_prompt_preview(preview: &PromptPreview) {
    println!(
        "# {} schema chunks, {} examples, {} bytes\n",
        preview.stats.schema_chunks, preview.stats.example_chunks, preview.stats.prompt_bytes
    );
    println!("{}", preview.prompt);
}
