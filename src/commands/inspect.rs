//! Inspect command implementation

use crate::chunk::chunk_schema;
use crate::config::Config;
use crate::error::Result;
use crate::reflect::{self, reflect_schema, ConnectionDescriptor};
use serde_json::Value;

/// What `inspect` dumps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InspectOutput {
    Snapshot,
    Chunks,
}

/// Reflect a source without registering it and return the snapshot or its chunks as JSON
pub async fn cmd_inspect(
    config: &Config,
    descriptor: &ConnectionDescriptor,
    output: InspectOutput,
) -> Result<Value> {
    let reflector = reflect::connect(descriptor, &config.source).await?;
    let snapshot = reflect_schema(reflector.as_ref()).await?;

    let value = match output {
        InspectOutput::Snapshot => serde_json::to_value(&snapshot)?,
        InspectOutput::Chunks => serde_json::to_value(chunk_schema(&snapshot))?,
    };
    Ok(value)
}
