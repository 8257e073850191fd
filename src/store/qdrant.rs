//! Qdrant-backed vector index

use super::{ChunkPayload, ChunkPoint, SearchResult, VectorIndex};
use crate::error::{Error, Result};
use async_trait::async_trait;
use qdrant_client::qdrant::{
    CountPointsBuilder, CreateCollectionBuilder, Distance, PointId, PointStruct,
    SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use serde_json::Value;
use tracing::{debug, info};

pub struct QdrantIndex {
    client: Qdrant,
}

impl QdrantIndex {
    pub fn new(url: &str, api_key: Option<String>) -> Result<Self> {
        debug!("Connecting to Qdrant at {}", url);

        let client = Qdrant::from_url(url)
            .api_key(api_key)
            .skip_compatibility_check()
            .build()
            .map_err(|e| Error::Qdrant(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn collection_exists(&self, name: &str) -> Result<bool> {
        Ok(self.client.collection_exists(name).await?)
    }

    async fn create_collection(&self, name: &str, dimension: usize) -> Result<()> {
        info!("Creating collection {} with dimension {}", name, dimension);

        let vectors_config = VectorParamsBuilder::new(dimension as u64, Distance::Cosine);
        self.client
            .create_collection(CreateCollectionBuilder::new(name).vectors_config(vectors_config))
            .await?;
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<bool> {
        if !self.client.collection_exists(name).await? {
            return Ok(false);
        }

        info!("Deleting collection {}", name);
        self.client.delete_collection(name).await?;
        Ok(true)
    }

    async fn insert(&self, name: &str, points: Vec<ChunkPoint>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        debug!("Upserting {} points to collection {}", points.len(), name);

        let point_structs: Vec<PointStruct> =
            points.into_iter().map(|p| p.to_point_struct()).collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(name, point_structs).wait(true))
            .await?;
        Ok(())
    }

    async fn query(&self, name: &str, vector: Vec<f32>, limit: usize) -> Result<Vec<SearchResult>> {
        debug!("Searching collection {} with limit {}", name, limit);

        let response = self
            .client
            .search_points(SearchPointsBuilder::new(name, vector, limit as u64).with_payload(true))
            .await?;

        Ok(response
            .result
            .into_iter()
            .map(|p| {
                let payload = ChunkPayload::from_json_map(
                    p.payload
                        .into_iter()
                        .map(|(k, v)| (k, json_from_qdrant_value(v)))
                        .collect(),
                );
                SearchResult {
                    id: point_id_to_u64(p.id),
                    score: p.score,
                    payload,
                }
            })
            .collect())
    }

    async fn count(&self, name: &str) -> Result<u64> {
        let response = self
            .client
            .count(CountPointsBuilder::new(name).exact(true))
            .await?;
        Ok(response.result.map(|r| r.count).unwrap_or(0))
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let response = self.client.list_collections().await?;
        let mut names: Vec<String> = response.collections.into_iter().map(|c| c.name).collect();
        names.sort();
        Ok(names)
    }
}

fn point_id_to_u64(id: Option<PointId>) -> u64 {
    match id {
        Some(PointId {
            point_id_options: Some(qdrant_client::qdrant::point_id::PointIdOptions::Num(num)),
        }) => num,
        _ => 0,
    }
}

/// Convert Qdrant value to serde_json Value
fn json_from_qdrant_value(v: qdrant_client::qdrant::Value) -> Value {
    use qdrant_client::qdrant::value::Kind;

    match v.kind {
        Some(Kind::NullValue(_)) => Value::Null,
        Some(Kind::BoolValue(b)) => Value::Bool(b),
        Some(Kind::IntegerValue(i)) => Value::Number(i.into()),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(d)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Some(Kind::StringValue(s)) => Value::String(s),
        Some(Kind::ListValue(list)) => Value::Array(
            list.values
                .into_iter()
                .map(json_from_qdrant_value)
                .collect(),
        ),
        Some(Kind::StructValue(s)) => Value::Object(
            s.fields
                .into_iter()
                .map(|(k, v)| (k, json_from_qdrant_value(v)))
                .collect(),
        ),
        None => Value::Null,
    }
}
