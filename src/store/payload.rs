//! Payload schema for indexed chunks

use crate::chunk::{Chunk, ChunkType};
use qdrant_client::qdrant::{PointStruct, Value as QdrantValue};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

const TEXT_KEY: &str = "text";
const TYPE_KEY: &str = "type";
const CHUNK_ID_KEY: &str = "chunk_id";

/// A point ready to be inserted into a collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkPoint {
    /// Positional id, unique within the collection
    pub id: u64,
    pub vector: Vec<f32>,
    pub payload: ChunkPayload,
}

impl ChunkPoint {
    pub fn new(position: usize, vector: Vec<f32>, chunk: &Chunk) -> Self {
        Self {
            id: position as u64,
            vector,
            payload: ChunkPayload::from_chunk(position, chunk),
        }
    }

    /// Convert to qdrant-client PointStruct
    pub fn to_point_struct(self) -> PointStruct {
        PointStruct::new(self.id, self.vector, self.payload.to_qdrant_payload())
    }
}

/// Payload stored with each point: the chunk text, its type tag and filter attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkPayload {
    /// `chunk_<n>`
    pub chunk_id: String,
    pub text: String,
    pub chunk_type: String,
    pub attributes: BTreeMap<String, String>,
}

impl ChunkPayload {
    pub fn from_chunk(position: usize, chunk: &Chunk) -> Self {
        Self {
            chunk_id: format!("chunk_{}", position),
            text: chunk.text.clone(),
            chunk_type: chunk.chunk_type.as_str().to_string(),
            attributes: chunk.attributes.clone(),
        }
    }

    /// Flatten into a Qdrant payload; attributes sit beside the reserved keys
    pub fn to_qdrant_payload(self) -> HashMap<String, QdrantValue> {
        let mut map = HashMap::new();
        for (key, value) in self.attributes {
            map.insert(key, string_to_qdrant(&value));
        }
        map.insert(TEXT_KEY.to_string(), string_to_qdrant(&self.text));
        map.insert(TYPE_KEY.to_string(), string_to_qdrant(&self.chunk_type));
        map.insert(CHUNK_ID_KEY.to_string(), string_to_qdrant(&self.chunk_id));
        map
    }

    /// Rebuild from a flat JSON payload; non-string attribute values are skipped
    pub fn from_json_map(map: Map<String, Value>) -> Self {
        let mut payload = Self {
            chunk_id: String::new(),
            text: String::new(),
            chunk_type: String::new(),
            attributes: BTreeMap::new(),
        };

        for (key, value) in map {
            let Value::String(value) = value else { continue };
            match key.as_str() {
                TEXT_KEY => payload.text = value,
                TYPE_KEY => payload.chunk_type = value,
                CHUNK_ID_KEY => payload.chunk_id = value,
                _ => {
                    payload.attributes.insert(key, value);
                }
            }
        }

        payload
    }

    /// Recover the chunk; `None` if the type tag is unknown
    pub fn to_chunk(&self) -> Option<Chunk> {
        Some(Chunk {
            text: self.text.clone(),
            chunk_type: ChunkType::parse(&self.chunk_type)?,
            attributes: self.attributes.clone(),
        })
    }
}

fn string_to_qdrant(s: &str) -> QdrantValue {
    QdrantValue {
        kind: Some(qdrant_client::qdrant::value::Kind::StringValue(
            s.to_string(),
        )),
    }
}
