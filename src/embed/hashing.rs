//! Deterministic feature-hashing embedder
//!
//! Maps lowercase word tokens and character trigrams into a fixed number of
//! buckets with blake3. Needs no model download, so it serves offline setups
//! and tests.

use super::{normalize_embedding, Embedder};
use crate::error::Result;
use async_trait::async_trait;

pub const HASHING_MODEL_NAME: &str = "feature-hashing";

pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn bucket(&self, feature: &str) -> (usize, f32) {
        let hash = blake3::hash(feature.as_bytes());
        let bytes = hash.as_bytes();
        let mut index = [0u8; 8];
        index.copy_from_slice(&bytes[..8]);
        let bucket = (u64::from_le_bytes(index) % self.dimension as u64) as usize;
        // One hash bit picks the sign so collisions tend to cancel
        let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
        (bucket, sign)
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let lowered = text.to_lowercase();

        for token in lowered
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|t| !t.is_empty())
        {
            let (bucket, sign) = self.bucket(token);
            vector[bucket] += 2.0 * sign;

            let chars: Vec<char> = format!("#{}#", token).chars().collect();
            for window in chars.windows(3) {
                let trigram: String = window.iter().collect();
                let (bucket, sign) = self.bucket(&trigram);
                vector[bucket] += sign;
            }
        }

        normalize_embedding(&vector)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        HASHING_MODEL_NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::cosine_similarity;

    #[test]
    fn test_deterministic_and_normalized() {
        let embedder = HashingEmbedder::new(64);
        let a = embedder.embed_text("Column 'customer_id' in table 'orders'");
        let b = embedder.embed_text("Column 'customer_id' in table 'orders'");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_related_text_scores_higher() {
        let embedder = HashingEmbedder::new(256);
        let query = embedder.embed_text("orders per customer");
        let related = embedder.embed_text("Table 'orders' has 2 columns: id, customer_id.");
        let unrelated = embedder.embed_text("View 'inventory_levels' with columns: sku, warehouse.");

        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let embedder = HashingEmbedder::new(16);
        assert!(embedder.embed_text("   ").iter().all(|v| *v == 0.0));
    }
}
