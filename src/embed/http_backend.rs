//! HTTP embedding sidecar client

use super::Embedder;
use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

#[derive(Debug, Clone, Serialize)]
struct EmbedTextRequest<'a> {
    model: &'a str,
    inputs: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum EmbeddingResponse {
    Embeddings { embeddings: Vec<Vec<f32>> },
    Vectors { vectors: Vec<Vec<f32>> },
    Data { data: Vec<EmbeddingData> },
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl EmbeddingResponse {
    fn into_embeddings(self) -> Vec<Vec<f32>> {
        match self {
            EmbeddingResponse::Embeddings { embeddings } => embeddings,
            EmbeddingResponse::Vectors { vectors } => vectors,
            EmbeddingResponse::Data { data } => data.into_iter().map(|d| d.embedding).collect(),
        }
    }
}

/// Embedder backed by an HTTP service exposing `POST /v1/embed/text`
pub struct HttpEmbedder {
    client: Client,
    endpoint: Url,
    model_id: String,
    dimension: usize,
    retries: usize,
}

impl HttpEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let base_url = Url::parse(&config.backend_url)?;
        let endpoint = base_url
            .join("/v1/embed/text")
            .map_err(|e| Error::Config(format!("Invalid embedding backend URL: {}", e)))?;
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            client,
            endpoint,
            model_id: config.model.clone(),
            dimension: config.resolved_dimension(),
            retries: 2,
        })
    }

    fn validate_dimensions(&self, embeddings: &[Vec<f32>]) -> Result<()> {
        if let Some(mismatch) = embeddings.iter().find(|vec| vec.len() != self.dimension) {
            return Err(Error::Embedding(format!(
                "Embedding dimension mismatch for model '{}': expected {}, got {}",
                self.model_id,
                self.dimension,
                mismatch.len()
            )));
        }
        Ok(())
    }

    async fn send_with_retry(&self, request: reqwest::RequestBuilder) -> Result<EmbeddingResponse> {
        let mut last_err: Option<Error> = None;
        for attempt in 0..=self.retries {
            let req = request
                .try_clone()
                .ok_or_else(|| Error::Embedding("Failed to clone backend request".to_string()))?;
            match req.send().await {
                Ok(response) => match response.error_for_status() {
                    Ok(ok) => return Ok(ok.json::<EmbeddingResponse>().await?),
                    Err(e) => last_err = Some(Error::Embedding(e.to_string())),
                },
                Err(e) => last_err = Some(Error::Embedding(e.to_string())),
            }

            if attempt < self.retries {
                debug!("Embedding request failed, retrying (attempt {})", attempt + 1);
                tokio::time::sleep(Duration::from_millis(200 * (attempt + 1) as u64)).await;
            }
        }

        Err(last_err
            .unwrap_or_else(|| Error::Embedding("Embedding backend request failed".to_string())))
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = EmbedTextRequest {
            model: &self.model_id,
            inputs: texts,
        };
        let request = self.client.post(self.endpoint.clone()).json(&body);
        let embeddings = self.send_with_retry(request).await?.into_embeddings();
        self.validate_dimensions(&embeddings)?;
        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}
