//! Gemini `generateContent` REST client

use super::Generator;
use crate::config::GenerationConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateResponse {
    /// Concatenated text of the first candidate, if it has any
    fn first_text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

/// Generator backed by the Gemini REST API
pub struct GeminiGenerator {
    client: Client,
    endpoint: Url,
    model: String,
    api_key: Option<String>,
    timeout_secs: u64,
}

impl GeminiGenerator {
    pub fn new(config: &GenerationConfig, api_key: Option<String>) -> Result<Self> {
        let endpoint = Url::parse(&format!(
            "{}/v1beta/models/{}:generateContent",
            config.base_url.trim_end_matches('/'),
            config.model
        ))
        .map_err(|e| Error::Config(format!("Invalid generation base URL: {}", e)))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            model: config.model.clone(),
            api_key,
            timeout_secs: config.timeout_secs,
        })
    }

    fn upstream(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::UpstreamGeneration(format!(
                "request to {} timed out after {}s",
                self.model, self.timeout_secs
            ))
        } else {
            Error::UpstreamGeneration(e.to_string())
        }
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            Error::UpstreamGeneration("no API key configured for the generation service".to_string())
        })?;

        let body = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
        };

        debug!("Sending {} byte prompt to {}", prompt.len(), self.model);

        let response = self
            .client
            .post(self.endpoint.clone())
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.upstream(e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::UpstreamGeneration(format!(
                "{} returned {}: {}",
                self.model,
                status,
                detail.trim()
            )));
        }

        let parsed: GenerateResponse = response.json().await.map_err(|e| self.upstream(e))?;
        parsed.first_text().ok_or_else(|| {
            Error::UpstreamGeneration(format!("{} returned no candidates", self.model))
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer, timeout_secs: u64) -> GenerationConfig {
        GenerationConfig {
            model: "gemini-2.5-flash".to_string(),
            api_key_env: "SQLINGO_TEST_KEY".to_string(),
            base_url: server.uri(),
            timeout_secs,
        }
    }

    const ENDPOINT: &str = "/v1beta/models/gemini-2.5-flash:generateContent";

    #[tokio::test]
    async fn test_generate_returns_candidate_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(ENDPOINT))
            .and(header("x-goog-api-key", "secret"))
            .and(body_partial_json(json!({
                "contents": [{"role": "user", "parts": [{"text": "list orders"}]}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {"role": "model", "parts": [{"text": "SELECT * "}, {"text": "FROM orders;"}]}
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let generator =
            GeminiGenerator::new(&config_for(&server, 5), Some("secret".to_string())).unwrap();
        let text = generator.generate("list orders").await.unwrap();
        assert_eq!(text, "SELECT * FROM orders;");
    }

    #[tokio::test]
    async fn test_error_status_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(ENDPOINT))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .expect(1)
            .mount(&server)
            .await;

        let generator =
            GeminiGenerator::new(&config_for(&server, 5), Some("secret".to_string())).unwrap();
        match generator.generate("q").await {
            Err(Error::UpstreamGeneration(msg)) => assert!(msg.contains("overloaded")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_candidates_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(ENDPOINT))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
            .mount(&server)
            .await;

        let generator =
            GeminiGenerator::new(&config_for(&server, 5), Some("secret".to_string())).unwrap();
        assert!(matches!(
            generator.generate("q").await,
            Err(Error::UpstreamGeneration(_))
        ));
    }

    #[tokio::test]
    async fn test_timeout_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(ENDPOINT))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(3))
                    .set_body_json(json!({"candidates": []})),
            )
            .mount(&server)
            .await;

        let generator =
            GeminiGenerator::new(&config_for(&server, 1), Some("secret".to_string())).unwrap();
        match generator.generate("q").await {
            Err(Error::UpstreamGeneration(msg)) => assert!(msg.contains("timed out")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_without_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let generator = GeminiGenerator::new(&config_for(&server, 5), None).unwrap();
        assert!(matches!(
            generator.generate("q").await,
            Err(Error::UpstreamGeneration(_))
        ));
    }
}
