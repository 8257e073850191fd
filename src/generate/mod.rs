//! Text generation service
//!
//! A `Generator` takes one composed prompt and returns the model's raw text.
//! Every failure surfaces as `Error::UpstreamGeneration`; nothing is retried here.

mod gemini;

pub use gemini::*;

use crate::config::Config;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Trait for generation providers
#[async_trait]
pub trait Generator: Send + Sync {
    /// Send a single prompt and return the raw generated text
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Model identifier sent with each request
    fn model_name(&self) -> &str;
}

/// Create the generator configured for this installation
pub fn create_generator(config: &Config) -> Result<Arc<dyn Generator>> {
    Ok(Arc::new(GeminiGenerator::new(
        &config.generation,
        config.generation_api_key(),
    )?))
}
