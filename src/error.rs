//! Custom error types for sqlingo

use thiserror::Error;

/// Main error type for sqlingo operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    /// The relational source is unreachable or rejected the credentials
    #[error("Connection error: {0}")]
    Connection(String),

    /// The connection lacks the privileges needed to introspect the schema
    #[error("Schema access error: {0}")]
    SchemaAccess(String),

    /// A query targeted a tenant (or collection) that was never registered
    #[error("Index not found: {0}")]
    IndexNotFound(String),

    /// The generation service failed or timed out
    #[error("Upstream generation error: {0}")]
    UpstreamGeneration(String),

    #[error("Invalid tenant id: {0}")]
    InvalidTenant(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Qdrant error: {0}")]
    Qdrant(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Not initialized: run 'sqlingo init' first")]
    NotInitialized,

    #[error("Already initialized at {0}")]
    AlreadyInitialized(String),

    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}

/// Result type alias for sqlingo
pub type Result<T> = std::result::Result<T, Error>;

/// Convert qdrant errors
impl From<qdrant_client::QdrantError> for Error {
    fn from(err: qdrant_client::QdrantError) -> Self {
        Error::Qdrant(err.to_string())
    }
}
