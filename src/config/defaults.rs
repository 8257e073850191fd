//! Default values for configuration

/// Default Qdrant gRPC URL for local development (port 6334, not 6333 REST)
pub fn default_qdrant_url() -> String {
    std::env::var("QDRANT_URL").unwrap_or_else(|_| "http://127.0.0.1:6334".to_string())
}

/// Default environment variable name for Qdrant API key
pub fn default_qdrant_api_key_env() -> String {
    "".to_string()
}

/// Default vector index backend
pub fn default_store_backend() -> String {
    "qdrant".to_string()
}

/// Prefix reserved for collections that do not belong to a tenant
pub const RESERVED_COLLECTION_PREFIX: &str = "__";

/// Default name of the shared example collection
pub fn default_example_collection() -> String {
    format!("{}sql_examples", RESERVED_COLLECTION_PREFIX)
}

/// Default embedding backend kind
pub fn default_embedding_backend() -> String {
    if cfg!(feature = "local-embed") {
        "fastembed".to_string()
    } else {
        "http".to_string()
    }
}

/// Default embedding model (BAAI/bge-small-en-v1.5)
pub fn default_embedding_model() -> String {
    "BAAI/bge-small-en-v1.5".to_string()
}

/// Default embedding dimension (matches bge-small)
pub fn default_embedding_dimension() -> usize {
    384
}

/// Default batch size for embedding
pub fn default_embedding_batch_size() -> usize {
    32
}

/// Default embedding backend URL
pub fn default_embedding_backend_url() -> String {
    std::env::var("SQLINGO_EMBEDDING_BACKEND_URL")
        .unwrap_or_else(|_| "http://127.0.0.1:7997".to_string())
}

/// Default number of chunks retrieved per index
pub fn default_retrieval_top_k() -> usize {
    5
}

/// Default byte budget for each retrieved chunk set in the prompt
pub fn default_max_context_bytes() -> usize {
    6000
}

/// Default generation model
pub fn default_generation_model() -> String {
    "gemini-2.5-flash".to_string()
}

/// Default environment variable holding the generation API key
pub fn default_generation_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

/// Default generation endpoint
pub fn default_generation_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

/// Default generation timeout in seconds
pub fn default_generation_timeout() -> u64 {
    60
}

/// Default timeout for connecting to a relational source
pub fn default_source_connect_timeout() -> u64 {
    30
}

/// Default pool size used while reflecting a source
pub fn default_source_max_connections() -> u32 {
    2
}

/// Default example corpus file name (relative to the base directory)
pub fn default_examples_file_name() -> String {
    "sql_train.json".to_string()
}
