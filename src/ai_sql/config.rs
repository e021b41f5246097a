//! Configuration for the SQL assistant backends

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "gemma2-9b-it";
pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_COLLECTION: &str = "rag_queries";

/// Vector-search context configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// OpenAI-compatible embeddings endpoint
    pub embedding_base_url: String,

    /// Embedding model name
    pub embedding_model: String,

    /// Embedding API key (can also use EMBEDDING_API_KEY env var)
    pub embedding_api_key: Option<String>,

    /// Vector database URL
    pub vector_url: String,

    /// Vector database API key (can also use QDRANT_API_KEY env var)
    pub vector_api_key: Option<String>,

    /// Collection holding past query/result pairs
    pub collection: String,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            embedding_base_url: "http://localhost:8080/v1".to_string(),
            embedding_model: "all-mpnet-base-v2".to_string(),
            embedding_api_key: None,
            vector_url: "http://localhost:6333".to_string(),
            vector_api_key: None,
            collection: DEFAULT_COLLECTION.to_string(),
        }
    }
}

impl ContextConfig {
    /// Get embedding API key from config or environment
    pub fn get_embedding_api_key(&self) -> Option<String> {
        self.embedding_api_key
            .clone()
            .or_else(|| env::var("EMBEDDING_API_KEY").ok())
    }

    /// Get vector database API key from config or environment
    pub fn get_vector_api_key(&self) -> Option<String> {
        self.vector_api_key
            .clone()
            .or_else(|| env::var("QDRANT_API_KEY").ok())
    }
}

/// Configuration for the completion backend and its call policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiSqlConfig {
    /// Model identifier sent with every task
    pub model: String,

    /// OpenAI-compatible chat completions base URL
    pub base_url: String,

    /// API key (can also use GROQ_API_KEY env var)
    pub api_key: Option<String>,

    /// Sampling temperature; left to the backend default when unset
    pub temperature: Option<f32>,

    /// Per-attempt timeout in seconds
    pub timeout_seconds: u64,

    /// Extra attempts for transient failures (0 = single attempt)
    pub max_retries: u32,

    /// First backoff delay, doubled for each further retry
    pub retry_base_delay_ms: u64,

    pub context: ContextConfig,
}

impl Default for AiSqlConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            temperature: None,
            timeout_seconds: 30,
            max_retries: 2,
            retry_base_delay_ms: 500,
            context: ContextConfig::default(),
        }
    }
}

impl AiSqlConfig {
    /// Get completion API key from config or environment
    pub fn get_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| env::var("GROQ_API_KEY").ok())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.model.trim().is_empty() {
            return Err("model must not be empty".to_string());
        }

        if self.base_url.trim().is_empty() {
            return Err("base_url must not be empty".to_string());
        }

        if let Some(temperature) = self.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err("temperature must be between 0.0 and 2.0".to_string());
            }
        }

        if self.timeout_seconds == 0 {
            return Err("timeout_seconds must be greater than 0".to_string());
        }

        if self.context.collection.trim().is_empty() {
            return Err("context.collection must not be empty".to_string());
        }

        Ok(())
    }

    /// Get documentation for configuration fields
    pub fn documentation() -> Vec<(&'static str, &'static str)> {
        vec![
            ("[ai_sql]", "LLM-backed SQL generation and optimization"),
            ("model", "Model identifier (default: gemma2-9b-it)"),
            ("base_url", "Chat completions base URL (default: https://api.groq.com/openai/v1)"),
            ("api_key", "API key (or use GROQ_API_KEY env var)"),
            ("temperature", "Sampling temperature 0.0-2.0 (default: backend default)"),
            ("timeout_seconds", "Timeout per request attempt (default: 30)"),
            ("max_retries", "Retries for network errors, timeouts, 429 and 5xx (default: 2)"),
            ("retry_base_delay_ms", "First retry delay, doubled per retry (default: 500)"),
            ("", ""),
            ("[ai_sql.context]", "Similar-query retrieval"),
            ("embedding_base_url", "Embeddings base URL (default: http://localhost:8080/v1)"),
            ("embedding_model", "Embedding model (default: all-mpnet-base-v2)"),
            ("embedding_api_key", "Embedding API key (or use EMBEDDING_API_KEY env var)"),
            ("vector_url", "Vector database URL (default: http://localhost:6333)"),
            ("vector_api_key", "Vector database API key (or use QDRANT_API_KEY env var)"),
            ("collection", "Collection with past queries (default: rag_queries)"),
        ]
    }
}
