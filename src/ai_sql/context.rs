//! Similar-query retrieval from a vector index
//!
//! A query is embedded once and matched against the collection of stored
//! query/result pairs. Only the two nearest neighbours are kept.

use crate::ai_sql::client::with_timeout;
use crate::ai_sql::config::AiSqlConfig;
use crate::ai_sql::error::{AiError, AiResult, BackendError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Maximum number of matches returned by a lookup
pub const CONTEXT_LIMIT: usize = 2;

fn http_client() -> AiResult<Client> {
    Client::builder().build().map_err(|e| {
        AiError::ConfigurationError(format!("Failed to create HTTP client: {}", e))
    })
}

/// A stored query/result pair close to the lookup text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextMatch {
    pub id: String,
    pub score: f32,
    #[serde(default)]
    pub payload: Map<String, Value>,
}

/// A model that converts text into a float vector
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, BackendError>;

    fn name(&self) -> &str;
}

/// Nearest-neighbour search over a named collection
#[async_trait]
pub trait VectorSearch: Send + Sync {
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ContextMatch>, BackendError>;
}

/// OpenAI-compatible `/embeddings` endpoint
pub struct HttpEmbeddingProvider {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl HttpEmbeddingProvider {
    pub fn new(base_url: &str, model: &str, api_key: Option<String>) -> AiResult<Self> {
        Ok(Self {
            client: http_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, BackendError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });

        let mut request = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(BackendError::Api {
                status_code: status.as_u16(),
                message: body,
            });
        }

        parse_embedding_response(&body)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

/// Extract `data[0].embedding` from an embeddings reply
pub fn parse_embedding_response(body: &str) -> Result<Vec<f32>, BackendError> {
    let json: Value = serde_json::from_str(body)
        .map_err(|e| BackendError::Malformed(format!("Failed to parse embedding response: {}", e)))?;

    let values = json
        .pointer("/data/0/embedding")
        .and_then(|v| v.as_array())
        .ok_or_else(|| BackendError::Malformed("No embedding vector in response".to_string()))?;

    values
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| BackendError::Malformed(format!("Non-numeric embedding value: {}", v)))
        })
        .collect()
}

/// Qdrant REST search client
pub struct QdrantSearch {
    client: Client,
    url: String,
    api_key: Option<String>,
}

impl QdrantSearch {
    pub fn new(url: &str, api_key: Option<String>) -> AiResult<Self> {
        Ok(Self {
            client: http_client()?,
            url: url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl VectorSearch for QdrantSearch {
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ContextMatch>, BackendError> {
        let body = serde_json::json!({
            "vector": vector,
            "limit": limit,
            "with_payload": true,
        });

        let mut request = self
            .client
            .post(format!("{}/collections/{}/points/search", self.url, collection))
            .json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.header("api-key", api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(BackendError::Api {
                status_code: status.as_u16(),
                message: body,
            });
        }

        parse_search_response(&body)
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    result: Vec<ScoredPoint>,
}

#[derive(Debug, Deserialize)]
struct ScoredPoint {
    id: Value,
    score: f32,
    #[serde(default)]
    payload: Option<Map<String, Value>>,
}

/// Decode the `result` array of a points search reply
pub fn parse_search_response(body: &str) -> Result<Vec<ContextMatch>, BackendError> {
    let response: SearchResponse = serde_json::from_str(body)
        .map_err(|e| BackendError::Malformed(format!("Failed to parse search response: {}", e)))?;

    Ok(response
        .result
        .into_iter()
        .map(|point| ContextMatch {
            id: match point.id {
                Value::String(id) => id,
                other => other.to_string(),
            },
            score: point.score,
            payload: point.payload.unwrap_or_default(),
        })
        .collect())
}

/// Embeds lookup text and fetches the closest stored queries
pub struct ContextRetriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorSearch>,
    collection: String,
    timeout: Duration,
}

impl ContextRetriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorSearch>,
        collection: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            embedder,
            index,
            collection: collection.into(),
            timeout,
        }
    }

    /// Build the HTTP-backed retriever described by the configuration
    pub fn from_config(config: &AiSqlConfig) -> AiResult<Self> {
        let context = &config.context;
        let embedder = HttpEmbeddingProvider::new(
            &context.embedding_base_url,
            &context.embedding_model,
            context.get_embedding_api_key(),
        )?;
        let index = QdrantSearch::new(&context.vector_url, context.get_vector_api_key())?;

        Ok(Self::new(
            Arc::new(embedder),
            Arc::new(index),
            context.collection.clone(),
            config.timeout(),
        ))
    }

    /// Fetch at most [`CONTEXT_LIMIT`] matches for `query_text`.
    ///
    /// Either the whole result list is returned or the call fails; there are
    /// no partial results.
    pub async fn retrieve_context(&self, query_text: &str) -> AiResult<Vec<ContextMatch>> {
        debug!(
            "Embedding lookup text ({} chars) with {}",
            query_text.len(),
            self.embedder.name()
        );

        let vector = with_timeout(self.timeout, self.embedder.embed(query_text))
            .await
            .map_err(|e| lookup_failed("embedding", e))?;
        if vector.is_empty() {
            return Err(AiError::ContextLookup(
                "embedding model returned an empty vector".to_string(),
            ));
        }

        let mut matches = with_timeout(
            self.timeout,
            self.index.search(&self.collection, &vector, CONTEXT_LIMIT),
        )
        .await
        .map_err(|e| lookup_failed("vector search", e))?;

        matches.truncate(CONTEXT_LIMIT);
        info!(
            "Retrieved {} context match(es) from collection '{}'",
            matches.len(),
            self.collection
        );
        Ok(matches)
    }
}

fn lookup_failed(stage: &str, error: BackendError) -> AiError {
    warn!("Context lookup failed during {}: {}", stage, error);
    AiError::ContextLookup(format!("{stage} failed: {error}"))
}
