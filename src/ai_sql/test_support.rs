//! In-memory backends for unit tests

use crate::ai_sql::context::{ContextMatch, EmbeddingProvider, VectorSearch};
use crate::ai_sql::error::BackendError;
use crate::ai_sql::prompt::ChatMessage;
use crate::ai_sql::client::CompletionBackend;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Replays a fixed sequence of outcomes, one per call
pub struct ScriptedBackend {
    outcomes: Mutex<VecDeque<Result<String, BackendError>>>,
    calls: AtomicUsize,
    last_messages: Mutex<Vec<ChatMessage>>,
}

impl ScriptedBackend {
    pub fn new(outcomes: Vec<Result<String, BackendError>>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            calls: AtomicUsize::new(0),
            last_messages: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with the same text
    pub fn canned(text: &str) -> Self {
        Self::new(vec![Ok(text.to_string())])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_messages(&self) -> Vec<ChatMessage> {
        self.last_messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn create(&self, messages: &[ChatMessage], _model: &str) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_messages.lock().unwrap() = messages.to_vec();

        let mut outcomes = self.outcomes.lock().unwrap();
        if outcomes.len() > 1 {
            outcomes.pop_front().unwrap()
        } else {
            outcomes
                .front()
                .cloned()
                .unwrap_or_else(|| Err(BackendError::Malformed("script exhausted".to_string())))
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Never answers within a reasonable deadline
pub struct SlowBackend {
    delay: Duration,
}

impl SlowBackend {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl CompletionBackend for SlowBackend {
    async fn create(&self, _messages: &[ChatMessage], _model: &str) -> Result<String, BackendError> {
        tokio::time::sleep(self.delay).await;
        Ok("SELECT 1;".to_string())
    }

    fn name(&self) -> &str {
        "slow"
    }
}

/// Returns a fixed vector, or a fixed failure
pub struct StubEmbedder {
    result: Result<Vec<f32>, BackendError>,
}

impl StubEmbedder {
    pub fn new(dims: usize) -> Self {
        Self {
            result: Ok(vec![0.1; dims]),
        }
    }

    pub fn failing(error: BackendError) -> Self {
        Self { result: Err(error) }
    }
}

#[async_trait]
impl EmbeddingProvider for StubEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, BackendError> {
        self.result.clone()
    }

    fn name(&self) -> &str {
        "stub-embedder"
    }
}

/// Vector index that ignores `limit` and returns everything it holds
pub struct StubIndex {
    result: Result<Vec<ContextMatch>, BackendError>,
    requested_limit: AtomicUsize,
}

impl StubIndex {
    pub fn with_matches(count: usize) -> Self {
        let matches = (0..count)
            .map(|i| ContextMatch {
                id: i.to_string(),
                score: 1.0 - i as f32 * 0.1,
                payload: serde_json::Map::new(),
            })
            .collect();
        Self {
            result: Ok(matches),
            requested_limit: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: BackendError) -> Self {
        Self {
            result: Err(error),
            requested_limit: AtomicUsize::new(0),
        }
    }

    pub fn requested_limit(&self) -> usize {
        self.requested_limit.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorSearch for StubIndex {
    async fn search(
        &self,
        _collection: &str,
        _vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ContextMatch>, BackendError> {
        self.requested_limit.store(limit, Ordering::SeqCst);
        self.result.clone()
    }
}
