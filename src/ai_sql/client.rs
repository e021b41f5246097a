//! Completion backend client and the adapter that owns the call policy

use crate::ai_sql::config::AiSqlConfig;
use crate::ai_sql::error::{AiError, AiResult, BackendError};
use crate::ai_sql::prompt::{ChatMessage, PromptSpec};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Raw text of one completion, owned by the caller that requested it
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionResult {
    pub raw_text: String,
}

/// Trait for completion backends
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Send role-tagged messages and return the first choice's content
    async fn create(&self, messages: &[ChatMessage], model: &str) -> Result<String, BackendError>;

    /// Get backend name
    fn name(&self) -> &str;
}

/// OpenAI-compatible `/chat/completions` backend (Groq by default)
pub struct ChatCompletionsBackend {
    client: Client,
    api_key: String,
    base_url: String,
    temperature: Option<f32>,
}

impl ChatCompletionsBackend {
    pub fn new(api_key: String, base_url: &str, temperature: Option<f32>) -> AiResult<Self> {
        let client = Client::builder().build().map_err(|e| {
            AiError::ConfigurationError(format!("Failed to create HTTP client: {}", e))
        })?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            temperature,
        })
    }
}

#[async_trait]
impl CompletionBackend for ChatCompletionsBackend {
    async fn create(&self, messages: &[ChatMessage], model: &str) -> Result<String, BackendError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request_body = ChatRequest {
            model,
            messages,
            temperature: self.temperature,
        };

        debug!("Calling chat completions with model: {}", model);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| BackendError::Network(format!("Request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BackendError::Network(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(BackendError::Api {
                status_code: status.as_u16(),
                message: body,
            });
        }

        parse_chat_response(&body)
    }

    fn name(&self) -> &str {
        "chat-completions"
    }
}

/// Extract `choices[0].message.content` from a chat completions reply
pub fn parse_chat_response(body: &str) -> Result<String, BackendError> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| BackendError::Malformed(format!("Failed to parse API response: {}", e)))?;

    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| BackendError::Malformed("No content in response".to_string()))
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Bounded exponential backoff for transient failures
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// One attempt, no retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (0-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(retry))
    }
}

/// Run a backend future under a deadline
pub(crate) async fn with_timeout<T, F>(limit: Duration, future: F) -> Result<T, BackendError>
where
    F: Future<Output = Result<T, BackendError>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => Err(BackendError::Timeout {
            timeout_secs: limit.as_secs_f64().ceil() as u64,
        }),
    }
}

/// Sends a prompt to the completion backend and returns one completion
#[derive(Clone)]
pub struct CompletionClient {
    backend: Arc<dyn CompletionBackend>,
    timeout: Duration,
    retry: RetryPolicy,
}

impl CompletionClient {
    pub fn new(backend: Arc<dyn CompletionBackend>, timeout: Duration, retry: RetryPolicy) -> Self {
        Self {
            backend,
            timeout,
            retry,
        }
    }

    /// Create the client described by the configuration
    pub fn from_config(config: &AiSqlConfig) -> AiResult<Self> {
        let api_key = config.get_api_key().ok_or_else(|| {
            AiError::ConfigurationError(
                "API key not configured. Set GROQ_API_KEY environment variable or add api_key to the [ai_sql] section.".to_string(),
            )
        })?;

        let backend = ChatCompletionsBackend::new(api_key, &config.base_url, config.temperature)?;

        Ok(Self::new(
            Arc::new(backend),
            config.timeout(),
            RetryPolicy {
                max_retries: config.max_retries,
                base_delay: config.retry_base_delay(),
            },
        ))
    }

    /// Send the prompt and wait for the completion.
    ///
    /// Transient failures are retried per the retry policy; anything else,
    /// or the last transient failure, is returned as an upstream error for
    /// the prompt's task.
    pub async fn complete(&self, prompt: &PromptSpec) -> AiResult<CompletionResult> {
        let messages = prompt.messages();
        debug!(
            "[{}] system prompt length: {} chars, user prompt length: {} chars",
            prompt.task,
            prompt.system_text.len(),
            prompt.user_text.len()
        );
        trace!("[{}] user prompt: {}", prompt.task, prompt.user_text);

        let mut retry = 0;
        loop {
            let outcome = with_timeout(
                self.timeout,
                self.backend.create(&messages, &prompt.model_id),
            )
            .await;

            match outcome {
                Ok(raw_text) => {
                    info!(
                        "[{}] completion received from {} ({} chars)",
                        prompt.task,
                        self.backend.name(),
                        raw_text.len()
                    );
                    return Ok(CompletionResult { raw_text });
                }
                Err(e) if e.is_retryable() && retry < self.retry.max_retries => {
                    let delay = self.retry.delay_for(retry);
                    retry += 1;
                    warn!(
                        "[{}] attempt {} failed: {}. Retrying in {:?}",
                        prompt.task, retry, e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    warn!("[{}] completion failed: {}", prompt.task, e);
                    return Err(AiError::upstream(prompt.task, e));
                }
            }
        }
    }
}
