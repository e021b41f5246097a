//! Error types for the SQL assistant pipeline

use crate::ai_sql::prompt::TaskKind;
use thiserror::Error;

/// Result type for assistant operations
pub type AiResult<T> = Result<T, AiError>;

/// Failures raised by a remote backend (completion, embedding or vector search)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error: {status_code} - {message}")]
    Api { status_code: u16, message: String },

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
}

impl BackendError {
    /// Check if the error is worth another attempt.
    ///
    /// Rate limiting and server-side failures are transient; other 4xx
    /// statuses (bad request, auth) and malformed bodies are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            BackendError::Network(_) | BackendError::Timeout { .. } => true,
            BackendError::Api { status_code, .. } => {
                *status_code == 429 || (500..600).contains(status_code)
            }
            BackendError::Malformed(_) => false,
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            BackendError::Malformed(e.to_string())
        } else if let Some(status) = e.status() {
            BackendError::Api {
                status_code: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            BackendError::Network(e.to_string())
        }
    }
}

/// Errors surfaced to callers of the task orchestrators
#[derive(Error, Debug)]
pub enum AiError {
    #[error("{}: {source}", task.error_prefix())]
    Upstream {
        task: TaskKind,
        #[source]
        source: BackendError,
    },

    #[error("{}: request timed out after {timeout_secs}s", task.error_prefix())]
    Timeout { task: TaskKind, timeout_secs: u64 },

    #[error("Error retrieving context: {0}")]
    ContextLookup(String),

    #[error("Model output is not a statement list: {reason}")]
    ParseAnomaly { reason: String, original: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl AiError {
    /// Wrap a backend failure for the given task
    pub fn upstream(task: TaskKind, source: BackendError) -> Self {
        match source {
            BackendError::Timeout { timeout_secs } => AiError::Timeout { task, timeout_secs },
            source => AiError::Upstream { task, source },
        }
    }

    /// Status code an HTTP front end would answer with
    pub fn status_code(&self) -> u16 {
        match self {
            AiError::InvalidInput(_) => 400,
            AiError::Timeout { .. } => 504,
            _ => 500,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            AiError::Timeout { task, timeout_secs } => format!(
                "{}: no answer within {timeout_secs}s. Try again or increase ai_sql.timeout_seconds in config.",
                task.error_prefix()
            ),
            AiError::ParseAnomaly { reason, original } => format!(
                "Model output is not a statement list ({reason}). Raw output:\n{original}"
            ),
            AiError::ConfigurationError(msg) => format!(
                "Configuration issue: {msg}. Check your config file or environment variables."
            ),
            _ => self.to_string(),
        }
    }
}
