//! LLM-backed SQL assistance
//!
//! Each task builds a prompt, sends it through the completion adapter and
//! normalizes the reply. Only the optimize task parses the reply further,
//! into an ordered list of statements.
//!
//! # Usage
//!
//! ```rust,no_run
//! use sqlpilot::ai_sql::{AiSqlConfig, SqlAssistant};
//!
//! # async fn run() -> sqlpilot::ai_sql::AiResult<()> {
//! let assistant = SqlAssistant::from_config(&AiSqlConfig::default())?;
//! let sql = assistant
//!     .generate_query("customers(id, name, age)", "list all customers older than 30")
//!     .await?;
//! println!("{sql}");
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod normalize;
pub mod prompt;
pub mod statement_list;

#[cfg(test)]
pub(crate) mod test_support;

pub use client::{
    ChatCompletionsBackend, CompletionBackend, CompletionClient, CompletionResult, RetryPolicy,
};
pub use config::{AiSqlConfig, ContextConfig};
pub use context::{
    CONTEXT_LIMIT, ContextMatch, ContextRetriever, EmbeddingProvider, HttpEmbeddingProvider,
    QdrantSearch, VectorSearch,
};
pub use error::{AiError, AiResult, BackendError};
pub use normalize::{NormalizedText, normalize};
pub use prompt::{
    ChatMessage, OptimizationOutcome, PromptGenerator, PromptInputs, PromptSpec, QueryMetrics,
    Role, TaskKind,
};
pub use statement_list::{StatementListParse, parse_statement_list};

use serde::Serialize;
use tracing::{debug, info, trace};

/// Optimize result split into index statements and the rewritten query
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OptimizationReport {
    pub indexes: Vec<String>,
    pub query: Option<String>,
}

/// Separate `CREATE [UNIQUE] INDEX` statements from the rewritten query.
///
/// The query is the last statement that is not an index creation.
pub fn split_optimization(statements: &[String]) -> OptimizationReport {
    let mut report = OptimizationReport::default();
    for statement in statements {
        if is_index_creation(statement) {
            report.indexes.push(statement.clone());
        } else {
            report.query = Some(statement.clone());
        }
    }
    report
}

fn is_index_creation(statement: &str) -> bool {
    let words: Vec<String> = statement
        .split_whitespace()
        .take(3)
        .map(|w| w.to_ascii_uppercase())
        .collect();
    match words.as_slice() {
        [create, index, ..] if create == "CREATE" && index == "INDEX" => true,
        [create, unique, index] => create == "CREATE" && unique == "UNIQUE" && index == "INDEX",
        _ => false,
    }
}

/// Task orchestrators for the SQL assistant
pub struct SqlAssistant {
    prompts: PromptGenerator,
    client: CompletionClient,
}

impl SqlAssistant {
    pub fn new(prompts: PromptGenerator, client: CompletionClient) -> Self {
        Self { prompts, client }
    }

    /// Create the assistant described by the configuration
    pub fn from_config(config: &AiSqlConfig) -> AiResult<Self> {
        config.validate().map_err(AiError::ConfigurationError)?;
        let client = CompletionClient::from_config(config)?;
        Ok(Self::new(PromptGenerator::new(config.model.clone()), client))
    }

    pub fn model_id(&self) -> &str {
        self.prompts.model_id()
    }

    /// Translate a natural-language order into one SQL query
    pub async fn generate_query(&self, schema: &str, order: &str) -> AiResult<String> {
        info!("Generating query for order ({} chars)", order.len());
        trace!("Order: {}", order);
        let text = self
            .run(PromptInputs::GenerateQuery { schema, order })
            .await?;
        Ok(text.into_string())
    }

    /// Turn a free-form database description into DDL
    pub async fn create_schema(&self, schema: &str) -> AiResult<String> {
        info!("Generating schema DDL ({} chars of description)", schema.len());
        let text = self.run(PromptInputs::CreateSchema { schema }).await?;
        Ok(text.into_string())
    }

    /// Generate INSERT statements for the tables in `creation_sql`
    pub async fn populate_schema(&self, creation_sql: &str, max_insertions: u32) -> AiResult<String> {
        info!("Generating up to {} insertion(s) per table", max_insertions);
        let text = self
            .run(PromptInputs::PopulateSchema {
                creation_sql,
                max_insertions,
            })
            .await?;
        Ok(text.into_string())
    }

    /// Propose indexes and a rewritten query.
    ///
    /// Returns the statements in the order they must be run: index creation
    /// first, the rewritten query last. A reply that is not a literal list of
    /// strings is reported as [`AiError::ParseAnomaly`].
    pub async fn optimize_query(&self, query: &str, schema: &str) -> AiResult<Vec<String>> {
        info!("Optimizing query ({} chars)", query.len());
        trace!("Query to optimize: {}", query);
        let text = self.run(PromptInputs::OptimizeQuery { schema, query }).await?;

        match parse_statement_list(&text) {
            StatementListParse::Parsed(statements) => {
                debug!("Optimization proposes {} statement(s)", statements.len());
                Ok(statements)
            }
            StatementListParse::Failed { reason, original } => {
                Err(AiError::ParseAnomaly { reason, original })
            }
        }
    }

    /// Explain the measured effect of an applied optimization
    pub async fn analyze_optimization(&self, outcome: &OptimizationOutcome) -> AiResult<String> {
        info!(
            "Analyzing optimization with {} applied index(es)",
            outcome.applied_indexes.len()
        );
        let text = self.run(PromptInputs::AnalyzeOptimization(outcome)).await?;
        Ok(text.into_string())
    }

    /// Answer the original order in plain language from a query result
    pub async fn interpret_result(&self, order: &str, result: &str) -> AiResult<String> {
        info!(
            "Interpreting result ({} chars) for order ({} chars)",
            result.len(),
            order.len()
        );
        trace!("Order: {}", order);
        let text = self
            .run(PromptInputs::InterpretResult { order, result })
            .await?;
        Ok(text.into_string())
    }

    async fn run(&self, inputs: PromptInputs<'_>) -> AiResult<NormalizedText> {
        let prompt = self.prompts.build(&inputs)?;
        let completion = self.client.complete(&prompt).await?;
        let text = normalize(&completion.raw_text);
        debug!(
            "[{}] normalized reply: {} -> {} chars",
            prompt.task,
            completion.raw_text.len(),
            text.len()
        );
        Ok(text)
    }
}
