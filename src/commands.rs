//! Subcommand dispatch and result rendering

use crate::ai_sql::{
    AiError, AiResult, ContextMatch, ContextRetriever, OptimizationOutcome, SqlAssistant,
    TaskKind, split_optimization,
};
use crate::cli::Command;
use crate::config::Config;
use serde_json::json;
use std::fs;
use tracing::debug;

/// Result of one subcommand, before rendering
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    Text { task: Option<TaskKind>, text: String },
    Statements(Vec<String>),
    Matches(Vec<ContextMatch>),
}

impl Output {
    /// Render for stdout, as plain text or as a JSON document
    pub fn render(&self, as_json: bool) -> String {
        match (self, as_json) {
            (Output::Text { text, .. }, false) => text.clone(),
            (Output::Text { task, text }, true) => json!({
                "task": task.map(|t| t.name()),
                "output": text,
            })
            .to_string(),
            (Output::Statements(statements), false) => statements.join("\n"),
            (Output::Statements(statements), true) => {
                let report = split_optimization(statements);
                json!({
                    "statements": statements,
                    "indexes": report.indexes,
                    "query": report.query,
                })
                .to_string()
            }
            (Output::Matches(matches), false) => matches
                .iter()
                .map(|m| {
                    format!(
                        "{:.4}\t{}\t{}",
                        m.score,
                        m.id,
                        serde_json::Value::Object(m.payload.clone())
                    )
                })
                .collect::<Vec<_>>()
                .join("\n"),
            (Output::Matches(matches), true) => json!({ "matches": matches }).to_string(),
        }
    }
}

/// Read an `@path` argument from disk; other values are returned as given
pub fn resolve_arg(value: &str) -> AiResult<String> {
    match value.strip_prefix('@') {
        Some(path) => {
            debug!("Reading argument from {}", path);
            fs::read_to_string(path)
                .map_err(|e| AiError::InvalidInput(format!("cannot read {path}: {e}")))
        }
        None => Ok(value.to_string()),
    }
}

fn parse_outcome(request: &str) -> AiResult<OptimizationOutcome> {
    serde_json::from_str(request)
        .map_err(|e| AiError::InvalidInput(format!("analyze request is not valid JSON: {e}")))
}

/// Run a subcommand against the configured backends
pub async fn run(command: &Command, config: &Config) -> AiResult<Output> {
    match command {
        Command::Config => Ok(Output::Text {
            task: None,
            text: Config::template(),
        }),
        Command::Completions { .. } => Err(AiError::InvalidInput(
            "completions are written by the binary".to_string(),
        )),
        Command::Context { query } => {
            let retriever = ContextRetriever::from_config(&config.ai_sql)?;
            Ok(Output::Matches(retriever.retrieve_context(query).await?))
        }
        task => {
            let assistant = SqlAssistant::from_config(&config.ai_sql)?;
            execute(&assistant, task).await
        }
    }
}

/// Run an assistant task
pub async fn execute(assistant: &SqlAssistant, command: &Command) -> AiResult<Output> {
    let (task, text) = match command {
        Command::Generate { schema, order } => (
            TaskKind::GenerateQuery,
            assistant
                .generate_query(&resolve_arg(schema)?, order)
                .await?,
        ),
        Command::CreateSchema { schema } => (
            TaskKind::CreateSchema,
            assistant.create_schema(&resolve_arg(schema)?).await?,
        ),
        Command::Populate {
            ddl,
            max_insertions,
        } => (
            TaskKind::PopulateSchema,
            assistant
                .populate_schema(&resolve_arg(ddl)?, *max_insertions)
                .await?,
        ),
        Command::Optimize { schema, query } => {
            let statements = assistant
                .optimize_query(&resolve_arg(query)?, &resolve_arg(schema)?)
                .await?;
            return Ok(Output::Statements(statements));
        }
        Command::Analyze { request } => {
            let outcome = parse_outcome(&resolve_arg(request)?)?;
            (
                TaskKind::AnalyzeOptimization,
                assistant.analyze_optimization(&outcome).await?,
            )
        }
        Command::Interpret { order, result } => (
            TaskKind::InterpretResult,
            assistant
                .interpret_result(order, &resolve_arg(result)?)
                .await?,
        ),
        Command::Context { .. } | Command::Config | Command::Completions { .. } => {
            return Err(AiError::InvalidInput(
                "not an assistant task".to_string(),
            ));
        }
    };

    Ok(Output::Text {
        task: Some(task),
        text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai_sql::test_support::ScriptedBackend;
    use crate::ai_sql::{CompletionClient, PromptGenerator, RetryPolicy};
    use serde_json::Value;
    use std::io::Write;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    fn assistant(backend: Arc<ScriptedBackend>) -> SqlAssistant {
        SqlAssistant::new(
            PromptGenerator::new("gemma2-9b-it"),
            CompletionClient::new(backend, Duration::from_secs(5), RetryPolicy::none()),
        )
    }

    fn temp_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_resolve_arg() {
        let file = temp_file("customers(id, name, age)");
        let arg = format!("@{}", file.path().display());
        assert_eq!(resolve_arg(&arg).unwrap(), "customers(id, name, age)");
        assert_eq!(resolve_arg("plain text").unwrap(), "plain text");
        assert!(matches!(
            resolve_arg("@/definitely/not/here.sql"),
            Err(AiError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_generate_reads_schema_file() {
        let backend = Arc::new(ScriptedBackend::canned("SELECT name FROM customers;"));
        let file = temp_file("customers(id, name, age)");
        let command = Command::Generate {
            schema: format!("@{}", file.path().display()),
            order: "customer names".to_string(),
        };

        let output = execute(&assistant(backend.clone()), &command).await.unwrap();
        assert_eq!(output.render(false), "SELECT name FROM customers;");
        assert!(backend.last_messages()[0].content.contains("customers(id, name, age)"));

        let rendered: Value = serde_json::from_str(&output.render(true)).unwrap();
        assert_eq!(rendered["task"], "generate_query");
        assert_eq!(rendered["output"], "SELECT name FROM customers;");
    }

    #[tokio::test]
    async fn test_optimize_renders_report() {
        let backend = Arc::new(ScriptedBackend::canned(
            r#"["CREATE INDEX idx_a ON t(a);", "SELECT b FROM t WHERE a = 1;"]"#,
        ));
        let command = Command::Optimize {
            schema: "t(a, b)".to_string(),
            query: "SELECT * FROM t WHERE a = 1".to_string(),
        };

        let output = execute(&assistant(backend), &command).await.unwrap();
        assert_eq!(
            output.render(false),
            "CREATE INDEX idx_a ON t(a);\nSELECT b FROM t WHERE a = 1;"
        );

        let rendered: Value = serde_json::from_str(&output.render(true)).unwrap();
        assert_eq!(rendered["indexes"][0], "CREATE INDEX idx_a ON t(a);");
        assert_eq!(rendered["query"], "SELECT b FROM t WHERE a = 1;");
        assert_eq!(rendered["statements"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_analyze_request_from_json() {
        let backend = Arc::new(ScriptedBackend::canned("Keep the index."));
        let request = r#"{
            "original_metrics": {"execution_time_ms": 120.5, "plan": "Seq Scan"},
            "optimized_metrics": {"execution_time_ms": 3.2, "plan": "Index Scan"},
            "original_query": "SELECT * FROM t WHERE a = 1",
            "optimized_query": "SELECT b FROM t WHERE a = 1",
            "applied_indexes": ["CREATE INDEX idx_a ON t(a);"]
        }"#;
        let command = Command::Analyze {
            request: request.to_string(),
        };

        let output = execute(&assistant(backend.clone()), &command).await.unwrap();
        assert_eq!(output.render(false), "Keep the index.");

        let user = &backend.last_messages()[1].content;
        assert!(user.contains("Seq Scan"));
        assert!(user.contains("- CREATE INDEX idx_a ON t(a);"));
    }

    #[tokio::test]
    async fn test_analyze_rejects_bad_json() {
        let backend = Arc::new(ScriptedBackend::canned("unused"));
        let command = Command::Analyze {
            request: "{not json".to_string(),
        };

        let error = execute(&assistant(backend.clone()), &command).await.unwrap_err();
        assert!(matches!(error, AiError::InvalidInput(_)));
        assert_eq!(backend.calls(), 0);
    }

    #[test]
    fn test_render_matches() {
        let mut payload = serde_json::Map::new();
        payload.insert("query".to_string(), Value::from("SELECT 1"));
        let output = Output::Matches(vec![ContextMatch {
            id: "7".to_string(),
            score: 0.5,
            payload,
        }]);

        assert_eq!(output.render(false), "0.5000\t7\t{\"query\":\"SELECT 1\"}");
        let rendered: Value = serde_json::from_str(&output.render(true)).unwrap();
        assert_eq!(rendered["matches"][0]["id"], "7");
    }

    #[tokio::test]
    async fn test_config_template_needs_no_backend() {
        let output = run(&Command::Config, &Config::default()).await.unwrap();
        assert!(output.render(false).contains("[ai_sql]"));
    }
}
