//! Prompt generation for the SQL assistant tasks
//!
//! Every task gets a fixed system-role instruction and a user-role payload.
//! The output-format rules live in the system role because the response
//! parser tolerates no text around the requested shape.

use crate::ai_sql::error::{AiError, AiResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Execution metrics reported by the caller, keyed by metric name
pub type QueryMetrics = BTreeMap<String, serde_json::Value>;

/// The task a prompt is built for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    GenerateQuery,
    CreateSchema,
    PopulateSchema,
    OptimizeQuery,
    AnalyzeOptimization,
    InterpretResult,
}

impl TaskKind {
    pub fn name(&self) -> &'static str {
        match self {
            TaskKind::GenerateQuery => "generate_query",
            TaskKind::CreateSchema => "create_schema",
            TaskKind::PopulateSchema => "populate_schema",
            TaskKind::OptimizeQuery => "optimize_query",
            TaskKind::AnalyzeOptimization => "analyze_optimization",
            TaskKind::InterpretResult => "interpret_result",
        }
    }

    /// Prefix put in front of upstream failures for this task
    pub fn error_prefix(&self) -> &'static str {
        match self {
            TaskKind::GenerateQuery | TaskKind::OptimizeQuery | TaskKind::InterpretResult => {
                "Error processing the query with the LLM"
            }
            TaskKind::CreateSchema | TaskKind::PopulateSchema => {
                "Error processing the database structure with the LLM"
            }
            TaskKind::AnalyzeOptimization => "Error evaluating optimization effects with the LLM",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Chat role of a prompt message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// A single role-tagged message sent to the completion backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// Before/after measurements of an optimization, as supplied by the caller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizationOutcome {
    #[serde(default)]
    pub original_metrics: QueryMetrics,
    #[serde(default)]
    pub optimized_metrics: QueryMetrics,
    pub original_query: String,
    pub optimized_query: String,
    #[serde(default)]
    pub applied_indexes: Vec<String>,
}

/// Typed inputs for one task
#[derive(Debug, Clone, Copy)]
pub enum PromptInputs<'a> {
    GenerateQuery { schema: &'a str, order: &'a str },
    CreateSchema { schema: &'a str },
    PopulateSchema { creation_sql: &'a str, max_insertions: u32 },
    OptimizeQuery { schema: &'a str, query: &'a str },
    AnalyzeOptimization(&'a OptimizationOutcome),
    InterpretResult { order: &'a str, result: &'a str },
}

impl PromptInputs<'_> {
    pub fn kind(&self) -> TaskKind {
        match self {
            PromptInputs::GenerateQuery { .. } => TaskKind::GenerateQuery,
            PromptInputs::CreateSchema { .. } => TaskKind::CreateSchema,
            PromptInputs::PopulateSchema { .. } => TaskKind::PopulateSchema,
            PromptInputs::OptimizeQuery { .. } => TaskKind::OptimizeQuery,
            PromptInputs::AnalyzeOptimization(_) => TaskKind::AnalyzeOptimization,
            PromptInputs::InterpretResult { .. } => TaskKind::InterpretResult,
        }
    }

    fn required_fields(&self) -> Vec<(&'static str, &str)> {
        match self {
            PromptInputs::GenerateQuery { schema, order } => {
                vec![("database structure", *schema), ("order", *order)]
            }
            PromptInputs::CreateSchema { schema } => vec![("database structure", *schema)],
            PromptInputs::PopulateSchema { creation_sql, .. } => {
                vec![("creation command", *creation_sql)]
            }
            PromptInputs::OptimizeQuery { schema, query } => {
                vec![("database structure", *schema), ("query", *query)]
            }
            PromptInputs::AnalyzeOptimization(outcome) => vec![
                ("original query", outcome.original_query.as_str()),
                ("optimized query", outcome.optimized_query.as_str()),
            ],
            PromptInputs::InterpretResult { order, result } => {
                vec![("order", *order), ("result", *result)]
            }
        }
    }
}

/// A fully built prompt, ready for the completion adapter
#[derive(Debug, Clone, PartialEq)]
pub struct PromptSpec {
    pub task: TaskKind,
    pub system_text: String,
    pub user_text: String,
    pub model_id: String,
}

impl PromptSpec {
    /// Messages in the order the backend expects them: system, then user
    pub fn messages(&self) -> Vec<ChatMessage> {
        vec![
            ChatMessage {
                role: Role::System,
                content: self.system_text.clone(),
            },
            ChatMessage {
                role: Role::User,
                content: self.user_text.clone(),
            },
        ]
    }
}

/// Prompt generator for the assistant tasks
#[derive(Debug, Clone)]
pub struct PromptGenerator {
    model_id: String,
}

impl PromptGenerator {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Build the prompt for a task. Never performs I/O.
    pub fn build(&self, inputs: &PromptInputs<'_>) -> AiResult<PromptSpec> {
        for (field, value) in inputs.required_fields() {
            if value.trim().is_empty() {
                return Err(AiError::InvalidInput(format!(
                    "{} requires a non-empty {}",
                    inputs.kind(),
                    field
                )));
            }
        }
        if let PromptInputs::PopulateSchema { max_insertions: 0, .. } = inputs {
            return Err(AiError::InvalidInput(
                "populate_schema requires at least one insertion per table".to_string(),
            ));
        }

        Ok(PromptSpec {
            task: inputs.kind(),
            system_text: Self::system_prompt(inputs),
            user_text: Self::user_prompt(inputs),
            model_id: self.model_id.clone(),
        })
    }

    fn system_prompt(inputs: &PromptInputs<'_>) -> String {
        match inputs {
            PromptInputs::GenerateQuery { schema, .. } => format!(
                "You are an assistant specialized in SQL. \
                 Based on the following database structure:\n\n{schema}\n\n\
                 Generate a single SQL query that fulfills exactly the user's request below. \
                 Return only the SQL query, without explanations, markdown code fences or any additional text."
            ),
            PromptInputs::CreateSchema { .. } => CREATE_SCHEMA_SYSTEM.to_string(),
            PromptInputs::PopulateSchema { max_insertions, .. } => format!(
                "You are an assistant specialized in relational databases.\n\
                 Your task is to generate sample SQL commands that populate an already structured database.\n\n\
                 Based on the table creation commands provided (CREATE TABLE), generate INSERT INTO commands \
                 that fill the tables with fictitious but coherent data.\n\
                 - Generate at most {max_insertions} insertions per table.\n\
                 - Data must match the declared types (e.g. dates as YYYY-MM-DD, fictitious names, realistic e-mails, coherent IDs).\n\
                 - Respect the relationships between tables (foreign keys must point to existing rows).\n\n\
                 Return only the INSERT INTO commands, formatted as a list of strings, for example:\n\
                 [\n\
                 \x20   \"INSERT INTO customers (id, name, email) VALUES (1, 'Francisco Silva', 'francisco@email.com');\",\n\
                 \x20   \"INSERT INTO customers (id, name, email) VALUES (2, 'Laura Lima', 'laura@email.com');\"\n\
                 ]\n\
                 Do not add explanations and do not wrap the list in markdown code fences."
            ),
            PromptInputs::OptimizeQuery { schema, .. } => format!(
                "{OPTIMIZE_SYSTEM_HEAD}\
                 ### Database Structure\n\
                 {schema}\n\
                 ---\n\
                 ### Notes\n\
                 * **Do not include any explanation in the answer**\n\
                 * Return only the array with the SQL commands and the optimized query, as in the examples above\n\
                 * Do not return any markdown code block delimiter\n"
            ),
            PromptInputs::AnalyzeOptimization(_) => ANALYZE_SYSTEM.to_string(),
            PromptInputs::InterpretResult { order, .. } => format!(
                "You are an assistant specialized in SQL. \
                 Based on the following user question: {order}\n\
                 Rewrite the result the database returned for that query as a natural-language answer. \
                 Return only the answer for the user, without explanation."
            ),
        }
    }

    fn user_prompt(inputs: &PromptInputs<'_>) -> String {
        match inputs {
            PromptInputs::GenerateQuery { order, .. } => order.to_string(),
            PromptInputs::CreateSchema { schema } => schema.to_string(),
            PromptInputs::PopulateSchema { creation_sql, .. } => creation_sql.to_string(),
            PromptInputs::OptimizeQuery { query, .. } => format!("Original query:\n{query}"),
            PromptInputs::AnalyzeOptimization(outcome) => format!(
                "Original query:\n{}\n\n\
                 Original query metrics:\n{}\n\n\
                 Optimized query:\n{}\n\n\
                 Optimized query metrics:\n{}\n\n\
                 Applied indexes:\n{}",
                outcome.original_query,
                render_metrics(&outcome.original_metrics),
                outcome.optimized_query,
                render_metrics(&outcome.optimized_metrics),
                render_indexes(&outcome.applied_indexes),
            ),
            PromptInputs::InterpretResult { result, .. } => result.to_string(),
        }
    }
}

const CREATE_SCHEMA_SYSTEM: &str = "\
- You are an assistant specialized in relational databases.
- Your task is to convert a description of a database structure into SQL DDL (Data Definition Language) commands such as CREATE TABLE.
- Choose appropriate data types, primary keys, foreign keys and constraints when they are described.
- Return **only the SQL commands needed** to create the described tables and relationships.
- Important: return them in a valid creation order, so every table is created before any table that references it.
- Do not add explanations and do not wrap the answer in markdown code fences.
- Example of the expected answer:
CREATE TABLE customers (
    id INT PRIMARY KEY,
    name VARCHAR(255),
    email VARCHAR(255) UNIQUE
);

CREATE TABLE orders (
    id INT PRIMARY KEY,
    customer_id INT,
    created_on DATE,
    FOREIGN KEY (customer_id) REFERENCES customers(id)
);";

const OPTIMIZE_SYSTEM_HEAD: &str = "\
## Assistant Specialized in SQL and Query Optimization

You are an **assistant specialized in SQL** and **query performance optimization**. You will receive:
* The **database structure**
* A **SQL query** that needs to be optimized
---
### Task
1. **Analyze** the given query against the database structure
2. **Suggest optimization commands**, such as index creation (`CREATE INDEX`), when needed
3. **Rewrite the query** more efficiently, keeping exactly the same result
---
### Answer Format
* Return **only an array of strings**, **without explanations**
* The array must contain, in this order:
  1. The **`CREATE INDEX` commands** (if any are needed)
  2. The **optimized query**, exactly once, as the last element
#### Examples
**With indexes:**
[
  \"CREATE INDEX idx_customer_id ON orders(customer_id);\",
  \"SELECT * FROM orders WHERE customer_id = 123;\"
]
**Without indexes:**
[
  \"SELECT * FROM orders WHERE name = 'name';\"
]
---
";

const ANALYZE_SYSTEM: &str = "\
You are a database performance specialist. \
Below are the execution results of two queries (original and optimized) and the indexes that were applied. \
Your task is to evaluate whether the optimizations should be kept based on those results, \
considering time, execution plans and efficiency.

State clearly and objectively whether the changes are worth keeping. \
Consider possible risks, marginal gains and the impact on other kinds of queries, and explain the decision.

Answer with a technical and objective analysis.";

fn render_metrics(metrics: &QueryMetrics) -> String {
    if metrics.is_empty() {
        return "(none reported)".to_string();
    }
    serde_json::to_string_pretty(metrics).unwrap_or_else(|_| format!("{metrics:?}"))
}

fn render_indexes(indexes: &[String]) -> String {
    if indexes.is_empty() {
        return "(none)".to_string();
    }
    indexes
        .iter()
        .map(|index| format!("- {index}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn generator() -> PromptGenerator {
        PromptGenerator::new("gemma2-9b-it")
    }

    fn outcome() -> OptimizationOutcome {
        let mut original_metrics = QueryMetrics::new();
        original_metrics.insert("execution_ms".to_string(), json!(120.5));
        original_metrics.insert("plan".to_string(), json!("Seq Scan on t"));
        let mut optimized_metrics = QueryMetrics::new();
        optimized_metrics.insert("execution_ms".to_string(), json!(3.2));

        OptimizationOutcome {
            original_metrics,
            optimized_metrics,
            original_query: "SELECT * FROM t WHERE a = 1".to_string(),
            optimized_query: "SELECT id FROM t WHERE a = 1".to_string(),
            applied_indexes: vec!["CREATE INDEX idx_a ON t(a);".to_string()],
        }
    }

    #[test]
    fn test_generate_query_prompt() {
        let spec = generator()
            .build(&PromptInputs::GenerateQuery {
                schema: "customers(id, name, age)",
                order: "list all customers older than 30",
            })
            .unwrap();

        assert_eq!(spec.task, TaskKind::GenerateQuery);
        assert_eq!(spec.model_id, "gemma2-9b-it");
        assert!(spec.system_text.contains("customers(id, name, age)"));
        assert!(spec.system_text.contains("single SQL query"));
        assert_eq!(spec.user_text, "list all customers older than 30");
    }

    #[test]
    fn test_populate_prompt_embeds_limit() {
        let spec = generator()
            .build(&PromptInputs::PopulateSchema {
                creation_sql: "CREATE TABLE t (id INT PRIMARY KEY);",
                max_insertions: 7,
            })
            .unwrap();

        assert!(spec.system_text.contains("at most 7 insertions per table"));
        assert!(spec.system_text.contains("list of strings"));
        assert_eq!(spec.user_text, "CREATE TABLE t (id INT PRIMARY KEY);");
    }

    #[test]
    fn test_optimize_prompt_layout() {
        let spec = generator()
            .build(&PromptInputs::OptimizeQuery {
                schema: "orders(id, customer_id)",
                query: "SELECT * FROM orders WHERE customer_id = 1",
            })
            .unwrap();

        assert!(spec.system_text.contains("CREATE INDEX"));
        assert!(spec.system_text.contains("orders(id, customer_id)"));
        assert!(spec.system_text.contains("markdown code block"));
        assert_eq!(
            spec.user_text,
            "Original query:\nSELECT * FROM orders WHERE customer_id = 1"
        );
    }

    #[test]
    fn test_analyze_prompt_lists_everything_in_order() {
        let outcome = outcome();
        let spec = generator()
            .build(&PromptInputs::AnalyzeOptimization(&outcome))
            .unwrap();

        let text = &spec.user_text;
        let positions: Vec<usize> = [
            "Original query:",
            "Original query metrics:",
            "Optimized query:",
            "Optimized query metrics:",
            "Applied indexes:",
        ]
        .iter()
        .map(|label| text.find(label).unwrap())
        .collect();
        assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(text.contains("\"execution_ms\": 120.5"));
        assert!(text.contains("- CREATE INDEX idx_a ON t(a);"));
    }

    #[test]
    fn test_prompts_are_deterministic() {
        let outcome = outcome();
        let inputs = PromptInputs::AnalyzeOptimization(&outcome);
        assert_eq!(generator().build(&inputs).unwrap(), generator().build(&inputs).unwrap());
    }

    #[rstest]
    #[case(PromptInputs::GenerateQuery { schema: "t(a)", order: "   " })]
    #[case(PromptInputs::CreateSchema { schema: "" })]
    #[case(PromptInputs::PopulateSchema { creation_sql: "CREATE TABLE t (a INT);", max_insertions: 0 })]
    #[case(PromptInputs::OptimizeQuery { schema: "t(a)", query: "" })]
    #[case(PromptInputs::InterpretResult { order: "how many?", result: "" })]
    fn test_rejects_empty_inputs(#[case] inputs: PromptInputs<'static>) {
        let result = generator().build(&inputs);
        assert!(matches!(result, Err(AiError::InvalidInput(_))));
    }

    #[test]
    fn test_every_prompt_has_both_roles() {
        let outcome = outcome();
        let all = [
            PromptInputs::GenerateQuery { schema: "t(a)", order: "all rows" },
            PromptInputs::CreateSchema { schema: "t with column a" },
            PromptInputs::PopulateSchema { creation_sql: "CREATE TABLE t (a INT);", max_insertions: 3 },
            PromptInputs::OptimizeQuery { schema: "t(a)", query: "SELECT * FROM t" },
            PromptInputs::AnalyzeOptimization(&outcome),
            PromptInputs::InterpretResult { order: "how many rows?", result: "[(3,)]" },
        ];

        for inputs in all {
            let spec = generator().build(&inputs).unwrap();
            let messages = spec.messages();
            assert_eq!(messages.len(), 2);
            assert_eq!(messages[0].role, Role::System);
            assert_eq!(messages[1].role, Role::User);
            assert!(!spec.system_text.trim().is_empty(), "{}", inputs.kind());
            assert!(!spec.user_text.trim().is_empty(), "{}", inputs.kind());
        }
    }
}
