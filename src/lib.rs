//! sqlpilot: LLM-assisted SQL generation, schema design and query optimization

pub mod ai_sql;
pub mod cli;
pub mod commands;
pub mod config;
pub mod logging;

pub use ai_sql::{AiError, AiResult, SqlAssistant};
pub use config::Config;
