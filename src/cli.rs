use crate::config::LogLevel;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// sqlpilot - LLM-assisted SQL generation, schema design and query tuning
#[derive(Parser, Debug, Clone)]
#[command(name = "sqlpilot")]
#[command(version, long_about = None)]
#[command(about = "LLM-assisted SQL generation, schema design and query optimization")]
pub struct Args {
    /// Config file (default: <config dir>/sqlpilot/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Override the configured log level
    #[arg(long, global = true, value_enum)]
    pub log_level: Option<LogLevelArg>,

    /// Emit JSON instead of plain text
    #[arg(long, global = true)]
    pub json: bool,

    /// Override the configured model identifier
    #[arg(long, global = true, env = "SQLPILOT_MODEL")]
    pub model: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Arguments accepting `@path` read their value from that file.
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Translate a natural-language order into a SQL query
    Generate {
        /// Database structure (text or @file)
        #[arg(long)]
        schema: String,
        /// What the query should return
        #[arg(long)]
        order: String,
    },

    /// Turn a database description into CREATE TABLE statements
    CreateSchema {
        /// Free-form description of the tables (text or @file)
        #[arg(long)]
        schema: String,
    },

    /// Generate INSERT statements for existing CREATE TABLE statements
    Populate {
        /// CREATE TABLE statements (text or @file)
        #[arg(long)]
        ddl: String,
        /// Maximum insertions per table
        #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u32).range(1..))]
        max_insertions: u32,
    },

    /// Propose indexes and a rewritten query
    Optimize {
        /// Database structure (text or @file)
        #[arg(long)]
        schema: String,
        /// Query to optimize (text or @file)
        #[arg(long)]
        query: String,
    },

    /// Judge whether an applied optimization should be kept
    Analyze {
        /// JSON document with metrics, queries and applied indexes (@file or inline)
        #[arg(long)]
        request: String,
    },

    /// Answer a question in plain language from a query result
    Interpret {
        /// The original question
        #[arg(long)]
        order: String,
        /// Result returned by the database (text or @file)
        #[arg(long)]
        result: String,
    },

    /// Look up the stored queries closest to a text
    Context {
        #[arg(long)]
        query: String,
    },

    /// Print a commented config file template
    Config,

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Supported shells for completion generation
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum LogLevelArg {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevelArg> for LogLevel {
    fn from(level: LogLevelArg) -> Self {
        match level {
            LogLevelArg::Trace => LogLevel::Trace,
            LogLevelArg::Debug => LogLevel::Debug,
            LogLevelArg::Info => LogLevel::Info,
            LogLevelArg::Warn => LogLevel::Warn,
            LogLevelArg::Error => LogLevel::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_args_definition_is_valid() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = Args::try_parse_from([
            "sqlpilot",
            "generate",
            "--schema",
            "customers(id, name, age)",
            "--order",
            "list all customers older than 30",
            "--json",
            "--log-level",
            "debug",
        ])
        .unwrap();

        assert!(args.json);
        assert_eq!(args.log_level, Some(LogLevelArg::Debug));
        assert_eq!(
            args.command,
            Command::Generate {
                schema: "customers(id, name, age)".to_string(),
                order: "list all customers older than 30".to_string(),
            }
        );
    }

    #[rstest]
    #[case(&["sqlpilot", "populate", "--ddl", "CREATE TABLE t(a INT);", "--max-insertions", "0"])]
    #[case(&["sqlpilot", "optimize", "--query", "SELECT 1"])]
    #[case(&["sqlpilot"])]
    fn test_rejected_invocations(#[case] argv: &[&str]) {
        assert!(Args::try_parse_from(argv).is_err());
    }

    #[test]
    fn test_completions_shell() {
        let args = Args::try_parse_from(["sqlpilot", "completions", "zsh"]).unwrap();
        assert_eq!(args.command, Command::Completions { shell: Shell::Zsh });
    }

    #[test]
    fn test_populate_default_insertions() {
        let args =
            Args::try_parse_from(["sqlpilot", "populate", "--ddl", "@schema.sql"]).unwrap();
        assert_eq!(
            args.command,
            Command::Populate {
                ddl: "@schema.sql".to_string(),
                max_insertions: 10,
            }
        );
    }
}
