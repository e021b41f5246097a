use std::fs;
use std::io;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::config::{LogLevel, LoggingConfig};

#[derive(thiserror::Error, Debug)]
pub enum LoggingError {
    #[error("Failed to create log directory {path}: {source}")]
    CreateDir { path: String, source: io::Error },

    #[error("Invalid log file path: {0}")]
    InvalidPath(String),

    #[error("Failed to install log subscriber: {0}")]
    Install(#[from] tracing_subscriber::util::TryInitError),
}

/// Filter used when `RUST_LOG` is unset
pub fn default_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::new(format!("sqlpilot={level},warn"))
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over the configured level; `level_override` (the
/// `--log-level` flag) wins over the config file. Console output goes to
/// stderr so stdout carries only command results. The returned guard flushes
/// the file writer on drop and must be held until exit.
pub fn init(
    config: &LoggingConfig,
    level_override: Option<LogLevel>,
) -> Result<Option<WorkerGuard>, LoggingError> {
    let level = level_override.unwrap_or(config.level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(level));

    let console = config.console_output.then(|| {
        fmt::layer()
            .with_writer(io::stderr)
            .with_target(false)
            .boxed()
    });

    let (file, guard) = if config.file_output {
        let (writer, guard) = file_writer(&config.file_path)?;
        let layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()?;

    tracing::debug!(
        "Logging initialized (level={}, console={}, file={})",
        level,
        config.console_output,
        if config.file_output { config.file_path.as_str() } else { "off" }
    );

    Ok(guard)
}

fn file_writer(
    file_path: &str,
) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard), LoggingError> {
    let path = Path::new(file_path);
    let file_name = path
        .file_name()
        .ok_or_else(|| LoggingError::InvalidPath(file_path.to_string()))?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    fs::create_dir_all(dir).map_err(|source| LoggingError::CreateDir {
        path: dir.display().to_string(),
        source,
    })?;

    let appender = tracing_appender::rolling::never(dir, file_name);
    Ok(tracing_appender::non_blocking(appender))
}
