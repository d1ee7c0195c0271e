use std::fs;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::domain::config::LoggingConfig;
use crate::domain::DomainError;

const LOG_TARGET: &str = "speech_orchestrator";
const LOG_FILE_PREFIX: &str = "speech-orchestrator";

/// Filter directive for the crate at `level`, everything else at warn.
fn default_directive(level: &str) -> String {
    format!("{}={},warn", LOG_TARGET, level)
}

fn file_appender(logs_dir: &Path, max_files: u32) -> Result<RollingFileAppender, DomainError> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .max_log_files(max_files.max(1) as usize)
        .build(logs_dir)
        .map_err(|e| DomainError::Config(format!("Failed to create log file appender: {}", e)))
}

/// Initialize console logging and, when enabled, daily-rotated JSON files.
///
/// Returns a guard that must be kept alive for the duration of the application.
/// When the guard is dropped, any remaining logs are flushed. Calling this
/// more than once keeps the first subscriber.
pub fn init_logging(
    logs_dir: &Path,
    config: &LoggingConfig,
) -> Result<Option<WorkerGuard>, DomainError> {
    let level = config.level.as_str();
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(level)));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::NONE)
        .with_filter(env_filter);

    if !config.file_logging {
        let _ = tracing_subscriber::registry().with(console_layer).try_init();
        tracing::info!(level, "Logging initialized (console only)");
        return Ok(None);
    }

    fs::create_dir_all(logs_dir)?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender(logs_dir, config.max_files)?);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .json()
        .with_span_events(FmtSpan::CLOSE)
        .with_filter(EnvFilter::new(format!("{}={}", LOG_TARGET, level)));

    if tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .is_ok()
    {
        tracing::info!(
            logs_dir = ?logs_dir,
            level,
            max_files = config.max_files,
            "Logging initialized with file output"
        );
    }

    Ok(Some(guard))
}
