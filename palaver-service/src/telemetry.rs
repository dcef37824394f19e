use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::{
    non_blocking,
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, time::UtcTime},
    layer::SubscriberExt,
    prelude::*,
    util::SubscriberInitExt,
    EnvFilter, Registry,
};

/// Default filter when `RUST_LOG` is not set.
const DEFAULT_LOG_FILTER: &str =
    "info,palaver_service=info,palaver_state=info,palaver_inference=info";

/// Configure logging with JSON formatting, file output, and console output
///
/// JSON lines go to a daily-rolling file `<log_directory>/<log_file_name>`,
/// human-readable lines go to stdout. The returned guard must be held until
/// the process exits, dropping it flushes the buffered file writer.
///
/// # Errors
///
/// Returns an error if:
/// - Failed to create logs directory
/// - Failed to set global default subscriber
pub fn setup_logging<P: AsRef<Path>>(log_directory: P, log_file_name: &str) -> Result<WorkerGuard> {
    let log_directory = log_directory.as_ref();
    std::fs::create_dir_all(log_directory).context("Failed to create logs directory")?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, log_directory, log_file_name);
    let (file_non_blocking, file_guard) = non_blocking(file_appender);

    let file_layer = fmt::layer()
        .json()
        .with_timer(UtcTime::rfc_3339())
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(file_non_blocking);

    let console_layer = fmt::layer()
        .pretty()
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_file(true)
        .with_span_events(FmtSpan::ENTER);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    Registry::default()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to set global default subscriber")?;

    Ok(file_guard)
}
