//! Agency Ledger backend.
//!
//! Record keeping for a student-placement agency: finance sheets, bonus and
//! agent tracking, the five-stage registration pipeline and the office
//! expense tables. Everything is served as JSON over HTTP and can be
//! loaded from, or exported to, Excel workbooks.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod agents;
pub mod commands;
pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod export;
pub mod import;
pub mod records;
pub mod registration;
pub mod server;
pub mod students;

pub use error::AppError;

pub(crate) const DEFAULT_LOG_FILTER: &str = "info,agency_ledger=debug";

/// Install the console and daily-rolling file subscribers.
///
/// The returned guard flushes the file writer on drop; keep it alive for the
/// lifetime of the process.
pub fn init_logging(log_dir: &Path) -> Result<WorkerGuard, AppError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    std::fs::create_dir_all(log_dir)?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "ledger");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);
    let console_layer = fmt::layer().with_target(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| AppError::Config(format!("Failed to install logger: {e}")))?;

    Ok(guard)
}
