//! Trucklog - back office for a road freight operator.
//!
//! Trips, GC notes (consignment notes), payments, expenses and master data
//! live in a single SQLite file. The crate exposes them through a JSON HTTP
//! API ([`server`], [`routes`]) and a small CLI (`main.rs`), and renders
//! reports and printable documents to PDF and XLSX ([`reports`], [`export`]).

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod auth;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod diagnostics;
pub mod error;
pub mod expenses;
pub mod export;
pub mod format;
pub mod gc_notes;
pub mod input;
pub mod master;
pub mod models;
pub mod payments;
pub mod reports;
pub mod routes;
pub mod server;
pub mod trips;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Install the global subscriber: an env-filtered console layer plus a
/// daily rolling file under `log_dir`. Keep the returned guard alive until
/// exit; dropping it flushes the file writer.
pub fn init_logging(log_filter: &str, log_dir: &Path) -> AppResult<WorkerGuard> {
    let env_filter = EnvFilter::try_new(log_filter)
        .map_err(|e| AppError::validation(format!("invalid log filter {log_filter:?}: {e}")))?;

    // Prune old log files before setting up the appender
    std::fs::create_dir_all(log_dir)?;
    diagnostics::prune_old_logs(log_dir);

    let file_appender = tracing_appender::rolling::daily(log_dir, "trucklog");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);
    // Console output goes to stderr so CLI commands can print JSON on stdout.
    let console_layer = fmt::layer().with_writer(std::io::stderr).with_target(true);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| AppError::Internal(format!("logging already initialised: {e}")))?;

    Ok(guard)
}
