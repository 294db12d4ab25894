//! Logging infrastructure.
//!
//! This module provides:
//! - Per-job loggers with file + callback dual output
//! - A warning accumulator surfaced in the final job report
//! - Tail buffer for error diagnosis
//! - Integration with the `tracing` ecosystem
//!
//! # Example
//!
//! ```no_run
//! use subvid_core::logging::{JobLogger, LogConfig};
//!
//! let logger = JobLogger::new("assemble_ep01", ".logs", LogConfig::default(), None).unwrap();
//! logger.phase("Synthesis");
//! logger.progress(50);
//! logger.success("Job completed");
//! ```

mod job_logger;
mod types;

pub use job_logger::JobLogger;
pub use types::{LogCallback, LogConfig, LogLevel, MessagePrefix};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the global tracing subscriber.
///
/// Respects RUST_LOG and falls back to the provided default level.
/// Call once at application startup.
pub fn init_tracing(default_level: LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_to_filter_str(default_level)));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .init();
}

/// Convert LogLevel to filter string.
fn level_to_filter_str(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Trace => "trace",
        LogLevel::Debug => "debug",
        LogLevel::Info => "info",
        LogLevel::Warn => "warn",
        LogLevel::Error => "error",
    }
}
