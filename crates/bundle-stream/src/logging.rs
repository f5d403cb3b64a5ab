//! Logging setup for bundle-stream
//!
//! This module is only available with the `logging` feature.
//!
//! The library itself only emits `tracing` events. Applications that do not
//! install their own subscriber can use these helpers.

use std::sync::Once;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Log level for bundle-stream output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    /// No logging output
    Silent,
    Error,
    /// Errors and warnings, including config warnings from the bundler
    Warn,
    #[default]
    Info,
    /// Lifecycle events: config loading, build, generation
    Debug,
    /// Per-file and loader-hook detail
    Trace,
}

impl LogLevel {
    fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Silent => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    /// Directive applying this level to bundle-stream only, leaving other
    /// crates (Rolldown, Boa) at `warn`.
    fn directive(&self) -> String {
        match self {
            LogLevel::Silent => "off".to_string(),
            level => format!("warn,bundle_stream={}", level.as_filter()),
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "silent" | "off" => Ok(LogLevel::Silent),
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(format!("Invalid log level: {}", other)),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_filter())
    }
}

fn install(filter: EnvFilter) {
    // Another subscriber may already be installed by the host application.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_target(false).without_time())
        .try_init();
}

/// Initialize logging at `level`.
///
/// Only the first call in a process takes effect. `RUST_LOG` directives are
/// still honoured on top of the level.
///
/// # Example
///
/// ```rust,no_run
/// use bundle_stream::logging::{init_logging, LogLevel};
///
/// init_logging(LogLevel::Debug);
/// ```
pub fn init_logging(level: LogLevel) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(level.directive()));
        install(filter);
    });
}

/// Initialize logging from `RUST_LOG`, falling back to [`LogLevel::Info`].
///
/// # Example
///
/// ```rust,no_run
/// use bundle_stream::logging::init_logging_from_env;
///
/// init_logging_from_env();
/// ```
pub fn init_logging_from_env() {
    init_logging(LogLevel::Info);
}
