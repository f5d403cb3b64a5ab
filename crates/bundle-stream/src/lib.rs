#![cfg_attr(docsrs, feature(doc_cfg))]

//! # bundle-stream
//!
//! Turns a Rollup-style bundler build into a stream of in-memory output files.
//!
//! The crate loads an optional external configuration module, merges it with
//! caller-supplied options, builds once, generates once per output target, and
//! pushes every generated chunk onto a stream as an [`OutputFile`] with a
//! resolved absolute path and buffered contents.
//!
//! The bundler itself is pluggable through the [`Bundler`] trait. With the
//! default `rolldown` feature, [`RolldownBundler`] is used when no override is
//! given.
//!
//! ## Quick Start
//!
//! ```no_run
//! use bundle_stream::{StreamOptions, bundle_stream};
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let options = StreamOptions::new()
//!     .input("./src/index.js")
//!     .outputs([
//!         json!({ "format": "es", "file": "dist/index.mjs" }),
//!         json!({ "format": "cjs", "file": "dist/index.cjs", "sourcemap": true }),
//!     ]);
//!
//! for file in bundle_stream(options).into_files().await? {
//!     println!("{} ({} bytes)", file.path().display(), file.contents().len());
//! }
//! # Ok(()) }
//! ```
//!
//! ### Config file shorthand
//!
//! A bare path is treated as `{ config: <path> }`:
//!
//! ```no_run
//! use bundle_stream::{StreamEvent, bundle_stream};
//! use futures::StreamExt;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut stream = bundle_stream("rollup.config.js");
//! let mut events = stream.take_events().expect("events not taken yet");
//!
//! while let Some(file) = stream.next().await {
//!     let file = file?;
//!     println!("{}", file.relative().display());
//! }
//!
//! while let Some(event) = events.next().await {
//!     if let StreamEvent::Config(config) = event {
//!         println!("loaded config with {} keys", config.len());
//!     }
//! }
//! # Ok(()) }
//! ```

pub mod bundler;
pub mod config;
pub mod diagnostics;
pub mod eval;
pub mod events;
pub mod file;
pub mod loader;
pub mod options;
pub mod orchestrator;
pub mod stream;

#[cfg(feature = "rolldown")]
#[cfg_attr(docsrs, doc(cfg(feature = "rolldown")))]
pub mod rolldown_backend;

// Logging utilities (optional, enabled with "logging" feature)
#[cfg(feature = "logging")]
#[cfg_attr(docsrs, doc(cfg(feature = "logging")))]
pub mod logging;

pub use bundler::{
    BundleHandle, Bundler, BundlerWarning, Chunk, ChunkContents, GeneratedArtifact, SourceMap,
    WarningHandler,
};
pub use config::{ConfigFormat, load_config};
pub use eval::ModuleEvaluator;
pub use events::{EventReceiver, EventSender, StreamEvent};
pub use file::OutputFile;
pub use options::{BuildOptions, FileMetadata, OutputOptions, StreamOptions};
pub use stream::{BundleStream, bundle_stream};

#[cfg(feature = "eval")]
#[cfg_attr(docsrs, doc(cfg(feature = "eval")))]
pub use eval::BoaEvaluator;

#[cfg(feature = "rolldown")]
#[cfg_attr(docsrs, doc(cfg(feature = "rolldown")))]
pub use rolldown_backend::RolldownBundler;

#[cfg(feature = "logging")]
#[cfg_attr(docsrs, doc(cfg(feature = "logging")))]
pub use logging::{LogLevel, init_logging, init_logging_from_env};

/// Error types for bundle-stream operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Error reported by the bundler during the build or generate phase.
    ///
    /// The message is the bundler's own, passed through unchanged.
    #[error("{message}")]
    Bundler {
        message: String,
        diagnostics: Vec<diagnostics::ExtractedDiagnostic>,
    },

    /// A config module threw while being evaluated.
    #[error("Config evaluation failed: {0}")]
    ConfigEvaluation(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error with context message.
    #[error("{message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// The background build task stopped without reporting a result.
    #[error("Build task failed: {0}")]
    TaskFailed(String),
}

/// Result type alias for bundle-stream operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a bundler error carrying only a message.
    pub fn bundler(message: impl Into<String>) -> Self {
        Error::Bundler {
            message: message.into(),
            diagnostics: Vec::new(),
        }
    }

    /// Create a bundler error from a Rolldown error.
    ///
    /// Extracts structured diagnostics from Rolldown's error types.
    pub fn from_rolldown_batch(error: &dyn std::fmt::Debug) -> Self {
        let diagnostics = diagnostics::extract_from_rolldown_error(error);
        Error::Bundler {
            message: diagnostics::summarize(&diagnostics),
            diagnostics,
        }
    }

    pub(crate) fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io {
            message: message.into(),
            source,
        }
    }
}

impl miette::Diagnostic for Error {
    fn code(&self) -> Option<Box<dyn std::fmt::Display + '_>> {
        Some(Box::new(match self {
            Error::Bundler { .. } => "BUNDLER_ERROR",
            Error::ConfigEvaluation(_) => "CONFIG_EVALUATION",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::Io { .. } => "IO_ERROR",
            Error::TaskFailed(_) => "TASK_FAILED",
        }))
    }

    fn severity(&self) -> Option<miette::Severity> {
        Some(miette::Severity::Error)
    }

    fn help(&self) -> Option<Box<dyn std::fmt::Display + '_>> {
        match self {
            Error::ConfigEvaluation(_) => Some(Box::new(
                "The config module threw while it was evaluated. Check the module for runtime errors.",
            )),
            Error::InvalidConfig(msg) => Some(Box::new(format!(
                "Check your configuration file for syntax errors.\nError: {}",
                msg
            ))),
            Error::Bundler { diagnostics, .. } if diagnostics.len() == 1 => diagnostics[0]
                .help
                .as_ref()
                .map(|h| Box::new(h.clone()) as Box<dyn std::fmt::Display>),
            Error::TaskFailed(_) => Some(Box::new(
                "The build task panicked. This is a bug in bundle-stream or in a custom Bundler.",
            )),
            _ => None,
        }
    }
}
