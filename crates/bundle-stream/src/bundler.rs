//! The bundler seam.
//!
//! A [`Bundler`] runs the build phase once and hands back a
//! [`BundleHandle`]; the handle generates artifacts for any number of output
//! targets. Whatever shape the underlying tool returns is tagged as a
//! [`GeneratedArtifact`] at this boundary so downstream code never has to
//! guess between single- and multi-chunk results.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::diagnostics::{self, UNRESOLVED_IMPORT};
use crate::options::BuildOptions;
use crate::{Error, Result};

/// A module bundler with a Rollup-style build/generate split.
#[async_trait]
pub trait Bundler: Send + Sync + fmt::Debug {
    /// Run the build phase.
    ///
    /// Implementations validate required options (such as `input`) and
    /// reject with their own message when they are missing.
    async fn build(&self, options: &BuildOptions) -> Result<Arc<dyn BundleHandle>>;
}

/// Result of a successful build phase.
///
/// A handle is never mutated by generation and may be asked to generate any
/// number of times.
#[async_trait]
pub trait BundleHandle: Send + Sync + fmt::Debug {
    /// Generate artifacts for one output target.
    ///
    /// `options` is the full build options merged with one output descriptor.
    async fn generate(&self, options: &BuildOptions) -> Result<GeneratedArtifact>;
}

/// Artifact produced by one generation call.
#[derive(Debug, Clone, PartialEq)]
pub enum GeneratedArtifact {
    /// One chunk, named after the entry point.
    Single(Chunk),
    /// Several physical outputs keyed by generated file name, in generation order.
    Multi(IndexMap<String, Chunk>),
}

impl GeneratedArtifact {
    /// Number of files this artifact converts into.
    pub fn len(&self) -> usize {
        match self {
            GeneratedArtifact::Single(_) => 1,
            GeneratedArtifact::Multi(chunks) => chunks.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The entry chunk: the only chunk, or the first generated one.
    pub fn into_primary(self) -> Option<Chunk> {
        match self {
            GeneratedArtifact::Single(chunk) => Some(chunk),
            GeneratedArtifact::Multi(chunks) => chunks.into_iter().next().map(|(_, chunk)| chunk),
        }
    }
}

/// Generated code (or asset bytes) with an optional source map.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub contents: ChunkContents,
    pub map: Option<SourceMap>,
}

impl Chunk {
    /// A chunk of generated code.
    pub fn code(code: impl Into<String>) -> Self {
        Self {
            contents: ChunkContents::Text(code.into()),
            map: None,
        }
    }

    /// A chunk of raw bytes, used verbatim.
    pub fn bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            contents: ChunkContents::Bytes(bytes.into()),
            map: None,
        }
    }

    /// Attach a source map.
    pub fn with_map(mut self, map: SourceMap) -> Self {
        self.map = Some(map);
        self
    }
}

/// Contents of a chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkContents {
    Text(String),
    Bytes(Vec<u8>),
}

impl ChunkContents {
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            ChunkContents::Text(text) => text.into_bytes(),
            ChunkContents::Bytes(bytes) => bytes,
        }
    }

    /// Contents as text, replacing invalid UTF-8 sequences.
    pub fn to_text(&self) -> String {
        match self {
            ChunkContents::Text(text) => text.clone(),
            ChunkContents::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        }
    }
}

/// A source map (v3 JSON object).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceMap(Value);

impl SourceMap {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Parse a source map from its JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map(Self)
            .map_err(|e| Error::bundler(format!("Invalid source map: {}", e)))
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn to_json_string(&self) -> String {
        self.0.to_string()
    }

    /// The `sources` listed in the map.
    pub fn sources(&self) -> Vec<&str> {
        self.0
            .get("sources")
            .and_then(Value::as_array)
            .map(|sources| sources.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

/// A non-fatal diagnostic raised by the bundler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundlerWarning {
    /// Rollup-style code, e.g. `UNRESOLVED_IMPORT`.
    pub code: String,
    pub message: String,
}

impl BundlerWarning {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Build a warning from any debuggable bundler diagnostic.
    pub fn from_debug(warning: &dyn fmt::Debug) -> Self {
        let diag = diagnostics::extract_warning(warning);
        Self::new(diag.kind.code(), diag.message)
    }

    pub fn is_unresolved_import(&self) -> bool {
        self.code == UNRESOLVED_IMPORT
    }
}

impl fmt::Display for BundlerWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}) {}", self.code, self.message)
    }
}

/// Callback receiving bundler warnings.
pub type WarningHandler = Arc<dyn Fn(&BundlerWarning) + Send + Sync>;
