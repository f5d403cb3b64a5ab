//! Caller options and their assembly into final build options.
//!
//! [`StreamOptions`] is what a caller hands to [`bundle_stream`](crate::bundle_stream).
//! It separates the adapter's own controls (bundler override, file
//! metadata, config path) from the directives forwarded to the bundler,
//! which live in [`BuildOptions`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use path_clean::PathClean;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::bundler::{Bundler, BundlerWarning, WarningHandler};
use crate::config::load_config;
use crate::eval::ModuleEvaluator;
use crate::events::EventSender;
use crate::{Error, Result};

/// Keys that control the adapter itself and are never forwarded to the bundler.
pub const RESERVED_KEYS: [&str; 3] = ["rollup", "vinyl", "config"];

/// Bundler directives for one invocation.
///
/// Holds the raw option map (`input`, `output`, `external`, ...) plus an
/// optional warning handler. Values are owned, so a `BuildOptions` handed to
/// a build is a snapshot that later edits of the caller's copy cannot reach.
#[derive(Clone, Default)]
pub struct BuildOptions {
    values: Map<String, Value>,
    on_warn: Option<WarningHandler>,
}

impl BuildOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(values: Map<String, Value>) -> Self {
        Self {
            values,
            on_warn: None,
        }
    }

    /// Set a directive, replacing any previous value.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn into_values(self) -> Map<String, Value> {
        self.values
    }

    /// Install a warning handler.
    pub fn with_on_warn(mut self, handler: WarningHandler) -> Self {
        self.on_warn = Some(handler);
        self
    }

    pub fn on_warn(&self) -> Option<&WarningHandler> {
        self.on_warn.as_ref()
    }

    /// Report a warning to the handler, or log it when none is installed.
    pub fn warn(&self, warning: &BundlerWarning) {
        match &self.on_warn {
            Some(handler) => handler(warning),
            None => tracing::warn!("{}", warning),
        }
    }

    /// The `input` directive as given.
    pub fn input(&self) -> Option<&Value> {
        self.values.get("input").filter(|v| !v.is_null())
    }

    /// The entry path used to name single-chunk output.
    ///
    /// A string input, or the only element of a one-element string array.
    pub fn entry_path(&self) -> Option<&str> {
        match self.input()? {
            Value::String(path) => Some(path),
            Value::Array(items) if items.len() == 1 => items[0].as_str(),
            _ => None,
        }
    }

    /// The effective output descriptors.
    ///
    /// A bare descriptor becomes a one-element list; a missing or null
    /// `output` becomes a single empty descriptor.
    pub fn outputs(&self) -> Vec<OutputOptions> {
        match self.values.get("output") {
            Some(Value::Array(items)) => items.iter().map(OutputOptions::from_value).collect(),
            Some(Value::Null) | None => vec![OutputOptions::default()],
            Some(other) => vec![OutputOptions::from_value(other)],
        }
    }

    /// These options with one descriptor's fields laid over them.
    pub fn with_output(&self, descriptor: &OutputOptions) -> BuildOptions {
        let mut merged = self.clone();
        for (key, value) in descriptor.values() {
            merged.values.insert(key.clone(), value.clone());
        }
        merged
    }

    /// Shallow-merge `self` over `base`; keys in `self` win.
    pub fn merged_over(self, base: Map<String, Value>) -> BuildOptions {
        let mut values = base;
        values.extend(self.values);
        BuildOptions {
            values,
            on_warn: self.on_warn,
        }
    }

    fn strip_reserved(mut self) -> Self {
        for key in RESERVED_KEYS {
            self.values.remove(key);
        }
        self
    }
}

impl fmt::Debug for BuildOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildOptions")
            .field("values", &self.values)
            .field("on_warn", &self.on_warn.as_ref().map(|_| "<handler>"))
            .finish()
    }
}

impl From<Map<String, Value>> for BuildOptions {
    fn from(values: Map<String, Value>) -> Self {
        Self::from_map(values)
    }
}

/// One output descriptor: format, destination and map flag for a single
/// generation target.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputOptions(Map<String, Value>);

impl OutputOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(values: Map<String, Value>) -> Self {
        Self(values)
    }

    /// A descriptor from a JSON value; non-objects become an empty descriptor.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(map) => Self(map.clone()),
            _ => Self::default(),
        }
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Output directory for multi-chunk builds. An empty string is unset.
    pub fn dir(&self) -> Option<&str> {
        self.0
            .get("dir")
            .and_then(Value::as_str)
            .filter(|dir| !dir.is_empty())
    }

    /// Explicit output file. An empty string is unset.
    pub fn file(&self) -> Option<&str> {
        self.0
            .get("file")
            .and_then(Value::as_str)
            .filter(|file| !file.is_empty())
    }

    pub fn format(&self) -> Option<&str> {
        self.0.get("format").and_then(Value::as_str)
    }

    /// Whether source maps are requested (`true`, `"inline"` or `"hidden"`).
    pub fn sourcemap(&self) -> bool {
        sourcemap_enabled(self.0.get("sourcemap"))
    }
}

/// Whether a `sourcemap` directive asks for maps.
pub(crate) fn sourcemap_enabled(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(enabled)) => *enabled,
        Some(Value::String(kind)) => matches!(kind.as_str(), "inline" | "hidden" | "file"),
        _ => false,
    }
}

/// Base metadata applied to every output file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    /// Directory output paths are resolved against (default: process cwd).
    #[serde(default)]
    pub cwd: Option<PathBuf>,

    /// Base directory for relative-path display (default: `cwd`).
    #[serde(default)]
    pub base: Option<PathBuf>,

    /// Free-form fields carried onto every file.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FileMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn base(mut self, base: impl Into<PathBuf>) -> Self {
        self.base = Some(base.into());
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// Options accepted by [`bundle_stream`](crate::bundle_stream).
///
/// # Examples
///
/// ```
/// use bundle_stream::{FileMetadata, StreamOptions};
/// use serde_json::json;
///
/// let options = StreamOptions::new()
///     .input("src/main.js")
///     .output(json!({ "dir": "dist", "format": "es" }))
///     .file_metadata(FileMetadata::new().base("dist"));
///
/// assert_eq!(options.build.entry_path(), Some("src/main.js"));
/// ```
#[derive(Clone, Default)]
pub struct StreamOptions {
    /// Bundler override (the `rollup` key). Defaults to the Rolldown backend.
    pub bundler: Option<Arc<dyn Bundler>>,

    /// Config module evaluator. Defaults to the Boa evaluator.
    pub evaluator: Option<Arc<dyn ModuleEvaluator>>,

    /// Base metadata for every output file (the `vinyl` key).
    pub file_metadata: FileMetadata,

    /// Path to an external configuration module (the `config` key).
    pub config: Option<PathBuf>,

    /// Directives forwarded to the bundler.
    pub build: BuildOptions,
}

impl StreamOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse options from a JSON value.
    ///
    /// A string is shorthand for `{ "config": <string> }`. The `vinyl` key is
    /// parsed into [`FileMetadata`]; `rollup` cannot carry a bundler through
    /// JSON and is dropped.
    pub fn from_value(value: Value) -> Result<Self> {
        let mut values = match value {
            Value::String(config) => return Ok(Self::new().config(config)),
            Value::Null => return Ok(Self::new()),
            Value::Object(map) => map,
            other => {
                return Err(Error::InvalidConfig(format!(
                    "options must be an object or a config path, got {}",
                    other
                )));
            }
        };

        let config = match values.remove("config") {
            Some(Value::String(path)) => Some(PathBuf::from(path)),
            Some(Value::Null) | None => None,
            Some(other) => {
                return Err(Error::InvalidConfig(format!(
                    "`config` must be a path string, got {}",
                    other
                )));
            }
        };

        let file_metadata = match values.remove("vinyl") {
            Some(Value::Null) | None => FileMetadata::default(),
            Some(vinyl) => serde_json::from_value(vinyl)
                .map_err(|e| Error::InvalidConfig(format!("invalid `vinyl` options: {}", e)))?,
        };

        let build = BuildOptions::from_map(values).strip_reserved();

        Ok(Self {
            bundler: None,
            evaluator: None,
            file_metadata,
            config,
            build,
        })
    }

    pub fn bundler(mut self, bundler: Arc<dyn Bundler>) -> Self {
        self.bundler = Some(bundler);
        self
    }

    pub fn evaluator(mut self, evaluator: Arc<dyn ModuleEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    pub fn file_metadata(mut self, metadata: FileMetadata) -> Self {
        self.file_metadata = metadata;
        self
    }

    pub fn config(mut self, path: impl Into<PathBuf>) -> Self {
        self.config = Some(path.into());
        self
    }

    /// Set a bundler directive.
    ///
    /// `config` and `vinyl` are routed to [`StreamOptions::config`] and
    /// [`StreamOptions::file_metadata`] as [`from_value`](Self::from_value)
    /// does. A value of the wrong shape for either is logged and ignored.
    /// `rollup` cannot carry a bundler and is dropped when options are
    /// assembled; use [`bundler`](Self::bundler) instead.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        let value = value.into();

        match key.as_str() {
            "config" => match value {
                Value::String(path) => self.config = Some(PathBuf::from(path)),
                Value::Null => self.config = None,
                other => tracing::warn!("ignoring `config` that is not a path string: {}", other),
            },
            "vinyl" => match value {
                Value::Null => self.file_metadata = FileMetadata::default(),
                vinyl => match serde_json::from_value(vinyl) {
                    Ok(metadata) => self.file_metadata = metadata,
                    Err(e) => tracing::warn!("ignoring invalid `vinyl` options: {}", e),
                },
            },
            _ => self.build.insert(key, value),
        }
        self
    }

    pub fn input(self, input: impl Into<Value>) -> Self {
        self.set("input", input)
    }

    /// Set a single output descriptor.
    pub fn output(self, descriptor: impl Into<Value>) -> Self {
        self.set("output", descriptor)
    }

    /// Set an ordered list of output descriptors.
    pub fn outputs<I, V>(self, descriptors: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let list: Vec<Value> = descriptors.into_iter().map(Into::into).collect();
        self.set("output", Value::Array(list))
    }

    pub fn on_warn<F>(mut self, handler: F) -> Self
    where
        F: Fn(&BundlerWarning) + Send + Sync + 'static,
    {
        self.build = self.build.with_on_warn(Arc::new(handler));
        self
    }
}

impl fmt::Debug for StreamOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamOptions")
            .field("bundler", &self.bundler)
            .field("evaluator", &self.evaluator)
            .field("file_metadata", &self.file_metadata)
            .field("config", &self.config)
            .field("build", &self.build)
            .finish()
    }
}

impl From<&str> for StreamOptions {
    fn from(config: &str) -> Self {
        Self::new().config(config)
    }
}

impl From<String> for StreamOptions {
    fn from(config: String) -> Self {
        Self::new().config(config)
    }
}

impl From<PathBuf> for StreamOptions {
    fn from(config: PathBuf) -> Self {
        Self::new().config(config)
    }
}

impl From<&Path> for StreamOptions {
    fn from(config: &Path) -> Self {
        Self::new().config(config)
    }
}

impl From<BuildOptions> for StreamOptions {
    fn from(build: BuildOptions) -> Self {
        Self {
            build,
            ..Self::default()
        }
    }
}

/// Resolve a config path against the process working directory.
pub(crate) fn resolve_config_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf().clean();
    }
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(path)
        .clean()
}

/// Produce the final build options for one invocation.
///
/// When `config` is set, the config module is loaded first and the caller's
/// directives are merged over it. Reserved keys are stripped from the result.
pub async fn assemble_options(
    config: Option<&Path>,
    build: BuildOptions,
    bundler: &dyn Bundler,
    evaluator: Option<Arc<dyn ModuleEvaluator>>,
    events: &EventSender,
) -> Result<BuildOptions> {
    let build = build.strip_reserved();

    let Some(config) = config else {
        return Ok(build);
    };

    let path = resolve_config_path(config);
    tracing::debug!("Loading config from {}", path.display());
    let loaded = load_config(&path, bundler, evaluator, events).await?;

    Ok(build.merged_over(loaded).strip_reserved())
}
