//! External configuration modules.
//!
//! A config module is a script whose export is a build-options object. It is
//! loaded by bundling it with the same bundler the invocation uses (so it may
//! be written in whatever module syntax the bundler understands), generating
//! CommonJS, and evaluating that generated code in place of the file on disk.
//!
//! Plain `.json` and `.toml` files are also accepted and parsed directly.

use std::path::Path;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::bundler::{Bundler, BundlerWarning, ChunkContents};
use crate::eval::ModuleEvaluator;
use crate::events::{EventSender, StreamEvent};
use crate::loader;
use crate::options::BuildOptions;
use crate::{Error, Result};

/// How a config file is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// Parsed as JSON.
    Json,
    /// Parsed as TOML.
    Toml,
    /// Bundled to CommonJS and evaluated.
    Module,
}

impl ConfigFormat {
    /// Detect the format from the file extension.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => ConfigFormat::Json,
            Some("toml") => ConfigFormat::Toml,
            _ => ConfigFormat::Module,
        }
    }
}

/// Load the config at `path` (already absolute) and return its exported
/// options.
///
/// Emits [`StreamEvent::Config`] with the loaded object before returning a
/// copy of it, so listeners observe exactly what the module exported.
pub async fn load_config(
    path: &Path,
    bundler: &dyn Bundler,
    evaluator: Option<Arc<dyn ModuleEvaluator>>,
    events: &EventSender,
) -> Result<Map<String, Value>> {
    if !blocking(path, |path| Ok(path.is_file())).await? {
        return Err(Error::InvalidConfig(format!(
            "Config file not found: {}",
            path.display()
        )));
    }

    let exported = match ConfigFormat::from_path(path) {
        ConfigFormat::Json => blocking(path, load_json).await?,
        ConfigFormat::Toml => blocking(path, load_toml).await?,
        ConfigFormat::Module => load_module(path, bundler, evaluator).await?,
    };

    let config = into_object(path, exported)?;
    events.emit(StreamEvent::Config(config.clone()));
    Ok(config)
}

/// Run filesystem or evaluator work on tokio's blocking pool.
async fn blocking<T, F>(path: &Path, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&Path) -> Result<T> + Send + 'static,
{
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || f(&path))
        .await
        .map_err(|e| Error::TaskFailed(e.to_string()))?
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| Error::io(format!("Failed to read config {}: {}", path.display(), e), e))
}

fn load_json(path: &Path) -> Result<Value> {
    let content = read(path)?;
    serde_json::from_str(&content)
        .map_err(|e| Error::InvalidConfig(format!("Invalid JSON in {}: {}", path.display(), e)))
}

fn load_toml(path: &Path) -> Result<Value> {
    let content = read(path)?;
    let parsed: toml::Value = toml::from_str(&content)
        .map_err(|e| Error::InvalidConfig(format!("Invalid TOML in {}: {}", path.display(), e)))?;
    serde_json::to_value(parsed).map_err(|e| {
        Error::InvalidConfig(format!(
            "TOML to JSON conversion failed for {}: {}",
            path.display(),
            e
        ))
    })
}

fn into_object(path: &Path, value: Value) -> Result<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(Error::InvalidConfig(format!(
            "{} must export an options object, got {}",
            path.display(),
            type_name(&other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Unresolved imports are expected while bundling a config (its
/// dependencies stay external); everything else is worth surfacing.
pub(crate) fn config_warning(warning: &BundlerWarning) {
    if warning.is_unresolved_import() {
        tracing::trace!("ignoring config warning: {}", warning);
        return;
    }
    tracing::warn!("{}", warning);
}

async fn load_module(
    path: &Path,
    bundler: &dyn Bundler,
    evaluator: Option<Arc<dyn ModuleEvaluator>>,
) -> Result<Value> {
    let evaluator = evaluator.ok_or_else(|| {
        Error::InvalidConfig(format!(
            "{} is a config module but no module evaluator is available; \
             enable the `eval` feature or supply an evaluator",
            path.display()
        ))
    })?;

    let options = BuildOptions::new()
        .set("input", path.display().to_string())
        .set("platform", "node")
        .with_on_warn(Arc::new(config_warning));

    let handle = bundler.build(&options).await?;
    let artifact = handle.generate(&options.clone().set("format", "cjs")).await?;
    let code = match artifact.into_primary() {
        Some(chunk) => match chunk.contents {
            ChunkContents::Text(code) => code,
            bytes @ ChunkContents::Bytes(_) => bytes.to_text(),
        },
        None => {
            return Err(Error::bundler(format!(
                "Bundling config {} produced no output",
                path.display()
            )));
        }
    };

    blocking(path, move |path| evaluate_generated(path, code, evaluator.as_ref())).await
}

/// Evaluate `code` as though it were the contents of `path`.
///
/// The evaluator reads the module, and anything it requires, through the
/// loader hook. The override lives only for the duration of this call and is
/// removed on every exit path, including panics inside the evaluator.
fn evaluate_generated(path: &Path, code: String, evaluator: &dyn ModuleEvaluator) -> Result<Value> {
    let _exclusive = loader::exclusive();
    let _override = loader::override_module(path, code);
    evaluator.evaluate(path)
}
