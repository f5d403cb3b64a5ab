//! Rolldown-backed [`Bundler`].
//!
//! Translates the Rollup-style option map into Rolldown's `BundlerOptions`
//! and maps Rolldown's output (chunks plus emitted assets) into
//! [`GeneratedArtifact::Multi`], keyed by generated file name.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use rolldown::{
    BundleOutput, BundlerBuilder as RolldownBundlerBuilder, BundlerOptions, InputItem, IsExternal,
    OutputFormat, Platform, SourceMapType,
};
use rolldown_common::Output;
use serde_json::{Map, Value};

use crate::bundler::{BundleHandle, Bundler, BundlerWarning, Chunk, GeneratedArtifact, SourceMap};
use crate::options::BuildOptions;
use crate::{Error, Result};

/// Message used when no entry point was configured.
pub const MISSING_INPUT: &str = "You must supply options.input to rollup";

/// Bundles with Rolldown.
#[derive(Debug, Default, Clone, Copy)]
pub struct RolldownBundler;

impl RolldownBundler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Bundler for RolldownBundler {
    async fn build(&self, options: &BuildOptions) -> Result<Arc<dyn BundleHandle>> {
        // Bundle once up front so resolution and parse errors belong to the
        // build phase. Warnings are reported here and nowhere else.
        let artifact = into_artifact(bundle(options, Warnings::Report).await?)?;
        Ok(Arc::new(RolldownHandle {
            base: options.clone(),
            prebuilt: Mutex::new(Some(artifact)),
        }))
    }
}

/// Handle over a successful Rolldown build.
///
/// Each generation re-bundles with the merged output options; the output of
/// the initial build is reused once when the options are unchanged. Warnings
/// from re-bundling repeat the build's and are not forwarded again.
pub struct RolldownHandle {
    base: BuildOptions,
    prebuilt: Mutex<Option<GeneratedArtifact>>,
}

impl std::fmt::Debug for RolldownHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RolldownHandle")
            .field("base", &self.base)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl BundleHandle for RolldownHandle {
    async fn generate(&self, options: &BuildOptions) -> Result<GeneratedArtifact> {
        let reusable = if options.values() == self.base.values() {
            self.prebuilt.lock().take()
        } else {
            None
        };

        match reusable {
            Some(artifact) => Ok(artifact),
            None => into_artifact(bundle(options, Warnings::Suppress).await?),
        }
    }
}

/// Whether a bundling pass forwards Rolldown's warnings to `on_warn`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Warnings {
    Report,
    Suppress,
}

async fn bundle(options: &BuildOptions, warnings: Warnings) -> Result<BundleOutput> {
    let rolldown_options = to_rolldown_options(options.values())?;

    let mut bundler = RolldownBundlerBuilder::default()
        .with_options(rolldown_options)
        .build()
        .map_err(|e| Error::from_rolldown_batch(&e))?;

    let output = bundler
        .generate()
        .await
        .map_err(|e| Error::from_rolldown_batch(&e))?;

    if warnings == Warnings::Report {
        for warning in &output.warnings {
            options.warn(&BundlerWarning::from_debug(warning));
        }
    } else if !output.warnings.is_empty() {
        tracing::trace!("suppressed {} repeated warning(s)", output.warnings.len());
    }

    Ok(output)
}

/// Convert Rolldown output into an artifact keyed by file name.
///
/// Source map files emitted next to chunks are folded into their chunk.
fn into_artifact(output: BundleOutput) -> Result<GeneratedArtifact> {
    let map_files: Vec<String> = output
        .assets
        .iter()
        .filter_map(|item| match item {
            Output::Chunk(chunk) => chunk.sourcemap_filename.clone(),
            Output::Asset(_) => None,
        })
        .collect();

    let mut chunks = IndexMap::new();
    for item in &output.assets {
        match item {
            Output::Chunk(chunk) => {
                let mut converted = Chunk::code(chunk.code.clone());
                if let Some(map) = &chunk.map {
                    converted = converted.with_map(SourceMap::from_json(&map.to_json_string())?);
                }
                chunks.insert(chunk.filename.to_string(), converted);
            }
            Output::Asset(asset) => {
                let filename = asset.filename.to_string();
                if map_files.contains(&filename) {
                    continue;
                }
                chunks.insert(filename, Chunk::bytes(asset.source.as_bytes().to_vec()));
            }
        }
    }

    tracing::trace!("Rolldown produced {} file(s)", chunks.len());
    Ok(GeneratedArtifact::Multi(chunks))
}

/// Translate a Rollup-style option map into Rolldown options.
///
/// Unrecognized keys are ignored.
pub fn to_rolldown_options(values: &Map<String, Value>) -> Result<BundlerOptions> {
    let input = parse_input(values.get("input"))?;

    let cwd = match values.get("cwd").and_then(Value::as_str) {
        Some(cwd) => PathBuf::from(cwd),
        None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    };

    let mut options = BundlerOptions {
        input: Some(input),
        cwd: Some(cwd),
        ..Default::default()
    };

    if let Some(format) = values.get("format").and_then(Value::as_str) {
        options.format = Some(parse_format(format)?);
    }

    options.sourcemap = parse_sourcemap(values.get("sourcemap"));
    options.dir = non_empty(values.get("dir"));
    options.file = non_empty(values.get("file"));

    let external = string_list(values.get("external"));
    if !external.is_empty() {
        options.external = Some(IsExternal::from(external));
    }

    if let Some(platform) = values.get("platform").and_then(Value::as_str) {
        options.platform = Some(parse_platform(platform)?);
    }

    Ok(options)
}

fn parse_input(input: Option<&Value>) -> Result<Vec<InputItem>> {
    let items = match input {
        Some(Value::String(import)) => vec![InputItem {
            name: None,
            import: import.clone(),
        }],
        Some(Value::Array(imports)) => imports
            .iter()
            .filter_map(Value::as_str)
            .map(|import| InputItem {
                name: None,
                import: import.to_string(),
            })
            .collect(),
        Some(Value::Object(named)) => named
            .iter()
            .filter_map(|(name, import)| {
                import.as_str().map(|import| InputItem {
                    name: Some(name.clone()),
                    import: import.to_string(),
                })
            })
            .collect(),
        _ => Vec::new(),
    };

    if items.is_empty() {
        return Err(Error::bundler(MISSING_INPUT));
    }
    Ok(items)
}

fn parse_format(format: &str) -> Result<OutputFormat> {
    match format {
        "es" | "esm" | "module" => Ok(OutputFormat::Esm),
        "cjs" | "commonjs" => Ok(OutputFormat::Cjs),
        "iife" => Ok(OutputFormat::Iife),
        "umd" => Ok(OutputFormat::Umd),
        other => Err(Error::bundler(format!(
            "Invalid value \"{}\" for option \"output.format\"",
            other
        ))),
    }
}

fn parse_sourcemap(value: Option<&Value>) -> Option<SourceMapType> {
    match value? {
        Value::Bool(true) => Some(SourceMapType::File),
        Value::String(kind) => match kind.as_str() {
            "file" => Some(SourceMapType::File),
            "inline" => Some(SourceMapType::Inline),
            "hidden" => Some(SourceMapType::Hidden),
            _ => None,
        },
        _ => None,
    }
}

fn parse_platform(platform: &str) -> Result<Platform> {
    match platform {
        "node" => Ok(Platform::Node),
        "browser" => Ok(Platform::Browser),
        "neutral" => Ok(Platform::Neutral),
        other => Err(Error::bundler(format!(
            "Invalid value \"{}\" for option \"platform\"",
            other
        ))),
    }
}

fn non_empty(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(single)) => vec![single.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(String::from)
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn missing_input_uses_rollup_message() {
        let err = to_rolldown_options(&Map::new()).unwrap_err();
        assert_eq!(err.to_string(), MISSING_INPUT);

        let err = to_rolldown_options(&map(json!({ "input": [] }))).unwrap_err();
        assert_eq!(err.to_string(), MISSING_INPUT);
    }

    #[test]
    fn input_shapes() {
        let options = to_rolldown_options(&map(json!({ "input": "src/main.js" }))).unwrap();
        let input = options.input.unwrap();
        assert_eq!(input.len(), 1);
        assert_eq!(input[0].import, "src/main.js");

        let options =
            to_rolldown_options(&map(json!({ "input": { "app": "a.js", "admin": "b.js" } })))
                .unwrap();
        let input = options.input.unwrap();
        assert_eq!(input.len(), 2);
        assert!(
            input
                .iter()
                .any(|item| item.name.as_deref() == Some("app") && item.import == "a.js")
        );
    }

    #[test]
    fn output_directives_are_translated() {
        let options = to_rolldown_options(&map(json!({
            "input": "main.js",
            "format": "cjs",
            "sourcemap": true,
            "dir": "dist",
            "external": ["fs", "path"],
            "platform": "node",
            "plugins": []
        })))
        .unwrap();

        assert!(matches!(options.format, Some(OutputFormat::Cjs)));
        assert!(matches!(options.sourcemap, Some(SourceMapType::File)));
        assert_eq!(options.dir.as_deref(), Some("dist"));
        assert!(options.external.is_some());
        assert!(matches!(options.platform, Some(Platform::Node)));
    }

    #[test]
    fn unknown_format_is_rejected() {
        let err = to_rolldown_options(&map(json!({ "input": "a.js", "format": "amd2" })))
            .unwrap_err();
        assert!(err.to_string().contains("output.format"));
    }

    #[test]
    fn sourcemap_false_disables_maps() {
        assert!(parse_sourcemap(Some(&json!(false))).is_none());
        assert!(parse_sourcemap(None).is_none());
        assert!(matches!(
            parse_sourcemap(Some(&json!("inline"))),
            Some(SourceMapType::Inline)
        ));
    }
}
