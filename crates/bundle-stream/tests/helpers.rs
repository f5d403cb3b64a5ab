//! Shared test utilities for bundle-stream tests
//!
//! Provides a scripted in-memory bundler so stream behaviour can be tested
//! without running a real build.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bundle_stream::{
    BuildOptions, BundleHandle, Bundler, BundlerWarning, Chunk, Error, GeneratedArtifact,
    OutputFile, Result, SourceMap,
};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::{Map, Value, json};
use tempfile::TempDir;

pub const MISSING_INPUT: &str = "You must supply options.input to rollup";

/// Records of every call a [`MockBundler`] received.
#[derive(Debug, Default)]
pub struct Calls {
    pub builds: Vec<Map<String, Value>>,
    pub generations: Vec<Map<String, Value>>,
}

/// A bundler driven entirely by its options.
///
/// - A missing `input` fails the build with Rollup's message.
/// - An `input` naming a readable file generates that file's contents
///   unchanged (used for config modules).
/// - A `delay` (milliseconds) in the merged options delays generation.
/// - A `fail` string in the merged options fails generation with it.
/// - A `warn` string makes the build report a warning with that code.
/// - `sourcemap: true` attaches a small map to every chunk.
#[derive(Debug, Clone, Default)]
pub struct MockBundler {
    chunks: Option<Vec<String>>,
    panic_on_build: bool,
    pub calls: Arc<Mutex<Calls>>,
}

impl MockBundler {
    /// Generates one chunk per invocation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Generates one chunk per name, keyed by name.
    pub fn with_chunks(names: &[&str]) -> Self {
        Self {
            chunks: Some(names.iter().map(|name| name.to_string()).collect()),
            ..Self::default()
        }
    }

    /// Panics in the build phase.
    pub fn panicking() -> Self {
        Self {
            panic_on_build: true,
            ..Self::default()
        }
    }

    pub fn builds(&self) -> Vec<Map<String, Value>> {
        self.calls.lock().builds.clone()
    }

    pub fn generations(&self) -> Vec<Map<String, Value>> {
        self.calls.lock().generations.clone()
    }
}

#[async_trait]
impl Bundler for MockBundler {
    async fn build(&self, options: &BuildOptions) -> Result<Arc<dyn BundleHandle>> {
        if self.panic_on_build {
            panic!("mock bundler exploded");
        }

        self.calls.lock().builds.push(options.values().clone());

        if options.input().is_none() {
            return Err(Error::bundler(MISSING_INPUT));
        }
        if let Some(code) = options.get("warn").and_then(Value::as_str) {
            options.warn(&BundlerWarning::new(code, "reported by mock bundler"));
        }

        Ok(Arc::new(MockHandle {
            chunks: self.chunks.clone(),
            calls: Arc::clone(&self.calls),
        }))
    }
}

#[derive(Debug)]
pub struct MockHandle {
    chunks: Option<Vec<String>>,
    calls: Arc<Mutex<Calls>>,
}

#[async_trait]
impl BundleHandle for MockHandle {
    async fn generate(&self, options: &BuildOptions) -> Result<GeneratedArtifact> {
        self.calls.lock().generations.push(options.values().clone());

        if let Some(delay) = options.get("delay").and_then(Value::as_u64) {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if let Some(message) = options.get("fail").and_then(Value::as_str) {
            return Err(Error::bundler(message));
        }

        let format = options
            .get("format")
            .and_then(Value::as_str)
            .unwrap_or("es")
            .to_string();
        let with_map = options.get("sourcemap") == Some(&json!(true));
        let chunk = |name: &str| {
            let chunk = Chunk::code(generated_code(options, name, &format));
            if with_map {
                chunk.with_map(SourceMap::new(json!({
                    "version": 3,
                    "file": name,
                    "sources": [name],
                    "mappings": "AAAA"
                })))
            } else {
                chunk
            }
        };

        match &self.chunks {
            Some(names) => {
                let mut chunks = IndexMap::new();
                for name in names {
                    chunks.insert(name.clone(), chunk(name));
                }
                Ok(GeneratedArtifact::Multi(chunks))
            }
            None => {
                let name = options.entry_path().unwrap_or("main.js").to_string();
                Ok(GeneratedArtifact::Single(chunk(&name)))
            }
        }
    }
}

fn generated_code(options: &BuildOptions, name: &str, format: &str) -> String {
    if let Some(path) = options.entry_path() {
        if let Ok(source) = std::fs::read_to_string(path) {
            return source;
        }
    }
    format!("// {format}\nexport default \"{name}\";\n")
}

/// Create a temp project directory.
pub fn project() -> TempDir {
    TempDir::new().expect("temp dir")
}

/// Write `contents` to `relative` under `dir`, creating parents.
pub fn write_file(dir: &Path, relative: &str, contents: &str) -> PathBuf {
    let path = dir.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent dirs");
    }
    std::fs::write(&path, contents).expect("write file");
    path
}

/// Paths of `files` relative to `root`.
pub fn relative_paths(files: &[OutputFile], root: &Path) -> Vec<String> {
    files
        .iter()
        .map(|file| {
            file.path()
                .strip_prefix(root)
                .unwrap_or(file.path())
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect()
}

/// Assert that a file's contents contain a substring
pub fn assert_contents_contain(file: &OutputFile, substring: &str) {
    let text = file.contents_str().expect("utf-8 contents");
    assert!(
        text.contains(substring),
        "Expected {} to contain '{}', but it didn't.\nContents (first 500 chars): {}",
        file.path().display(),
        substring,
        &text[..text.len().min(500)]
    );
}
