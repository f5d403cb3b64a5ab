//! Output files and artifact conversion.
//!
//! Converts a [`GeneratedArtifact`] into [`OutputFile`]s with resolved
//! absolute paths. Nothing here touches the disk.

use std::path::{Path, PathBuf};

use path_clean::PathClean;
use serde_json::{Map, Value};

use crate::bundler::{Chunk, GeneratedArtifact, SourceMap};
use crate::options::{FileMetadata, OutputOptions};

/// Fallback file name when neither a destination nor an entry name is known.
pub const DEFAULT_FILE_NAME: &str = "main.js";

/// Metadata keys that are always computed and never copied from the caller.
const COMPUTED_KEYS: [&str; 6] = ["path", "contents", "sourceMap", "source_map", "cwd", "base"];

/// One generated file, held in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputFile {
    path: PathBuf,
    contents: Vec<u8>,
    source_map: Option<SourceMap>,
    cwd: PathBuf,
    base: PathBuf,
    extra: Map<String, Value>,
}

impl OutputFile {
    /// Build a file from a chunk and the caller's base metadata.
    ///
    /// `path` is resolved against the metadata `cwd` (or the process working
    /// directory) if it is relative.
    pub fn new(path: impl AsRef<Path>, chunk: Chunk, metadata: &FileMetadata) -> Self {
        let cwd = metadata_cwd(metadata);
        let base = match &metadata.base {
            Some(base) => cwd.join(base).clean(),
            None => cwd.clone(),
        };
        let extra = metadata
            .extra
            .iter()
            .filter(|(key, _)| !COMPUTED_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Self {
            path: cwd.join(path).clean(),
            contents: chunk.contents.into_bytes(),
            source_map: chunk.map,
            cwd,
            base,
            extra,
        }
    }

    /// Absolute path of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contents(&self) -> &[u8] {
        &self.contents
    }

    /// Contents as UTF-8 text, if they are valid UTF-8.
    pub fn contents_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.contents).ok()
    }

    pub fn into_contents(self) -> Vec<u8> {
        self.contents
    }

    pub fn source_map(&self) -> Option<&SourceMap> {
        self.source_map.as_ref()
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Path relative to `base`, or the absolute path when it lies outside.
    pub fn relative(&self) -> &Path {
        self.path.strip_prefix(&self.base).unwrap_or(&self.path)
    }

    /// Final path component.
    pub fn basename(&self) -> Option<&str> {
        self.path.file_name().and_then(|name| name.to_str())
    }

    /// Free-form metadata copied from the caller.
    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }
}

fn metadata_cwd(metadata: &FileMetadata) -> PathBuf {
    let process_cwd = || std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    match &metadata.cwd {
        Some(cwd) if cwd.is_absolute() => cwd.clean(),
        Some(cwd) => process_cwd().join(cwd).clean(),
        None => process_cwd(),
    }
}

/// Resolve the (possibly relative) path of one generated file.
///
/// Precedence: `dir` joined with the chunk name, then the descriptor's
/// `file`, then the basename of the chunk name, then [`DEFAULT_FILE_NAME`].
pub fn resolve_output_path(descriptor: &OutputOptions, name: Option<&str>) -> PathBuf {
    match (descriptor.dir(), descriptor.file(), name) {
        (Some(dir), _, Some(name)) => Path::new(dir).join(name),
        (_, Some(file), _) => PathBuf::from(file),
        (_, None, Some(name)) => match Path::new(name).file_name() {
            Some(basename) => PathBuf::from(basename),
            None => PathBuf::from(DEFAULT_FILE_NAME),
        },
        _ => PathBuf::from(DEFAULT_FILE_NAME),
    }
}

/// Convert one artifact into output files.
///
/// `entry` names a single-chunk artifact; multi-chunk artifacts are named
/// by their keys and keep generation order.
pub fn convert(
    artifact: GeneratedArtifact,
    metadata: &FileMetadata,
    entry: Option<&str>,
    descriptor: &OutputOptions,
) -> Vec<OutputFile> {
    match artifact {
        GeneratedArtifact::Single(chunk) => {
            let path = resolve_output_path(descriptor, entry);
            tracing::trace!("single chunk -> {}", path.display());
            vec![OutputFile::new(path, chunk, metadata)]
        }
        GeneratedArtifact::Multi(chunks) => chunks
            .into_iter()
            .map(|(name, chunk)| {
                let path = resolve_output_path(descriptor, Some(&name));
                tracing::trace!("chunk {} -> {}", name, path.display());
                OutputFile::new(path, chunk, metadata)
            })
            .collect(),
    }
}
