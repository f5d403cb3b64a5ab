//! Diagnostic extraction from bundler errors and warnings.
//!
//! Rolldown reports diagnostics through types whose shape changes between
//! releases, so this module works from their formatted representation and
//! maps them onto stable, Rollup-compatible codes such as
//! `UNRESOLVED_IMPORT`.

use serde::{Deserialize, Serialize};

/// Code used for imports the bundler could not resolve.
pub const UNRESOLVED_IMPORT: &str = "UNRESOLVED_IMPORT";

/// Extracted diagnostic information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedDiagnostic {
    pub kind: DiagnosticKind,
    pub severity: DiagnosticSeverity,
    pub message: String,
    pub file: Option<String>,
    pub help: Option<String>,
}

/// Diagnostic kind (mirrors Rolldown's EventKind).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    MissingExport,
    ParseError,
    CircularDependency,
    UnresolvedEntry,
    UnresolvedImport,
    InvalidOption,
    Plugin,
    Other,
}

impl DiagnosticKind {
    /// Rollup-style code for this kind.
    pub fn code(&self) -> &'static str {
        match self {
            DiagnosticKind::MissingExport => "MISSING_EXPORT",
            DiagnosticKind::ParseError => "PARSE_ERROR",
            DiagnosticKind::CircularDependency => "CIRCULAR_DEPENDENCY",
            DiagnosticKind::UnresolvedEntry => "UNRESOLVED_ENTRY",
            DiagnosticKind::UnresolvedImport => UNRESOLVED_IMPORT,
            DiagnosticKind::InvalidOption => "INVALID_OPTION",
            DiagnosticKind::Plugin => "PLUGIN_ERROR",
            DiagnosticKind::Other => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Diagnostic severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    Error,
    Warning,
}

/// Extract diagnostics from Rolldown error types.
pub fn extract_from_rolldown_error(error: &dyn std::fmt::Debug) -> Vec<ExtractedDiagnostic> {
    let error_str = format!("{error:?}");

    let parts: Vec<&str> = error_str
        .split("BatchedBuildDiagnostic")
        .filter(|s| !s.trim().is_empty())
        .collect();

    if parts.len() > 1 {
        parts
            .iter()
            .map(|part| extract_single(part, DiagnosticSeverity::Error))
            .collect()
    } else {
        vec![extract_single(&error_str, DiagnosticSeverity::Error)]
    }
}

/// Extract a single warning diagnostic from any debuggable value.
pub fn extract_warning(warning: &dyn std::fmt::Debug) -> ExtractedDiagnostic {
    extract_single(&format!("{warning:?}"), DiagnosticSeverity::Warning)
}

/// Join diagnostic messages into a single error message.
pub fn summarize(diagnostics: &[ExtractedDiagnostic]) -> String {
    match diagnostics {
        [] => "Unknown bundler error".to_string(),
        [single] => single.message.clone(),
        many => many
            .iter()
            .map(|d| d.message.as_str())
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

/// Classify a formatted diagnostic by its content.
pub fn classify(text: &str) -> DiagnosticKind {
    if text.contains("MissingExport") || text.contains("MISSING_EXPORT") {
        DiagnosticKind::MissingExport
    } else if text.contains("UnresolvedImport")
        || text.contains(UNRESOLVED_IMPORT)
        || text.contains("Could not resolve")
        || text.contains("Cannot resolve")
    {
        DiagnosticKind::UnresolvedImport
    } else if text.contains("UnresolvedEntry") || text.contains("UNRESOLVED_ENTRY") {
        DiagnosticKind::UnresolvedEntry
    } else if text.contains("Circular") || text.contains("CIRCULAR_DEPENDENCY") {
        DiagnosticKind::CircularDependency
    } else if text.contains("Parse error") || text.contains("ParseError") {
        DiagnosticKind::ParseError
    } else if text.contains("InvalidOption") || text.contains("INVALID_OPTION") {
        DiagnosticKind::InvalidOption
    } else if text.contains("Plugin") {
        DiagnosticKind::Plugin
    } else {
        DiagnosticKind::Other
    }
}

fn extract_single(text: &str, severity: DiagnosticSeverity) -> ExtractedDiagnostic {
    let message = text.trim().to_string();
    ExtractedDiagnostic {
        kind: classify(&message),
        severity,
        file: extract_file_path(&message),
        help: extract_help_text(&message),
        message,
    }
}

/// Extract file path from error message.
fn extract_file_path(text: &str) -> Option<String> {
    for ext in &[".js", ".ts", ".jsx", ".tsx", ".mjs", ".cjs"] {
        if let Some(pos) = text.find(ext) {
            let before = &text[..pos + ext.len()];
            for indicator in &["in ", "at ", "file: ", "path: ", "\"", "'"] {
                if let Some(start) = before.rfind(indicator) {
                    let path_str = &before[start + indicator.len()..];
                    if let Some(end) = path_str.find([' ', '\n', '"', '\'', ',']) {
                        return Some(path_str[..end].trim().to_string());
                    }
                    return Some(path_str.trim().to_string());
                }
            }
        }
    }
    None
}

/// Extract help text from error message.
fn extract_help_text(text: &str) -> Option<String> {
    for indicator in &["help: ", "Help: ", "hint: ", "Hint: "] {
        if let Some(pos) = text.find(indicator) {
            let after = &text[pos + indicator.len()..];
            let help_str = after.lines().next().unwrap_or("").trim();
            if !help_str.is_empty() {
                return Some(help_str.to_string());
            }
        }
    }
    None
}
