use crate::model::Position;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::PathBuf;

/// A non-fatal anomaly encountered during analysis.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub severity: Severity,
    pub path: PathBuf,
    pub position: Option<Position>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiagnosticKind {
    ParseError,
    UnresolvedImport,
    AmbiguousResolution,
    CyclicReexport,
    UnknownExport,
    DynamicExportList,
}

impl DiagnosticKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticKind::ParseError => "parse-error",
            DiagnosticKind::UnresolvedImport => "unresolved-import",
            DiagnosticKind::AmbiguousResolution => "ambiguous-resolution",
            DiagnosticKind::CyclicReexport => "cyclic-reexport",
            DiagnosticKind::UnknownExport => "unknown-export",
            DiagnosticKind::DynamicExportList => "dynamic-export-list",
        }
    }
}

impl std::fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warn,
    Error,
}

impl Diagnostic {
    pub fn parse_error(path: PathBuf, reason: impl std::fmt::Display) -> Self {
        Self {
            kind: DiagnosticKind::ParseError,
            severity: Severity::Error,
            path,
            position: None,
            message: format!("File skipped: {}", reason),
        }
    }

    pub fn unresolved_import(path: PathBuf, position: Position, module: &str) -> Self {
        Self {
            kind: DiagnosticKind::UnresolvedImport,
            severity: Severity::Info,
            path,
            position: Some(position),
            message: format!("Module `{}` is not part of the corpus", module),
        }
    }

    pub fn ambiguous_resolution(path: PathBuf, position: Position, written: &str, candidates: &[String]) -> Self {
        Self {
            kind: DiagnosticKind::AmbiguousResolution,
            severity: Severity::Warn,
            path,
            position: Some(position),
            message: format!(
                "`{}` resolves to {} symbols: {}",
                written,
                candidates.len(),
                candidates.join(", ")
            ),
        }
    }

    /// `cycle` lists the modules of the re-export chain, ending where it revisits.
    pub fn cyclic_reexport(path: PathBuf, position: Option<Position>, cycle: &[String]) -> Self {
        Self {
            kind: DiagnosticKind::CyclicReexport,
            severity: Severity::Warn,
            path,
            position,
            message: format!("Cyclic re-export: {}", cycle.join(" → ")),
        }
    }

    pub fn unknown_export(path: PathBuf, position: Option<Position>, name: &str) -> Self {
        Self {
            kind: DiagnosticKind::UnknownExport,
            severity: Severity::Warn,
            path,
            position,
            message: format!("`__all__` lists `{}` but the module never defines it", name),
        }
    }

    pub fn dynamic_export_list(path: PathBuf, position: Position) -> Self {
        Self {
            kind: DiagnosticKind::DynamicExportList,
            severity: Severity::Warn,
            path,
            position: Some(position),
            message: "`__all__` is not a literal list; falling back to naming convention"
                .to_string(),
        }
    }
}

impl Ord for Diagnostic {
    fn cmp(&self, other: &Self) -> Ordering {
        self.path
            .cmp(&other.path)
            .then_with(|| self.position.cmp(&other.position))
            .then_with(|| self.kind.cmp(&other.kind))
            .then_with(|| self.message.cmp(&other.message))
            .then_with(|| self.severity.cmp(&other.severity))
    }
}

impl PartialOrd for Diagnostic {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warn => write!(f, "warn"),
            Severity::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warn" | "warning" => Ok(Severity::Warn),
            "error" => Ok(Severity::Error),
            _ => Err(format!("Unknown severity: {}", s)),
        }
    }
}
