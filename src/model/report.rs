use crate::model::{Confidence, Diagnostic, SymbolKind, UsageKind};
use serde::Serialize;
use std::collections::BTreeMap;

/// The complete, deterministic result of one analysis run.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub target: String,
    pub project_root: String,
    pub modules: Vec<TargetModule>,
    /// Keyed by fully-qualified symbol name.
    pub symbols: BTreeMap<String, SymbolReport>,
    pub unattributed: Vec<UnattributedSite>,
    pub diagnostics: Vec<Diagnostic>,
    pub stats: ReportStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct TargetModule {
    pub name: String,
    pub path: String,
    /// Corpus files importing this module.
    pub importers: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SymbolReport {
    pub name: String,
    pub module: String,
    pub kind: SymbolKind,
    pub public: bool,
    pub line: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docstring: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reexport_of: Option<String>,
    pub used: bool,
    pub counts: BTreeMap<UsageKind, usize>,
    pub sites: Vec<UsageSite>,
}

impl SymbolReport {
    pub fn usage_count(&self) -> usize {
        self.sites.len()
    }

    /// Files with at least one usage site, in order.
    pub fn importers(&self) -> Vec<&str> {
        let mut files: Vec<&str> = self.sites.iter().map(|s| s.file.as_str()).collect();
        files.dedup();
        files
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct UsageSite {
    pub file: String,
    pub line: usize,
    pub column: usize,
    pub written: String,
    pub kind: UsageKind,
    pub confidence: Confidence,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct UnattributedSite {
    pub file: String,
    pub line: usize,
    pub column: usize,
    pub written: String,
    pub kind: UsageKind,
    pub confidence: Confidence,
    /// Qualified names of the constructors whose result was dereferenced.
    pub via: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReportStats {
    pub files_scanned: usize,
    pub files_failed: usize,
    pub references: usize,
    pub unresolved: usize,
}

impl Report {
    pub fn used_symbols(&self) -> impl Iterator<Item = (&String, &SymbolReport)> {
        self.symbols.iter().filter(|(_, s)| s.used)
    }

    pub fn unused_symbols(&self) -> impl Iterator<Item = (&String, &SymbolReport)> {
        self.symbols.iter().filter(|(_, s)| !s.used && s.public)
    }
}
