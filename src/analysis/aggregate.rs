use crate::analysis::corpus::Corpus;
use crate::analysis::imports::ImportGraph;
use crate::model::{
    Diagnostic, Report, ReportStats, SymbolId, SymbolReport, TargetModule, UnattributedSite,
    UnattributedUsage, UsageKind, UsageRecord, UsageSite, Visibility,
};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

/// Per-file (or merged) analysis output. Merging is plain concatenation;
/// the report sorts everything, so merge order never shows.
#[derive(Debug, Default, Clone)]
pub struct UsageSet {
    pub records: Vec<UsageRecord>,
    pub unattributed: Vec<UnattributedUsage>,
    pub diagnostics: Vec<Diagnostic>,
    pub references: usize,
    pub unresolved: usize,
}

impl UsageSet {
    pub fn merge(mut self, mut other: Self) -> Self {
        self.records.append(&mut other.records);
        self.unattributed.append(&mut other.unattributed);
        self.diagnostics.append(&mut other.diagnostics);
        self.references += other.references;
        self.unresolved += other.unresolved;
        self
    }
}

/// `path` relative to `root` with `/` separators; `.` for the root itself.
pub fn display_path(path: &Path, root: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().to_string()),
            Component::RootDir => Some(String::new()),
            Component::ParentDir => Some("..".to_string()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

/// Everything besides the usage set that goes into a report.
pub struct ReportContext<'a> {
    pub target: &'a Path,
    pub project_root: &'a Path,
    pub corpus: &'a Corpus,
    pub graph: &'a ImportGraph,
    pub files_scanned: usize,
    pub files_failed: usize,
}

/// Fold the merged usage set into the final, fully sorted report.
pub fn build_report(context: &ReportContext<'_>, usage: UsageSet) -> Report {
    let corpus = context.corpus;
    let root = context.project_root;
    let relative = |path: &Path| display_path(path, root);

    let modules = corpus
        .target_modules()
        .map(|module| TargetModule {
            name: module.name.clone(),
            path: relative(&module.path),
            importers: context
                .graph
                .importers_of(&module.name)
                .iter()
                .filter(|file| corpus.module_at(file).is_none_or(|m| !corpus.is_target(m.id)))
                .map(|file| relative(file))
                .collect(),
        })
        .collect();

    let mut sites: BTreeMap<SymbolId, Vec<UsageSite>> = BTreeMap::new();
    for record in usage.records {
        sites.entry(record.symbol).or_default().push(UsageSite {
            file: relative(&record.site.file),
            line: record.site.position.line,
            column: record.site.position.column,
            written: record.site.written,
            kind: record.kind,
            confidence: record.confidence,
        });
    }

    let mut symbols = BTreeMap::new();
    for symbol in corpus.target_symbols() {
        let mut symbol_sites = sites.remove(&symbol.id).unwrap_or_default();
        let public = symbol.visibility == Visibility::Public;
        if !public && symbol_sites.is_empty() {
            continue;
        }
        symbol_sites.sort();

        let mut counts: BTreeMap<UsageKind, usize> = BTreeMap::new();
        for site in &symbol_sites {
            *counts.entry(site.kind).or_default() += 1;
        }
        let reexport_of = symbol.origin.as_ref().map(|origin| match &origin.name {
            Some(name) => format!("{}.{}", origin.module, name),
            None => origin.module.clone(),
        });

        symbols
            .entry(symbol.qualified_name.clone())
            .or_insert(SymbolReport {
                name: symbol.name.clone(),
                module: corpus.module(symbol.module).name.clone(),
                kind: symbol.kind,
                public,
                line: symbol.line,
                docstring: symbol.docstring.clone(),
                reexport_of,
                used: !symbol_sites.is_empty(),
                counts,
                sites: symbol_sites,
            });
    }

    let mut unattributed: Vec<UnattributedSite> = usage
        .unattributed
        .into_iter()
        .map(|u| {
            let mut via: Vec<String> = u
                .via
                .iter()
                .map(|id| corpus.symbol(*id).qualified_name.clone())
                .collect();
            via.sort();
            UnattributedSite {
                file: relative(&u.site.file),
                line: u.site.position.line,
                column: u.site.position.column,
                written: u.site.written,
                kind: u.kind,
                confidence: u.confidence,
                via,
            }
        })
        .collect();
    unattributed.sort();

    let mut diagnostics: Vec<Diagnostic> = usage
        .diagnostics
        .into_iter()
        .map(|mut d| {
            d.path = PathBuf::from(relative(&d.path));
            d
        })
        .collect();
    diagnostics.sort();
    diagnostics.dedup();

    Report {
        target: relative(context.target),
        project_root: root.display().to_string(),
        modules,
        symbols,
        unattributed,
        diagnostics,
        stats: ReportStats {
            files_scanned: context.files_scanned,
            files_failed: context.files_failed,
            references: usage.references,
            unresolved: usage.unresolved,
        },
    }
}
