mod aggregate;
mod cancel;
mod classify;
mod corpus;
mod discover;
mod exports;
mod imports;
mod references;
mod resolve;

pub use aggregate::{ReportContext, UsageSet, build_report, display_path};
pub use cancel::CancelToken;
pub use classify::{classify, usage_kind};
pub use corpus::Corpus;
pub use discover::{detect_project_root, discover_files, is_test_file, module_name, target_files};
pub use exports::{ModuleDraft, SymbolDraft, extract};
pub use imports::{
    Binding, FileImports, ImportEdge, ImportGraph, ImportItem, ImportTarget, ImportedNames,
    ModuleNames, collect_imports,
};
pub use references::collect_references;
pub use resolve::Resolver;

use crate::config::{AnalysisSettings, ConfigError};
use crate::fs::FileSystem;
use crate::model::{Diagnostic, Module, ModuleId, Outcome, Reference, Report};
use crate::parser::{ParsedSource, SourceCache, SourceLoader};
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, debug_span, info, info_span};

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Target not found: {0}")]
    TargetNotFound(PathBuf),
    #[error("Target could not be parsed: {path}: {reason}")]
    TargetUnparseable { path: PathBuf, reason: String },
    #[error("Analysis cancelled")]
    Cancelled,
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Inputs of one run: the target's files and the consumer corpus, all
/// absolute and already discovered.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    /// Target as given (file or package directory).
    pub target: PathBuf,
    pub target_files: Vec<PathBuf>,
    pub corpus_files: Vec<PathBuf>,
    pub project_root: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parallelism {
    Sequential,
    /// Rayon pool with the given thread count, or rayon's default.
    Pool(Option<usize>),
}

impl Parallelism {
    pub fn from_settings(settings: &AnalysisSettings) -> Self {
        match (settings.parallel, settings.jobs) {
            (false, _) | (true, Some(1)) => Parallelism::Sequential,
            (true, jobs) => Parallelism::Pool(jobs),
        }
    }
}

/// Run the analysis on a dedicated thread pool sized by `parallelism`.
pub fn execute(
    request: &AnalysisRequest,
    fs: &dyn FileSystem,
    cancel: &CancelToken,
    parallelism: Parallelism,
) -> Result<Report, AnalysisError> {
    let builder = rayon::ThreadPoolBuilder::new();
    let builder = match parallelism {
        Parallelism::Sequential => builder.num_threads(1),
        Parallelism::Pool(Some(jobs)) => builder.num_threads(jobs),
        Parallelism::Pool(None) => builder,
    };
    let pool = builder.build()?;
    pool.install(|| run(request, fs, cancel))
}

/// Per-file output of the parallel scan phase.
struct FileScan {
    draft: ModuleDraft,
    imports: FileImports,
    references: Vec<Reference>,
}

fn checkpoint(cancel: &CancelToken) -> Result<(), AnalysisError> {
    if cancel.is_cancelled() {
        info!("Analysis cancelled; discarding partial results");
        Err(AnalysisError::Cancelled)
    } else {
        Ok(())
    }
}

fn package_of(path: &Path, name: &str) -> String {
    Module::new(ModuleId(0), path.to_path_buf(), name.to_string())
        .package()
        .to_string()
}

/// Run the whole pipeline on the current rayon pool.
///
/// Phases: load the target (fatal on failure), load the corpus, scan every
/// file in parallel, freeze the corpus and import graph, resolve and
/// classify references in parallel, then reduce into a report.
pub fn run(
    request: &AnalysisRequest,
    fs: &dyn FileSystem,
    cancel: &CancelToken,
) -> Result<Report, AnalysisError> {
    let _span = info_span!("analyze", target = %request.target.display()).entered();

    if request.target_files.is_empty() {
        return Err(AnalysisError::TargetNotFound(request.target.clone()));
    }

    let loader = SourceLoader::new(fs);
    let mut cache = SourceCache::new();
    let keep_going = || !cancel.is_cancelled();

    {
        let _phase = debug_span!("load_target").entered();
        cache.populate(&loader, &request.target_files, &keep_going);
    }
    checkpoint(cancel)?;
    if request.target_files.iter().all(|path| cache.get(path).is_none()) {
        let path = &request.target_files[0];
        let reason = cache
            .failure(path)
            .map(|e| e.to_string())
            .unwrap_or_else(|| "not loaded".to_string());
        return Err(AnalysisError::TargetUnparseable {
            path: path.clone(),
            reason,
        });
    }

    let mut all_files: Vec<PathBuf> = request
        .corpus_files
        .iter()
        .chain(&request.target_files)
        .cloned()
        .collect();
    all_files.sort();
    all_files.dedup();

    {
        let _phase = debug_span!("load_corpus", files = all_files.len()).entered();
        cache.populate(&loader, &all_files, &keep_going);
    }
    checkpoint(cancel)?;

    let targets: HashSet<PathBuf> = request.target_files.iter().cloned().collect();
    let parsed: Vec<(&PathBuf, &Arc<ParsedSource>, String)> = all_files
        .iter()
        .filter_map(|path| cache.get(path).map(|source| (path, source, module_name(path, fs))))
        .collect();
    let names = ModuleNames::new(parsed.iter().map(|(_, _, name)| name.clone()));
    info!(
        "Loaded {} files ({} failed), {} target files",
        parsed.len(),
        cache.failures().count(),
        targets.len()
    );

    let scans: Vec<FileScan> = {
        let _phase = debug_span!("scan").entered();
        parsed
            .par_iter()
            .filter(|_| keep_going())
            .map(|(path, source, name)| {
                let package = package_of(path, name);
                let draft = extract(source, name, &package, &names);
                let imports = collect_imports(source, &package);
                let references = if targets.contains(*path) {
                    Vec::new()
                } else {
                    collect_references(source, &imports, &draft.reexported_names())
                };
                FileScan {
                    draft,
                    imports,
                    references,
                }
            })
            .collect()
    };
    checkpoint(cancel)?;

    let mut diagnostics: Vec<Diagnostic> = cache
        .failures()
        .map(|(path, error)| Diagnostic::parse_error(path.clone(), error))
        .collect();

    let (graph, graph_diagnostics) = ImportGraph::build(
        scans
            .iter()
            .map(|scan| (scan.draft.path.as_path(), scan.draft.name.as_str(), &scan.imports)),
        &names,
    );
    diagnostics.extend(graph_diagnostics);
    debug!(
        "Import graph: {} edges ({} external)",
        graph.edge_count(),
        graph.external_edge_count()
    );

    let mut references: Vec<(PathBuf, Vec<Reference>)> = Vec::new();
    let mut files = Vec::with_capacity(scans.len());
    for mut scan in scans {
        diagnostics.append(&mut scan.draft.diagnostics);
        if !scan.references.is_empty() {
            references.push((scan.draft.path.clone(), scan.references));
        }
        files.push((scan.draft, scan.imports));
    }

    // Barrier: everything below reads the frozen corpus only.
    let corpus = Corpus::freeze(files, &targets, names);
    let resolver = Resolver::new(&corpus);

    let usage = {
        let _phase = debug_span!("resolve", files = references.len()).entered();
        references
            .par_iter()
            .filter(|_| keep_going())
            .map(|(path, file_references)| {
                let Some(module) = corpus.module_at(path) else {
                    return UsageSet::default();
                };
                let imports = corpus.imports(module.id);
                file_references
                    .iter()
                    .map(|reference| {
                        let (resolution, found) = resolver.resolve(reference, imports);
                        let mut usage = classify(reference, &resolution, &corpus);
                        usage.references = 1;
                        usage.unresolved = usize::from(resolution.outcome == Outcome::Unresolved);
                        usage.diagnostics = found;
                        usage
                    })
                    .fold(UsageSet::default(), UsageSet::merge)
            })
            .reduce(UsageSet::default, UsageSet::merge)
    };
    checkpoint(cancel)?;

    let usage = UsageSet {
        diagnostics,
        ..UsageSet::default()
    }
    .merge(usage);

    let context = ReportContext {
        target: &request.target,
        project_root: &request.project_root,
        corpus: &corpus,
        graph: &graph,
        files_scanned: all_files.len(),
        files_failed: cache.failures().count(),
    };
    let report = build_report(&context, usage);
    info!(
        "Report: {} symbols, {} used, {} diagnostics",
        report.symbols.len(),
        report.used_symbols().count(),
        report.diagnostics.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFs;
    use crate::model::{Confidence, DiagnosticKind, UsageKind};

    const PKG2: &str = r#"
def some_function():
    """Do something."""
    return 1

class SampleClass:
    def method(self):
        pass

SOME_CONSTANT = 42
"#;

    const CLIENT: &str = r#"from src.pkg1 import pkg2

def main():
    pkg2.some_function()
    instance = pkg2.SampleClass()
    instance.method()
    if 42 == pkg2.SOME_CONSTANT:
        print("match")
"#;

    fn request(fs: &MockFs, target: &str) -> AnalysisRequest {
        let target = PathBuf::from(target);
        let target_files: Vec<PathBuf> = fs
            .paths()
            .into_iter()
            .filter(|p| p == &target || p.starts_with(&target))
            .collect();
        AnalysisRequest {
            target,
            target_files,
            corpus_files: fs.paths(),
            project_root: PathBuf::from("/p"),
        }
    }

    fn scenario() -> MockFs {
        MockFs::with_files([
            ("/p/src/__init__.py", ""),
            ("/p/src/pkg1/__init__.py", ""),
            ("/p/src/pkg1/pkg2/__init__.py", PKG2),
            ("/p/client.py", CLIENT),
            ("/p/broken.py", "def broken(:\n"),
        ])
    }

    #[test]
    fn test_scenario_report() {
        let fs = scenario();
        let report = run(&request(&fs, "/p/src/pkg1/pkg2"), &fs, &CancelToken::new()).unwrap();

        assert_eq!(report.target, "src/pkg1/pkg2");
        assert_eq!(report.modules.len(), 1);
        assert_eq!(report.modules[0].name, "src.pkg1.pkg2");

        let function = &report.symbols["src.pkg1.pkg2.some_function"];
        assert!(function.used);
        assert_eq!(function.docstring.as_deref(), Some("Do something."));
        assert_eq!(function.sites.len(), 1);
        assert_eq!(function.sites[0].kind, UsageKind::Call);
        assert_eq!(function.sites[0].file, "client.py");
        assert_eq!(function.sites[0].line, 4);

        let class = &report.symbols["src.pkg1.pkg2.SampleClass"];
        assert_eq!(class.sites.len(), 1);
        assert_eq!(class.sites[0].kind, UsageKind::Instantiate);
        assert_eq!(class.sites[0].confidence, Confidence::Definite);

        let constant = &report.symbols["src.pkg1.pkg2.SOME_CONSTANT"];
        assert_eq!(constant.sites[0].kind, UsageKind::AttributeRead);
        assert_eq!(constant.sites[0].line, 7);

        assert_eq!(report.unattributed.len(), 1);
        assert_eq!(report.unattributed[0].via, vec!["src.pkg1.pkg2.SampleClass"]);

        assert_eq!(report.stats.files_scanned, 5);
        assert_eq!(report.stats.files_failed, 1);
        assert!(
            report
                .diagnostics
                .iter()
                .any(|d| d.kind == DiagnosticKind::ParseError && d.path == Path::new("broken.py"))
        );
    }

    #[test]
    fn test_sequential_and_parallel_agree() {
        let fs = scenario();
        let req = request(&fs, "/p/src/pkg1/pkg2");
        let cancel = CancelToken::new();
        let sequential = execute(&req, &fs, &cancel, Parallelism::Sequential).unwrap();
        let parallel = execute(&req, &fs, &cancel, Parallelism::Pool(Some(4))).unwrap();
        assert_eq!(
            serde_json::to_string(&sequential).unwrap(),
            serde_json::to_string(&parallel).unwrap()
        );
    }

    #[test]
    fn test_missing_target_is_fatal() {
        let fs = scenario();
        let result = run(&request(&fs, "/p/nowhere"), &fs, &CancelToken::new());
        assert!(matches!(result, Err(AnalysisError::TargetNotFound(_))));
    }

    #[test]
    fn test_unparseable_target_is_fatal() {
        let fs = scenario();
        let result = run(&request(&fs, "/p/broken.py"), &fs, &CancelToken::new());
        assert!(matches!(result, Err(AnalysisError::TargetUnparseable { .. })));
    }

    #[test]
    fn test_cancelled_run_yields_no_report() {
        let fs = scenario();
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = run(&request(&fs, "/p/src/pkg1/pkg2"), &fs, &cancel);
        assert!(matches!(result, Err(AnalysisError::Cancelled)));
    }

    #[test]
    fn test_parallelism_from_settings() {
        let mut settings = AnalysisSettings::default();
        assert_eq!(Parallelism::from_settings(&settings), Parallelism::Pool(None));
        settings.jobs = Some(1);
        assert_eq!(Parallelism::from_settings(&settings), Parallelism::Sequential);
        settings.jobs = Some(3);
        settings.parallel = false;
        assert_eq!(Parallelism::from_settings(&settings), Parallelism::Sequential);
    }
}
