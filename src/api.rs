//! Library API for apitrace.
//!
//! Unlike the CLI commands, which print output and return exit codes, these
//! functions return proper `Result` types that calling code can handle.
//!
//! # Example
//!
//! ```no_run
//! use apitrace::{analyze, AnalysisOptions};
//! use std::path::Path;
//!
//! let report = analyze(Path::new("src/mypackage"), AnalysisOptions::default())?;
//! for (name, symbol) in report.unused_symbols() {
//!     println!("{} ({}) is never used", name, symbol.kind);
//! }
//! # Ok::<(), apitrace::ApitraceError>(())
//! ```

use crate::analysis::{
    self, AnalysisError, AnalysisRequest, CancelToken, Parallelism, detect_project_root,
    discover_files, target_files,
};
use crate::config::{Config, ConfigError};
use crate::fs::default_fs;
use crate::model::Report;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Errors that can occur during apitrace operations.
#[derive(Debug, Error)]
pub enum ApitraceError {
    /// A corpus root, project root or corpus file could not be resolved.
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// Configuration file error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Fatal analysis failure: missing or unparseable target, cancellation.
    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    /// IO error during analysis.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApitraceError {
    /// Whether the error is about the target itself rather than the corpus.
    pub fn is_target_error(&self) -> bool {
        matches!(
            self,
            ApitraceError::Analysis(
                AnalysisError::TargetNotFound(_) | AnalysisError::TargetUnparseable { .. }
            )
        )
    }
}

/// Where consumer files come from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CorpusSource {
    /// Walk the detected project root.
    #[default]
    ProjectRoot,
    /// Walk this directory instead.
    Root(PathBuf),
    /// Exactly these files.
    Files(Vec<PathBuf>),
}

/// Options for the `analyze` function. `None` fields fall back to the
/// project's `.apitrace.toml`, then to built-in defaults.
#[derive(Debug, Clone, Default)]
pub struct AnalysisOptions {
    pub corpus: CorpusSource,

    /// Overrides project root detection.
    pub project_root: Option<PathBuf>,

    /// Use this configuration instead of loading `.apitrace.toml`.
    pub config: Option<Config>,

    pub include_tests: Option<bool>,

    /// Extra exclude globs, added to the configured ones.
    pub exclude: Vec<String>,

    pub parallel: Option<bool>,

    pub jobs: Option<usize>,
}

impl AnalysisOptions {
    /// Apply these options on top of a loaded configuration.
    pub fn apply(&self, mut config: Config) -> Config {
        if let Some(include_tests) = self.include_tests {
            config.analysis.include_tests = include_tests;
        }
        config.analysis.exclude.extend(self.exclude.iter().cloned());
        if let Some(parallel) = self.parallel {
            config.analysis.parallel = parallel;
        }
        if let Some(jobs) = self.jobs.filter(|&n| n > 0) {
            config.analysis.jobs = Some(jobs);
        }
        config
    }
}

fn canonical(path: &Path) -> Result<PathBuf, ApitraceError> {
    path.canonicalize()
        .map_err(|_| ApitraceError::PathNotFound(path.to_path_buf()))
}

/// A fully resolved run: the request handed to the pipeline plus the
/// effective configuration.
#[derive(Debug, Clone)]
pub struct Plan {
    pub request: AnalysisRequest,
    pub config: Config,
}

/// Resolve paths, load configuration and discover the corpus.
pub fn plan(target: &Path, options: &AnalysisOptions) -> Result<Plan, ApitraceError> {
    let target = target
        .canonicalize()
        .map_err(|_| AnalysisError::TargetNotFound(target.to_path_buf()))?;

    let project_root = match &options.project_root {
        Some(root) => canonical(root)?,
        None => detect_project_root(&target, default_fs()),
    };

    let config = match &options.config {
        Some(config) => config.clone(),
        None => Config::load(&project_root)?,
    };
    let config = options.apply(config);

    let corpus_files = match &options.corpus {
        CorpusSource::ProjectRoot => discover_files(&project_root, &config),
        CorpusSource::Root(root) => discover_files(&canonical(root)?, &config),
        CorpusSource::Files(files) => {
            let mut resolved = files
                .iter()
                .map(|file| canonical(file))
                .collect::<Result<Vec<_>, _>>()?;
            resolved.sort();
            resolved.dedup();
            resolved
        }
    };
    debug!(
        "Project root {}, {} corpus files",
        project_root.display(),
        corpus_files.len()
    );

    Ok(Plan {
        request: AnalysisRequest {
            target_files: target_files(&target),
            target,
            corpus_files,
            project_root,
        },
        config,
    })
}

/// Analyze how the corpus uses the public API of `target` (a module file or
/// a package directory).
///
/// # Errors
///
/// Fails only when the target cannot be found or parsed, a configured path
/// does not exist, or the configuration file is invalid. Problems with
/// individual corpus files are reported as diagnostics instead.
pub fn analyze(target: &Path, options: AnalysisOptions) -> Result<Report, ApitraceError> {
    analyze_with_cancel(target, options, &CancelToken::new())
}

/// Like [`analyze`], abandoning the run once `cancel` is triggered.
pub fn analyze_with_cancel(
    target: &Path,
    options: AnalysisOptions,
    cancel: &CancelToken,
) -> Result<Report, ApitraceError> {
    let plan = plan(target, &options)?;
    let parallelism = Parallelism::from_settings(&plan.config.analysis);
    Ok(analysis::execute(&plan.request, default_fs(), cancel, parallelism)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_override_config() {
        let options = AnalysisOptions {
            include_tests: Some(true),
            exclude: vec!["vendor/**".to_string()],
            parallel: Some(false),
            jobs: Some(0),
            ..Default::default()
        };
        let mut base = Config::default();
        base.analysis.exclude.push("build/**".to_string());
        base.analysis.jobs = Some(2);

        let config = options.apply(base);
        assert!(config.analysis.include_tests);
        assert!(!config.analysis.parallel);
        assert_eq!(config.analysis.exclude, vec!["build/**", "vendor/**"]);
        assert_eq!(config.analysis.jobs, Some(2));
    }

    #[test]
    fn test_missing_target_is_target_error() {
        let error = plan(Path::new("/nonexistent/apitrace/pkg"), &AnalysisOptions::default())
            .unwrap_err();
        assert!(error.is_target_error());
    }
}
