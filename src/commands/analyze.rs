use crate::analysis::{self, CancelToken, Parallelism};
use crate::api::{self, AnalysisOptions, ApitraceError, CorpusSource};
use crate::cli::{AnalyzeArgs, OutputFormat};
use crate::config::Config;
use crate::fs::{FileSystem, default_fs};
use crate::model::Report;
use crate::output::{JsonOutput, MarkdownOutput, OutputFormatter, RecordsOutput};
use crate::style;
use std::io::{self, Write};
use tracing::info;

pub fn cmd_analyze(args: AnalyzeArgs) -> i32 {
    cmd_analyze_with_fs(args, default_fs())
}

fn options_from_args(args: &AnalyzeArgs) -> AnalysisOptions {
    let corpus = match (&args.root, &args.files) {
        (_, Some(files)) => CorpusSource::Files(files.clone()),
        (Some(root), None) => CorpusSource::Root(root.clone()),
        (None, None) => CorpusSource::ProjectRoot,
    };
    AnalysisOptions {
        corpus,
        project_root: args.project_root.clone(),
        config: None,
        include_tests: args.include_tests.then_some(true),
        exclude: Vec::new(),
        parallel: args.no_parallel.then_some(false),
        jobs: args.jobs,
    }
}

/// Run an analysis and write the report; `fs` receives the `-o` file.
pub fn cmd_analyze_with_fs(args: AnalyzeArgs, fs: &dyn FileSystem) -> i32 {
    let Some(target) = args.target.clone() else {
        style::error("No target given");
        return 1;
    };

    let mut options = options_from_args(&args);
    let plan = match api::plan(&target, &options) {
        Err(ApitraceError::Config(e)) => {
            style::warning(&format!("Failed to load config: {}. Using defaults.", e));
            options.config = Some(Config::default());
            api::plan(&target, &options)
        }
        other => other,
    };
    let plan = match plan {
        Ok(plan) => plan,
        Err(e) => {
            style::error(&e.to_string());
            return 1;
        }
    };

    let parallelism = Parallelism::from_settings(&plan.config.analysis);
    let cancel = CancelToken::new();
    let report = match analysis::execute(&plan.request, default_fs(), &cancel, parallelism) {
        Ok(report) => report,
        Err(e) => {
            style::error(&e.to_string());
            if matches!(e, analysis::AnalysisError::TargetNotFound(_)) {
                style::hint("The target must be a Python file or a directory containing Python files");
            }
            return 1;
        }
    };

    let rendered = match render(&report, &args, plan.config.report.sample_sites) {
        Ok(text) => text,
        Err(e) => {
            style::error(&format!("Failed to format output: {}", e));
            return 1;
        }
    };

    let written = match &args.output {
        Some(path) => fs.write(path, &rendered).map(|_| {
            info!("Report written to {}", path.display());
            style::success(&format!("Wrote report to {}", style::path(path)));
        }),
        None if args.format == OutputFormat::Text => {
            style::render_markdown(&rendered, &mut io::stdout())
        }
        None => {
            let mut stdout = io::stdout();
            write!(stdout, "{}", rendered).and_then(|_| stdout.flush())
        }
    };

    if let Err(e) = written {
        style::error(&format!("Failed to write output: {}", e));
        return 1;
    }

    // Diagnostics never affect the exit code.
    0
}

fn render(report: &Report, args: &AnalyzeArgs, sample_sites: usize) -> io::Result<String> {
    let mut buffer = Vec::new();
    match args.format {
        OutputFormat::Text => {
            MarkdownOutput::new(sample_sites, args.short).format(report, &mut buffer)?
        }
        OutputFormat::Json => JsonOutput::new().format(report, &mut buffer)?,
        OutputFormat::Records => RecordsOutput::new().format(report, &mut buffer)?,
    }
    String::from_utf8(buffer).map_err(io::Error::other)
}
