use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "apitrace")]
#[command(about = "Trace how a Python package's public API is used across a codebase")]
#[command(version)]
#[command(args_conflicts_with_subcommands = true, subcommand_negates_reqs = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Used when no subcommand is specified
    #[command(flatten)]
    pub analyze: AnalyzeArgs,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace); RUST_LOG wins
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Analyze public API usage of a module or package (default behavior)
    Analyze(AnalyzeArgs),

    /// Generate a starter .apitrace.toml configuration file
    Init(InitArgs),
}

#[derive(Parser, Debug, Clone, Default)]
pub struct AnalyzeArgs {
    /// Target module file or package directory
    #[arg(required = true)]
    pub target: Option<PathBuf>,

    /// Directory to scan for consumer files (defaults to the project root)
    #[arg(long, conflicts_with = "files")]
    pub root: Option<PathBuf>,

    /// Explicit list of consumer files
    #[arg(long, num_args = 1..)]
    pub files: Option<Vec<PathBuf>>,

    /// Project root used for module naming, config and relative paths
    #[arg(long)]
    pub project_root: Option<PathBuf>,

    /// Output format
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,

    /// Output file (defaults to stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// One line per used symbol, sorted by usage count
    #[arg(long)]
    pub short: bool,

    /// Include test files in the consumer corpus
    #[arg(long)]
    pub include_tests: bool,

    /// Run on a single thread
    #[arg(long)]
    pub no_parallel: bool,

    /// Number of worker threads
    #[arg(short, long)]
    pub jobs: Option<usize>,
}

#[derive(Parser, Debug, Clone)]
pub struct InitArgs {
    /// Path where to create .apitrace.toml (defaults to current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown summary, rendered on a terminal
    #[default]
    Text,
    /// Full structured report
    Json,
    /// JSON Lines, one record per symbol, site and diagnostic
    Records,
}
