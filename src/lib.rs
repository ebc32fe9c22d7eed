pub mod analysis;
pub mod api;
pub mod cli;
pub mod commands;
pub mod config;
pub mod fs;
pub mod model;
pub mod output;
pub mod parser;
pub mod style;

pub use analysis::{AnalysisError, CancelToken};
pub use api::{AnalysisOptions, ApitraceError, CorpusSource, analyze, analyze_with_cancel};
pub use cli::Cli;
pub use commands::{cmd_analyze, cmd_init};
pub use config::Config;
pub use model::Report;
