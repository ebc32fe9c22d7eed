mod json;
mod markdown;
mod records;

pub use json::JsonOutput;
pub use markdown::MarkdownOutput;
pub use records::RecordsOutput;

use crate::model::Report;
use std::io::Write;

pub trait OutputFormatter {
    fn format<W: Write>(&self, report: &Report, writer: &mut W) -> std::io::Result<()>;
}

/// Render a report into a string with any formatter.
pub fn render<F: OutputFormatter>(formatter: &F, report: &Report) -> std::io::Result<String> {
    let mut buffer = Vec::new();
    formatter.format(report, &mut buffer)?;
    String::from_utf8(buffer).map_err(std::io::Error::other)
}
