use crate::model::{
    Confidence, Diagnostic, DiagnosticKind, Report, Severity, SymbolKind, UsageKind,
};
use crate::output::OutputFormatter;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;

/// JSON Lines: one self-describing record per line, symbols first, each
/// followed by its sites, then unattributed usages and diagnostics.
pub struct RecordsOutput;

impl RecordsOutput {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RecordsOutput {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Record<'a> {
    Symbol {
        symbol: &'a str,
        kind: SymbolKind,
        public: bool,
        used: bool,
        line: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        reexport_of: Option<&'a str>,
        counts: &'a BTreeMap<UsageKind, usize>,
    },
    Site {
        symbol: &'a str,
        file: &'a str,
        line: usize,
        column: usize,
        written: &'a str,
        kind: UsageKind,
        confidence: Confidence,
    },
    Unattributed {
        file: &'a str,
        line: usize,
        column: usize,
        written: &'a str,
        kind: UsageKind,
        confidence: Confidence,
        via: &'a [String],
    },
    Diagnostic {
        kind: DiagnosticKind,
        severity: Severity,
        file: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        line: Option<usize>,
        #[serde(skip_serializing_if = "Option::is_none")]
        column: Option<usize>,
        message: &'a str,
    },
}

impl<'a> Record<'a> {
    fn diagnostic(d: &'a Diagnostic) -> Self {
        Record::Diagnostic {
            kind: d.kind,
            severity: d.severity,
            file: d.path.display().to_string(),
            line: d.position.map(|p| p.line),
            column: d.position.map(|p| p.column),
            message: &d.message,
        }
    }
}

fn emit<W: Write>(writer: &mut W, record: &Record<'_>) -> std::io::Result<()> {
    let line = serde_json::to_string(record).map_err(std::io::Error::other)?;
    writeln!(writer, "{}", line)
}

impl OutputFormatter for RecordsOutput {
    fn format<W: Write>(&self, report: &Report, writer: &mut W) -> std::io::Result<()> {
        for (qualified, symbol) in &report.symbols {
            emit(
                writer,
                &Record::Symbol {
                    symbol: qualified,
                    kind: symbol.kind,
                    public: symbol.public,
                    used: symbol.used,
                    line: symbol.line,
                    reexport_of: symbol.reexport_of.as_deref(),
                    counts: &symbol.counts,
                },
            )?;
            for site in &symbol.sites {
                emit(
                    writer,
                    &Record::Site {
                        symbol: qualified,
                        file: &site.file,
                        line: site.line,
                        column: site.column,
                        written: &site.written,
                        kind: site.kind,
                        confidence: site.confidence,
                    },
                )?;
            }
        }

        for usage in &report.unattributed {
            emit(
                writer,
                &Record::Unattributed {
                    file: &usage.file,
                    line: usage.line,
                    column: usage.column,
                    written: &usage.written,
                    kind: usage.kind,
                    confidence: usage.confidence,
                    via: &usage.via,
                },
            )?;
        }

        for diagnostic in &report.diagnostics {
            emit(writer, &Record::diagnostic(diagnostic))?;
        }
        Ok(())
    }
}
