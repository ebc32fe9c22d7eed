use crate::model::{Report, Severity, SymbolKind, SymbolReport};
use crate::output::OutputFormatter;
use std::io::Write;

/// Human-readable summary. `short` lists used symbols only, one per line.
pub struct MarkdownOutput {
    pub sample_sites: usize,
    pub short: bool,
}

impl MarkdownOutput {
    pub fn new(sample_sites: usize, short: bool) -> Self {
        Self { sample_sites, short }
    }

    fn format_short<W: Write>(&self, report: &Report, writer: &mut W) -> std::io::Result<()> {
        let mut used: Vec<(&String, &SymbolReport)> = report.used_symbols().collect();
        if used.is_empty() {
            writeln!(writer, "No symbols of `{}` are used by the corpus.", report.target)?;
            return Ok(());
        }
        used.sort_by(|a, b| {
            b.1.usage_count()
                .cmp(&a.1.usage_count())
                .then_with(|| a.0.cmp(b.0))
        });

        writeln!(writer, "# API usage summary for `{}`\n", report.target)?;
        for (qualified, symbol) in used {
            let count = symbol.usage_count();
            let noun = if count == 1 { "usage" } else { "usages" };
            writeln!(writer, "- `{}` ({} {})", qualified, count, noun)?;
        }
        Ok(())
    }

    fn format_symbol<W: Write>(
        &self,
        qualified: &str,
        symbol: &SymbolReport,
        writer: &mut W,
    ) -> std::io::Result<()> {
        let visibility = if symbol.public { "public" } else { "private" };
        writeln!(
            writer,
            "- **{}** ({} usages, {}) `{}`",
            symbol.name,
            symbol.usage_count(),
            visibility,
            qualified
        )?;
        if let Some(docstring) = &symbol.docstring {
            let first_line = docstring.lines().next().unwrap_or("");
            writeln!(writer, "  *{}*", truncate(first_line, 80))?;
        }
        if let Some(origin) = &symbol.reexport_of {
            writeln!(writer, "  re-exported from `{}`", origin)?;
        }
        if !symbol.counts.is_empty() {
            let counts: Vec<String> = symbol
                .counts
                .iter()
                .map(|(kind, count)| format!("{} {}", kind, count))
                .collect();
            let files = symbol.importers();
            writeln!(
                writer,
                "  {} in {} file{}",
                counts.join(", "),
                files.len(),
                if files.len() == 1 { "" } else { "s" }
            )?;
        }
        for site in symbol.sites.iter().take(self.sample_sites) {
            writeln!(
                writer,
                "  - `{}:{}:{}` {} ({}, {})",
                site.file, site.line, site.column, site.written, site.kind, site.confidence
            )?;
        }
        if symbol.sites.len() > self.sample_sites {
            writeln!(
                writer,
                "  - ... and {} more",
                symbol.sites.len() - self.sample_sites
            )?;
        }
        Ok(())
    }
}

impl OutputFormatter for MarkdownOutput {
    fn format<W: Write>(&self, report: &Report, writer: &mut W) -> std::io::Result<()> {
        if self.short {
            return self.format_short(report, writer);
        }

        writeln!(writer, "# Public API usage: {}\n", report.target)?;

        if !report.modules.is_empty() {
            writeln!(writer, "## Modules\n")?;
            for module in &report.modules {
                let importers = module.importers.len();
                writeln!(
                    writer,
                    "- `{}` ({}) imported by {} file{}",
                    module.name,
                    module.path,
                    importers,
                    if importers == 1 { "" } else { "s" }
                )?;
            }
            writeln!(writer)?;
        }

        let kinds = [
            (SymbolKind::Class, "Classes"),
            (SymbolKind::Function, "Functions"),
            (SymbolKind::Constant, "Constants"),
            (SymbolKind::Attribute, "Attributes"),
            (SymbolKind::Unknown, "Unknown"),
        ];
        for (kind, title) in kinds {
            let used: Vec<_> = report
                .used_symbols()
                .filter(|(_, s)| s.kind == kind)
                .collect();
            if used.is_empty() {
                continue;
            }
            writeln!(writer, "## {}\n", title)?;
            for (qualified, symbol) in used {
                self.format_symbol(qualified, symbol, writer)?;
            }
            writeln!(writer)?;
        }

        let unused: Vec<_> = report.unused_symbols().collect();
        if !unused.is_empty() {
            writeln!(writer, "## Unused public symbols\n")?;
            for (qualified, symbol) in unused {
                writeln!(writer, "- `{}` ({})", qualified, symbol.kind)?;
            }
            writeln!(writer)?;
        }

        if !report.unattributed.is_empty() {
            writeln!(writer, "## Unattributed usages\n")?;
            for usage in &report.unattributed {
                let via = if usage.via.is_empty() {
                    String::new()
                } else {
                    format!(" via `{}`", usage.via.join("`, `"))
                };
                writeln!(
                    writer,
                    "- `{}:{}:{}` {} ({}, {}){}",
                    usage.file,
                    usage.line,
                    usage.column,
                    usage.written,
                    usage.kind,
                    usage.confidence,
                    via
                )?;
            }
            writeln!(writer)?;
        }

        let notable: Vec<_> = report
            .diagnostics
            .iter()
            .filter(|d| d.severity > Severity::Info)
            .collect();
        if !notable.is_empty() {
            writeln!(writer, "## Diagnostics\n")?;
            for diagnostic in notable {
                let location = match diagnostic.position {
                    Some(position) => format!("{}:{}", diagnostic.path.display(), position),
                    None => diagnostic.path.display().to_string(),
                };
                writeln!(
                    writer,
                    "- [{}] `{}` {}: {}",
                    diagnostic.severity, location, diagnostic.kind, diagnostic.message
                )?;
            }
            writeln!(writer)?;
        }

        let stats = &report.stats;
        let infos = report
            .diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Info)
            .count();
        writeln!(
            writer,
            "---\n{} of {} symbols used. Scanned {} files ({} failed), {} references ({} unresolved), {} informational diagnostics.",
            report.used_symbols().count(),
            report.symbols.len(),
            stats.files_scanned,
            stats.files_failed,
            stats.references,
            stats.unresolved,
            infos
        )?;
        Ok(())
    }
}

fn truncate(s: &str, max_len: usize) -> &str {
    match s.char_indices().nth(max_len) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Confidence, ReportStats, UsageKind, UsageSite};
    use crate::output::render;
    use std::collections::BTreeMap;

    fn symbol(name: &str, kind: SymbolKind, sites: usize) -> SymbolReport {
        let sites: Vec<UsageSite> = (0..sites)
            .map(|i| UsageSite {
                file: "app.py".to_string(),
                line: i + 1,
                column: 1,
                written: format!("pkg.{}", name),
                kind: UsageKind::Call,
                confidence: Confidence::Definite,
            })
            .collect();
        let mut counts = BTreeMap::new();
        if !sites.is_empty() {
            counts.insert(UsageKind::Call, sites.len());
        }
        SymbolReport {
            name: name.to_string(),
            module: "pkg".to_string(),
            kind,
            public: true,
            line: 1,
            docstring: None,
            reexport_of: None,
            used: !sites.is_empty(),
            counts,
            sites,
        }
    }

    fn report() -> Report {
        let mut symbols = BTreeMap::new();
        symbols.insert("pkg.a".to_string(), symbol("a", SymbolKind::Function, 1));
        symbols.insert("pkg.b".to_string(), symbol("b", SymbolKind::Function, 5));
        symbols.insert("pkg.c".to_string(), symbol("c", SymbolKind::Class, 0));
        Report {
            target: "pkg".to_string(),
            project_root: "/p".to_string(),
            modules: Vec::new(),
            symbols,
            unattributed: Vec::new(),
            diagnostics: Vec::new(),
            stats: ReportStats::default(),
        }
    }

    #[test]
    fn test_short_sorted_by_usage() {
        let text = render(&MarkdownOutput::new(3, true), &report()).unwrap();
        let lines: Vec<&str> = text.lines().filter(|l| l.starts_with("- ")).collect();
        assert_eq!(lines, vec!["- `pkg.b` (5 usages)", "- `pkg.a` (1 usage)"]);
    }

    #[test]
    fn test_sample_sites_limit() {
        let text = render(&MarkdownOutput::new(2, false), &report()).unwrap();
        assert!(text.contains("## Functions"));
        assert!(text.contains("... and 3 more"));
        assert!(text.contains("## Unused public symbols"));
        assert!(text.contains("- `pkg.c` (class)"));
        assert!(text.contains("2 of 3 symbols used"));
    }
}
