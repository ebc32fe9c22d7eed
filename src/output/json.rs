use crate::model::Report;
use crate::output::OutputFormatter;
use std::io::Write;

/// The full structured report as pretty-printed JSON.
pub struct JsonOutput;

impl JsonOutput {
    pub fn new() -> Self {
        Self
    }
}

impl Default for JsonOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputFormatter for JsonOutput {
    fn format<W: Write>(&self, report: &Report, writer: &mut W) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(report).map_err(std::io::Error::other)?;
        writeln!(writer, "{}", json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ReportStats;
    use crate::output::render;
    use std::collections::BTreeMap;

    #[test]
    fn test_empty_report_shape() {
        let report = Report {
            target: "pkg".to_string(),
            project_root: "/p".to_string(),
            modules: Vec::new(),
            symbols: BTreeMap::new(),
            unattributed: Vec::new(),
            diagnostics: Vec::new(),
            stats: ReportStats::default(),
        };
        let text = render(&JsonOutput::new(), &report).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["target"], "pkg");
        assert_eq!(value["stats"]["files_scanned"], 0);
        assert!(value["symbols"].as_object().unwrap().is_empty());
    }
}
