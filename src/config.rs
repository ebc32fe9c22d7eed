use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

pub const CONFIG_FILE: &str = ".apitrace.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub analysis: AnalysisSettings,
    pub report: ReportSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisSettings {
    /// Keep files under `test`/`tests` directories and `test_*.py` files.
    pub include_tests: bool,
    /// Glob patterns (relative to the project root) removed from the corpus.
    pub exclude: Vec<String>,
    pub parallel: bool,
    pub jobs: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportSettings {
    /// Usage sites listed per symbol in the human summary.
    pub sample_sites: usize,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    analysis: Option<RawAnalysis>,
    report: Option<RawReport>,
}

#[derive(Debug, Deserialize)]
struct RawAnalysis {
    include_tests: Option<bool>,
    exclude: Option<Vec<String>>,
    parallel: Option<bool>,
    jobs: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RawReport {
    sample_sites: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            analysis: AnalysisSettings::default(),
            report: ReportSettings::default(),
        }
    }
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            include_tests: false,
            exclude: Vec::new(),
            parallel: true,
            jobs: None,
        }
    }
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self { sample_sites: 3 }
    }
}

impl Config {
    pub fn load(project_path: &Path) -> Result<Self, ConfigError> {
        let config_path = project_path.join(CONFIG_FILE);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&config_path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(content)?;
        let defaults = AnalysisSettings::default();

        let analysis = match raw.analysis {
            Some(a) => AnalysisSettings {
                include_tests: a.include_tests.unwrap_or(defaults.include_tests),
                exclude: a.exclude.unwrap_or_default(),
                parallel: a.parallel.unwrap_or(defaults.parallel),
                jobs: a.jobs.filter(|&n| n > 0),
            },
            None => defaults,
        };

        let report = match raw.report {
            Some(r) => ReportSettings {
                sample_sites: r.sample_sites.unwrap_or(ReportSettings::default().sample_sites),
            },
            None => ReportSettings::default(),
        };

        Ok(Self { analysis, report })
    }

    /// Whether a project-relative path matches one of the exclude patterns.
    pub fn is_excluded(&self, relative: &Path) -> bool {
        let path_str = relative.to_string_lossy();
        self.analysis
            .exclude
            .iter()
            .any(|pattern| glob_match(pattern, &path_str))
    }
}

/// Template written by `apitrace init`.
pub fn generate_config_template() -> String {
    r#"# apitrace configuration

[analysis]
# Analyze files in test/tests directories and test_*.py / *_test.py files too.
include_tests = false
# Glob patterns, relative to the project root, removed from the consumer corpus.
exclude = ["build/**", "dist/**"]
# Scan consumer files on the rayon thread pool.
parallel = true
# jobs = 4

[report]
# Usage sites shown per symbol in the text summary.
sample_sites = 3
"#
    .to_string()
}

/// Simple glob matching supporting ** and * wildcards.
pub fn glob_match(pattern: &str, path: &str) -> bool {
    // Normalize path separators
    let path = path.replace('\\', "/");
    let pattern = pattern.replace('\\', "/");

    glob_match_recursive(&pattern, &path)
}

fn glob_match_recursive(pattern: &str, path: &str) -> bool {
    // Handle ** (match any path segments)
    if let Some(pos) = pattern.find("**") {
        let prefix = &pattern[..pos];
        let suffix = &pattern[pos + 2..];
        let suffix = suffix.strip_prefix('/').unwrap_or(suffix);

        if !prefix.is_empty() && !path.starts_with(prefix) {
            return false;
        }

        let remaining = &path[prefix.len()..];

        if suffix.is_empty() {
            return true;
        }

        for (i, _) in remaining.char_indices() {
            if glob_match_recursive(suffix, &remaining[i..]) {
                return true;
            }
        }
        glob_match_recursive(suffix, "")
    } else if let Some(pos) = pattern.find('*') {
        // Handle single * (match within one segment)
        let prefix = &pattern[..pos];
        let suffix = &pattern[pos + 1..];

        if !path.starts_with(prefix) {
            return false;
        }

        let remaining = &path[prefix.len()..];

        // * doesn't match path separators
        for (i, c) in remaining.char_indices() {
            if c == '/' {
                return glob_match_recursive(suffix, &remaining[i..]);
            }
            if glob_match_recursive(suffix, &remaining[i..]) {
                return true;
            }
        }
        glob_match_recursive(suffix, "")
    } else {
        // No wildcards - exact match or path ends with pattern
        pattern == path || path.ends_with(&format!("/{}", pattern))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_sections_missing() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert!(!config.analysis.include_tests);
        assert_eq!(config.report.sample_sites, 3);
    }

    #[test]
    fn test_parse_analysis_section() {
        let config = Config::from_toml(
            r#"
            [analysis]
            include_tests = true
            exclude = ["vendor/**"]
            parallel = false
            jobs = 0

            [report]
            sample_sites = 5
            "#,
        )
        .unwrap();

        assert!(config.analysis.include_tests);
        assert!(!config.analysis.parallel);
        assert_eq!(config.analysis.jobs, None);
        assert_eq!(config.report.sample_sites, 5);
        assert!(config.is_excluded(Path::new("vendor/lib/x.py")));
        assert!(!config.is_excluded(Path::new("src/x.py")));
    }

    #[test]
    fn test_invalid_toml_is_error() {
        assert!(matches!(
            Config::from_toml("[analysis\ninclude_tests = ["),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_template_parses() {
        let config = Config::from_toml(&generate_config_template()).unwrap();
        assert_eq!(config.analysis.exclude, vec!["build/**", "dist/**"]);
    }

    #[test]
    fn test_glob_match() {
        assert!(glob_match("**/conftest.py", "tests/conftest.py"));
        assert!(glob_match("**/conftest.py", "conftest.py"));
        assert!(glob_match("build/**", "build/lib/pkg/core.py"));
        assert!(glob_match("*.pyi", "core.pyi"));
        assert!(!glob_match("src/*.py", "src/pkg/core.py"));
        assert!(!glob_match("**/db/**", "src/database.py"));
    }
}
