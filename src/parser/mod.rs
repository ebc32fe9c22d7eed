mod common;
mod python;

use crate::fs::FileSystem;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace};
use tree_sitter::{Node, Tree};

pub use common::{docstring, name_chain, node_text, string_literal_value};
pub use python::PythonParser;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse: {0}")]
    Parse(String),
    #[error("Syntax error at line {line}, column {column}")]
    Syntax { line: usize, column: usize },
    #[error("Unsupported language for file: {0}")]
    UnsupportedLanguage(String),
}

pub trait LanguageParser: Send + Sync {
    fn extensions(&self) -> &[&str];
    fn parse_source(&self, path: &Path, source: String) -> Result<ParsedSource, ParseError>;
}

/// A parsed file: its text and syntax tree.
#[derive(Debug)]
pub struct ParsedSource {
    pub path: PathBuf,
    pub source: String,
    pub tree: Tree,
    pub lines: usize,
}

impl ParsedSource {
    pub fn new(path: PathBuf, source: String, tree: Tree) -> Self {
        let lines = source.lines().count();
        Self {
            path,
            source,
            tree,
            lines,
        }
    }

    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }
}

/// Reads files through a [`FileSystem`] and hands them to the language parser.
pub struct SourceLoader<'a> {
    fs: &'a dyn FileSystem,
    parser: Box<dyn LanguageParser>,
}

impl<'a> SourceLoader<'a> {
    pub fn new(fs: &'a dyn FileSystem) -> Self {
        Self {
            fs,
            parser: Box::new(PythonParser::new()),
        }
    }

    pub fn supports(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.parser.extensions().contains(&ext))
    }

    pub fn load(&self, path: &Path) -> Result<ParsedSource, ParseError> {
        if !self.supports(path) {
            return Err(ParseError::UnsupportedLanguage(path.display().to_string()));
        }
        let source = self.fs.read_to_string(path)?;
        self.parser.parse_source(path, source)
    }
}

/// Per-run cache of parsed files, keyed by path.
///
/// Populated in phases and read-only in between: a path is parsed at most
/// once per run, and every lookup of the same path yields the same `Arc`.
#[derive(Debug, Default)]
pub struct SourceCache {
    entries: HashMap<PathBuf, Arc<ParsedSource>>,
    failures: BTreeMap<PathBuf, ParseError>,
}

impl SourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse every path not already cached, in parallel on the current rayon
    /// pool. `keep_going` is polled per file; once it returns false the
    /// remaining files are skipped. Returns the number of files attempted.
    pub fn populate(
        &mut self,
        loader: &SourceLoader<'_>,
        paths: &[PathBuf],
        keep_going: &(dyn Fn() -> bool + Sync),
    ) -> usize {
        let pending: Vec<&PathBuf> = paths.iter().filter(|p| !self.contains(p)).collect();
        debug!("Parsing {} files ({} cached)", pending.len(), paths.len() - pending.len());

        let loaded: Vec<(PathBuf, Result<ParsedSource, ParseError>)> = pending
            .par_iter()
            .filter(|_| keep_going())
            .map(|path| {
                trace!("Parsing {}", path.display());
                ((*path).clone(), loader.load(path))
            })
            .collect();

        let attempted = loaded.len();
        for (path, result) in loaded {
            match result {
                Ok(parsed) => {
                    self.entries.insert(path, Arc::new(parsed));
                }
                Err(e) => {
                    debug!("Failed to parse {}: {}", path.display(), e);
                    self.failures.insert(path, e);
                }
            }
        }
        attempted
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path) || self.failures.contains_key(path)
    }

    pub fn get(&self, path: &Path) -> Option<&Arc<ParsedSource>> {
        self.entries.get(path)
    }

    pub fn failure(&self, path: &Path) -> Option<&ParseError> {
        self.failures.get(path)
    }

    /// Failed paths in path order.
    pub fn failures(&self) -> impl Iterator<Item = (&PathBuf, &ParseError)> {
        self.failures.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parse an in-memory snippet; used by unit tests across the crate.
#[cfg(test)]
pub fn parse_snippet(path: &str, source: &str) -> ParsedSource {
    PythonParser::new()
        .parse_source(Path::new(path), source.to_string())
        .expect("snippet should parse")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFs;

    #[test]
    fn test_cache_never_reparses() {
        let fs = MockFs::with_files([
            ("/p/a.py", "x = 1\n"),
            ("/p/b.py", "def broken(:\n"),
        ]);
        let loader = SourceLoader::new(&fs);
        let mut cache = SourceCache::new();
        let paths = vec![PathBuf::from("/p/a.py"), PathBuf::from("/p/b.py")];

        assert_eq!(cache.populate(&loader, &paths, &|| true), 2);
        let first = Arc::clone(cache.get(Path::new("/p/a.py")).unwrap());

        // Second pass finds everything cached.
        assert_eq!(cache.populate(&loader, &paths, &|| true), 0);
        let second = cache.get(Path::new("/p/a.py")).unwrap();
        assert!(Arc::ptr_eq(&first, second));

        assert!(cache.failure(Path::new("/p/b.py")).is_some());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let fs = MockFs::new();
        let loader = SourceLoader::new(&fs);
        assert!(matches!(
            loader.load(Path::new("/nope.py")),
            Err(ParseError::Io(_))
        ));
    }

    #[test]
    fn test_unsupported_extension() {
        let fs = MockFs::with_files([("/p/readme.md", "# hi")]);
        let loader = SourceLoader::new(&fs);
        assert!(matches!(
            loader.load(Path::new("/p/readme.md")),
            Err(ParseError::UnsupportedLanguage(_))
        ));
    }

    #[test]
    fn test_stopped_population_skips_files() {
        let fs = MockFs::with_files([("/p/a.py", "x = 1\n")]);
        let loader = SourceLoader::new(&fs);
        let mut cache = SourceCache::new();
        let attempted = cache.populate(&loader, &[PathBuf::from("/p/a.py")], &|| false);
        assert_eq!(attempted, 0);
        assert!(cache.is_empty());
    }
}
