use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Index of a [`Module`] in the module arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModuleId(pub usize);

/// Index of a [`Symbol`] in the symbol arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SymbolId(pub usize);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub id: ModuleId,
    pub path: PathBuf,
    /// Dotted import name, e.g. `src.pkg1.pkg2`.
    pub name: String,
    pub is_package: bool,
    pub lines: usize,
    /// Names listed in `__all__`, if the module declares one.
    pub export_list: Option<Vec<String>>,
    /// Public surface: name -> symbol.
    pub exports: BTreeMap<String, SymbolId>,
    /// Private top-level definitions that are not exported.
    pub private: BTreeMap<String, SymbolId>,
    /// Modules re-exposed wholesale with `from m import *` at top level.
    pub star_reexports: Vec<String>,
}

impl Module {
    pub fn new(id: ModuleId, path: PathBuf, name: String) -> Self {
        let is_package = path
            .file_stem()
            .and_then(|s| s.to_str())
            .is_some_and(|stem| stem == "__init__");

        Self {
            id,
            path,
            name,
            is_package,
            lines: 0,
            export_list: None,
            exports: BTreeMap::new(),
            private: BTreeMap::new(),
            star_reexports: Vec::new(),
        }
    }

    /// The package relative imports are resolved against.
    pub fn package(&self) -> &str {
        if self.is_package {
            &self.name
        } else {
            self.name.rsplit_once('.').map(|(pkg, _)| pkg).unwrap_or("")
        }
    }

    /// Exported symbol first, then private definitions.
    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.exports
            .get(name)
            .or_else(|| self.private.get(name))
            .copied()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
    pub id: SymbolId,
    pub name: String,
    pub qualified_name: String,
    pub kind: SymbolKind,
    pub module: ModuleId,
    pub visibility: Visibility,
    pub line: usize,
    pub docstring: Option<String>,
    /// Set when the symbol is an import re-exposed under this module's namespace.
    pub origin: Option<ReexportOrigin>,
}

/// Where a re-exported symbol was imported from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReexportOrigin {
    /// Absolute dotted module name.
    pub module: String,
    /// Imported name, or `None` when the module object itself is re-exported.
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum SymbolKind {
    Function,
    Class,
    Constant,
    Attribute,
    Unknown,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Class => "class",
            SymbolKind::Constant => "constant",
            SymbolKind::Attribute => "attribute",
            SymbolKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    /// In Python, names starting with _ are considered private
    pub fn from_name(name: &str) -> Self {
        if name.starts_with('_') {
            Visibility::Private
        } else {
            Visibility::Public
        }
    }
}
