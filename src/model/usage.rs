use crate::model::SymbolId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 1-based line and column of a syntactic occurrence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }

    pub fn from_point(point: tree_sitter::Point) -> Self {
        Self {
            line: point.row + 1,
            column: point.column + 1,
        }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// The leftmost element of a reference chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefHead {
    /// A plain name, e.g. `pkg2` in `pkg2.some_function`.
    Name(String),
    /// The result of calling a chain, e.g. `pkg2.SampleClass()` in `pkg2.SampleClass().method`.
    CallResult(Vec<String>),
}

/// Syntactic position of a reference within its enclosing expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefContext {
    Load,
    Call,
    Store,
    Delete,
    ClassBase,
    Annotation,
    /// Import of a name that is never referenced afterwards in the file.
    ImportOnly,
    /// Import re-exposed by the importing module.
    ReExport,
}

/// Reflective access through a builtin such as `getattr`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicAccess {
    pub function: String,
    /// Whether the attribute name was a string literal.
    pub literal: bool,
}

/// One syntactic occurrence of a name chain in a consumer file.
#[derive(Debug, Clone)]
pub struct Reference {
    pub file: PathBuf,
    pub position: Position,
    pub head: RefHead,
    /// Attribute names following the head, in order.
    pub attrs: Vec<String>,
    pub context: RefContext,
    pub dynamic: Option<DynamicAccess>,
    /// The head name is also rebound to something untracked in a scope this
    /// reference sees, so it may not hold the import at this point.
    pub rebound: bool,
}

impl Reference {
    pub fn new(file: PathBuf, position: Position, head: RefHead, attrs: Vec<String>) -> Self {
        Self {
            file,
            position,
            head,
            attrs,
            context: RefContext::Load,
            dynamic: None,
            rebound: false,
        }
    }

    pub fn with_context(mut self, context: RefContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_dynamic(mut self, dynamic: DynamicAccess) -> Self {
        self.dynamic = Some(dynamic);
        self
    }

    /// The chain as written, e.g. `pkg2.SampleClass().method`.
    pub fn written(&self) -> String {
        let mut out = match &self.head {
            RefHead::Name(name) => name.clone(),
            RefHead::CallResult(callee) => format!("{}()", callee.join(".")),
        };
        for attr in &self.attrs {
            out.push('.');
            out.push_str(attr);
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Possible,
    Definite,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Possible => "possible",
            Confidence::Definite => "definite",
        }
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A symbol reached by resolution, with the number of chain attributes left
/// over after the symbol (e.g. `copy` in `cfg.DEFAULT.copy`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Candidate {
    pub symbol: SymbolId,
    pub trailing: usize,
    /// Re-exports crossed on the way to `symbol`, outermost first.
    pub via: Vec<SymbolId>,
}

impl Candidate {
    pub fn new(symbol: SymbolId) -> Self {
        Self {
            symbol,
            trailing: 0,
            via: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Unresolved,
    Symbols(Vec<Candidate>),
    /// The chain names a module rather than a symbol.
    Module(String),
    /// The chain dereferences the result of calling these symbols.
    Instance(Vec<SymbolId>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStatus {
    Unresolved,
    Definite,
    Ambiguous,
}

/// Result of resolving exactly one [`Reference`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub outcome: Outcome,
    pub confidence: Confidence,
}

impl Resolution {
    pub fn unresolved() -> Self {
        Self {
            outcome: Outcome::Unresolved,
            confidence: Confidence::Definite,
        }
    }

    pub fn candidates(&self) -> &[Candidate] {
        match &self.outcome {
            Outcome::Symbols(candidates) => candidates,
            _ => &[],
        }
    }

    pub fn status(&self) -> ResolutionStatus {
        match self.candidates().len() {
            0 => ResolutionStatus::Unresolved,
            1 => ResolutionStatus::Definite,
            _ => ResolutionStatus::Ambiguous,
        }
    }
}

/// How a symbol is used at one site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UsageKind {
    Call,
    Instantiate,
    AttributeRead,
    AttributeWrite,
    ReExport,
    UnresolvedThroughInstance,
    Unknown,
}

impl UsageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageKind::Call => "call",
            UsageKind::Instantiate => "instantiate",
            UsageKind::AttributeRead => "attribute-read",
            UsageKind::AttributeWrite => "attribute-write",
            UsageKind::ReExport => "re-export",
            UsageKind::UnresolvedThroughInstance => "unresolved-through-instance",
            UsageKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for UsageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Location of a usage, shared by attributed and unattributed records.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Site {
    pub file: PathBuf,
    pub position: Position,
    pub written: String,
}

impl Site {
    pub fn of(reference: &Reference) -> Self {
        Self {
            file: reference.file.clone(),
            position: reference.position,
            written: reference.written(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageRecord {
    pub symbol: SymbolId,
    pub site: Site,
    pub kind: UsageKind,
    pub confidence: Confidence,
}

/// A usage that cannot be attributed to any symbol's own surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnattributedUsage {
    pub site: Site,
    pub kind: UsageKind,
    pub confidence: Confidence,
    /// Constructors whose instance was dereferenced, if any.
    pub via: Vec<SymbolId>,
}
