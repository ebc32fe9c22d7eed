use crate::analysis::imports::{ImportItem, ImportTarget, ModuleNames, join_name, parse_import};
use crate::model::{Diagnostic, Position, ReexportOrigin, SymbolKind, Visibility};
use crate::parser::{ParsedSource, docstring, node_text, string_literal_value};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use tree_sitter::Node;

/// A symbol as seen by the extractor, before ids are assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolDraft {
    pub name: String,
    pub kind: SymbolKind,
    pub line: usize,
    pub docstring: Option<String>,
    pub origin: Option<ReexportOrigin>,
    pub exported: bool,
}

impl SymbolDraft {
    pub fn visibility(&self) -> Visibility {
        if self.exported {
            Visibility::Public
        } else {
            Visibility::Private
        }
    }
}

/// Everything the extractor learns about one module.
#[derive(Debug, Clone)]
pub struct ModuleDraft {
    pub path: PathBuf,
    pub name: String,
    pub is_package: bool,
    pub lines: usize,
    pub export_list: Option<Vec<String>>,
    pub symbols: Vec<SymbolDraft>,
    pub star_reexports: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ModuleDraft {
    pub fn symbol(&self, name: &str) -> Option<&SymbolDraft> {
        self.symbols.iter().find(|s| s.name == name)
    }

    /// Names this module re-exposes from its imports.
    pub fn reexported_names(&self) -> HashSet<String> {
        self.symbols
            .iter()
            .filter(|s| s.exported && s.origin.is_some())
            .map(|s| s.name.clone())
            .collect()
    }
}

#[derive(Debug, Clone)]
struct Definition {
    kind: SymbolKind,
    line: usize,
    docstring: Option<String>,
}

#[derive(Debug, Clone)]
struct ImportedName {
    origin: ReexportOrigin,
    line: usize,
    redundant_alias: bool,
}

/// Accumulates top-level facts in source order.
#[derive(Default)]
struct Scan {
    definitions: BTreeMap<String, Definition>,
    order: Vec<String>,
    imports: BTreeMap<String, ImportedName>,
    star_reexports: Vec<String>,
    export_list: Option<Vec<String>>,
    export_list_position: Option<Position>,
    dynamic_export_list: Option<Position>,
}

impl Scan {
    fn define(&mut self, name: &str, definition: Definition) {
        if !self.definitions.contains_key(name) {
            self.order.push(name.to_string());
            self.definitions.insert(name.to_string(), definition);
        }
    }

    fn extend_export_list(&mut self, names: Option<Vec<String>>, position: Position, replace: bool) {
        match names {
            Some(names) => {
                self.export_list_position.get_or_insert(position);
                let list = self.export_list.get_or_insert_with(Vec::new);
                if replace {
                    list.clear();
                }
                for name in names {
                    if !list.contains(&name) {
                        list.push(name);
                    }
                }
            }
            None => {
                self.dynamic_export_list.get_or_insert(position);
            }
        }
    }
}

/// Compute the exported symbol set of one parsed module.
///
/// With `__all__` the exports are exactly the listed names; otherwise every
/// top-level function, class and assignment whose name has no leading
/// underscore. Imports re-exposed by the module are tagged with their origin
/// but not followed. Unexported definitions are kept as private symbols.
pub fn extract(parsed: &ParsedSource, name: &str, package: &str, known: &ModuleNames) -> ModuleDraft {
    let is_package = parsed
        .path
        .file_stem()
        .and_then(|s| s.to_str())
        .is_some_and(|stem| stem == "__init__");

    let mut scan = Scan::default();
    for statement in top_level_statements(parsed.root()) {
        scan_statement(&statement, &parsed.source, package, &mut scan);
    }

    let mut diagnostics = Vec::new();
    if let Some(position) = scan.dynamic_export_list {
        diagnostics.push(Diagnostic::dynamic_export_list(parsed.path.clone(), position));
        scan.export_list = None;
    }

    let mut symbols = Vec::new();
    match &scan.export_list {
        Some(list) => {
            let listed: HashSet<&str> = list.iter().map(String::as_str).collect();
            for listed_name in list {
                if let Some(def) = scan.definitions.get(listed_name) {
                    symbols.push(defined(listed_name, def, true));
                } else if let Some(import) = scan.imports.get(listed_name) {
                    symbols.push(reexported(listed_name, import));
                } else if known.is_known(&join_name(name, listed_name)) && is_package {
                    symbols.push(SymbolDraft {
                        name: listed_name.clone(),
                        kind: SymbolKind::Unknown,
                        line: scan.export_list_position.map(|p| p.line).unwrap_or(1),
                        docstring: None,
                        origin: Some(ReexportOrigin {
                            module: join_name(name, listed_name),
                            name: None,
                        }),
                        exported: true,
                    });
                } else {
                    diagnostics.push(Diagnostic::unknown_export(
                        parsed.path.clone(),
                        scan.export_list_position,
                        listed_name,
                    ));
                    symbols.push(SymbolDraft {
                        name: listed_name.clone(),
                        kind: SymbolKind::Unknown,
                        line: scan.export_list_position.map(|p| p.line).unwrap_or(1),
                        docstring: None,
                        origin: None,
                        exported: true,
                    });
                }
            }
            for def_name in &scan.order {
                if !listed.contains(def_name.as_str()) {
                    symbols.push(defined(def_name, &scan.definitions[def_name], false));
                }
            }
        }
        None => {
            for def_name in &scan.order {
                let public = Visibility::from_name(def_name) == Visibility::Public;
                symbols.push(defined(def_name, &scan.definitions[def_name], public));
            }
            for (local, import) in &scan.imports {
                let public = Visibility::from_name(local) == Visibility::Public;
                let from_import = import.origin.name.is_some();
                let reexport = import.redundant_alias || (is_package && from_import);
                // A local definition of the same name takes precedence.
                if public && reexport && !scan.definitions.contains_key(local) {
                    symbols.push(reexported(local, import));
                }
            }
        }
    }

    ModuleDraft {
        path: parsed.path.clone(),
        name: name.to_string(),
        is_package,
        lines: parsed.lines,
        export_list: scan.export_list,
        symbols,
        star_reexports: scan.star_reexports,
        diagnostics,
    }
}

fn defined(name: &str, def: &Definition, exported: bool) -> SymbolDraft {
    SymbolDraft {
        name: name.to_string(),
        kind: def.kind,
        line: def.line,
        docstring: def.docstring.clone(),
        origin: None,
        exported,
    }
}

fn reexported(name: &str, import: &ImportedName) -> SymbolDraft {
    SymbolDraft {
        name: name.to_string(),
        kind: SymbolKind::Unknown,
        line: import.line,
        docstring: None,
        origin: Some(import.origin.clone()),
        exported: true,
    }
}

/// Module-level statements, descending into top-level `if`/`try` blocks
/// (version checks, optional-dependency fallbacks).
fn top_level_statements(root: Node<'_>) -> Vec<Node<'_>> {
    let mut statements = Vec::new();
    collect_block(root, &mut statements);
    statements
}

fn collect_block<'t>(block: Node<'t>, out: &mut Vec<Node<'t>>) {
    let mut cursor = block.walk();
    for statement in block.named_children(&mut cursor) {
        match statement.kind() {
            "if_statement" | "try_statement" => collect_compound(statement, out),
            _ => out.push(statement),
        }
    }
}

fn collect_compound<'t>(node: Node<'t>, out: &mut Vec<Node<'t>>) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "block" => collect_block(child, out),
            "elif_clause" | "else_clause" | "except_clause" | "except_group_clause"
            | "finally_clause" => collect_compound(child, out),
            _ => {}
        }
    }
}

fn scan_statement(node: &Node, source: &str, package: &str, scan: &mut Scan) {
    match node.kind() {
        "function_definition" | "class_definition" => scan_definition(node, source, scan),
        "decorated_definition" => {
            if let Some(def) = node.child_by_field_name("definition") {
                scan_definition(&def, source, scan);
            }
        }
        "import_statement" | "import_from_statement" => {
            for item in parse_import(node, source, package) {
                scan_import(item, scan);
            }
        }
        "expression_statement" => {
            let mut cursor = node.walk();
            for expr in node.named_children(&mut cursor) {
                match expr.kind() {
                    "assignment" => scan_assignment(&expr, source, scan),
                    "augmented_assignment" => scan_augmented(&expr, source, scan),
                    "call" => scan_export_list_call(&expr, source, scan),
                    _ => {}
                }
            }
        }
        _ => {}
    }
}

fn scan_definition(node: &Node, source: &str, scan: &mut Scan) {
    let Some(name) = node.child_by_field_name("name") else {
        return;
    };
    let kind = if node.kind() == "class_definition" {
        SymbolKind::Class
    } else {
        SymbolKind::Function
    };
    let docstring = node
        .child_by_field_name("body")
        .and_then(|body| docstring(&body, source));
    scan.define(
        node_text(&name, source),
        Definition {
            kind,
            line: node.start_position().row + 1,
            docstring,
        },
    );
}

fn scan_import(item: ImportItem, scan: &mut Scan) {
    let line = item.position.line;
    let redundant_alias = item.is_redundant_alias();
    match &item.target {
        ImportTarget::Wildcard => {
            if !scan.star_reexports.contains(&item.module) {
                scan.star_reexports.push(item.module.clone());
            }
        }
        ImportTarget::Module { alias } => {
            let Some(local) = item.local_name() else {
                return;
            };
            // `import a.b` binds `a`, `import a.b as x` binds `a.b`.
            let module = if alias.is_some() {
                item.module.clone()
            } else {
                local.to_string()
            };
            scan.imports.entry(local.to_string()).or_insert(ImportedName {
                origin: ReexportOrigin { module, name: None },
                line,
                redundant_alias,
            });
        }
        ImportTarget::Name { name, .. } => {
            let Some(local) = item.local_name() else {
                return;
            };
            scan.imports.entry(local.to_string()).or_insert(ImportedName {
                origin: ReexportOrigin {
                    module: item.module.clone(),
                    name: Some(name.clone()),
                },
                line,
                redundant_alias,
            });
        }
    }
}

fn is_upper_case(name: &str) -> bool {
    name.chars().any(|c| c.is_ascii_alphabetic())
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

fn is_literal(node: &Node) -> bool {
    match node.kind() {
        "string" | "concatenated_string" | "integer" | "float" | "true" | "false" | "none" => true,
        "unary_operator" => node.named_child(0).is_some_and(|n| is_literal(&n)),
        "list" | "tuple" | "set" => {
            let mut cursor = node.walk();
            node.named_children(&mut cursor).all(|n| is_literal(&n))
        }
        _ => false,
    }
}

/// Names of a literal list/tuple of strings, or `None` if any part is computed.
fn literal_names(node: &Node, source: &str) -> Option<Vec<String>> {
    match node.kind() {
        "list" | "tuple" | "set" => {
            let mut cursor = node.walk();
            node.named_children(&mut cursor)
                .filter(|n| n.kind() != "comment")
                .map(|n| string_literal_value(&n, source))
                .collect()
        }
        "binary_operator" => {
            let op = node.child_by_field_name("operator")?;
            if node_text(&op, source) != "+" {
                return None;
            }
            let mut names = literal_names(&node.child_by_field_name("left")?, source)?;
            names.extend(literal_names(&node.child_by_field_name("right")?, source)?);
            Some(names)
        }
        "parenthesized_expression" => literal_names(&node.named_child(0)?, source),
        _ => None,
    }
}

fn scan_assignment(node: &Node, source: &str, scan: &mut Scan) {
    let Some(left) = node.child_by_field_name("left") else {
        return;
    };
    let right = node.child_by_field_name("right");
    let line = node.start_position().row + 1;

    if left.kind() == "identifier" && node_text(&left, source) == "__all__" {
        let position = Position::from_point(node.start_position());
        let names = right.and_then(|r| literal_names(&r, source));
        scan.extend_export_list(names, position, true);
        return;
    }

    let mut targets = Vec::new();
    assignment_targets(&left, source, &mut targets);
    let unpacked = left.kind() != "identifier";
    let value = right.map(assigned_value);
    for target in targets {
        let literal = !unpacked && value.as_ref().is_some_and(is_literal);
        let kind = if is_upper_case(target) || literal {
            SymbolKind::Constant
        } else {
            SymbolKind::Attribute
        };
        scan.define(
            target,
            Definition {
                kind,
                line,
                docstring: None,
            },
        );
    }

    // Chained assignment: `A = B = 1`.
    if let Some(right) = right {
        if right.kind() == "assignment" {
            scan_assignment(&right, source, scan);
        }
    }
}

/// Value of a possibly chained assignment's right-hand side.
fn assigned_value(node: Node<'_>) -> Node<'_> {
    if node.kind() == "assignment" {
        if let Some(right) = node.child_by_field_name("right") {
            return assigned_value(right);
        }
    }
    node
}

fn assignment_targets<'s>(node: &Node, source: &'s str, out: &mut Vec<&'s str>) {
    match node.kind() {
        "identifier" => out.push(node_text(node, source)),
        "pattern_list" | "tuple_pattern" | "list_pattern" => {
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                assignment_targets(&child, source, out);
            }
        }
        _ => {}
    }
}

fn scan_augmented(node: &Node, source: &str, scan: &mut Scan) {
    let Some(left) = node.child_by_field_name("left") else {
        return;
    };
    if node_text(&left, source) != "__all__" {
        return;
    }
    let position = Position::from_point(node.start_position());
    let names = node
        .child_by_field_name("right")
        .and_then(|r| literal_names(&r, source));
    scan.extend_export_list(names, position, false);
}

/// `__all__.extend([...])` and `__all__.append("x")`.
fn scan_export_list_call(node: &Node, source: &str, scan: &mut Scan) {
    let Some(function) = node.child_by_field_name("function") else {
        return;
    };
    if function.kind() != "attribute" {
        return;
    }
    let (Some(object), Some(method)) = (
        function.child_by_field_name("object"),
        function.child_by_field_name("attribute"),
    ) else {
        return;
    };
    if node_text(&object, source) != "__all__" {
        return;
    }

    let position = Position::from_point(node.start_position());
    let argument = node
        .child_by_field_name("arguments")
        .and_then(|args| args.named_child(0));
    let names = match node_text(&method, source) {
        "extend" => argument.and_then(|a| literal_names(&a, source)),
        "append" => argument
            .and_then(|a| string_literal_value(&a, source))
            .map(|name| vec![name]),
        _ => return,
    };
    scan.extend_export_list(names, position, false);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DiagnosticKind;
    use crate::parser::parse_snippet;

    fn extract_from(path: &str, name: &str, source: &str) -> ModuleDraft {
        let parsed = parse_snippet(path, source);
        let package = if path.ends_with("__init__.py") {
            name.to_string()
        } else {
            name.rsplit_once('.').map(|(p, _)| p.to_string()).unwrap_or_default()
        };
        extract(&parsed, name, &package, &ModuleNames::default())
    }

    fn exported_names(draft: &ModuleDraft) -> Vec<&str> {
        draft
            .symbols
            .iter()
            .filter(|s| s.exported)
            .map(|s| s.name.as_str())
            .collect()
    }

    #[test]
    fn test_naming_convention_exports() {
        let draft = extract_from(
            "/p/pkg2/__init__.py",
            "pkg2",
            r#"
def some_function():
    """Does something."""
    return 1

class SampleClass:
    def method(self):
        pass

SOME_CONSTANT = 42
_private = 1
__version__ = "1.0"
"#,
        );
        assert_eq!(
            exported_names(&draft),
            vec!["some_function", "SampleClass", "SOME_CONSTANT"]
        );
        let func = draft.symbol("some_function").unwrap();
        assert_eq!(func.kind, SymbolKind::Function);
        assert_eq!(func.docstring.as_deref(), Some("Does something."));
        assert_eq!(func.line, 2);
        assert_eq!(draft.symbol("SampleClass").unwrap().kind, SymbolKind::Class);
        assert_eq!(draft.symbol("SOME_CONSTANT").unwrap().kind, SymbolKind::Constant);
        assert!(!draft.symbol("_private").unwrap().exported);
        assert!(!draft.symbol("__version__").unwrap().exported);
    }

    #[test]
    fn test_explicit_export_list_is_exact() {
        let draft = extract_from(
            "/p/m.py",
            "m",
            r#"
__all__ = ["_hidden_but_listed", "listed"]

def listed(): pass
def unlisted(): pass
def _hidden_but_listed(): pass
"#,
        );
        assert_eq!(exported_names(&draft), vec!["_hidden_but_listed", "listed"]);
        assert_eq!(draft.symbol("_hidden_but_listed").unwrap().visibility(), Visibility::Public);
        assert!(!draft.symbol("unlisted").unwrap().exported);
        assert_eq!(
            draft.export_list,
            Some(vec!["_hidden_but_listed".to_string(), "listed".to_string()])
        );
    }

    #[test]
    fn test_unknown_export_is_kept_with_diagnostic() {
        let draft = extract_from("/p/m.py", "m", "__all__ = ['ghost']\n");
        let ghost = draft.symbol("ghost").unwrap();
        assert_eq!(ghost.kind, SymbolKind::Unknown);
        assert!(ghost.exported);
        assert_eq!(draft.diagnostics.len(), 1);
        assert_eq!(draft.diagnostics[0].kind, DiagnosticKind::UnknownExport);
    }

    #[test]
    fn test_export_list_extensions() {
        let draft = extract_from(
            "/p/m.py",
            "m",
            r#"
__all__ = ["a"]
__all__ += ["b"]
__all__.extend(["c"])
__all__.append("d")
a = b = 1
def c(): pass
class d: pass
"#,
        );
        assert_eq!(exported_names(&draft), vec!["a", "b", "c", "d"]);
        assert_eq!(draft.symbol("a").unwrap().kind, SymbolKind::Constant);
    }

    #[test]
    fn test_dynamic_export_list_falls_back() {
        let draft = extract_from(
            "/p/m.py",
            "m",
            "from .base import names\n__all__ = names + ['x']\ndef x(): pass\ndef _y(): pass\n",
        );
        assert!(draft.export_list.is_none());
        assert_eq!(exported_names(&draft), vec!["x"]);
        assert_eq!(draft.diagnostics[0].kind, DiagnosticKind::DynamicExportList);
    }

    #[test]
    fn test_package_reexports_tag_origin() {
        let draft = extract_from(
            "/p/mypkg/__init__.py",
            "mypkg",
            "from .core import add, _internal\nfrom .helpers import *\nimport os\n",
        );
        let add = draft.symbol("add").unwrap();
        assert_eq!(
            add.origin,
            Some(ReexportOrigin {
                module: "mypkg.core".to_string(),
                name: Some("add".to_string()),
            })
        );
        assert!(draft.symbol("_internal").is_none());
        assert!(draft.symbol("os").is_none());
        assert_eq!(draft.star_reexports, vec!["mypkg.helpers".to_string()]);
        assert!(draft.reexported_names().contains("add"));
    }

    #[test]
    fn test_plain_module_reexports_need_redundant_alias() {
        let draft = extract_from(
            "/p/mypkg/api.py",
            "mypkg.api",
            "from .core import add\nfrom .core import sub as sub\n",
        );
        assert!(draft.symbol("add").is_none());
        assert!(draft.symbol("sub").unwrap().origin.is_some());
    }

    #[test]
    fn test_local_definition_beats_reexport() {
        let draft = extract_from(
            "/p/mypkg/__init__.py",
            "mypkg",
            "from .core import add\ndef add(a, b):\n    return a + b\n",
        );
        let add = draft.symbol("add").unwrap();
        assert!(add.origin.is_none());
        assert_eq!(add.kind, SymbolKind::Function);
        assert_eq!(draft.symbols.iter().filter(|s| s.name == "add").count(), 1);
    }

    #[test]
    fn test_guarded_definitions_are_top_level() {
        let draft = extract_from(
            "/p/m.py",
            "m",
            r#"
try:
    from fastlib import speedup
except ImportError:
    def speedup(x):
        return x

if True:
    FLAG = True
else:
    FLAG = False

def outer():
    def inner(): pass
"#,
        );
        assert_eq!(exported_names(&draft), vec!["speedup", "FLAG", "outer"]);
        assert!(draft.symbol("inner").is_none());
    }

    #[test]
    fn test_attribute_vs_constant() {
        let draft = extract_from(
            "/p/m.py",
            "m",
            "logger = get_logger()\ntimeout = 30\nx, y = 1, 2\n",
        );
        assert_eq!(draft.symbol("logger").unwrap().kind, SymbolKind::Attribute);
        assert_eq!(draft.symbol("timeout").unwrap().kind, SymbolKind::Constant);
        assert_eq!(draft.symbol("x").unwrap().kind, SymbolKind::Attribute);
    }
}
