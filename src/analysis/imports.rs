use crate::model::{Diagnostic, Position};
use crate::parser::{ParsedSource, name_chain, node_text};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use tree_sitter::Node;

/// Dotted names of every module in the corpus, plus their package prefixes
/// (so namespace packages without an `__init__.py` still resolve).
#[derive(Debug, Default, Clone)]
pub struct ModuleNames {
    modules: HashSet<String>,
    prefixes: HashSet<String>,
}

impl ModuleNames {
    pub fn new<I: IntoIterator<Item = String>>(names: I) -> Self {
        let mut known = Self::default();
        for name in names {
            let mut end = 0;
            while let Some(dot) = name[end..].find('.') {
                end += dot;
                known.prefixes.insert(name[..end].to_string());
                end += 1;
            }
            known.modules.insert(name);
        }
        known
    }

    pub fn is_module(&self, name: &str) -> bool {
        self.modules.contains(name)
    }

    /// A corpus module or a package prefix of one.
    pub fn is_known(&self, name: &str) -> bool {
        self.modules.contains(name) || self.prefixes.contains(name)
    }
}

/// `module.attr`, treating an empty module as the top level.
pub fn join_name(module: &str, attr: &str) -> String {
    if module.is_empty() {
        attr.to_string()
    } else {
        format!("{}.{}", module, attr)
    }
}

/// Absolute module name for a relative import of the given level.
/// Levels reaching above the top-level package keep their leading dots and
/// therefore never match a corpus module.
pub fn resolve_relative(package: &str, level: usize, rest: Option<&str>) -> String {
    let mut parts: Vec<&str> = package.split('.').filter(|p| !p.is_empty()).collect();
    let up = level.saturating_sub(1);
    if up > parts.len() {
        return format!("{}{}", ".".repeat(level), rest.unwrap_or(""));
    }
    parts.truncate(parts.len() - up);
    let base = parts.join(".");
    match rest {
        Some(rest) if !rest.is_empty() => join_name(&base, rest),
        _ => base,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportTarget {
    /// `import a.b` or `import a.b as x`.
    Module { alias: Option<String> },
    /// `from m import name` or `from m import name as x`.
    Name { name: String, alias: Option<String> },
    /// `from m import *`.
    Wildcard,
}

/// One imported entity of an import statement, with its module made absolute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportItem {
    pub module: String,
    pub target: ImportTarget,
    pub position: Position,
}

impl ImportItem {
    /// Name bound in the importing scope, if any.
    pub fn local_name(&self) -> Option<&str> {
        match &self.target {
            ImportTarget::Module { alias: Some(alias) } => Some(alias),
            ImportTarget::Module { alias: None } => self.module.split('.').next(),
            ImportTarget::Name { name, alias } => Some(alias.as_deref().unwrap_or(name)),
            ImportTarget::Wildcard => None,
        }
    }

    /// The `import x as x` / `from m import x as x` re-export idiom.
    pub fn is_redundant_alias(&self) -> bool {
        match &self.target {
            ImportTarget::Module { alias: Some(alias) } => alias == &self.module,
            ImportTarget::Name {
                name,
                alias: Some(alias),
            } => alias == name,
            _ => false,
        }
    }
}

fn dotted(node: &Node, source: &str) -> Option<String> {
    name_chain(node, source).map(|chain| chain.join("."))
}

fn import_from_module(node: &Node, source: &str, package: &str) -> Option<String> {
    let module = node.child_by_field_name("module_name")?;
    match module.kind() {
        "dotted_name" => dotted(&module, source),
        "relative_import" => {
            let text = node_text(&module, source);
            let level = text.chars().take_while(|c| *c == '.').count();
            let mut cursor = module.walk();
            let rest = module
                .named_children(&mut cursor)
                .find(|c| c.kind() == "dotted_name")
                .and_then(|c| dotted(&c, source));
            Some(resolve_relative(package, level, rest.as_deref()))
        }
        _ => None,
    }
}

fn aliased(node: &Node, source: &str) -> Option<(String, Option<String>)> {
    match node.kind() {
        "dotted_name" => Some((dotted(node, source)?, None)),
        "aliased_import" => {
            let name = dotted(&node.child_by_field_name("name")?, source)?;
            let alias = node
                .child_by_field_name("alias")
                .map(|a| node_text(&a, source).to_string());
            Some((name, alias))
        }
        _ => None,
    }
}

/// Import items of an `import` or `from ... import` statement. Relative
/// modules are resolved against `package`.
pub fn parse_import(node: &Node, source: &str, package: &str) -> Vec<ImportItem> {
    let mut items = Vec::new();
    let mut cursor = node.walk();

    match node.kind() {
        "import_statement" => {
            for name in node.children_by_field_name("name", &mut cursor) {
                if let Some((module, alias)) = aliased(&name, source) {
                    items.push(ImportItem {
                        module,
                        target: ImportTarget::Module { alias },
                        position: Position::from_point(name.start_position()),
                    });
                }
            }
        }
        "import_from_statement" => {
            let Some(module) = import_from_module(node, source, package) else {
                return items;
            };
            for name in node.children_by_field_name("name", &mut cursor) {
                if let Some((name_text, alias)) = aliased(&name, source) {
                    items.push(ImportItem {
                        module: module.clone(),
                        target: ImportTarget::Name {
                            name: name_text,
                            alias,
                        },
                        position: Position::from_point(name.start_position()),
                    });
                }
            }
            let mut cursor = node.walk();
            if node
                .named_children(&mut cursor)
                .any(|c| c.kind() == "wildcard_import")
            {
                items.push(ImportItem {
                    module,
                    target: ImportTarget::Wildcard,
                    position: Position::from_point(node.start_position()),
                });
            }
        }
        _ => {}
    }

    items
}

/// What a name in a file's scope is bound to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Binding {
    /// The module object itself.
    Module(String),
    /// A name imported from a module.
    From { module: String, name: String },
    /// A local alias of another chain, e.g. `f = pkg.func`.
    Alias(Vec<String>),
    /// The result of calling a chain, e.g. `obj = pkg.Class()`.
    Instance(Vec<String>),
}

/// Per-file import information: every import item plus the local bindings
/// they (and simple aliasing assignments) introduce. Flow-insensitive: a name
/// bound differently in separate branches keeps every binding.
#[derive(Debug, Clone, Default)]
pub struct FileImports {
    pub items: Vec<ImportItem>,
    pub bindings: BTreeMap<String, Vec<Binding>>,
    pub wildcards: Vec<String>,
}

impl FileImports {
    pub fn binding(&self, name: &str) -> &[Binding] {
        self.bindings.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    pub fn has_wildcards(&self) -> bool {
        !self.wildcards.is_empty()
    }

    fn bind(&mut self, name: &str, binding: Binding) {
        let entry = self.bindings.entry(name.to_string()).or_default();
        if !entry.contains(&binding) {
            entry.push(binding);
        }
    }

    fn add_item(&mut self, item: ImportItem) {
        match &item.target {
            ImportTarget::Module { alias: Some(alias) } => {
                let alias = alias.clone();
                self.bind(&alias, Binding::Module(item.module.clone()));
            }
            ImportTarget::Module { alias: None } => {
                if let Some(head) = item.module.split('.').next() {
                    let head = head.to_string();
                    self.bind(&head, Binding::Module(head.clone()));
                }
            }
            ImportTarget::Name { name, alias } => {
                let local = alias.clone().unwrap_or_else(|| name.clone());
                let binding = Binding::From {
                    module: item.module.clone(),
                    name: name.clone(),
                };
                self.bind(&local, binding);
            }
            ImportTarget::Wildcard => {
                if !self.wildcards.contains(&item.module) {
                    self.wildcards.push(item.module.clone());
                }
            }
        }
        self.items.push(item);
    }
}

/// Collect every import in the file, at any nesting depth, then the aliasing
/// assignments whose right-hand side starts from an imported name.
pub fn collect_imports(parsed: &ParsedSource, package: &str) -> FileImports {
    let mut imports = FileImports::default();
    visit_imports(parsed.root(), &parsed.source, package, &mut imports);
    visit_assignments(parsed.root(), &parsed.source, &mut imports);
    imports
}

fn visit_imports(node: Node, source: &str, package: &str, imports: &mut FileImports) {
    match node.kind() {
        "import_statement" | "import_from_statement" => {
            for item in parse_import(&node, source, package) {
                imports.add_item(item);
            }
        }
        "future_import_statement" => {}
        _ => {
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                visit_imports(child, source, package, imports);
            }
        }
    }
}

fn visit_assignments(node: Node, source: &str, imports: &mut FileImports) {
    if node.kind() == "assignment" {
        bind_assignment(&node, source, imports);
    }
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        visit_assignments(child, source, imports);
    }
}

fn bind_assignment(node: &Node, source: &str, imports: &mut FileImports) {
    if let Some((local, binding)) = assignment_binding(node, source, imports) {
        imports.bind(local, binding);
    }
}

/// The alias or instance binding an `assignment` node introduces, if its
/// right-hand side starts from an imported name.
pub fn assignment_binding<'s>(
    node: &Node,
    source: &'s str,
    imports: &FileImports,
) -> Option<(&'s str, Binding)> {
    let left = node.child_by_field_name("left")?;
    let right = node.child_by_field_name("right")?;
    if left.kind() != "identifier" {
        return None;
    }
    let local = node_text(&left, source);

    let (chain, instance) = match right.kind() {
        "identifier" | "attribute" => (name_chain(&right, source), false),
        "call" => (
            right
                .child_by_field_name("function")
                .and_then(|f| name_chain(&f, source)),
            true,
        ),
        _ => (None, false),
    };
    let chain = chain?;
    let head_bound = imports.is_bound(&chain[0]) || imports.has_wildcards();
    if !head_bound || (chain.len() == 1 && chain[0] == local && !instance) {
        return None;
    }

    let binding = if instance {
        Binding::Instance(chain)
    } else {
        Binding::Alias(chain)
    };
    Some((local, binding))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportedNames {
    /// The module object itself (`import m`).
    Module,
    Names(Vec<String>),
    Wildcard,
}

/// A directed import edge: importing file's module -> imported module.
#[derive(Debug, Clone)]
pub struct ImportEdge {
    pub file: PathBuf,
    pub alias: Option<String>,
    pub names: ImportedNames,
    pub position: Position,
    /// The imported module is not part of the corpus.
    pub external: bool,
}

/// Module-level import graph over the corpus. Nodes are dotted module names,
/// external ones included; cycles are kept as-is.
pub struct ImportGraph {
    graph: DiGraph<String, ImportEdge>,
    node_indices: HashMap<String, NodeIndex>,
}

impl ImportGraph {
    /// Build the graph from `(file, module name, imports)` triples. Returns
    /// the graph plus one `UnresolvedImport` diagnostic per external edge.
    pub fn build<'a, I>(files: I, known: &ModuleNames) -> (Self, Vec<Diagnostic>)
    where
        I: IntoIterator<Item = (&'a Path, &'a str, &'a FileImports)>,
    {
        let mut graph = Self {
            graph: DiGraph::new(),
            node_indices: HashMap::new(),
        };
        let mut diagnostics = Vec::new();

        for (file, module, imports) in files {
            let from = graph.node(module);
            let mut pending: Option<(String, ImportEdge)> = None;

            for item in &imports.items {
                let external = !known.is_known(&item.module);
                let (alias, names) = match &item.target {
                    ImportTarget::Module { alias } => (alias.clone(), ImportedNames::Module),
                    ImportTarget::Name { name, .. } => (None, ImportedNames::Names(vec![name.clone()])),
                    ImportTarget::Wildcard => (None, ImportedNames::Wildcard),
                };

                if let ImportTarget::Name { name, alias } = &item.target {
                    let submodule = join_name(&item.module, name);
                    if known.is_module(&submodule) {
                        let edge = ImportEdge {
                            file: file.to_path_buf(),
                            alias: alias.clone(),
                            names: ImportedNames::Module,
                            position: item.position,
                            external: false,
                        };
                        graph.add_edge(from, &submodule, edge, &mut diagnostics);
                    }
                }

                // Names from one statement share an edge.
                if let (Some((module_name, edge)), ImportedNames::Names(new)) = (&mut pending, &names) {
                    if *module_name == item.module && edge.position.line == item.position.line {
                        if let ImportedNames::Names(existing) = &mut edge.names {
                            existing.extend(new.iter().cloned());
                            continue;
                        }
                    }
                }

                if let Some((module_name, edge)) = pending.take() {
                    graph.add_edge(from, &module_name, edge, &mut diagnostics);
                }

                pending = Some((
                    item.module.clone(),
                    ImportEdge {
                        file: file.to_path_buf(),
                        alias,
                        names,
                        position: item.position,
                        external,
                    },
                ));
            }

            if let Some((module_name, edge)) = pending.take() {
                graph.add_edge(from, &module_name, edge, &mut diagnostics);
            }
        }

        (graph, diagnostics)
    }

    fn node(&mut self, module: &str) -> NodeIndex {
        if let Some(idx) = self.node_indices.get(module) {
            return *idx;
        }
        let idx = self.graph.add_node(module.to_string());
        self.node_indices.insert(module.to_string(), idx);
        idx
    }

    fn add_edge(
        &mut self,
        from: NodeIndex,
        module: &str,
        edge: ImportEdge,
        diagnostics: &mut Vec<Diagnostic>,
    ) {
        if edge.external {
            diagnostics.push(Diagnostic::unresolved_import(
                edge.file.clone(),
                edge.position,
                module,
            ));
        }
        let to = self.node(module);
        self.graph.add_edge(from, to, edge);
    }

    /// Files importing `module` directly, sorted.
    pub fn importers_of(&self, module: &str) -> Vec<PathBuf> {
        let Some(idx) = self.node_indices.get(module) else {
            return Vec::new();
        };
        let mut files: Vec<PathBuf> = self
            .graph
            .edges_directed(*idx, Direction::Incoming)
            .map(|edge| edge.weight().file.clone())
            .collect();
        files.sort();
        files.dedup();
        files
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn external_edge_count(&self) -> usize {
        self.graph.edge_weights().filter(|e| e.external).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DiagnosticKind;
    use crate::parser::parse_snippet;

    fn imports_of(source: &str, package: &str) -> FileImports {
        let parsed = parse_snippet("consumer.py", source);
        collect_imports(&parsed, package)
    }

    #[test]
    fn test_resolve_relative() {
        assert_eq!(resolve_relative("pkg.sub", 1, None), "pkg.sub");
        assert_eq!(resolve_relative("pkg.sub", 1, Some("core")), "pkg.sub.core");
        assert_eq!(resolve_relative("pkg.sub", 2, Some("util")), "pkg.util");
        assert_eq!(resolve_relative("", 1, Some("sibling")), "sibling");
        assert_eq!(resolve_relative("pkg", 3, Some("x")), "...x");
    }

    #[test]
    fn test_module_names_prefixes() {
        let names = ModuleNames::new(["src.pkg1.pkg2".to_string(), "client".to_string()]);
        assert!(names.is_module("src.pkg1.pkg2"));
        assert!(!names.is_module("src.pkg1"));
        assert!(names.is_known("src.pkg1"));
        assert!(names.is_known("src"));
        assert!(!names.is_known("os"));
    }

    #[test]
    fn test_plain_and_aliased_imports() {
        let imports = imports_of("import src.pkg1.pkg2\nimport numpy as np\n", "");
        assert_eq!(imports.binding("src"), &[Binding::Module("src".to_string())]);
        assert_eq!(imports.binding("np"), &[Binding::Module("numpy".to_string())]);
        assert_eq!(imports.items.len(), 2);
    }

    #[test]
    fn test_from_imports_and_wildcards() {
        let imports = imports_of(
            "from .core import add as plus, Calc\nfrom ..util import *\n",
            "mypkg.sub",
        );
        assert_eq!(
            imports.binding("plus"),
            &[Binding::From {
                module: "mypkg.sub.core".to_string(),
                name: "add".to_string(),
            }]
        );
        assert!(imports.is_bound("Calc"));
        assert_eq!(imports.wildcards, vec!["mypkg.util".to_string()]);
    }

    #[test]
    fn test_alias_and_instance_bindings() {
        let imports = imports_of(
            "import pkg\nf = pkg.func\nobj = pkg.Klass()\ny = other.thing\n",
            "",
        );
        assert_eq!(
            imports.binding("f"),
            &[Binding::Alias(vec!["pkg".to_string(), "func".to_string()])]
        );
        assert_eq!(
            imports.binding("obj"),
            &[Binding::Instance(vec!["pkg".to_string(), "Klass".to_string()])]
        );
        assert!(!imports.is_bound("y"));
    }

    #[test]
    fn test_nested_imports_are_collected() {
        let imports = imports_of(
            "try:\n    import simplejson as json\nexcept ImportError:\n    import json\n",
            "",
        );
        assert_eq!(imports.binding("json").len(), 2);
    }

    #[test]
    fn test_redundant_alias() {
        let imports = imports_of("from m import x as x\nfrom m import y as z\n", "");
        assert!(imports.items[0].is_redundant_alias());
        assert!(!imports.items[1].is_redundant_alias());
    }

    #[test]
    fn test_graph_edges_and_importers() {
        let known = ModuleNames::new(["pkg".to_string(), "pkg.core".to_string(), "app".to_string()]);
        let app = imports_of("import os\nfrom pkg import core, helper\n", "");
        let (graph, diagnostics) =
            ImportGraph::build([(Path::new("/p/app.py"), "app", &app)], &known);

        assert_eq!(graph.importers_of("pkg"), vec![PathBuf::from("/p/app.py")]);
        assert_eq!(graph.importers_of("pkg.core"), vec![PathBuf::from("/p/app.py")]);
        assert!(graph.importers_of("app").is_empty());
        // os, pkg (core+helper share one edge), pkg.core submodule
        assert_eq!(graph.edge_count(), 3);
        assert_eq!(graph.external_edge_count(), 1);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::UnresolvedImport);
    }

    #[test]
    fn test_graph_keeps_cycles() {
        let known = ModuleNames::new(["a".to_string(), "b".to_string()]);
        let a = imports_of("from b import x\n", "");
        let b = imports_of("from a import x\n", "");
        let (graph, diagnostics) = ImportGraph::build(
            [
                (Path::new("/p/a.py"), "a", &a),
                (Path::new("/p/b.py"), "b", &b),
            ],
            &known,
        );
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.importers_of("a"), vec![PathBuf::from("/p/b.py")]);
        assert!(diagnostics.is_empty());
    }
}
