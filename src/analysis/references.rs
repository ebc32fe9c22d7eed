use crate::analysis::imports::{FileImports, ImportTarget, assignment_binding, parse_import};
use crate::model::{DynamicAccess, Position, RefContext, RefHead, Reference};
use crate::parser::{ParsedSource, name_chain, node_text, string_literal_value};
use std::collections::HashSet;
use tree_sitter::Node;

/// Builtins that take an object and an attribute name.
const REFLECTIVE: &[&str] = &["getattr", "hasattr", "setattr", "delattr"];

/// Builtin names never looked up through wildcard imports.
const BUILTINS: &[&str] = &[
    "abs", "all", "any", "bool", "bytes", "callable", "dict", "dir", "enumerate", "Exception",
    "filter", "float", "format", "frozenset", "id", "int", "isinstance", "issubclass", "iter",
    "len", "list", "map", "max", "min", "next", "object", "open", "print", "property", "range",
    "repr", "reversed", "round", "self", "set", "sorted", "str", "sum", "super", "tuple", "type",
    "zip",
];

/// Collect every reference in a consumer file whose head is bound by an
/// import (or, in files with wildcard imports, any free name). Import
/// statements themselves only contribute import-only and re-export sites.
pub fn collect_references(
    parsed: &ParsedSource,
    imports: &FileImports,
    reexported: &HashSet<String>,
) -> Vec<Reference> {
    let locals = if imports.has_wildcards() {
        let mut locals = HashSet::new();
        local_names(parsed.root(), &parsed.source, &mut locals);
        locals
    } else {
        HashSet::new()
    };

    let mut module = Scope::default();
    scope_bindings(parsed.root(), &parsed.source, imports, &mut module);
    global_rebinds(parsed.root(), &parsed.source, imports, &mut module.shadowing);

    let mut collector = Collector {
        parsed,
        imports,
        locals,
        module,
        scopes: Vec::new(),
        references: Vec::new(),
    };
    collector.visit(parsed.root());
    collector.import_sites(reexported);
    collector.references
}

/// Names one scope binds. `tracked` names come from imports or aliasing
/// assignments; `shadowing` names are bound to anything else.
#[derive(Debug, Default)]
struct Scope {
    tracked: HashSet<String>,
    shadowing: HashSet<String>,
    /// `global` and `nonlocal` names, which belong to an outer scope.
    declared: HashSet<String>,
}

/// How a name looks from the current scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shadow {
    None,
    /// Rebound somewhere visible; the import may or may not hold.
    Rebound,
    /// A plain local of an enclosing function or comprehension.
    Local,
}

struct Collector<'a> {
    parsed: &'a ParsedSource,
    imports: &'a FileImports,
    locals: HashSet<String>,
    module: Scope,
    /// Function, lambda and comprehension scopes, innermost last.
    scopes: Vec<Scope>,
    references: Vec<Reference>,
}

impl<'a> Collector<'a> {
    fn tracks(&self, name: &str) -> bool {
        if self.imports.is_bound(name) {
            return true;
        }
        self.imports.has_wildcards() && !self.locals.contains(name) && !BUILTINS.contains(&name)
    }

    fn shadow(&self, name: &str) -> Shadow {
        for scope in self.scopes.iter().rev() {
            if scope.declared.contains(name) {
                continue;
            }
            match (scope.shadowing.contains(name), scope.tracked.contains(name)) {
                (true, true) => return Shadow::Rebound,
                (true, false) => return Shadow::Local,
                (false, true) => return Shadow::None,
                (false, false) => {}
            }
        }
        if self.module.shadowing.contains(name) {
            Shadow::Rebound
        } else {
            Shadow::None
        }
    }

    /// Visit `node` inside a new scope binding `parameters` and whatever
    /// `body` binds.
    fn visit_scoped(&mut self, node: Node, parameters: Option<Node>, body: Node) {
        let source = &self.parsed.source;
        let mut scope = Scope::default();
        if let Some(parameters) = parameters {
            parameter_names(parameters, source, &mut scope.shadowing);
        }
        if is_comprehension(&node) {
            let mut cursor = node.walk();
            for clause in node.named_children(&mut cursor) {
                if clause.kind() != "for_in_clause" {
                    continue;
                }
                if let Some(left) = clause.child_by_field_name("left") {
                    binding_targets(&left, source, &mut scope.shadowing);
                }
            }
        } else {
            scope_bindings(body, source, self.imports, &mut scope);
        }

        self.scopes.push(scope);
        if body.id() == node.id() {
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                self.visit(child);
            }
        } else {
            self.visit(body);
        }
        self.scopes.pop();
    }

    /// Default values and annotations inside a parameter list; the parameter
    /// names themselves are declarations.
    fn visit_parameter_values(&mut self, parameters: Node) {
        let mut cursor = parameters.walk();
        for parameter in parameters.named_children(&mut cursor) {
            for field in ["type", "value"] {
                if let Some(child) = parameter.child_by_field_name(field) {
                    self.visit(child);
                }
            }
        }
    }

    fn push(&mut self, node: &Node, head: RefHead, attrs: Vec<String>, context: RefContext) -> &mut Reference {
        let reference = Reference::new(
            self.parsed.path.clone(),
            Position::from_point(node.start_position()),
            head,
            attrs,
        )
        .with_context(context);
        self.references.push(reference);
        let last = self.references.len() - 1;
        &mut self.references[last]
    }

    fn visit(&mut self, node: Node) {
        match node.kind() {
            "import_statement" | "import_from_statement" | "future_import_statement" => return,
            "function_definition" | "lambda" => {
                // Decorators, defaults and annotations belong to the enclosing scope.
                let parameters = node.child_by_field_name("parameters");
                let body = node.child_by_field_name("body");
                let mut cursor = node.walk();
                for child in node.named_children(&mut cursor) {
                    if Some(child.id()) == body.map(|b| b.id()) {
                        continue;
                    }
                    if Some(child.id()) == parameters.map(|p| p.id()) {
                        self.visit_parameter_values(child);
                    } else {
                        self.visit(child);
                    }
                }
                if let Some(body) = body {
                    self.visit_scoped(node, parameters, body);
                }
                return;
            }
            kind if is_comprehension_kind(kind) => {
                self.visit_scoped(node, None, node);
                return;
            }
            "call" => {
                if self.visit_reflective(&node) {
                    return;
                }
            }
            "identifier" | "attribute" => self.visit_chain(&node),
            _ => {}
        }

        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            self.visit(child);
        }
    }

    fn visit_chain(&mut self, node: &Node) {
        if !is_maximal(node) {
            return;
        }
        if node.kind() == "identifier" && !is_reference_identifier(node) {
            return;
        }
        let parsed = self.parsed;
        let Some((head, attrs)) = split_chain(node, &parsed.source) else {
            return;
        };
        let head_name = match &head {
            RefHead::Name(name) => name.as_str(),
            RefHead::CallResult(callee) => callee[0].as_str(),
        };
        if !self.tracks(head_name) {
            return;
        }
        let shadow = self.shadow(head_name);
        if shadow == Shadow::Local {
            return;
        }

        let context = context_of(node);
        // Rebinding a bare name is not a use of what it was bound to.
        let bare = attrs.is_empty() && matches!(head, RefHead::Name(_));
        if bare && matches!(context, RefContext::Store | RefContext::Delete) {
            return;
        }
        self.push(node, head, attrs, context).rebound = shadow == Shadow::Rebound;
    }

    /// `getattr(obj, "name")` and friends. Returns false when the call is not
    /// a reflective access on a tracked object.
    fn visit_reflective(&mut self, call: &Node) -> bool {
        let parsed = self.parsed;
        let source = &parsed.source;
        let Some(function) = call.child_by_field_name("function") else {
            return false;
        };
        if function.kind() != "identifier" {
            return false;
        }
        let name = node_text(&function, source);
        if !REFLECTIVE.contains(&name) || self.imports.is_bound(name) {
            return false;
        }
        let Some(arguments) = call.child_by_field_name("arguments") else {
            return false;
        };

        let mut cursor = arguments.walk();
        let positional: Vec<Node> = arguments
            .named_children(&mut cursor)
            .filter(|n| n.kind() != "keyword_argument" && n.kind() != "comment")
            .collect();
        if positional.len() < 2 {
            return false;
        }
        let Some(chain) = name_chain(&positional[0], source) else {
            return false;
        };
        if !self.tracks(&chain[0]) {
            return false;
        }
        let shadow = self.shadow(&chain[0]);
        if shadow == Shadow::Local {
            return false;
        }

        let literal = string_literal_value(&positional[1], source);
        let mut attrs = chain[1..].to_vec();
        if let Some(attribute) = &literal {
            attrs.push(attribute.clone());
        }
        let context = match name {
            "setattr" => RefContext::Store,
            "delattr" => RefContext::Delete,
            _ => context_of(call),
        };
        let dynamic = DynamicAccess {
            function: name.to_string(),
            literal: literal.is_some(),
        };
        let head = RefHead::Name(chain[0].clone());
        let reference = self.push(call, head, attrs, context);
        reference.dynamic = Some(dynamic);
        reference.rebound = shadow == Shadow::Rebound;

        // The name expression and any value argument may hold references too.
        for argument in positional.iter().skip(1) {
            self.visit(*argument);
        }
        true
    }

    /// Import-only and re-export sites for from-imports.
    fn import_sites(&mut self, reexported: &HashSet<String>) {
        let mentioned: HashSet<String> = self
            .references
            .iter()
            .map(|r| match &r.head {
                RefHead::Name(name) => name.clone(),
                RefHead::CallResult(callee) => callee[0].clone(),
            })
            .collect();

        let imports = self.imports;
        for item in &imports.items {
            if !matches!(item.target, ImportTarget::Name { .. }) {
                continue;
            }
            let Some(local) = item.local_name() else {
                continue;
            };
            let context = if reexported.contains(local) {
                RefContext::ReExport
            } else if !mentioned.contains(local) {
                RefContext::ImportOnly
            } else {
                continue;
            };
            self.references.push(
                Reference::new(
                    self.parsed.path.clone(),
                    item.position,
                    RefHead::Name(local.to_string()),
                    Vec::new(),
                )
                .with_context(context),
            );
        }
    }
}

fn is_field(parent: &Node, field: &str, node: &Node) -> bool {
    parent
        .child_by_field_name(field)
        .is_some_and(|child| child.id() == node.id())
}

/// Not the object of an enclosing attribute access.
fn is_maximal(node: &Node) -> bool {
    match node.parent() {
        Some(parent) if parent.kind() == "attribute" => !is_field(&parent, "object", node),
        _ => true,
    }
}

/// Identifiers that name a value, as opposed to declaring a name.
fn is_reference_identifier(node: &Node) -> bool {
    let Some(parent) = node.parent() else {
        return true;
    };
    match parent.kind() {
        "attribute" => !is_field(&parent, "attribute", node),
        "function_definition" | "class_definition" | "keyword_argument" | "default_parameter"
        | "typed_default_parameter" => !is_field(&parent, "name", node),
        "parameters" | "lambda_parameters" | "typed_parameter" | "list_splat_pattern"
        | "dictionary_splat_pattern" | "global_statement" | "nonlocal_statement"
        | "dotted_name" | "aliased_import" => false,
        _ => true,
    }
}

/// Split a maximal chain into its head and trailing attribute names.
fn split_chain(node: &Node, source: &str) -> Option<(RefHead, Vec<String>)> {
    match node.kind() {
        "identifier" => Some((RefHead::Name(node_text(node, source).to_string()), Vec::new())),
        "attribute" => {
            let object = node.child_by_field_name("object")?;
            let attribute = node.child_by_field_name("attribute")?;
            let (head, mut attrs) = match object.kind() {
                "identifier" | "attribute" => split_chain(&object, source)?,
                "call" => {
                    let callee = name_chain(&object.child_by_field_name("function")?, source)?;
                    (RefHead::CallResult(callee), Vec::new())
                }
                _ => return None,
            };
            attrs.push(node_text(&attribute, source).to_string());
            Some((head, attrs))
        }
        _ => None,
    }
}

fn context_of(node: &Node) -> RefContext {
    let Some(parent) = node.parent() else {
        return RefContext::Load;
    };
    match parent.kind() {
        "call" if is_field(&parent, "function", node) => RefContext::Call,
        "decorator" => RefContext::Call,
        "assignment" | "augmented_assignment" if is_field(&parent, "left", node) => {
            RefContext::Store
        }
        "for_statement" | "for_in_clause" if is_field(&parent, "left", node) => RefContext::Store,
        "pattern_list" | "tuple_pattern" | "list_pattern" => RefContext::Store,
        "delete_statement" => RefContext::Delete,
        "expression_list"
            if parent
                .parent()
                .is_some_and(|p| p.kind() == "delete_statement") =>
        {
            RefContext::Delete
        }
        "type" => RefContext::Annotation,
        "argument_list"
            if parent
                .parent()
                .is_some_and(|p| p.kind() == "class_definition") =>
        {
            RefContext::ClassBase
        }
        _ => RefContext::Load,
    }
}

/// Names bound locally anywhere in the file; these shadow wildcard imports.
fn local_names(node: Node, source: &str, out: &mut HashSet<String>) {
    match node.kind() {
        "function_definition" | "class_definition" | "default_parameter"
        | "typed_default_parameter" => {
            if let Some(name) = node.child_by_field_name("name") {
                out.insert(node_text(&name, source).to_string());
            }
        }
        "assignment" | "augmented_assignment" | "for_statement" | "for_in_clause" => {
            if let Some(left) = node.child_by_field_name("left") {
                binding_targets(&left, source, out);
            }
        }
        "parameters" | "lambda_parameters" | "typed_parameter" | "list_splat_pattern"
        | "dictionary_splat_pattern" | "as_pattern_target" => {
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                if child.kind() == "identifier" {
                    out.insert(node_text(&child, source).to_string());
                }
            }
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        local_names(child, source, out);
    }
}

fn is_comprehension_kind(kind: &str) -> bool {
    matches!(
        kind,
        "list_comprehension" | "set_comprehension" | "dictionary_comprehension" | "generator_expression"
    )
}

fn is_comprehension(node: &Node) -> bool {
    is_comprehension_kind(node.kind())
}

/// Names declared by a `parameters` or `lambda_parameters` node.
fn parameter_names(node: Node, source: &str, out: &mut HashSet<String>) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "identifier" => {
                out.insert(node_text(&child, source).to_string());
            }
            "default_parameter" | "typed_default_parameter" => {
                if let Some(name) = child.child_by_field_name("name") {
                    out.insert(node_text(&name, source).to_string());
                }
            }
            "typed_parameter" | "list_splat_pattern" | "dictionary_splat_pattern" => {
                parameter_names(child, source, out);
            }
            _ => {}
        }
    }
}

/// What the statements of one scope bind, without entering nested function,
/// lambda, class or comprehension scopes. Class bodies are skipped entirely:
/// their names are not visible from methods.
fn scope_bindings(node: Node, source: &str, imports: &FileImports, scope: &mut Scope) {
    match node.kind() {
        "function_definition" | "class_definition" => {
            if let Some(name) = node.child_by_field_name("name") {
                scope.shadowing.insert(node_text(&name, source).to_string());
            }
            return;
        }
        "lambda" => return,
        kind if is_comprehension_kind(kind) => return,
        "import_statement" | "import_from_statement" => {
            for item in parse_import(&node, source, "") {
                if let Some(local) = item.local_name() {
                    scope.tracked.insert(local.to_string());
                }
            }
            return;
        }
        "assignment" => match assignment_binding(&node, source, imports) {
            Some((local, _)) => {
                scope.tracked.insert(local.to_string());
            }
            None => {
                if let Some(left) = node.child_by_field_name("left") {
                    binding_targets(&left, source, &mut scope.shadowing);
                }
            }
        },
        "augmented_assignment" | "for_statement" => {
            if let Some(left) = node.child_by_field_name("left") {
                binding_targets(&left, source, &mut scope.shadowing);
            }
        }
        "named_expression" => {
            if let Some(name) = node.child_by_field_name("name") {
                scope.shadowing.insert(node_text(&name, source).to_string());
            }
        }
        "as_pattern_target" => binding_targets(&node, source, &mut scope.shadowing),
        "except_clause" => {
            if let Some(alias) = node.child_by_field_name("alias") {
                binding_targets(&alias, source, &mut scope.shadowing);
            }
        }
        "global_statement" | "nonlocal_statement" => {
            let mut cursor = node.walk();
            for name in node.named_children(&mut cursor) {
                scope.declared.insert(node_text(&name, source).to_string());
            }
            return;
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        scope_bindings(child, source, imports, scope);
    }
}

/// Module names that functions rebind through `global` declarations.
fn global_rebinds(node: Node, source: &str, imports: &FileImports, out: &mut HashSet<String>) {
    if node.kind() == "function_definition" {
        if let Some(body) = node.child_by_field_name("body") {
            let mut scope = Scope::default();
            scope_bindings(body, source, imports, &mut scope);
            out.extend(scope.declared.intersection(&scope.shadowing).cloned());
        }
    }
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        global_rebinds(child, source, imports, out);
    }
}

fn binding_targets(node: &Node, source: &str, out: &mut HashSet<String>) {
    match node.kind() {
        "identifier" => {
            out.insert(node_text(node, source).to_string());
        }
        "pattern_list" | "tuple_pattern" | "list_pattern" | "list_splat_pattern"
        | "as_pattern_target" => {
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                binding_targets(&child, source, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::imports::collect_imports;
    use crate::parser::parse_snippet;

    fn collect(source: &str) -> Vec<Reference> {
        collect_with(source, &HashSet::new())
    }

    fn collect_with(source: &str, reexported: &HashSet<String>) -> Vec<Reference> {
        let parsed = parse_snippet("/p/client.py", source);
        let imports = collect_imports(&parsed, "");
        collect_references(&parsed, &imports, reexported)
    }

    fn summary(references: &[Reference]) -> Vec<(String, RefContext, usize)> {
        references
            .iter()
            .map(|r| (r.written(), r.context, r.position.line))
            .collect()
    }

    #[test]
    fn test_scenario_references() {
        let references = collect(
            r#"from src.pkg1 import pkg2

pkg2.some_function()
obj = pkg2.SampleClass()
obj.method()
if 42 == pkg2.SOME_CONSTANT:
    pass
"#,
        );
        assert_eq!(
            summary(&references),
            vec![
                ("pkg2.some_function".to_string(), RefContext::Call, 3),
                ("pkg2.SampleClass".to_string(), RefContext::Call, 4),
                ("obj.method".to_string(), RefContext::Call, 5),
                ("pkg2.SOME_CONSTANT".to_string(), RefContext::Load, 6),
            ]
        );
    }

    #[test]
    fn test_call_result_chain() {
        let references = collect("import pkg\npkg.Klass().run()\n");
        assert_eq!(
            summary(&references),
            vec![
                ("pkg.Klass().run".to_string(), RefContext::Call, 2),
                ("pkg.Klass".to_string(), RefContext::Call, 2),
            ]
        );
    }

    #[test]
    fn test_contexts() {
        let references = collect(
            r#"import pkg

class Child(pkg.Base):
    pass

def f(x: pkg.Type, pkg_value=pkg.DEFAULT) -> pkg.Result:
    pass

pkg.counter = 1
del pkg.cache

@pkg.decorator
def g():
    pass
"#,
        );
        let contexts: Vec<(String, RefContext)> =
            references.iter().map(|r| (r.written(), r.context)).collect();
        assert!(contexts.contains(&("pkg.Base".to_string(), RefContext::ClassBase)));
        assert!(contexts.contains(&("pkg.Type".to_string(), RefContext::Annotation)));
        assert!(contexts.contains(&("pkg.DEFAULT".to_string(), RefContext::Load)));
        assert!(contexts.contains(&("pkg.Result".to_string(), RefContext::Annotation)));
        assert!(contexts.contains(&("pkg.counter".to_string(), RefContext::Store)));
        assert!(contexts.contains(&("pkg.cache".to_string(), RefContext::Delete)));
        assert!(contexts.contains(&("pkg.decorator".to_string(), RefContext::Call)));
        assert_eq!(references.len(), 7);
    }

    #[test]
    fn test_untracked_names_are_ignored() {
        let references = collect("import os\nx = compute()\nprint(x.value)\nos.getcwd()\n");
        assert_eq!(summary(&references), vec![("os.getcwd".to_string(), RefContext::Call, 4)]);
    }

    #[test]
    fn test_reflective_access() {
        let references = collect(
            "import pkg\nv = getattr(pkg, 'VALUE')\nsetattr(pkg, 'flag', True)\nhasattr(pkg, name)\n",
        );
        assert_eq!(references.len(), 3);
        assert_eq!(references[0].written(), "pkg.VALUE");
        assert_eq!(
            references[0].dynamic,
            Some(DynamicAccess {
                function: "getattr".to_string(),
                literal: true,
            })
        );
        assert_eq!(references[1].context, RefContext::Store);
        assert_eq!(references[2].written(), "pkg");
        assert!(!references[2].dynamic.as_ref().unwrap().literal);
    }

    #[test]
    fn test_import_only_and_reexport_sites() {
        let reexported: HashSet<String> = ["exposed".to_string()].into_iter().collect();
        let references = collect_with(
            "from pkg import unused, used, exposed\nused()\n",
            &reexported,
        );
        assert_eq!(
            summary(&references),
            vec![
                ("used".to_string(), RefContext::Call, 2),
                ("unused".to_string(), RefContext::ImportOnly, 1),
                ("exposed".to_string(), RefContext::ReExport, 1),
            ]
        );
    }

    #[test]
    fn test_wildcard_free_names() {
        let references = collect(
            "from pkg import *\n\ndef local():\n    pass\n\nhelper()\nlocal()\nprint(len([]))\n",
        );
        assert_eq!(summary(&references), vec![("helper".to_string(), RefContext::Call, 6)]);
    }

    #[test]
    fn test_function_locals_shadow_imports() {
        let references = collect(
            r#"import pkg

def go(pkg):
    pkg.run()

def loop(items):
    for pkg in items:
        pkg.run()
    return [pkg.name for pkg in items]

def uses_global():
    global pkg
    pkg = None
    pkg.run()

handler = lambda pkg: pkg.run()
pkg.start()
"#,
        );
        assert_eq!(
            summary(&references),
            vec![
                ("pkg.run".to_string(), RefContext::Call, 14),
                ("pkg.start".to_string(), RefContext::Call, 17),
            ]
        );
        // `global pkg` rebinds the module-level name.
        assert!(references.iter().all(|r| r.rebound));
    }

    #[test]
    fn test_defaults_and_annotations_see_enclosing_scope() {
        let references = collect("import pkg

def f(pkg: pkg.Type = pkg.DEFAULT):
    pkg.run()
");
        assert_eq!(
            summary(&references),
            vec![
                ("pkg.Type".to_string(), RefContext::Annotation, 3),
                ("pkg.DEFAULT".to_string(), RefContext::Load, 3),
            ]
        );
    }

    #[test]
    fn test_module_level_rebinding_is_flagged() {
        let references = collect("import pkg

pkg.setup()
for pkg in []:
    pkg.run()
");
        let flagged: Vec<(String, bool)> =
            references.iter().map(|r| (r.written(), r.rebound)).collect();
        assert_eq!(
            flagged,
            vec![("pkg.setup".to_string(), true), ("pkg.run".to_string(), true)]
        );
    }

    #[test]
    fn test_local_import_and_alias_are_tracked() {
        let references = collect(
            "def f(pkg):
    import pkg
    pkg.run()

def g():
    from pkg import Klass
    obj = Klass()
    obj.method()
",
        );
        let written: Vec<String> = references.iter().map(|r| r.written()).collect();
        assert_eq!(written, vec!["pkg.run", "Klass", "obj.method"]);
        assert!(references[0].rebound);
        assert!(!references[2].rebound);
    }

    #[test]
    fn test_rebinding_is_not_a_use() {
        let references = collect("from pkg import thing\nthing = 3\n");
        assert_eq!(
            summary(&references),
            vec![("thing".to_string(), RefContext::ImportOnly, 1)]
        );
    }
}
