use tree_sitter::Node;

/// Macro to define a thread-local parser with a given language.
/// Usage: `define_parser!(PARSER_NAME, language_fn)`
#[macro_export]
macro_rules! define_parser {
    ($name:ident, $language:expr) => {
        thread_local! {
            static $name: std::cell::RefCell<tree_sitter::Parser> = std::cell::RefCell::new({
                let mut parser = tree_sitter::Parser::new();
                parser.set_language(&$language.into()).expect(concat!("Failed to set ", stringify!($name), " language"));
                parser
            });
        }
    };
}

/// Source text of a node, or an empty string for invalid UTF-8.
pub fn node_text<'s>(node: &Node, source: &'s str) -> &'s str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

/// Value of a plain (non-interpolated) string literal.
/// Implicitly concatenated literals (`"a" "b"`) are joined.
pub fn string_literal_value(node: &Node, source: &str) -> Option<String> {
    match node.kind() {
        "string" => {
            let mut value = String::new();
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                match child.kind() {
                    "string_content" => value.push_str(node_text(&child, source)),
                    "interpolation" => return None,
                    _ => {}
                }
            }
            Some(value)
        }
        "concatenated_string" => {
            let mut value = String::new();
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                value.push_str(&string_literal_value(&child, source)?);
            }
            Some(value)
        }
        "parenthesized_expression" => {
            let inner = node.named_child(0)?;
            string_literal_value(&inner, source)
        }
        _ => None,
    }
}

/// Docstring of a function/class/module body: its first statement, if that
/// statement is a bare string literal.
pub fn docstring(body: &Node, source: &str) -> Option<String> {
    let mut cursor = body.walk();
    let first = body.named_children(&mut cursor).find(|n| n.kind() != "comment")?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let expr = first.named_child(0)?;
    let text = string_literal_value(&expr, source)?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// First `ERROR` or missing node in depth-first order.
pub fn first_error<'t>(node: Node<'t>) -> Option<Node<'t>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if let Some(found) = first_error(child) {
            return Some(found);
        }
    }
    None
}

/// Flatten an `identifier` / `attribute` / `dotted_name` node into its names.
/// Returns `None` when the chain is rooted in anything other than a name.
pub fn name_chain(node: &Node, source: &str) -> Option<Vec<String>> {
    match node.kind() {
        "identifier" => Some(vec![node_text(node, source).to_string()]),
        "dotted_name" => {
            let mut cursor = node.walk();
            let parts: Vec<String> = node
                .named_children(&mut cursor)
                .map(|n| node_text(&n, source).to_string())
                .collect();
            if parts.is_empty() { None } else { Some(parts) }
        }
        "attribute" => {
            let object = node.child_by_field_name("object")?;
            let attribute = node.child_by_field_name("attribute")?;
            let mut chain = name_chain(&object, source)?;
            chain.push(node_text(&attribute, source).to_string());
            Some(chain)
        }
        _ => None,
    }
}
