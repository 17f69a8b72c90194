//! AST parser (C2): lazy, per-language tree-sitter grammar loading with a
//! fail-closed contract — a missing or incompatible grammar demotes the
//! caller to fallback chunking, it never crashes the pipeline.
//!
//! Generalizes a JS/TS-only grammar selector to the nine grammars declared
//! as optional dependencies, with lazy per-language parser caching.

use crate::model::ChunkKind;
use std::collections::HashMap;
use std::sync::Mutex;

#[cfg(feature = "treesitter")]
use tree_sitter::{Language, Node, Parser, Tree};

/// A structural node extracted from a parse tree.
#[derive(Debug, Clone)]
pub struct ParsedNode {
    pub kind: ChunkKind,
    pub name: Option<String>,
    pub start_line: usize,
    pub end_line: usize,
    pub start_column: usize,
    pub end_column: usize,
    pub text: String,
    pub children: Vec<ParsedNode>,
    pub docstring: Option<String>,
    pub scope: Vec<String>,
}

#[cfg(feature = "treesitter")]
static LANGUAGE_CACHE: Mutex<Option<HashMap<String, Option<Language>>>> = Mutex::new(None);

#[cfg(feature = "treesitter")]
fn grammar_for(language: &str) -> Option<Language> {
    let mut guard = LANGUAGE_CACHE.lock().unwrap();
    let cache = guard.get_or_insert_with(HashMap::new);
    if let Some(cached) = cache.get(language) {
        return *cached;
    }
    let resolved = match language {
        "javascript" => Some(tree_sitter_javascript::language()),
        "typescript" => Some(tree_sitter_typescript::language_typescript()),
        "rust" => Some(tree_sitter_rust::language()),
        "python" => Some(tree_sitter_python::language()),
        "go" => Some(tree_sitter_go::language()),
        "java" => Some(tree_sitter_java::language()),
        "c" => Some(tree_sitter_c::language()),
        "cpp" => Some(tree_sitter_cpp::language()),
        "csharp" => Some(tree_sitter_c_sharp::language()),
        _ => None,
    };
    cache.insert(language.to_string(), resolved);
    resolved
}

#[cfg(not(feature = "treesitter"))]
fn grammar_for(_language: &str) -> Option<()> {
    None
}

/// Parse `source` as `language`. Returns `None` if the grammar is
/// unavailable or parsing fails — callers must fall back to deterministic
/// chunking rather than treat this as fatal.
#[cfg(feature = "treesitter")]
pub fn parse(source: &str, language: &str) -> Option<Tree> {
    let grammar = grammar_for(language)?;
    let mut parser = Parser::new();
    parser.set_language(grammar).ok()?;
    parser.parse(source, None)
}

#[cfg(not(feature = "treesitter"))]
pub fn parse(_source: &str, _language: &str) -> Option<()> {
    None
}

/// Map a per-language raw node kind to the canonical `type` enum.
fn normalize_node_kind(language: &str, raw: &str) -> Option<ChunkKind> {
    match (language, raw) {
        (_, "function_declaration") | (_, "function_item") | (_, "function_definition") => {
            Some(ChunkKind::Function)
        }
        (_, "method_definition") | (_, "method_declaration") => Some(ChunkKind::Method),
        (_, "class_declaration") | (_, "class_definition") | (_, "struct_item") => {
            Some(ChunkKind::Class)
        }
        (_, "interface_declaration") | (_, "trait_item") => Some(ChunkKind::Interface),
        (_, "type_alias_declaration") | (_, "type_item") => Some(ChunkKind::Type),
        (_, "enum_declaration") | (_, "enum_item") => Some(ChunkKind::Enum),
        (_, "module") | (_, "mod_item") | (_, "namespace_declaration") => Some(ChunkKind::Module),
        _ => None,
    }
}

#[cfg(feature = "treesitter")]
pub fn extract_nodes(tree: &Tree, source: &str, language: &str) -> Vec<ParsedNode> {
    let mut out = Vec::new();
    let mut cursor = tree.root_node().walk();
    for child in tree.root_node().children(&mut cursor) {
        if let Some(node) = node_from(source, language, child) {
            out.push(node);
        }
    }
    out
}

#[cfg(feature = "treesitter")]
fn node_from(source: &str, language: &str, node: Node) -> Option<ParsedNode> {
    // An `export_statement` carries its real declaration (function, class,
    // ...) as a `declaration` field child; classify and name off that inner
    // node, but keep the outer node's text/line span so the leading
    // `export` keyword stays visible to the exported-ness heuristic.
    if node.kind() == "export_statement" {
        let inner = node.child_by_field_name("declaration")?;
        return node_from(source, language, inner).map(|mut parsed| {
            parsed.start_line = node.start_position().row + 1;
            parsed.end_line = node.end_position().row + 1;
            parsed.start_column = node.start_position().column;
            parsed.end_column = node.end_position().column;
            if let Some(text) = source.get(node.start_byte()..node.end_byte()) {
                parsed.text = text.to_string();
            }
            parsed
        });
    }

    // `arrow_function` bound to a variable is classified as `function`
    //; `lexical_declaration` directly under a class body is a method.
    let kind = if node.kind() == "lexical_declaration" && is_inside_class_body(node) {
        ChunkKind::Method
    } else if node.kind() == "variable_declarator" && contains_arrow_function(node) {
        ChunkKind::Function
    } else {
        normalize_node_kind(language, node.kind())?
    };

    let start = node.start_byte();
    let end = node.end_byte();
    let text = source.get(start..end)?.to_string();
    let name = node
        .child_by_field_name("name")
        .and_then(|n| source.get(n.start_byte()..n.end_byte()))
        .map(|s| s.to_string());

    let docstring = leading_comment(source, node);

    let mut children = Vec::new();
    if matches!(kind, ChunkKind::Class) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if let Some(parsed_child) = node_from(source, language, child) {
                children.push(parsed_child);
            }
        }
    }

    Some(ParsedNode {
        kind,
        name,
        start_line: node.start_position().row + 1,
        end_line: node.end_position().row + 1,
        start_column: node.start_position().column,
        end_column: node.end_position().column,
        text,
        children,
        docstring,
        scope: Vec::new(),
    })
}

#[cfg(feature = "treesitter")]
fn is_inside_class_body(node: Node) -> bool {
    node.parent()
        .map(|p| p.kind() == "class_body")
        .unwrap_or(false)
}

#[cfg(feature = "treesitter")]
fn contains_arrow_function(node: Node) -> bool {
    let mut cursor = node.walk();
    node.children(&mut cursor).any(|c| c.kind() == "arrow_function")
}

/// Leading block/line comment immediately preceding `node`, used as a
/// docstring for languages where comments serve that role.
#[cfg(feature = "treesitter")]
fn leading_comment(source: &str, node: Node) -> Option<String> {
    let prev = node.prev_sibling()?;
    if prev.kind() != "comment" {
        return None;
    }
    // Require adjacency: no blank line between the comment and the node.
    if node.start_position().row.saturating_sub(prev.end_position().row) > 1 {
        return None;
    }
    source
        .get(prev.start_byte()..prev.end_byte())
        .map(|s| s.trim().to_string())
}

#[cfg(all(test, feature = "treesitter"))]
mod tests {
    use super::*;

    #[test]
    fn parses_rust_function_declaration() {
        let source = "fn hello() -> i32 { 1 }";
        let tree = parse(source, "rust").expect("rust grammar available");
        let nodes = extract_nodes(&tree, source, "rust");
        assert!(nodes.iter().any(|n| matches!(n.kind, ChunkKind::Function)));
    }

    #[test]
    fn unknown_language_fails_closed() {
        assert!(parse("fn x() {}", "cobol").is_none());
    }
}
