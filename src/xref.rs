//! Cross-reference tracker (C8): definitions and call sites keyed by name,
//! never by object identity.
//!
//! Definitions and call sites are extracted per file and merged into
//! forward/reverse `BTreeMap` adjacency lists, keyed by name rather than
//! any parse-tree object identity.

use crate::ast::ParsedNode;
use crate::model::{CallSite, Definition, DefinitionKind};
use std::collections::BTreeMap;

/// Method/collection calls common enough across languages to be noise
/// rather than signal.
const BUILTIN_CALL_BLACKLIST: &[&str] = &[
    "push", "pop", "shift", "unshift", "slice", "splice", "map", "filter", "reduce", "forEach",
    "join", "split", "toString", "to_string", "len", "length", "println", "print", "log", "debug",
    "clone", "unwrap", "expect", "into", "from", "iter", "collect",
];

#[derive(Debug, Clone, Default)]
pub struct XrefGraph {
    definitions: BTreeMap<(String, String), Definition>,
    /// callee name -> call sites whose callee is that name (forward).
    forward: BTreeMap<String, Vec<CallSite>>,
    /// caller name -> call sites whose caller is that name (reverse).
    reverse: BTreeMap<String, Vec<CallSite>>,
}

pub struct ExtractionResult {
    pub definitions: Vec<Definition>,
    pub calls: Vec<CallSite>,
}

impl XrefGraph {
    /// Remove every definition/call site belonging to `file_path`, ahead of
    /// re-ingesting it (called by the pipeline before `ingest_file`).
    pub fn remove_file(&mut self, file_path: &str) {
        self.definitions.retain(|(path, _), _| path != file_path);
        self.forward
            .values_mut()
            .for_each(|sites| sites.retain(|c| c.file_path != file_path));
        self.reverse
            .values_mut()
            .for_each(|sites| sites.retain(|c| c.file_path != file_path));
        self.forward.retain(|_, sites| !sites.is_empty());
        self.reverse.retain(|_, sites| !sites.is_empty());
    }

    pub fn ingest_file(&mut self, file_path: &str, result: ExtractionResult) {
        for definition in result.definitions {
            self.definitions
                .insert((file_path.to_string(), definition.name.clone()), definition);
        }
        for call in result.calls {
            self.forward.entry(call.callee.clone()).or_default().push(call.clone());
            self.reverse.entry(call.caller.clone()).or_default().push(call);
        }
    }

    pub fn get_callers(&self, name: &str) -> Vec<CallSite> {
        self.forward.get(name).cloned().unwrap_or_default()
    }

    pub fn get_callees(&self, name: &str) -> Vec<CallSite> {
        self.reverse.get(name).cloned().unwrap_or_default()
    }

    pub fn definition_count(&self) -> usize {
        self.definitions.len()
    }
}

/// Extract definitions and call sites from the top-level parsed nodes of one
/// file. Every function/method/class declaration becomes a
/// `Definition`; identifier calls and `x.method()` property calls inside it
/// become `CallSite`s, with built-ins filtered.
pub fn extract(file_path: &str, source: &str, nodes: &[ParsedNode]) -> ExtractionResult {
    let mut definitions = Vec::new();
    let mut calls = Vec::new();

    for node in nodes {
        let Some(kind) = definition_kind(node.kind) else {
            continue;
        };
        let Some(name) = node.name.clone() else {
            continue;
        };

        let exported = is_exported(&node.text);
        let found_calls = find_calls(&name, file_path, &node.text, node.start_line);
        let callee_names: Vec<String> = found_calls.iter().map(|c| c.callee.clone()).collect();

        definitions.push(Definition {
            name,
            file_path: file_path.to_string(),
            kind,
            start_line: node.start_line,
            end_line: node.end_line,
            calls: callee_names,
            exported,
        });
        calls.extend(found_calls);

        if kind == DefinitionKind::Class {
            for method in &node.children {
                let Some(method_name) = method.name.clone() else {
                    continue;
                };
                let method_calls = find_calls(&method_name, file_path, &method.text, method.start_line);
                let method_callee_names: Vec<String> = method_calls.iter().map(|c| c.callee.clone()).collect();
                definitions.push(Definition {
                    name: method_name,
                    file_path: file_path.to_string(),
                    kind: DefinitionKind::Method,
                    start_line: method.start_line,
                    end_line: method.end_line,
                    calls: method_callee_names,
                    exported,
                });
                calls.extend(method_calls);
            }
        }
    }

    let _ = source;
    ExtractionResult { definitions, calls }
}

fn definition_kind(kind: crate::model::ChunkKind) -> Option<DefinitionKind> {
    use crate::model::ChunkKind;
    match kind {
        ChunkKind::Function => Some(DefinitionKind::Function),
        ChunkKind::Method => Some(DefinitionKind::Method),
        ChunkKind::Class => Some(DefinitionKind::Class),
        ChunkKind::Interface => Some(DefinitionKind::Interface),
        _ => None,
    }
}

fn is_exported(text: &str) -> bool {
    let trimmed = text.trim_start();
    trimmed.starts_with("export ")
        || trimmed.starts_with("pub ")
        || trimmed.starts_with("pub(")
        || text.contains("__all__")
        || text
            .lines()
            .next()
            .map(|l| l.chars().next().map(|c| c.is_uppercase()).unwrap_or(false))
            .unwrap_or(false)
}

/// Scan `body` for `identifier(` and `x.identifier(` call expressions,
/// recording direct calls and method calls (`isMethodCall=true`) alike.
fn find_calls(caller: &str, file_path: &str, body: &str, start_line: usize) -> Vec<CallSite> {
    let mut out = Vec::new();
    let chars: Vec<char> = body.chars().collect();
    let mut i = 0usize;
    let mut line = start_line;

    while i < chars.len() {
        if chars[i] == '\n' {
            line += 1;
            i += 1;
            continue;
        }
        if chars[i].is_alphabetic() || chars[i] == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            let mut j = i;
            while j < chars.len() && chars[j] == ' ' {
                j += 1;
            }
            let is_call = j < chars.len() && chars[j] == '(';
            let is_method_call = start > 0 && chars[start - 1] == '.';

            if is_call && !is_keyword(&word) && !BUILTIN_CALL_BLACKLIST.contains(&word.as_str()) {
                out.push(CallSite {
                    caller: caller.to_string(),
                    callee: word,
                    file_path: file_path.to_string(),
                    line,
                    is_method_call,
                });
            }
            continue;
        }
        i += 1;
    }

    out
}

fn is_keyword(word: &str) -> bool {
    matches!(
        word,
        "if" | "for" | "while" | "switch" | "catch" | "function" | "return" | "match" | "fn"
            | "let" | "const" | "var" | "else" | "def" | "class"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ChunkKind;

    fn node(kind: ChunkKind, name: &str, text: &str, start_line: usize, end_line: usize) -> ParsedNode {
        ParsedNode {
            kind,
            name: Some(name.to_string()),
            start_line,
            end_line,
            start_column: 0,
            end_column: 0,
            text: text.to_string(),
            children: Vec::new(),
            docstring: None,
            scope: Vec::new(),
        }
    }

    #[test]
    fn finds_direct_call_and_tracks_caller_and_callee() {
        let nodes = vec![
            node(ChunkKind::Function, "main", "function main() {\n  helper();\n}", 1, 3),
        ];
        let result = extract("a.ts", "", &nodes);
        assert_eq!(result.definitions.len(), 1);
        assert!(result.calls.iter().any(|c| c.caller == "main" && c.callee == "helper"));
    }

    #[test]
    fn method_call_is_flagged() {
        let nodes = vec![node(
            ChunkKind::Function,
            "run",
            "function run() {\n  obj.execute();\n}",
            1,
            3,
        )];
        let result = extract("a.ts", "", &nodes);
        let call = result.calls.iter().find(|c| c.callee == "execute").unwrap();
        assert!(call.is_method_call);
    }

    #[test]
    fn xref_graph_queries_are_stable_across_runs() {
        let mut graph = XrefGraph::default();
        let nodes = vec![node(ChunkKind::Function, "main", "function main() {\n  helper();\n}", 1, 3)];
        let result = extract("a.ts", "", &nodes);
        graph.ingest_file("a.ts", result);

        let callers_of_helper = graph.get_callers("helper");
        assert_eq!(callers_of_helper.len(), 1);
        assert_eq!(callers_of_helper[0].caller, "main");
    }
}
