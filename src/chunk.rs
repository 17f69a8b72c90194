//! Semantic chunker (C3): AST-driven chunk emission with a deterministic
//! line-window fallback, large-chunk splitting, and file-context enrichment.
//!
//! Buffers chunk emission the same way a document chunker would, generalized
//! to declaration-oriented chunk kinds, with an overlap-window split for
//! any chunk that still exceeds the token budget.

use crate::ast::{self, ParsedNode};
use crate::model::{Chunk, ChunkKind};
use crate::util::{chunk_id, estimate_tokens};

pub struct ChunkOptions {
    pub max_chunk_tokens: usize,
    pub min_chunk_lines: usize,
    pub chunk_overlap_ratio: f32,
}

/// Split `source` (already known to be `language`) into chunks for one file.
/// Tries the AST path first; demotes to the fallback line-window path if no
/// grammar is available or the AST yields nothing usable.
pub fn chunk_file(
    relative_path: &str,
    file_path: &str,
    language: &str,
    source: &str,
    options: &ChunkOptions,
    now_ms: u64,
) -> Vec<Chunk> {
    if source.trim().is_empty() {
        return Vec::new();
    }

    let lines: Vec<&str> = source.lines().collect();

    let ast_chunks = ast::parse(source, language).map(|tree| {
        let nodes = extract(&tree, source, language);
        build_from_nodes(relative_path, file_path, language, source, &lines, &nodes, options, now_ms)
    });

    let mut chunks = match ast_chunks {
        Some(chunks) if !chunks.is_empty() => chunks,
        _ => fallback_chunks(relative_path, file_path, language, &lines, options, now_ms),
    };

    enrich_with_file_context(&mut chunks, relative_path, &lines);
    chunks
}

#[cfg(feature = "treesitter")]
fn extract(tree: &tree_sitter::Tree, source: &str, language: &str) -> Vec<ParsedNode> {
    ast::extract_nodes(tree, source, language)
}

#[cfg(not(feature = "treesitter"))]
fn extract(_tree: &(), _source: &str, _language: &str) -> Vec<ParsedNode> {
    Vec::new()
}

const CANONICAL_AST_KINDS: &[ChunkKind] = &[
    ChunkKind::Function,
    ChunkKind::Method,
    ChunkKind::Class,
    ChunkKind::Interface,
    ChunkKind::Type,
    ChunkKind::Enum,
    ChunkKind::Module,
    ChunkKind::Export,
];

fn build_from_nodes(
    relative_path: &str,
    file_path: &str,
    language: &str,
    source: &str,
    lines: &[&str],
    nodes: &[ParsedNode],
    options: &ChunkOptions,
    now_ms: u64,
) -> Vec<Chunk> {
    let mut out = Vec::new();

    for node in nodes {
        if !CANONICAL_AST_KINDS.contains(&node.kind) {
            continue;
        }

        if node.kind == ChunkKind::Class {
            let header_end = node
                .children
                .first()
                .map(|c| c.start_line.saturating_sub(1).max(node.start_line))
                .unwrap_or(node.end_line);
            let header_code = slice_lines(lines, node.start_line, header_end);
            push_with_splitting(
                &mut out,
                relative_path,
                file_path,
                language,
                node.kind,
                node.name.clone(),
                node.name.clone().unwrap_or_default(),
                node.start_line,
                header_end,
                &header_code,
                node.docstring.clone(),
                options,
                now_ms,
            );

            for method in &node.children {
                let scope = format!(
                    "{}:{}",
                    node.name.clone().unwrap_or_default(),
                    method.name.clone().unwrap_or_default()
                );
                let code = slice_lines(lines, method.start_line, method.end_line);
                push_with_splitting(
                    &mut out,
                    relative_path,
                    file_path,
                    language,
                    ChunkKind::Method,
                    method.name.clone(),
                    scope,
                    method.start_line,
                    method.end_line,
                    &code,
                    method.docstring.clone(),
                    options,
                    now_ms,
                );
            }
            continue;
        }

        let code = slice_lines(lines, node.start_line, node.end_line);
        push_with_splitting(
            &mut out,
            relative_path,
            file_path,
            language,
            node.kind,
            node.name.clone(),
            node.name.clone().unwrap_or_default(),
            node.start_line,
            node.end_line,
            &code,
            node.docstring.clone(),
            options,
            now_ms,
        );
    }

    let _ = source;
    out
}

#[allow(clippy::too_many_arguments)]
fn push_with_splitting(
    out: &mut Vec<Chunk>,
    relative_path: &str,
    file_path: &str,
    language: &str,
    kind: ChunkKind,
    name: Option<String>,
    scope: String,
    start_line: usize,
    end_line: usize,
    code: &str,
    docstring: Option<String>,
    options: &ChunkOptions,
    now_ms: u64,
) {
    let token_estimate = estimate_tokens(code);
    if token_estimate <= options.max_chunk_tokens {
        out.push(make_chunk(
            relative_path,
            file_path,
            language,
            kind,
            name,
            scope,
            start_line,
            end_line,
            code.to_string(),
            docstring,
            now_ms,
        ));
        return;
    }

    // Large-chunk splitting: ordered sub-chunks by line, each under the
    // token budget, overlapping by chunkOverlapRatio.
    let code_lines: Vec<&str> = code.lines().collect();
    let overlap = ((options.max_chunk_tokens as f32) * options.chunk_overlap_ratio) as usize;
    let approx_lines_per_chunk = (options.max_chunk_tokens * 4 / average_line_len(&code_lines).max(1)).max(1);
    let overlap_lines = (overlap * 4 / average_line_len(&code_lines).max(1)).min(approx_lines_per_chunk.saturating_sub(1));

    let mut part = 1;
    let mut cursor = 0usize;
    while cursor < code_lines.len() {
        let end = (cursor + approx_lines_per_chunk).min(code_lines.len());
        let part_code = code_lines[cursor..end].join("\n");
        let part_start = start_line + cursor;
        let part_end = start_line + end - 1;
        let part_name = name.as_ref().map(|n| format!("{n}_part{part}"));
        out.push(make_chunk(
            relative_path,
            file_path,
            language,
            kind,
            part_name,
            scope.clone(),
            part_start,
            part_end,
            part_code,
            if part == 1 { docstring.clone() } else { None },
            now_ms,
        ));
        if end >= code_lines.len() {
            break;
        }
        cursor = end.saturating_sub(overlap_lines).max(cursor + 1);
        part += 1;
    }
}

fn average_line_len(lines: &[&str]) -> usize {
    if lines.is_empty() {
        return 1;
    }
    let total: usize = lines.iter().map(|l| l.len()).sum();
    (total / lines.len()).max(1)
}

#[allow(clippy::too_many_arguments)]
fn make_chunk(
    relative_path: &str,
    file_path: &str,
    language: &str,
    kind: ChunkKind,
    name: Option<String>,
    scope: String,
    start_line: usize,
    end_line: usize,
    code: String,
    docstring: Option<String>,
    now_ms: u64,
) -> Chunk {
    let normalized = normalize_for_id(&code);
    let id = chunk_id(relative_path, start_line, end_line, &normalized);
    let token_estimate = estimate_tokens(&code);
    let content_hash = crate::util::sha256_hex(code.as_bytes());
    Chunk {
        id,
        file_path: file_path.to_string(),
        relative_path: relative_path.to_string(),
        language: language.to_string(),
        kind,
        name,
        scope: format!("{relative_path}:{scope}").trim_end_matches(':').to_string(),
        start_line,
        end_line,
        index_text: code.clone(),
        code,
        docstring,
        token_estimate,
        content_hash,
        last_updated: now_ms,
    }
}

fn normalize_for_id(code: &str) -> String {
    code.lines().map(str::trim_end).collect::<Vec<_>>().join("\n")
}

fn slice_lines(lines: &[&str], start_line: usize, end_line: usize) -> String {
    if start_line == 0 || start_line > lines.len() {
        return String::new();
    }
    let end = end_line.min(lines.len());
    lines[start_line - 1..end].join("\n")
}

/// Deterministic sliding-window fallback when no AST is available.
/// Chunks shorter than `min_chunk_lines` are coalesced into the next window;
/// comment-only / blank windows are dropped.
fn fallback_chunks(
    relative_path: &str,
    file_path: &str,
    language: &str,
    lines: &[&str],
    options: &ChunkOptions,
    now_ms: u64,
) -> Vec<Chunk> {
    if lines.is_empty() {
        return Vec::new();
    }

    let approx_lines_per_chunk = (options.max_chunk_tokens * 4 / average_line_len(lines).max(1)).max(options.min_chunk_lines);
    let overlap_lines = ((approx_lines_per_chunk as f32) * options.chunk_overlap_ratio) as usize;

    let mut out = Vec::new();
    let mut cursor = 0usize;
    let mut pending_start: Option<usize> = None;
    let mut pending_lines: Vec<&str> = Vec::new();

    while cursor < lines.len() {
        let end = (cursor + approx_lines_per_chunk).min(lines.len());
        let window = &lines[cursor..end];
        let is_blank_or_comment = window
            .iter()
            .all(|l| l.trim().is_empty() || is_comment_line(l.trim()));

        if !is_blank_or_comment {
            let start_line = cursor + 1;
            if pending_start.is_none() && (end - cursor) < options.min_chunk_lines && end < lines.len() {
                pending_start = Some(start_line);
                pending_lines = window.to_vec();
            } else {
                let (effective_start, code) = if let Some(p_start) = pending_start.take() {
                    pending_lines.extend_from_slice(window);
                    (p_start, pending_lines.join("\n"))
                } else {
                    (start_line, window.join("\n"))
                };
                out.push(make_chunk(
                    relative_path,
                    file_path,
                    language,
                    ChunkKind::Block,
                    None,
                    String::new(),
                    effective_start,
                    end,
                    code,
                    None,
                    now_ms,
                ));
                pending_lines = Vec::new();
            }
        }

        if end >= lines.len() {
            break;
        }
        cursor = end.saturating_sub(overlap_lines).max(cursor + 1);
    }

    out
}

fn is_comment_line(line: &str) -> bool {
    line.starts_with("//") || line.starts_with('#') || line.starts_with('*') || line.starts_with("/*")
}

/// Prepend file-level context (imports + top-level const/let/var spanning
/// multiple lines) to every non-file-context chunk's `index_text`, and emit
/// a synthetic `file_context` chunk first. `code` is never
/// modified — only `index_text`.
fn enrich_with_file_context(chunks: &mut Vec<Chunk>, relative_path: &str, lines: &[&str]) {
    if chunks.is_empty() {
        return;
    }

    let context = extract_file_context(lines);
    if context.trim().is_empty() {
        return;
    }

    for chunk in chunks.iter_mut() {
        chunk.index_text = format!("{context}\n\n{}", chunk.code);
    }

    let file_context_chunk = Chunk {
        id: chunk_id(relative_path, 1, 1, &context),
        file_path: chunks[0].file_path.clone(),
        relative_path: relative_path.to_string(),
        language: chunks[0].language.clone(),
        kind: ChunkKind::FileContext,
        name: None,
        scope: relative_path.to_string(),
        start_line: 1,
        end_line: 1,
        code: context.clone(),
        index_text: context.clone(),
        docstring: None,
        token_estimate: estimate_tokens(&context),
        content_hash: crate::util::sha256_hex(context.as_bytes()),
        last_updated: chunks[0].last_updated,
    };
    chunks.insert(0, file_context_chunk);
}

fn extract_file_context(lines: &[&str]) -> String {
    let mut context_lines = Vec::new();
    for line in lines.iter().take(50) {
        let trimmed = line.trim_start();
        if trimmed.starts_with("import ")
            || trimmed.starts_with("use ")
            || trimmed.starts_with("from ")
            || trimmed.starts_with("const ")
            || trimmed.starts_with("let ")
            || trimmed.starts_with("var ")
            || trimmed.starts_with("require(")
        {
            context_lines.push(*line);
        }
    }
    context_lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> ChunkOptions {
        ChunkOptions {
            max_chunk_tokens: 512,
            min_chunk_lines: 5,
            chunk_overlap_ratio: 0.25,
        }
    }

    #[test]
    fn empty_file_yields_no_chunks() {
        let chunks = chunk_file("a.ts", "/tmp/a.ts", "typescript", "   \n\n  ", &opts(), 0);
        assert!(chunks.is_empty());
    }

    #[test]
    fn fallback_chunks_cover_whole_file() {
        let source = (0..40).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let chunks = fallback_chunks("a.txt", "/tmp/a.txt", "text", &source.lines().collect::<Vec<_>>(), &opts(), 0);
        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|c| c.kind == ChunkKind::Block));
    }

    #[test]
    fn chunk_ids_are_stable_across_runs() {
        let source = "export function hello() {\n  return 1;\n}\n";
        let a = chunk_file("a.ts", "/tmp/a.ts", "typescript", source, &opts(), 0);
        let b = chunk_file("a.ts", "/tmp/a.ts", "typescript", source, &opts(), 0);
        let a_ids: Vec<&str> = a.iter().map(|c| c.id.as_str()).collect();
        let b_ids: Vec<&str> = b.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(a_ids, b_ids);
    }
}
