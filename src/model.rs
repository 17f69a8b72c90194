use serde::{Deserialize, Serialize};

/// Canonical chunk type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Function,
    Method,
    Class,
    Interface,
    Type,
    Enum,
    Module,
    Export,
    Block,
    FileContext,
}

/// A source file tracked by the crawler and change detector (C1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub file_path: String,
    pub relative_path: String,
    pub language: String,
    pub mtime_ms: u64,
    pub size_bytes: u64,
    #[serde(default)]
    pub content_hash: Option<String>,
}

/// Prior-run state used by the change detector, persisted to `file-state.json`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileState {
    pub mtime_ms: u64,
    pub size_bytes: u64,
}

/// Classification of a crawled candidate against the previous state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeStatus {
    New,
    Modified,
    Unchanged,
    Deleted,
}

/// The atomic unit of indexing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// First 64 bits of a content hash over (relativePath, startLine, endLine,
    /// normalized code) — 16 lowercase hex characters.
    pub id: String,
    pub file_path: String,
    pub relative_path: String,
    pub language: String,
    pub kind: ChunkKind,
    pub name: Option<String>,
    /// Dotted path from file to declaration, e.g. `pkg/a.ts:MyClass:method`.
    pub scope: String,
    pub start_line: usize,
    pub end_line: usize,
    pub code: String,
    /// Text actually fed to the embedder/tokenizer; equals `code` unless
    /// file-level context was prepended.
    pub index_text: String,
    pub docstring: Option<String>,
    pub token_estimate: usize,
    pub content_hash: String,
    pub last_updated: u64,
}

/// A function/method/class/interface declaration extracted by C8.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Definition {
    pub name: String,
    pub file_path: String,
    pub kind: DefinitionKind,
    pub start_line: usize,
    pub end_line: usize,
    pub calls: Vec<String>,
    pub exported: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DefinitionKind {
    Function,
    Method,
    Class,
    Interface,
}

/// A call expression recorded during C8 extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallSite {
    pub caller: String,
    pub callee: String,
    pub file_path: String,
    pub line: usize,
    pub is_method_call: bool,
}

/// Optional filters applied at query time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchFilters {
    pub kind: Option<ChunkKind>,
    pub language: Option<String>,
    #[serde(default)]
    pub include_paths: Vec<String>,
    #[serde(default)]
    pub exclude_paths: Vec<String>,
}

/// A materialized result returned by C11.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub chunk_id: String,
    pub relative_path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub kind: ChunkKind,
    pub name: Option<String>,
    pub language: String,
    pub code: String,
    pub score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Semantic,
    Keyword,
    Hybrid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FusionMode {
    Weighted,
    Rrf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XrefDirection {
    Callers,
    Callees,
    Both,
}

/// Progress events emitted by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub phase: PipelinePhase,
    pub processed: usize,
    pub total: usize,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PipelinePhase {
    Crawling,
    Parsing,
    Chunking,
    Embedding,
    Writing,
    Done,
}

/// Result object returned by the indexing pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexResult {
    pub success: bool,
    pub files_processed: usize,
    pub files_skipped: usize,
    pub files_updated: usize,
    pub files_deleted: usize,
    pub chunks_created: usize,
    pub languages: std::collections::BTreeMap<String, usize>,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// One same-file chunk reported alongside a `read_context` span, for the
/// caller to stitch surrounding declarations around the centered span.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextChunkRef {
    pub name: Option<String>,
    pub kind: ChunkKind,
    pub scope: String,
    pub start_line: usize,
    pub end_line: usize,
}

/// Result of `read_context`: the requested span (widened by `contextLines`,
/// centered on `symbol` when given) plus every other chunk in the same file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextResult {
    pub relative_path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub code: String,
    pub other_chunks: Vec<ContextChunkRef>,
}

/// Aggregate stats for `get_stats`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexStats {
    pub total_files: usize,
    pub total_chunks: usize,
    pub languages: std::collections::BTreeMap<String, usize>,
    pub store_size_bytes: u64,
}
