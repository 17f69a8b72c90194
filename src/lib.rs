//! A local, persistent code-understanding index: crawl a repository,
//! chunk it along declaration boundaries, embed and keyword-index each
//! chunk, and answer semantic/keyword/hybrid queries plus symbol and
//! cross-reference lookups — incrementally, on every re-index.
//!
//! `CodeIndex` is the single entry point; everything else is an internal
//! module wired together by it, one facade over many small modules.

mod ast;
mod bm25;
mod chunk;
mod config;
mod crawl;
mod embed;
mod error;
mod fuse;
mod fuzzy;
mod model;
mod pipeline;
mod query;
mod store;
mod util;
mod xref;

pub use config::Config;
pub use error::{CoreError, CoreResult};
pub use fuse::RerankerWeights;
pub use fuzzy::SymbolHit;
pub use model::{
    CallSite, ChangeStatus, Chunk, ChunkKind, ContextChunkRef, ContextResult, Definition,
    DefinitionKind, FileRecord, FileState, FusionMode, IndexResult, IndexStats, ProgressEvent,
    PipelinePhase, SearchFilters, SearchMode, SearchResult, XrefDirection,
};
pub use pipeline::CancelToken;
pub use query::SearchOptions;

use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedSender;

/// The handle a caller opens once per project and reuses for both indexing
/// and querying.
pub struct CodeIndex {
    config: Config,
    store: Arc<store::VectorStore>,
    keyword_index: Arc<Mutex<bm25::KeywordIndex>>,
    fuzzy_index: Arc<Mutex<fuzzy::FuzzySymbolIndex>>,
    xref_graph: Arc<Mutex<xref::XrefGraph>>,
    embedder: Arc<embed::Embedder>,
}

impl CodeIndex {
    /// Open (or create) the on-disk indexes under `config.data_dir`, and
    /// load the persisted keyword/fuzzy/xref state if present.
    pub fn open(config: Config) -> CoreResult<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.data_dir).map_err(CoreError::Io)?;

        let store = store::VectorStore::open(&config.store_path(), config.embedding_dimensions)?;
        let keyword_index = load_or_default(&config.bm25_path(), bm25::KeywordIndex::deserialize)?;
        let fuzzy_index = load_or_default(&config.fuzzy_path(), fuzzy::FuzzySymbolIndex::deserialize)?;
        let embedder = embed::Embedder::new(config.embedding_dimensions)?;

        Ok(Self {
            config,
            store: Arc::new(store),
            keyword_index: Arc::new(Mutex::new(keyword_index)),
            fuzzy_index: Arc::new(Mutex::new(fuzzy_index)),
            xref_graph: Arc::new(Mutex::new(xref::XrefGraph::default())),
            embedder: Arc::new(embedder),
        })
    }

    /// Download (or load from a local cache/bundle) the embedding model and
    /// initialize it. Must run before the first `index`/`search` call.
    pub fn initialize_embedder(&self, download_base_url: Option<&str>) -> CoreResult<()> {
        let source = embed::loader::resolve_source(&self.config.models_dir(), &self.config.embedding_model)?;
        let artifacts = embed::loader::load_artifacts(&source, download_base_url)?;
        self.embedder.initialize(&artifacts)
    }

    /// Run one incremental indexing pass over `config.project_root`.
    pub async fn index(
        &self,
        force: bool,
        progress: Option<UnboundedSender<ProgressEvent>>,
        cancel: CancelToken,
    ) -> CoreResult<IndexResult> {
        let pipeline = pipeline::IndexingPipeline::new(
            self.config.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.keyword_index),
            Arc::clone(&self.fuzzy_index),
            Arc::clone(&self.xref_graph),
            Arc::clone(&self.embedder),
        );
        let result = pipeline.run(force, progress, cancel).await;
        self.persist_side_indexes()?;
        result
    }

    fn persist_side_indexes(&self) -> CoreResult<()> {
        let bm25_bytes = self.keyword_index.lock().unwrap().serialize()?;
        atomic_write(&self.config.bm25_path(), &bm25_bytes)?;
        let fuzzy_bytes = self.fuzzy_index.lock().unwrap().serialize()?;
        atomic_write(&self.config.fuzzy_path(), &fuzzy_bytes)?;
        Ok(())
    }

    fn query_engine(&self) -> query::QueryEngine {
        query::QueryEngine::new(
            Arc::clone(&self.store),
            Arc::clone(&self.keyword_index),
            Arc::clone(&self.fuzzy_index),
            Arc::clone(&self.xref_graph),
            Arc::clone(&self.embedder),
            self.config.project_root.clone(),
        )
    }

    pub fn search(&self, query: &str, options: &SearchOptions) -> CoreResult<Vec<SearchResult>> {
        self.query_engine().search(query, options)
    }

    pub fn find_symbol(
        &self,
        pattern: &str,
        limit: Option<usize>,
        threshold: Option<f32>,
        types_filter: Option<&[String]>,
    ) -> CoreResult<Vec<SymbolHit>> {
        self.query_engine().find_symbol(pattern, limit, threshold, types_filter)
    }

    pub fn find_xrefs(&self, symbol: &str, direction: XrefDirection) -> CoreResult<Vec<CallSite>> {
        self.query_engine().find_xrefs(symbol, direction)
    }

    pub fn read_context(
        &self,
        relative_path: &str,
        symbol: Option<&str>,
        start_line: Option<usize>,
        end_line: Option<usize>,
        context_lines: Option<usize>,
    ) -> CoreResult<ContextResult> {
        self.query_engine()
            .read_context(relative_path, symbol, start_line, end_line, context_lines)
    }

    pub fn stats(&self) -> CoreResult<IndexStats> {
        let store_stats = self.store.stats()?;
        let file_state = pipeline::load_file_state(&self.config.file_state_path())?;

        let mut languages: std::collections::BTreeMap<String, usize> = Default::default();
        for relative_path in file_state.keys() {
            if let Some(language) = crawl::detect_language(std::path::Path::new(relative_path)) {
                *languages.entry(language.to_string()).or_insert(0) += 1;
            }
        }

        Ok(IndexStats {
            total_files: file_state.len(),
            total_chunks: store_stats.total_chunks,
            languages,
            store_size_bytes: std::fs::metadata(self.config.store_path())
                .map(|m| m.len())
                .unwrap_or(0),
        })
    }
}

fn load_or_default<T, F>(path: &std::path::Path, deserialize: F) -> CoreResult<T>
where
    T: Default,
    F: Fn(&[u8]) -> serde_json::Result<T>,
{
    if !path.exists() {
        return Ok(T::default());
    }
    let bytes = std::fs::read(path).map_err(CoreError::Io)?;
    Ok(deserialize(&bytes)?)
}

fn atomic_write(path: &std::path::Path, bytes: &[u8]) -> CoreResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(CoreError::Io)?;
    }
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, bytes).map_err(CoreError::Io)?;
    std::fs::rename(&tmp_path, path).map_err(CoreError::Io)?;
    Ok(())
}
