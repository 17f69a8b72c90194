//! Indexing pipeline (C10): the single incremental driver — crawl, classify,
//! parse/chunk/embed new and modified files, delete removed ones, skip
//! unchanged ones, and persist the new file-state snapshot.
//!
//! One canonical entry point replaces what could otherwise be three
//! near-duplicate ingest/update paths, generalized from document ingestion
//! to a classify-then-act incremental pass.

use crate::ast;
use crate::bm25::KeywordIndex;
use crate::chunk::{chunk_file, ChunkOptions};
use crate::config::Config;
use crate::embed::Embedder;
use crate::error::{CoreError, CoreResult};
use crate::fuzzy::{FuzzySymbolIndex, SymbolEntry};
use crate::model::{ChangeStatus, FileState, IndexResult, PipelinePhase, ProgressEvent};
use crate::store::VectorStore;
use crate::xref::{self, XrefGraph};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::mpsc::UnboundedSender;

/// Shared signal that stops new file work ASAP while letting any in-flight
/// chunk finish embedding.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct IndexingPipeline {
    config: Config,
    store: Arc<VectorStore>,
    keyword_index: Arc<Mutex<KeywordIndex>>,
    fuzzy_index: Arc<Mutex<FuzzySymbolIndex>>,
    xref_graph: Arc<Mutex<XrefGraph>>,
    embedder: Arc<Embedder>,
}

impl IndexingPipeline {
    pub fn new(
        config: Config,
        store: Arc<VectorStore>,
        keyword_index: Arc<Mutex<KeywordIndex>>,
        fuzzy_index: Arc<Mutex<FuzzySymbolIndex>>,
        xref_graph: Arc<Mutex<XrefGraph>>,
        embedder: Arc<Embedder>,
    ) -> Self {
        Self {
            config,
            store,
            keyword_index,
            fuzzy_index,
            xref_graph,
            embedder,
        }
    }

    fn emit(&self, progress: &Option<UnboundedSender<ProgressEvent>>, event: ProgressEvent) {
        if let Some(tx) = progress {
            let _ = tx.send(event);
        }
    }

    /// Run one incremental indexing pass.
    pub async fn run(
        &self,
        force: bool,
        progress: Option<UnboundedSender<ProgressEvent>>,
        cancel: CancelToken,
    ) -> CoreResult<IndexResult> {
        let started_at = Instant::now();
        let previous_state = load_file_state(&self.config.file_state_path())?;

        self.emit(
            &progress,
            ProgressEvent {
                phase: PipelinePhase::Crawling,
                processed: 0,
                total: 0,
                message: "crawling project root".to_string(),
            },
        );

        let (crawled, deleted_paths) = crate::crawl::crawl(&self.config, &previous_state, force)?;
        let total = crawled.len();

        let mut result = IndexResult::default();
        let mut new_state: BTreeMap<String, FileState> = previous_state.clone();

        for deleted in &deleted_paths {
            self.store.delete_by_file(deleted)?;
            self.keyword_index.lock().unwrap().remove_file(deleted);
            self.xref_graph.lock().unwrap().remove_file(deleted);
            self.fuzzy_index.lock().unwrap().remove_file(deleted);
            new_state.remove(deleted);
            result.files_deleted += 1;
        }

        for (index, file) in crawled.iter().enumerate() {
            if cancel.is_cancelled() {
                break;
            }

            match file.status {
                ChangeStatus::Unchanged => {
                    result.files_skipped += 1;
                    continue;
                }
                ChangeStatus::Deleted => continue,
                ChangeStatus::New | ChangeStatus::Modified => {}
            }

            self.emit(
                &progress,
                ProgressEvent {
                    phase: PipelinePhase::Parsing,
                    processed: index,
                    total,
                    message: file.record.relative_path.clone(),
                },
            );

            match self.process_file(file).await {
                Ok(chunks_created) => {
                    result.chunks_created += chunks_created;
                    result.files_processed += 1;
                    if file.status == ChangeStatus::Modified {
                        result.files_updated += 1;
                    }
                    *result.languages.entry(file.record.language.clone()).or_insert(0) += 1;
                    new_state.insert(
                        file.record.relative_path.clone(),
                        FileState {
                            mtime_ms: file.record.mtime_ms,
                            size_bytes: file.record.size_bytes,
                        },
                    );
                }
                Err(err) => {
                    // Per-file parse/read failures are recoverable; never
                    // abort the whole run.
                    tracing::warn!(
                        file = %file.record.relative_path,
                        error = %err,
                        "skipping file after processing error"
                    );
                }
            }
        }

        self.emit(
            &progress,
            ProgressEvent {
                phase: PipelinePhase::Writing,
                processed: total,
                total,
                message: "persisting file state".to_string(),
            },
        );
        save_file_state(&self.config.file_state_path(), &new_state)?;

        self.emit(
            &progress,
            ProgressEvent {
                phase: PipelinePhase::Done,
                processed: total,
                total,
                message: "indexing complete".to_string(),
            },
        );

        result.success = true;
        result.duration_ms = started_at.elapsed().as_millis() as u64;
        Ok(result)
    }

    async fn process_file(&self, file: &crate::crawl::CrawledFile) -> CoreResult<usize> {
        let source = std::fs::read_to_string(&file.record.file_path).map_err(CoreError::Io)?;

        let options = ChunkOptions {
            max_chunk_tokens: self.config.max_chunk_tokens,
            min_chunk_lines: self.config.min_chunk_lines,
            chunk_overlap_ratio: self.config.chunk_overlap_ratio,
        };
        let now_ms = file.record.mtime_ms;
        let chunks = chunk_file(
            &file.record.relative_path,
            &file.record.file_path,
            &file.record.language,
            &source,
            &options,
            now_ms,
        );

        self.store.delete_by_file(&file.record.relative_path)?;
        self.keyword_index.lock().unwrap().remove_file(&file.record.relative_path);
        self.xref_graph.lock().unwrap().remove_file(&file.record.relative_path);
        self.fuzzy_index.lock().unwrap().remove_file(&file.record.relative_path);

        if chunks.is_empty() {
            return Ok(0);
        }

        // Embedding runs off the async executor's blocking pool, batched,
        // then a single atomic upsert.
        let texts: Vec<String> = chunks.iter().map(|c| c.index_text.clone()).collect();
        let embedder = Arc::clone(&self.embedder);
        let batch_size = self.config.embed_batch_size;
        let vectors = tokio::task::spawn_blocking(move || embedder.embed_batch(&texts, batch_size))
            .await
            .map_err(|err| CoreError::Embedding(format!("embedding task panicked: {err}")))??;

        {
            let mut keyword_index = self.keyword_index.lock().unwrap();
            for chunk in &chunks {
                keyword_index.add_chunk_document(&file.record.relative_path, &chunk.id, &chunk.index_text);
            }
        }

        if let Some(tree) = ast::parse(&source, &file.record.language) {
            #[cfg(feature = "treesitter")]
            {
                let nodes = ast::extract_nodes(&tree, &source, &file.record.language);
                let extracted = xref::extract(&file.record.relative_path, &source, &nodes);
                for definition in &extracted.definitions {
                    self.fuzzy_index.lock().unwrap().add_symbol(SymbolEntry {
                        symbol: definition.name.clone(),
                        file_path: file.record.relative_path.clone(),
                        kind: format!("{:?}", definition.kind).to_lowercase(),
                        line: Some(definition.start_line),
                    });
                }
                self.xref_graph.lock().unwrap().ingest_file(&file.record.relative_path, extracted);
            }
            #[cfg(not(feature = "treesitter"))]
            let _ = tree;
        }

        let chunk_count = chunks.len();
        let upsert_batch = chunks.into_iter().zip(vectors.into_iter()).collect();
        self.store.upsert(upsert_batch)?;

        Ok(chunk_count)
    }
}

pub(crate) fn load_file_state(path: &std::path::Path) -> CoreResult<BTreeMap<String, FileState>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let bytes = std::fs::read(path).map_err(CoreError::Io)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Atomic write: temp file + rename, so a crash mid-write never leaves a
/// truncated or partially-written state file behind.
fn save_file_state(path: &std::path::Path, state: &BTreeMap<String, FileState>) -> CoreResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(CoreError::Io)?;
    }
    let bytes = serde_json::to_vec_pretty(state)?;
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, &bytes).map_err(CoreError::Io)?;
    std::fs::rename(&tmp_path, path).map_err(CoreError::Io)?;
    Ok(())
}
