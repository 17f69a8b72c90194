//! Vector store (C5): a transactional embedded database of chunks and their
//! vectors, with cosine-similarity search and glob-based path filters.
//!
//! Uses `redb` as a durable keyed-blob store rather than an in-memory
//! `Vec<f32>` behind a feature flag, so the index survives a restart.

use crate::error::{CoreError, CoreResult};
use crate::model::{Chunk, SearchFilters};
use redb::{Database, ReadableTable, TableDefinition};
use std::collections::BTreeMap;
use std::path::Path;

const CHUNKS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("chunks");
const FILE_INDEX_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("file_index");
const META_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");

const DIMENSION_KEY: &str = "dimension";

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct StoredChunk {
    chunk: Chunk,
    vector: Vec<f32>,
}

pub struct VectorStore {
    db: Database,
    dimension: usize,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StoreStats {
    pub total_chunks: usize,
    pub dimension: usize,
}

#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

impl VectorStore {
    /// Open (or create) the store at `path`. Records `dimension` on first
    /// open; subsequent opens with a different dimension are rejected.
    pub fn open(path: &Path, dimension: usize) -> CoreResult<Self> {
        let db = Database::create(path)?;

        let existing_dimension = {
            let read_txn = db.begin_read()?;
            match read_txn.open_table(META_TABLE) {
                Ok(table) => table
                    .get(DIMENSION_KEY)?
                    .map(|v| usize::from_le_bytes(v.value().try_into().unwrap_or([0; 8]))),
                Err(redb::TableError::TableDoesNotExist(_)) => None,
                Err(err) => return Err(err.into()),
            }
        };

        match existing_dimension {
            Some(0) | None => {
                let write_txn = db.begin_write()?;
                {
                    let mut table = write_txn.open_table(META_TABLE)?;
                    table.insert(DIMENSION_KEY, dimension.to_le_bytes().as_slice())?;
                }
                write_txn.commit()?;
            }
            Some(existing) if existing != dimension => {
                return Err(CoreError::Store(format!(
                    "store was opened with dimension {existing}, got {dimension}"
                )));
            }
            Some(_) => {}
        }

        Ok(Self { db, dimension })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Replace-by-id, atomic per batch.
    pub fn upsert(&self, chunks: Vec<(Chunk, Vec<f32>)>) -> CoreResult<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        for (_, vector) in &chunks {
            if vector.len() != self.dimension {
                return Err(CoreError::Store(format!(
                    "vector length {} does not match store dimension {}",
                    vector.len(),
                    self.dimension
                )));
            }
        }

        let write_txn = self.db.begin_write()?;
        {
            let mut chunk_table = write_txn.open_table(CHUNKS_TABLE)?;
            let mut file_table = write_txn.open_table(FILE_INDEX_TABLE)?;

            let mut by_file: BTreeMap<String, Vec<String>> = BTreeMap::new();
            for (chunk, vector) in &chunks {
                let existing = file_table
                    .get(chunk.relative_path.as_str())?
                    .map(|v| deserialize_id_list(v.value()))
                    .unwrap_or_default();
                by_file
                    .entry(chunk.relative_path.clone())
                    .or_insert(existing)
                    .push(chunk.id.clone());

                let stored = StoredChunk {
                    chunk: chunk.clone(),
                    vector: vector.clone(),
                };
                let bytes = serde_json::to_vec(&stored)?;
                chunk_table.insert(chunk.id.as_str(), bytes.as_slice())?;
            }

            for (relative_path, mut ids) in by_file {
                ids.sort();
                ids.dedup();
                let bytes = serialize_id_list(&ids);
                file_table.insert(relative_path.as_str(), bytes.as_slice())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Remove every chunk belonging to `relative_path`.
    pub fn delete_by_file(&self, relative_path: &str) -> CoreResult<usize> {
        let write_txn = self.db.begin_write()?;
        let removed;
        {
            let mut chunk_table = write_txn.open_table(CHUNKS_TABLE)?;
            let mut file_table = write_txn.open_table(FILE_INDEX_TABLE)?;

            let ids = file_table
                .get(relative_path)?
                .map(|v| deserialize_id_list(v.value()))
                .unwrap_or_default();
            removed = ids.len();
            for id in &ids {
                chunk_table.remove(id.as_str())?;
            }
            file_table.remove(relative_path)?;
        }
        write_txn.commit()?;
        Ok(removed)
    }

    /// Point lookup by chunk id, used to materialize ranked ids coming back
    /// from a fused search result list.
    pub fn find_by_id(&self, chunk_id: &str) -> CoreResult<Option<Chunk>> {
        let read_txn = self.db.begin_read()?;
        let chunk_table = match read_txn.open_table(CHUNKS_TABLE) {
            Ok(table) => table,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        match chunk_table.get(chunk_id)? {
            Some(bytes) => {
                let stored: StoredChunk = serde_json::from_slice(bytes.value())?;
                Ok(Some(stored.chunk))
            }
            None => Ok(None),
        }
    }

    pub fn get_by_file(&self, relative_path: &str) -> CoreResult<Vec<Chunk>> {
        let read_txn = self.db.begin_read()?;
        let file_table = match read_txn.open_table(FILE_INDEX_TABLE) {
            Ok(table) => table,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let ids = file_table
            .get(relative_path)?
            .map(|v| deserialize_id_list(v.value()))
            .unwrap_or_default();

        let chunk_table = read_txn.open_table(CHUNKS_TABLE)?;
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(bytes) = chunk_table.get(id.as_str())? {
                let stored: StoredChunk = serde_json::from_slice(bytes.value())?;
                out.push(stored.chunk);
            }
        }
        Ok(out)
    }

    /// Top-k by cosine similarity, converted to `[0, 1]` via `(1 + dot) / 2`.
    /// Ties broken by ascending scope then chunk id.
    pub fn search(&self, query: &[f32], k: usize, filters: &SearchFilters) -> CoreResult<Vec<ScoredChunk>> {
        let read_txn = self.db.begin_read()?;
        let chunk_table = match read_txn.open_table(CHUNKS_TABLE) {
            Ok(table) => table,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let include_globs: Vec<glob::Pattern> = filters
            .include_paths
            .iter()
            .filter_map(|p| glob::Pattern::new(p).ok())
            .collect();
        let exclude_globs: Vec<glob::Pattern> = filters
            .exclude_paths
            .iter()
            .filter_map(|p| glob::Pattern::new(p).ok())
            .collect();

        let mut scored = Vec::new();
        for entry in chunk_table.iter()? {
            let (_, value) = entry?;
            let stored: StoredChunk = serde_json::from_slice(value.value())?;
            if !passes_filters(&stored.chunk, filters, &include_globs, &exclude_globs) {
                continue;
            }
            let dot: f32 = query.iter().zip(stored.vector.iter()).map(|(a, b)| a * b).sum();
            let score = (1.0 + dot) / 2.0;
            scored.push(ScoredChunk {
                chunk: stored.chunk,
                score,
            });
        }

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.scope.cmp(&b.chunk.scope))
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });
        scored.truncate(k);
        Ok(scored)
    }

    pub fn stats(&self) -> CoreResult<StoreStats> {
        let read_txn = self.db.begin_read()?;
        let total_chunks = match read_txn.open_table(CHUNKS_TABLE) {
            Ok(table) => table.len()? as usize,
            Err(redb::TableError::TableDoesNotExist(_)) => 0,
            Err(err) => return Err(err.into()),
        };
        Ok(StoreStats {
            total_chunks,
            dimension: self.dimension,
        })
    }
}

/// Filter semantics: `includePaths` is OR of globs (empty = match all);
/// `excludePaths` applies after, exclusion wins on conflict.
fn passes_filters(
    chunk: &Chunk,
    filters: &SearchFilters,
    include_globs: &[glob::Pattern],
    exclude_globs: &[glob::Pattern],
) -> bool {
    if let Some(kind) = filters.kind {
        if chunk.kind != kind {
            return false;
        }
    }
    if let Some(language) = &filters.language {
        if &chunk.language != language {
            return false;
        }
    }
    if !include_globs.is_empty() && !include_globs.iter().any(|g| g.matches(&chunk.relative_path)) {
        return false;
    }
    if exclude_globs.iter().any(|g| g.matches(&chunk.relative_path)) {
        return false;
    }
    true
}

fn serialize_id_list(ids: &[String]) -> Vec<u8> {
    ids.join("\n").into_bytes()
}

fn deserialize_id_list(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .split('\n')
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ChunkKind;

    fn sample_chunk(id: &str, relative_path: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            file_path: format!("/tmp/{relative_path}"),
            relative_path: relative_path.to_string(),
            language: "typescript".to_string(),
            kind: ChunkKind::Function,
            name: Some("hello".to_string()),
            scope: relative_path.to_string(),
            start_line: 1,
            end_line: 2,
            code: "fn hello() {}".to_string(),
            index_text: "fn hello() {}".to_string(),
            docstring: None,
            token_estimate: 4,
            content_hash: "abc".to_string(),
            last_updated: 0,
        }
    }

    #[test]
    fn upsert_and_search_roundtrip() {
        let temp = tempfile::tempdir().unwrap();
        let store = VectorStore::open(&temp.path().join("store.db"), 3).unwrap();
        store
            .upsert(vec![(sample_chunk("a", "src/a.ts"), vec![1.0, 0.0, 0.0])])
            .unwrap();

        let results = store.search(&[1.0, 0.0, 0.0], 5, &SearchFilters::default()).unwrap();
        assert_eq!(results.len(), 1);
        assert!((results[0].score - 1.0).abs() < 1e-3);
    }

    #[test]
    fn dimension_mismatch_is_rejected_on_reopen() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("store.db");
        let _store = VectorStore::open(&path, 3).unwrap();
        drop(_store);
        let reopened = VectorStore::open(&path, 4);
        assert!(reopened.is_err());
    }

    #[test]
    fn delete_by_file_removes_chunks() {
        let temp = tempfile::tempdir().unwrap();
        let store = VectorStore::open(&temp.path().join("store.db"), 3).unwrap();
        store
            .upsert(vec![(sample_chunk("a", "src/a.ts"), vec![1.0, 0.0, 0.0])])
            .unwrap();
        let removed = store.delete_by_file("src/a.ts").unwrap();
        assert_eq!(removed, 1);
        assert!(store.get_by_file("src/a.ts").unwrap().is_empty());
    }

    #[test]
    fn find_by_id_resolves_a_single_chunk() {
        let temp = tempfile::tempdir().unwrap();
        let store = VectorStore::open(&temp.path().join("store.db"), 3).unwrap();
        store
            .upsert(vec![(sample_chunk("a", "src/a.ts"), vec![1.0, 0.0, 0.0])])
            .unwrap();
        assert!(store.find_by_id("a").unwrap().is_some());
        assert!(store.find_by_id("missing").unwrap().is_none());
    }

    #[test]
    fn include_paths_filter_restricts_results() {
        let temp = tempfile::tempdir().unwrap();
        let store = VectorStore::open(&temp.path().join("store.db"), 3).unwrap();
        store
            .upsert(vec![
                (sample_chunk("a", "src/a.ts"), vec![1.0, 0.0, 0.0]),
                (sample_chunk("b", "lib/b.ts"), vec![1.0, 0.0, 0.0]),
            ])
            .unwrap();

        let mut filters = SearchFilters::default();
        filters.include_paths = vec!["src/**".to_string()];
        let results = store.search(&[1.0, 0.0, 0.0], 10, &filters).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.relative_path, "src/a.ts");
    }
}
