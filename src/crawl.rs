use crate::config::Config;
use crate::error::CoreResult;
use crate::model::{ChangeStatus, FileRecord, FileState};
use ignore::WalkBuilder;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use std::time::SystemTime;

/// Bytes sniffed from the start of a file to decide whether it's binary.
const BINARY_SNIFF_BYTES: usize = 8192;

/// A null byte within the first `BINARY_SNIFF_BYTES` bytes marks the file as
/// binary — the same heuristic `git` and most text editors use.
fn looks_binary(path: &Path) -> bool {
    let Ok(mut file) = std::fs::File::open(path) else {
        return false;
    };
    let mut buf = [0u8; BINARY_SNIFF_BYTES];
    let Ok(read) = file.read(&mut buf) else {
        return false;
    };
    buf[..read].contains(&0)
}

/// Maps file extensions to the canonical language identifiers.
pub(crate) fn detect_language(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    Some(match ext.as_str() {
        "js" | "jsx" | "mjs" | "cjs" => "javascript",
        "ts" | "tsx" | "mts" | "cts" => "typescript",
        "rs" => "rust",
        "py" | "pyi" => "python",
        "go" => "go",
        "java" => "java",
        "c" | "h" => "c",
        "cpp" | "cc" | "cxx" | "hpp" | "hh" => "cpp",
        "cs" => "csharp",
        _ => return None,
    })
}

/// One crawled candidate paired with its change classification.
#[derive(Debug, Clone)]
pub struct CrawledFile {
    pub record: FileRecord,
    pub status: ChangeStatus,
}

/// Walk `config.project_root`, apply `config.ignore_patterns`/
/// `config.supported_languages`, and classify each candidate against
/// `previous_state`. The crawler is sequential; parallelism
/// belongs to downstream stages.
pub fn crawl(
    config: &Config,
    previous_state: &BTreeMap<String, FileState>,
    force: bool,
) -> CoreResult<(Vec<CrawledFile>, Vec<String>)> {
    let exclude_globs: Vec<glob::Pattern> = config
        .ignore_patterns
        .iter()
        .filter_map(|pattern| glob::Pattern::new(pattern).ok())
        .collect();

    let mut builder = WalkBuilder::new(&config.project_root);
    builder
        .hidden(true)
        .git_ignore(true)
        .git_global(true)
        .git_exclude(true)
        .ignore(true)
        .follow_links(false);
    let walker = builder.build();

    let mut seen_paths = std::collections::BTreeSet::new();
    let mut crawled = Vec::new();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(_) => continue,
        };
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let relative_path = match path.strip_prefix(&config.project_root) {
            Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
            Err(_) => continue,
        };

        if exclude_globs.iter().any(|pattern| pattern.matches(&relative_path)) {
            continue;
        }

        let Some(language) = detect_language(path) else {
            continue;
        };
        if !config
            .supported_languages
            .iter()
            .any(|lang| lang == language)
        {
            continue;
        }

        let metadata = match std::fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(_) => continue,
        };
        let size_bytes = metadata.len();
        if size_bytes > config.max_file_bytes {
            continue;
        }
        if looks_binary(path) {
            continue;
        }
        let mtime_ms = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        let record = FileRecord {
            file_path: path.to_string_lossy().to_string(),
            relative_path: relative_path.clone(),
            language: language.to_string(),
            mtime_ms,
            size_bytes,
            content_hash: None,
        };

        let status = if force {
            if previous_state.contains_key(&relative_path) {
                ChangeStatus::Modified
            } else {
                ChangeStatus::New
            }
        } else {
            match previous_state.get(&relative_path) {
                None => ChangeStatus::New,
                Some(prev) if prev.mtime_ms == mtime_ms && prev.size_bytes == size_bytes => {
                    ChangeStatus::Unchanged
                }
                Some(_) => ChangeStatus::Modified,
            }
        };

        seen_paths.insert(relative_path);
        crawled.push(CrawledFile { record, status });
    }

    let deleted: Vec<String> = previous_state
        .keys()
        .filter(|path| !seen_paths.contains(*path))
        .cloned()
        .collect();

    Ok((crawled, deleted))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_languages_by_extension() {
        assert_eq!(detect_language(Path::new("a.ts")), Some("typescript"));
        assert_eq!(detect_language(Path::new("a.rs")), Some("rust"));
        assert_eq!(detect_language(Path::new("a.unknown")), None);
    }

    #[test]
    fn crawl_classifies_new_modified_unchanged_deleted() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(temp.path().join("a.ts"), "export function hello(){}").unwrap();
        std::fs::write(temp.path().join("b.ts"), "export function bye(){}").unwrap();

        let mut config = Config::default();
        config.project_root = temp.path().to_path_buf();

        let (crawled, deleted) = crawl(&config, &BTreeMap::new(), false).unwrap();
        assert_eq!(crawled.len(), 2);
        assert!(crawled.iter().all(|f| f.status == ChangeStatus::New));
        assert!(deleted.is_empty());

        let mut previous_state = BTreeMap::new();
        for file in &crawled {
            previous_state.insert(
                file.record.relative_path.clone(),
                FileState {
                    mtime_ms: file.record.mtime_ms,
                    size_bytes: file.record.size_bytes,
                },
            );
        }

        std::fs::remove_file(temp.path().join("b.ts")).unwrap();
        std::fs::write(temp.path().join("a.ts"), "export function hello(){ return 1 }").unwrap();

        let (crawled, deleted) = crawl(&config, &previous_state, false).unwrap();
        assert_eq!(crawled.len(), 1);
        assert_eq!(crawled[0].status, ChangeStatus::Modified);
        assert_eq!(deleted, vec!["b.ts".to_string()]);
    }

    #[test]
    fn binary_and_oversized_files_are_dropped() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(temp.path().join("a.ts"), "export function hello(){}").unwrap();
        std::fs::write(temp.path().join("bin.ts"), [b'x', 0u8, b'y', b'z']).unwrap();
        std::fs::write(temp.path().join("huge.ts"), "x".repeat(100)).unwrap();

        let mut config = Config::default();
        config.project_root = temp.path().to_path_buf();
        config.max_file_bytes = 50;

        let (crawled, _) = crawl(&config, &BTreeMap::new(), false).unwrap();
        let seen: Vec<&str> = crawled.iter().map(|f| f.record.relative_path.as_str()).collect();
        assert_eq!(seen, vec!["a.ts"]);
    }

    #[test]
    fn force_reclassifies_present_files_as_modified() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(temp.path().join("a.ts"), "export function hello(){}").unwrap();

        let mut config = Config::default();
        config.project_root = temp.path().to_path_buf();

        let (crawled, _) = crawl(&config, &BTreeMap::new(), false).unwrap();
        let mut previous_state = BTreeMap::new();
        previous_state.insert(
            crawled[0].record.relative_path.clone(),
            FileState {
                mtime_ms: crawled[0].record.mtime_ms,
                size_bytes: crawled[0].record.size_bytes,
            },
        );

        let (crawled, _) = crawl(&config, &previous_state, true).unwrap();
        assert_eq!(crawled[0].status, ChangeStatus::Modified);
    }
}
