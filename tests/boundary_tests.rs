//! Boundary behavior that doesn't require an initialized embedder: input
//! validation, path resolution, and stats/lookups against an empty index.
//! These run by default, unlike the full-pipeline scenarios in
//! `end_to_end_tests.rs`.

mod common;

use seu_core::{CodeIndex, FusionMode, SearchMode, SearchOptions, XrefDirection};
use tempfile::TempDir;

fn open_empty(project: &std::path::Path, data_dir: &TempDir) -> CodeIndex {
    let config = common::test_config(project, data_dir);
    CodeIndex::open(config).expect("open should succeed")
}

#[test]
fn keyword_search_on_empty_index_is_empty() {
    let project = common::create_test_project(&[]);
    let data_dir = TempDir::new().unwrap();
    let index = open_empty(project.path(), &data_dir);

    let options = SearchOptions { mode: SearchMode::Keyword, fusion: FusionMode::Weighted, ..Default::default() };
    let hits = index.search("hello", &options).unwrap();
    assert!(hits.is_empty());
}

#[test]
fn empty_query_is_rejected() {
    let project = common::create_test_project(&[]);
    let data_dir = TempDir::new().unwrap();
    let index = open_empty(project.path(), &data_dir);

    let options = SearchOptions { mode: SearchMode::Keyword, ..Default::default() };
    assert!(index.search("   ", &options).is_err());
}

#[test]
fn find_symbol_and_xrefs_on_empty_index_are_empty() {
    let project = common::create_test_project(&[]);
    let data_dir = TempDir::new().unwrap();
    let index = open_empty(project.path(), &data_dir);

    assert!(index.find_symbol("anything", None, None, None).unwrap().is_empty());
    assert!(index.find_xrefs("anything", XrefDirection::Both).unwrap().is_empty());
}

#[test]
fn stats_on_fresh_index_are_zero() {
    let project = common::create_test_project(&[]);
    let data_dir = TempDir::new().unwrap();
    let index = open_empty(project.path(), &data_dir);

    let stats = index.stats().unwrap();
    assert_eq!(stats.total_files, 0);
    assert_eq!(stats.total_chunks, 0);
    assert!(stats.languages.is_empty());
}

#[test]
fn read_context_rejects_path_outside_project_root() {
    let project = common::create_test_project(&[("a.ts", "line one\nline two\n")]);
    let data_dir = TempDir::new().unwrap();
    let index = open_empty(project.path(), &data_dir);

    let outside = TempDir::new().unwrap();
    std::fs::write(outside.path().join("secret.ts"), "leaked").unwrap();
    let escape = outside.path().join("secret.ts");

    let result = index.read_context(escape.to_str().unwrap(), None, None, None, None);
    assert!(result.is_err());
}

#[test]
fn read_context_reports_not_found_for_missing_file() {
    let project = common::create_test_project(&[]);
    let data_dir = TempDir::new().unwrap();
    let index = open_empty(project.path(), &data_dir);

    let result = index.read_context("missing.ts", None, None, None, None);
    assert!(result.is_err());
}

#[test]
fn read_context_returns_requested_span_widened_by_context_lines() {
    let project = common::create_test_project(&[(
        "a.ts",
        "line1\nline2\nline3\nline4\nline5\n",
    )]);
    let data_dir = TempDir::new().unwrap();
    let index = open_empty(project.path(), &data_dir);

    let result = index
        .read_context("a.ts", None, Some(3), Some(3), Some(1))
        .expect("file exists on disk, should succeed even with an empty index");
    assert_eq!(result.start_line, 2);
    assert_eq!(result.end_line, 4);
    assert_eq!(result.code, "line2\nline3\nline4");
    assert!(result.other_chunks.is_empty());
}
