//! End-to-end scenarios against a real embedding model.
//!
//! These exercise the full `index` → `search`/`find_symbol`/`find_xrefs`
//! pipeline, which means every chunk gets embedded — that needs real model
//! weights. Point `SEU_CORE_TEST_MODEL_DIR` at a cached `arctic-embed-s`
//! directory (`config.json` + `tokenizer.json` + `model.bin`) and run with
//! `cargo test --test end_to_end_tests -- --ignored`.

mod common;

use seu_core::{CancelToken, FusionMode, SearchMode, SearchOptions, XrefDirection};
use tempfile::TempDir;

macro_rules! require_model {
    () => {
        match common::cached_model_dir() {
            Some(dir) => dir,
            None => {
                eprintln!("skipping: SEU_CORE_TEST_MODEL_DIR not set to a cached model directory");
                return;
            }
        }
    };
}

fn open_index(project: &std::path::Path, data_dir: &TempDir, model_dir: &std::path::Path) -> seu_core::CodeIndex {
    let config = common::test_config(project, data_dir);
    std::fs::create_dir_all(config.models_dir()).unwrap();
    for name in ["config.json", "tokenizer.json", "model.bin"] {
        let src = model_dir.join(name);
        if src.is_file() {
            std::fs::copy(&src, config.models_dir().join(name)).unwrap();
        }
    }
    let index = seu_core::CodeIndex::open(config).expect("open should succeed");
    index.initialize_embedder(None).expect("embedder should initialize from the cached model dir");
    index
}

#[tokio::test]
#[ignore = "requires a cached embedding model; see module docs"]
async fn incremental_skip_then_rerun() {
    let model_dir = require_model!();
    let project = common::create_test_project(&[("a.ts", "export function hello(){return 'world'}")]);
    let data_dir = TempDir::new().unwrap();
    let index = open_index(project.path(), &data_dir, &model_dir);

    let first = index.index(false, None, CancelToken::new()).await.unwrap();
    assert_eq!(first.files_processed, 1);
    assert!(first.chunks_created >= 1);
    assert_eq!(first.languages.get("typescript").copied(), Some(1));

    let second = index.index(false, None, CancelToken::new()).await.unwrap();
    assert_eq!(second.files_processed, 0);
    assert_eq!(second.files_skipped, 1);
}

#[tokio::test]
#[ignore = "requires a cached embedding model; see module docs"]
async fn delete_propagates_to_search() {
    let model_dir = require_model!();
    let project = common::create_test_project(&[("a.ts", "export function hello(){return 'world'}")]);
    let data_dir = TempDir::new().unwrap();
    let index = open_index(project.path(), &data_dir, &model_dir);
    index.index(false, None, CancelToken::new()).await.unwrap();

    std::fs::remove_file(project.path().join("a.ts")).unwrap();
    let result = index.index(false, None, CancelToken::new()).await.unwrap();
    assert_eq!(result.files_deleted, 1);

    let hits = index
        .search("hello", &SearchOptions { mode: SearchMode::Keyword, ..Default::default() })
        .unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
#[ignore = "requires a cached embedding model; see module docs"]
async fn fuzzy_symbol_hit() {
    let model_dir = require_model!();
    let project = common::create_test_project(&[(
        "users.ts",
        "export function getUserById(id){ return id }",
    )]);
    let data_dir = TempDir::new().unwrap();
    let index = open_index(project.path(), &data_dir, &model_dir);
    index.index(false, None, CancelToken::new()).await.unwrap();

    let hits = index.find_symbol("getUsr", Some(5), None, None).unwrap();
    let hit = hits.iter().find(|h| h.symbol.to_lowercase().contains("user"));
    assert!(hit.is_some());
    assert!(hit.unwrap().score > 0.3);
}

#[tokio::test]
#[ignore = "requires a cached embedding model; see module docs"]
async fn scoped_search_respects_include_paths() {
    let model_dir = require_model!();
    let project = common::create_test_project(&[
        ("src/a.ts", "export function run(){ return 1 }"),
        ("lib/b.ts", "export function run(){ return 2 }"),
    ]);
    let data_dir = TempDir::new().unwrap();
    let index = open_index(project.path(), &data_dir, &model_dir);
    index.index(false, None, CancelToken::new()).await.unwrap();

    let mut options = SearchOptions { mode: SearchMode::Semantic, ..Default::default() };
    options.filters.include_paths = vec!["src/**".to_string()];
    let hits = index.search("function", &options).unwrap();
    assert!(!hits.is_empty());
    assert!(hits.iter().all(|h| h.relative_path.starts_with("src/")));
}

#[tokio::test]
#[ignore = "requires a cached embedding model; see module docs"]
async fn ranking_prefers_index_file_over_nested_helper() {
    let model_dir = require_model!();
    let project = common::create_test_project(&[
        ("src/index.ts", "export function run(){ return 1 }"),
        ("src/utils/helper.ts", "export function run(){ return 1 }"),
    ]);
    let data_dir = TempDir::new().unwrap();
    let index = open_index(project.path(), &data_dir, &model_dir);
    index.index(false, None, CancelToken::new()).await.unwrap();

    let options = SearchOptions { mode: SearchMode::Hybrid, fusion: FusionMode::Weighted, ..Default::default() };
    let hits = index.search("run function", &options).unwrap();
    assert!(!hits.is_empty());
    assert_eq!(hits[0].relative_path, "src/index.ts");
}

#[tokio::test]
#[ignore = "requires a cached embedding model; see module docs"]
async fn xref_direction_lists_callers() {
    let model_dir = require_model!();
    let project = common::create_test_project(&[(
        "app.ts",
        "function helper(){ return 1 }\nfunction main(){ return helper() }",
    )]);
    let data_dir = TempDir::new().unwrap();
    let index = open_index(project.path(), &data_dir, &model_dir);
    index.index(false, None, CancelToken::new()).await.unwrap();

    let sites = index.find_xrefs("helper", XrefDirection::Callers).unwrap();
    assert!(sites.iter().any(|site| site.caller.contains("main")));
}
