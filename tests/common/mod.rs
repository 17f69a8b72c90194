//! Shared test utilities for the integration suite.

use seu_core::Config;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Write `files` under a fresh temp directory and return it as the project root.
pub fn create_test_project(files: &[(&str, &str)]) -> TempDir {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    for (path, content) in files {
        let file_path = temp_dir.path().join(path);
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).expect("failed to create parent dirs");
        }
        fs::write(&file_path, content).expect("failed to write test file");
    }
    temp_dir
}

/// A `Config` rooted at `project_root`, persisting to its own temp data dir.
pub fn test_config(project_root: &std::path::Path, data_dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.project_root = project_root.to_path_buf();
    config.data_dir = data_dir.path().to_path_buf();
    config
}

/// Directory holding a cached `config.json`/`tokenizer.json`/`model.bin`
/// bundle for the embedding model, if the environment has one set up.
/// Full-indexing tests need real model weights to embed chunks; they're
/// `#[ignore]`d and opt in via this variable rather than fetching over the
/// network on every test run.
pub fn cached_model_dir() -> Option<PathBuf> {
    let dir = PathBuf::from(std::env::var("SEU_CORE_TEST_MODEL_DIR").ok()?);
    if dir.join("config.json").is_file() && dir.join("tokenizer.json").is_file() {
        Some(dir)
    } else {
        None
    }
}
