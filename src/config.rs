use crate::error::{CoreError, CoreResult};
use std::path::PathBuf;

/// Resolved configuration for one indexing/query session.
///
/// Values are overridable via the environment variables `PROJECT_ROOT`,
/// `SEU_CLAUDE_DATA_DIR`, `SEU_CLAUDE_MODEL`, `SEU_CLAUDE_DIM`.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_root: PathBuf,
    pub data_dir: PathBuf,
    pub embedding_model: String,
    pub embedding_dimensions: usize,
    pub max_chunk_tokens: usize,
    pub min_chunk_lines: usize,
    pub chunk_overlap_ratio: f32,
    pub chunk_grounding_lines: usize,
    pub supported_languages: Vec<String>,
    pub ignore_patterns: Vec<String>,
    /// Recency half-life for the re-ranker's exponential decay, in days.
    pub recency_half_life_days: f32,
    pub embed_batch_size: usize,
    pub worker_limit: usize,
    /// Files larger than this are dropped by the crawler rather than read.
    pub max_file_bytes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            data_dir: default_data_dir(),
            embedding_model: "arctic-embed-s".to_string(),
            embedding_dimensions: 384,
            max_chunk_tokens: 512,
            min_chunk_lines: 5,
            chunk_overlap_ratio: 0.25,
            chunk_grounding_lines: 20,
            supported_languages: DEFAULT_LANGUAGES.iter().map(|s| s.to_string()).collect(),
            ignore_patterns: DEFAULT_IGNORE_PATTERNS.iter().map(|s| s.to_string()).collect(),
            recency_half_life_days: 60.0,
            embed_batch_size: 32,
            worker_limit: 8,
            max_file_bytes: 5 * 1024 * 1024,
        }
    }
}

pub const DEFAULT_LANGUAGES: &[&str] = &[
    "javascript", "typescript", "rust", "python", "go", "java", "c", "cpp", "csharp",
];

pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    "**/node_modules/**",
    "**/target/**",
    "**/dist/**",
    "**/build/**",
    "**/.git/**",
    "**/.hg/**",
    "**/.svn/**",
];

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".seu-core")
}

impl Config {
    /// Resolve defaults, overridden by named environment variables.
    pub fn from_env() -> CoreResult<Self> {
        let mut config = Config::default();

        if let Ok(root) = std::env::var("PROJECT_ROOT") {
            config.project_root = PathBuf::from(root);
        }
        if let Ok(dir) = std::env::var("SEU_CLAUDE_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(model) = std::env::var("SEU_CLAUDE_MODEL") {
            config.embedding_model = model;
        }
        if let Ok(dim) = std::env::var("SEU_CLAUDE_DIM") {
            let parsed: usize = dim
                .parse()
                .map_err(|_| CoreError::Config(format!("SEU_CLAUDE_DIM is not an integer: {dim}")))?;
            config.embedding_dimensions = parsed;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.embedding_dimensions == 0 {
            return Err(CoreError::Config("embeddingDimensions must be > 0".to_string()));
        }
        if !(0.0..=1.0).contains(&self.chunk_overlap_ratio) {
            return Err(CoreError::Config("chunkOverlapRatio must be in [0, 1]".to_string()));
        }
        if self.max_chunk_tokens == 0 {
            return Err(CoreError::Config("maxChunkTokens must be > 0".to_string()));
        }
        if self.max_file_bytes == 0 {
            return Err(CoreError::Config("maxFileBytes must be > 0".to_string()));
        }
        Ok(())
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("store.db")
    }

    pub fn bm25_path(&self) -> PathBuf {
        self.data_dir.join("bm25.json")
    }

    pub fn fuzzy_path(&self) -> PathBuf {
        self.data_dir.join("fuzzy-index.json")
    }

    pub fn xrefs_path(&self) -> PathBuf {
        self.data_dir.join("xrefs.json")
    }

    pub fn file_state_path(&self) -> PathBuf {
        self.data_dir.join("file-state.json")
    }

    pub fn models_dir(&self) -> PathBuf {
        self.data_dir.join("models")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn rejects_zero_dimension() {
        let mut config = Config::default();
        config.embedding_dimensions = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_overlap_out_of_range() {
        let mut config = Config::default();
        config.chunk_overlap_ratio = 1.5;
        assert!(config.validate().is_err());
    }
}
