use crate::allowlist::Allowlist;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Embedding/schema generation. Bumping it forces a full reindex.
pub const RAG_VERSION: u32 = 1;

/// Layout version of the persisted metadata record
pub const SCHEMA_VERSION: u32 = 1;

/// Name of the data directory created under the workspace root
pub const DEFAULT_INDEX_DIR_NAME: &str = ".coderag";

const MANIFEST_FILENAME: &str = "manifests.json";
const METADATA_FILENAME: &str = "metadata.json";
const VECTOR_DB_DIRNAME: &str = "vectors.lance";

/// What a full indexing run does when one file cannot be embedded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingFailurePolicy {
    /// Report the file through the error callback and continue with the next one
    #[default]
    SkipFile,
    /// Stop the run at the first failed file
    AbortRun,
}

/// Configuration for codebase indexing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// Root directory to index
    pub root_dir: PathBuf,

    /// Directory holding manifests, metadata and vectors.
    /// Defaults to `<root_dir>/.coderag`.
    #[serde(default)]
    pub index_dir: Option<PathBuf>,

    #[serde(default = "default_rag_version")]
    pub rag_version: u32,

    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// Lines per chunk
    #[serde(default = "default_chunk_lines")]
    pub chunk_lines: usize,

    /// Maximum embedding provider calls in flight
    #[serde(default = "default_max_concurrent_embeddings")]
    pub max_concurrent_embeddings: usize,

    /// Buffered rows that trigger a vector store write
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold: usize,

    /// Files larger than this are not indexed
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,

    #[serde(default)]
    pub allowlist: Allowlist,

    /// File patterns to ignore (gitignore-style)
    #[serde(default = "default_ignore_patterns")]
    pub ignore_patterns: Vec<String>,

    #[serde(default)]
    pub failure_policy: EmbeddingFailurePolicy,

    /// Capacity of the progress channel
    #[serde(default = "default_progress_buffer")]
    pub progress_buffer: usize,
}

fn default_rag_version() -> u32 {
    RAG_VERSION
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

fn default_chunk_lines() -> usize {
    50
}

fn default_max_concurrent_embeddings() -> usize {
    10
}

fn default_flush_threshold() -> usize {
    250
}

fn default_max_file_bytes() -> u64 {
    1024 * 1024
}

fn default_progress_buffer() -> usize {
    64
}

fn default_ignore_patterns() -> Vec<String> {
    [
        "node_modules",
        "target",
        ".git",
        "dist",
        "build",
        "*.min.js",
        "*.map",
    ]
    .iter()
    .map(|p| (*p).to_string())
    .collect()
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self::new(PathBuf::from("."))
    }
}

impl IndexerConfig {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            index_dir: None,
            rag_version: default_rag_version(),
            schema_version: default_schema_version(),
            chunk_lines: default_chunk_lines(),
            max_concurrent_embeddings: default_max_concurrent_embeddings(),
            flush_threshold: default_flush_threshold(),
            max_file_bytes: default_max_file_bytes(),
            allowlist: Allowlist::default(),
            ignore_patterns: default_ignore_patterns(),
            failure_policy: EmbeddingFailurePolicy::default(),
            progress_buffer: default_progress_buffer(),
        }
    }

    pub fn index_dir(&self) -> PathBuf {
        self.index_dir
            .clone()
            .unwrap_or_else(|| self.root_dir.join(DEFAULT_INDEX_DIR_NAME))
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.index_dir().join(MANIFEST_FILENAME)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.index_dir().join(METADATA_FILENAME)
    }

    pub fn vector_db_path(&self) -> PathBuf {
        self.index_dir().join(VECTOR_DB_DIRNAME)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.root_dir.exists() {
            return Err(format!("Root directory does not exist: {:?}", self.root_dir));
        }

        if !self.root_dir.is_dir() {
            return Err(format!("Root path is not a directory: {:?}", self.root_dir));
        }

        if self.chunk_lines == 0 {
            return Err("Chunk lines must be > 0".to_string());
        }

        if self.max_concurrent_embeddings == 0 {
            return Err("Max concurrent embeddings must be > 0".to_string());
        }

        if self.flush_threshold == 0 {
            return Err("Flush threshold must be > 0".to_string());
        }

        if self.progress_buffer == 0 {
            return Err("Progress buffer must be > 0".to_string());
        }

        if self.allowlist.is_empty() {
            return Err("Allowlist must name at least one extension or filename".to_string());
        }

        Ok(())
    }
}
