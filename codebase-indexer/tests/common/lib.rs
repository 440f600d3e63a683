use async_trait::async_trait;
use coderag_embeddings::{EmbeddingError, EmbeddingProvider};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tempfile::TempDir;

/// Deterministic embedding provider for tests.
///
/// Vectors are derived from a SHA-256 of the text, so equal texts always map
/// to equal vectors and an exact-content query lands at distance zero.
pub struct MockEmbeddingProvider {
    dimension: usize,
    batch_size: usize,
    calls: AtomicUsize,
    embedded: AtomicUsize,
    failing: AtomicBool,
    fail_marker: Mutex<Option<String>>,
}

impl MockEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            batch_size: 8,
            calls: AtomicUsize::new(0),
            embedded: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            fail_marker: Mutex::new(None),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Fail every call that includes a text containing `marker`
    pub fn fail_when_contains(&self, marker: &str) {
        *self.fail_marker.lock().unwrap() = Some(marker.to_string());
    }

    /// Fail every call
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn clear_failures(&self) {
        self.set_failing(false);
        *self.fail_marker.lock().unwrap() = None;
    }

    /// Number of `embed` calls made so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of texts successfully embedded so far
    pub fn embedded_count(&self) -> usize {
        self.embedded.load(Ordering::SeqCst)
    }

    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let digest = Sha256::digest(text.as_bytes());
        (0..self.dimension)
            .map(|i| {
                let byte = digest[i % digest.len()];
                (byte as f32 + i as f32) / 255.0
            })
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    fn model_id(&self) -> &str {
        "mock-sha256"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn max_batch_size(&self) -> usize {
        self.batch_size
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.failing.load(Ordering::SeqCst) {
            return Err(EmbeddingError::Api {
                status: 429,
                message: "rate limited".to_string(),
            });
        }

        let marker = self.fail_marker.lock().unwrap().clone();
        if let Some(marker) = marker
            && texts.iter().any(|text| text.contains(&marker))
        {
            return Err(EmbeddingError::Api {
                status: 500,
                message: format!("refusing text containing '{marker}'"),
            });
        }

        self.embedded.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|text| self.vector_for(text)).collect())
    }
}

/// A throwaway workspace directory
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, relative_path: &str) -> PathBuf {
        self.dir.path().join(relative_path)
    }

    pub fn write(&self, relative_path: &str, content: &str) {
        let path = self.path(relative_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    pub fn remove(&self, relative_path: &str) {
        std::fs::remove_file(self.path(relative_path)).unwrap();
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}

/// `count` numbered lines, each unique
pub fn numbered_lines(count: usize) -> String {
    (1..=count)
        .map(|i| format!("line {i}"))
        .collect::<Vec<_>>()
        .join("\n")
}
