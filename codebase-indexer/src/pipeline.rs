use crate::chunk::{Chunk, chunk_lines};
use crate::config::{EmbeddingFailurePolicy, IndexerConfig};
use crate::error::IndexerError;
use crate::fs::FileSystem;
use crate::manifest::content_hash;
use coderag_embeddings::{EmbeddingError, EmbeddingProvider, check_vectors};
use futures::stream::{self, BoxStream};
use futures::{StreamExt, future};
use log::{debug, warn};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Every chunk of one file together with its vector, in `chunk_index` order
#[derive(Debug, Clone)]
pub struct EmbeddedFile {
    pub relative_path: String,
    /// Hash of the bytes that were chunked
    pub content_hash: String,
    pub chunks: Vec<(Chunk, Vec<f32>)>,
}

/// A file that could not be embedded
#[derive(Debug)]
pub struct FileFailure {
    pub relative_path: String,
    pub error: IndexerError,
}

pub type FileEmbedding = Result<EmbeddedFile, FileFailure>;

/// Turns file paths into embedded chunks through the provider.
///
/// Files are processed concurrently; the number of provider calls in flight
/// is bounded by a semaphore shared by every clone of the pipeline.
#[derive(Clone)]
pub struct EmbeddingPipeline {
    fs: Arc<dyn FileSystem>,
    provider: Arc<dyn EmbeddingProvider>,
    permits: Arc<Semaphore>,
    chunk_lines: usize,
    concurrency: usize,
    policy: EmbeddingFailurePolicy,
}

impl EmbeddingPipeline {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        provider: Arc<dyn EmbeddingProvider>,
        config: &IndexerConfig,
    ) -> Self {
        let concurrency = config.max_concurrent_embeddings.max(1);
        Self {
            fs,
            provider,
            permits: Arc::new(Semaphore::new(concurrency)),
            chunk_lines: config.chunk_lines,
            concurrency,
            policy: config.failure_policy,
        }
    }

    /// One item per file, in completion order.
    ///
    /// Under [`EmbeddingFailurePolicy::AbortRun`] the stream ends right after
    /// the first failure.
    pub fn embed_files(&self, paths: Vec<String>) -> BoxStream<'static, FileEmbedding> {
        let pipeline = self.clone();
        let files = stream::iter(paths)
            .map(move |path| {
                let pipeline = pipeline.clone();
                async move { pipeline.embed_file(path).await }
            })
            .buffer_unordered(self.concurrency);

        match self.policy {
            EmbeddingFailurePolicy::SkipFile => files.boxed(),
            EmbeddingFailurePolicy::AbortRun => {
                let mut failed = false;
                files
                    .take_while(move |item| {
                        let keep = !failed;
                        failed |= item.is_err();
                        future::ready(keep)
                    })
                    .boxed()
            }
        }
    }

    /// Read one file and embed it
    pub async fn embed_file(&self, relative_path: String) -> FileEmbedding {
        match self.fs.read(&relative_path).await {
            Ok(bytes) => self.embed_bytes(relative_path, &bytes).await,
            Err(e) => Err(FileFailure {
                relative_path,
                error: e.into(),
            }),
        }
    }

    /// Chunk and embed already loaded content
    pub async fn embed_bytes(&self, relative_path: String, bytes: &[u8]) -> FileEmbedding {
        let hash = content_hash(bytes);
        let content = String::from_utf8_lossy(bytes);
        let chunks = chunk_lines(&relative_path, &content, self.chunk_lines);

        match self.embed_chunks(&chunks).await {
            Ok(vectors) => {
                debug!("Embedded {} chunks of {relative_path}", chunks.len());
                Ok(EmbeddedFile {
                    relative_path,
                    content_hash: hash,
                    chunks: chunks.into_iter().zip(vectors).collect(),
                })
            }
            Err(e) => {
                warn!("Embedding failed for {relative_path}: {e}");
                Err(FileFailure {
                    relative_path,
                    error: e.into(),
                })
            }
        }
    }

    /// Batches are sent one after another so the first error stops the file
    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let batch_size = self.provider.max_batch_size().max(1);
        let dimension = self.provider.dimension();
        let mut vectors = Vec::with_capacity(chunks.len());

        for batch in chunks.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|chunk| chunk.content.clone()).collect();

            let embedded = {
                let _permit = self
                    .permits
                    .acquire()
                    .await
                    .map_err(|e| EmbeddingError::Other(format!("Semaphore error: {e}")))?;
                self.provider.embed(&texts).await?
            };

            check_vectors(&embedded, texts.len(), dimension)?;
            vectors.extend(embedded);
        }

        Ok(vectors)
    }
}
