/*!
# Coderag Indexer

Incremental codebase indexing and semantic retrieval.

A workspace is scanned, every eligible file is fingerprinted, and only files
whose content or index generation changed are re-chunked and re-embedded.
Per-file manifests and vector rows live in two independent stores; the
indexer keeps them consistent by always writing vectors before the manifest
that claims them, and by reconciling orphans at the start of every run.

## Features

- **Incremental indexing**: unchanged files are never re-embedded
- **Crash tolerant**: orphan rows and orphan manifests are cleaned up
- **Self-healing schema**: a dimension or version change rebuilds the index
- **Bounded concurrency**: a fixed number of embedding calls in flight
- **Streaming progress**: one `{progress, total}` event per settled file

## Example

```rust,no_run
use coderag_embeddings::{HttpEmbeddingConfig, HttpEmbeddingProvider, ProviderCredential};
use coderag_indexer::{IndexerConfig, RagIndex};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let credential = ProviderCredential::from_env("OPENAI_API_KEY")
        .ok_or_else(|| anyhow::anyhow!("OPENAI_API_KEY is not set"))?;
    let provider = HttpEmbeddingProvider::new(HttpEmbeddingConfig::default(), credential)?;

    let index = RagIndex::open(IndexerConfig::new("./my-project"), Arc::new(provider)).await?;

    let mut run = index.initialize_rag(None);
    while let Some(event) = run.progress.recv().await {
        println!("{}/{}", event.progress, event.total);
    }
    let summary = run.handle.await??;
    println!("{} files indexed", summary.indexed_files);

    for hit in index.query("where are sessions persisted?", Some(5)).await? {
        println!("{}:{}-{} ({})", hit.relative_path, hit.start_line, hit.end_line, hit.distance);
    }
    Ok(())
}
```
*/

mod allowlist;
mod chunk;
mod config;
mod diff;
mod error;
mod fs;
mod indexer;
mod manifest;
mod metadata;
mod persist;
mod pipeline;
mod query;
mod reconcile;

pub use allowlist::Allowlist;
pub use chunk::{Chunk, chunk_lines};
pub use config::{
    DEFAULT_INDEX_DIR_NAME, EmbeddingFailurePolicy, IndexerConfig, RAG_VERSION, SCHEMA_VERSION,
};
pub use diff::{ChangeSet, compute_changes, diff, is_indexable};
pub use error::{ErrorKind, IndexerError, Result};
pub use fs::{FileSystem, LocalFileSystem, normalize_relative_path, resolve_relative_str};
pub use indexer::{
    ErrorCallback, FileEvent, IndexProgress, IndexRun, IndexSummary, RagIndex, UpdateOutcome,
};
pub use manifest::{JsonManifestStore, Manifest, ManifestStore, content_hash};
pub use metadata::{IndexMetadata, IndexStatus, METADATA_KEY, MetadataStore};
pub use pipeline::{EmbeddedFile, EmbeddingPipeline, FileEmbedding, FileFailure};
pub use query::{DEFAULT_QUERY_LIMIT, QueryEngine, QueryResult};
pub use reconcile::{Orphans, find_orphans, reconcile_schema};
