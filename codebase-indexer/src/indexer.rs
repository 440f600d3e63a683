use crate::config::{EmbeddingFailurePolicy, IndexerConfig};
use crate::diff::{compute_changes, is_indexable, load_manifests_or_empty};
use crate::error::{IndexerError, Result};
use crate::fs::{FileSystem, LocalFileSystem, resolve_relative_str};
use crate::manifest::{JsonManifestStore, Manifest, ManifestStore, content_hash};
use crate::metadata::{IndexMetadata, IndexStatus, MetadataStore};
use crate::pipeline::{EmbeddedFile, EmbeddingPipeline, FileFailure};
use crate::query::{QueryEngine, QueryResult};
use crate::reconcile::{find_orphans, reconcile_schema};
use chrono::Utc;
use coderag_embeddings::EmbeddingProvider;
use coderag_vector_store::{
    EmbeddingRecord, VectorIndex, VectorStore, VectorStoreConfig, VectorStoreError,
};
use futures::StreamExt;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Called once for every file that could not be indexed during a run
pub type ErrorCallback = Arc<dyn Fn(&FileFailure) + Send + Sync>;

/// One progress event: `progress` of `total` files have settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexProgress {
    pub progress: usize,
    pub total: usize,
}

/// Statistics about a full indexing run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexSummary {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    pub failed: usize,
    pub orphan_manifests_removed: usize,
    pub orphan_embeddings_removed: usize,
    pub chunks_written: usize,
    pub schema_rebuilt: bool,
    /// The progress receiver was dropped before the run finished
    pub cancelled: bool,
    /// Manifests alive after the run
    pub indexed_files: usize,
}

/// A running full index pass.
///
/// Drain `progress` to follow it; dropping the receiver cancels the run
/// after the rows already embedded have been written.
pub struct IndexRun {
    pub progress: mpsc::Receiver<IndexProgress>,
    pub handle: JoinHandle<Result<IndexSummary>>,
}

impl IndexRun {
    /// Drain progress and wait for the summary
    pub async fn wait(self) -> Result<IndexSummary> {
        self.collect().await.1
    }

    /// Every progress event, then the summary
    pub async fn collect(mut self) -> (Vec<IndexProgress>, Result<IndexSummary>) {
        let mut events = Vec::new();
        while let Some(event) = self.progress.recv().await {
            events.push(event);
        }
        (events, join(self.handle).await)
    }

    /// Stop listening and let the run wind down
    pub async fn cancel(self) -> Result<IndexSummary> {
        drop(self.progress);
        join(self.handle).await
    }
}

async fn join(handle: JoinHandle<Result<IndexSummary>>) -> Result<IndexSummary> {
    handle
        .await
        .map_err(|e| IndexerError::Task(e.to_string()))?
}

/// Change notification for a single file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileEvent {
    Add,
    Update,
    Delete,
}

/// What [`RagIndex::update_rag`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Indexed { chunks: usize },
    /// The manifest already matched the file
    Unchanged,
    Removed,
    /// Not an eligible path
    Ignored,
}

/// Incremental index of one workspace.
///
/// Keeps the vector store and the manifest store eventually consistent:
/// vector rows are written before the manifest claiming them, and deleted
/// before the manifest is dropped. Runs on the same workspace must be
/// serialized by the caller.
#[derive(Clone)]
pub struct RagIndex {
    config: Arc<IndexerConfig>,
    fs: Arc<dyn FileSystem>,
    store: Arc<dyn VectorIndex>,
    manifests: Arc<dyn ManifestStore>,
    metadata: Arc<MetadataStore>,
    pipeline: EmbeddingPipeline,
    query_engine: QueryEngine,
}

impl RagIndex {
    /// Open the index stored under `config.index_dir()` for a local workspace
    pub async fn open(config: IndexerConfig, provider: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        config.validate().map_err(IndexerError::Config)?;
        tokio::fs::create_dir_all(config.index_dir()).await?;

        let store = VectorStore::open(
            &config.vector_db_path(),
            VectorStoreConfig::new(provider.dimension(), config.rag_version),
        )
        .await?;

        let fs = Arc::new(LocalFileSystem::from_config(&config));
        let manifests = Arc::new(JsonManifestStore::new(config.manifest_path()));
        let metadata = Arc::new(MetadataStore::new(config.metadata_path()));

        Self::with_parts(config, fs, provider, Arc::new(store), manifests, metadata)
    }

    /// Assemble an index from injected collaborators
    pub fn with_parts(
        config: IndexerConfig,
        fs: Arc<dyn FileSystem>,
        provider: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorIndex>,
        manifests: Arc<dyn ManifestStore>,
        metadata: Arc<MetadataStore>,
    ) -> Result<Self> {
        if store.config().embedding_dim != provider.dimension() {
            return Err(IndexerError::Config(format!(
                "vector store dimension {} differs from provider '{}' dimension {}",
                store.config().embedding_dim,
                provider.model_id(),
                provider.dimension()
            )));
        }
        if store.config().rag_version != config.rag_version {
            return Err(IndexerError::Config(format!(
                "vector store rag_version {} differs from configured {}",
                store.config().rag_version,
                config.rag_version
            )));
        }

        let pipeline = EmbeddingPipeline::new(fs.clone(), provider.clone(), &config);
        let query_engine = QueryEngine::new(provider, store.clone());

        Ok(Self {
            config: Arc::new(config),
            fs,
            store,
            manifests,
            metadata,
            pipeline,
            query_engine,
        })
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    /// Start a full reconciliation pass in the background
    pub fn initialize_rag(&self, on_error: Option<ErrorCallback>) -> IndexRun {
        let (tx, rx) = mpsc::channel(self.config.progress_buffer);
        let index = self.clone();
        let handle = tokio::spawn(async move {
            let mut run = FullRun::new(&index, tx, on_error);
            run.execute().await
        });
        IndexRun {
            progress: rx,
            handle,
        }
    }

    /// Bring a single file in line with the workspace
    pub async fn update_rag(&self, relative_path: &str, event: FileEvent) -> Result<UpdateOutcome> {
        let path = resolve_relative_str(relative_path)
            .filter(|path| !path.is_empty())
            .ok_or_else(|| IndexerError::InvalidPath(relative_path.to_string()))?;

        reconcile_schema(
            self.store.as_ref(),
            self.manifests.as_ref(),
            &self.metadata,
            self.config.rag_version,
            self.config.schema_version,
        )
        .await?;

        let outcome = match event {
            FileEvent::Delete => self.remove_file(&path).await?,
            FileEvent::Add | FileEvent::Update => self.index_file(&path).await?,
        };
        debug!("update_rag {path} ({event:?}): {outcome:?}");

        if matches!(outcome, UpdateOutcome::Indexed { .. } | UpdateOutcome::Removed) {
            self.sync_metadata().await?;
        }
        Ok(outcome)
    }

    /// Rank indexed chunks by similarity to `text`, at most `limit` of them
    /// ([`DEFAULT_QUERY_LIMIT`](crate::DEFAULT_QUERY_LIMIT) when `None`)
    pub async fn query(&self, text: &str, limit: Option<usize>) -> Result<Vec<QueryResult>> {
        self.query_engine.query(text, limit).await
    }

    pub async fn get_metadata(&self) -> Result<IndexStatus> {
        self.metadata.status().await
    }

    /// Drop every vector row, manifest and metadata counter
    pub async fn reset(&self) -> Result<()> {
        info!("Resetting index for {}", self.config.root_dir.display());
        self.store.reset().await?;
        self.manifests.clear().await?;
        self.metadata
            .reset(self.config.rag_version, self.config.schema_version)
            .await?;
        Ok(())
    }

    async fn index_file(&self, path: &str) -> Result<UpdateOutcome> {
        if !self.config.allowlist.is_eligible(path) || self.fs.is_excluded(path) {
            return Ok(UpdateOutcome::Ignored);
        }

        let bytes = match self.fs.read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return self.remove_file(path).await,
            Err(e) => return Err(e.into()),
        };
        if !is_indexable(&bytes, self.config.max_file_bytes) {
            return self.remove_file(path).await;
        }

        let hash = content_hash(&bytes);
        if let Ok(Some(manifest)) = self.manifests.get(path).await
            && manifest.is_current(&hash, self.config.rag_version)
        {
            return Ok(UpdateOutcome::Unchanged);
        }

        let file = self
            .pipeline
            .embed_bytes(path.to_string(), &bytes)
            .await
            .map_err(|failure| failure.error)?;

        let rows = self.records_for(&file);
        self.store.delete_by_path(path).await?;
        self.store.insert_batch(&rows).await?;
        self.manifests
            .put(Manifest::new(path, file.content_hash, self.config.rag_version))
            .await?;

        Ok(UpdateOutcome::Indexed { chunks: rows.len() })
    }

    async fn remove_file(&self, path: &str) -> Result<UpdateOutcome> {
        self.store.delete_by_path(path).await?;
        if self.manifests.remove(path).await? {
            Ok(UpdateOutcome::Removed)
        } else {
            Ok(UpdateOutcome::Ignored)
        }
    }

    async fn sync_metadata(&self) -> Result<IndexMetadata> {
        let indexed_files = self.manifests.len().await?;
        self.metadata
            .record_run(
                indexed_files,
                self.config.rag_version,
                self.config.schema_version,
            )
            .await
    }

    fn records_for(&self, file: &EmbeddedFile) -> Vec<EmbeddingRecord> {
        let absolute_path = self
            .fs
            .absolute_path(&file.relative_path)
            .to_string_lossy()
            .into_owned();
        let indexed_at = Utc::now().timestamp_millis();

        file.chunks
            .iter()
            .map(|(chunk, vector)| EmbeddingRecord {
                absolute_path: absolute_path.clone(),
                relative_path: chunk.relative_path.clone(),
                chunk_index: chunk.chunk_index,
                total_chunks: chunk.total_chunks,
                content: chunk.content.clone(),
                embedding: vector.clone(),
                start_line: chunk.start_line,
                end_line: chunk.end_line,
                rag_version: self.config.rag_version,
                indexed_at,
            })
            .collect()
    }
}

/// Emits one event per settled file and notices when nobody listens anymore
struct ProgressSink {
    tx: mpsc::Sender<IndexProgress>,
    progress: usize,
    total: usize,
    closed: bool,
}

impl ProgressSink {
    async fn emit(&mut self) {
        if self.closed {
            return;
        }
        let event = IndexProgress {
            progress: self.progress,
            total: self.total,
        };
        if self.tx.send(event).await.is_err() {
            debug!("Progress receiver dropped");
            self.closed = true;
        }
    }

    async fn settle(&mut self, files: usize) {
        for _ in 0..files {
            self.progress += 1;
            self.emit().await;
        }
    }

    fn cancelled(&mut self) -> bool {
        if self.tx.is_closed() {
            self.closed = true;
        }
        self.closed
    }
}

/// A file whose rows are buffered but not yet written
struct PendingFile {
    relative_path: String,
    content_hash: String,
    updated: bool,
}

/// State of one `initialize_rag` pass
struct FullRun<'a> {
    index: &'a RagIndex,
    sink: ProgressSink,
    on_error: Option<ErrorCallback>,
    rows: Vec<EmbeddingRecord>,
    pending: Vec<PendingFile>,
    stale_rows: BTreeSet<String>,
    orphan_embeddings: BTreeSet<String>,
    aborted: Option<FileFailure>,
    summary: IndexSummary,
}

impl<'a> FullRun<'a> {
    fn new(
        index: &'a RagIndex,
        tx: mpsc::Sender<IndexProgress>,
        on_error: Option<ErrorCallback>,
    ) -> Self {
        Self {
            index,
            sink: ProgressSink {
                tx,
                progress: 0,
                total: 0,
                closed: false,
            },
            on_error,
            rows: Vec::new(),
            pending: Vec::new(),
            stale_rows: BTreeSet::new(),
            orphan_embeddings: BTreeSet::new(),
            aborted: None,
            summary: IndexSummary::default(),
        }
    }

    async fn execute(&mut self) -> Result<IndexSummary> {
        let started = Instant::now();
        let config = self.index.config.clone();
        info!("Starting index run in {}", config.root_dir.display());

        let check = reconcile_schema(
            self.index.store.as_ref(),
            self.index.manifests.as_ref(),
            &self.index.metadata,
            config.rag_version,
            config.schema_version,
        )
        .await?;
        self.summary.schema_rebuilt = check.is_rebuilt();

        // Orphans first, so the diff sees the cleaned manifest set
        let mut manifests = load_manifests_or_empty(self.index.manifests.as_ref()).await;
        let orphans = find_orphans(self.index.store.as_ref(), &manifests).await?;
        for path in &orphans.orphan_manifests {
            match self.index.manifests.remove(path).await {
                Ok(_) => {
                    manifests.remove(path);
                    self.summary.orphan_manifests_removed += 1;
                }
                Err(e) => warn!("Failed to remove orphan manifest {path}: {e}"),
            }
        }

        let mut changes = compute_changes(
            self.index.fs.as_ref(),
            &config.allowlist,
            &manifests,
            config.rag_version,
            config.max_file_bytes,
        )
        .await?;

        // Orphan rows of re-added files are replaced when the file is written
        let (stale, doomed): (BTreeSet<String>, BTreeSet<String>) = orphans
            .orphan_embeddings
            .into_iter()
            .partition(|path| changes.to_add.contains(path));
        self.stale_rows = stale;
        changes.to_remove.extend(doomed.iter().cloned());
        self.orphan_embeddings = doomed;

        self.sink.total = changes.total();
        info!(
            "Indexing {} files: {} to add, {} to update, {} to remove",
            self.sink.total,
            changes.to_add.len(),
            changes.to_update.len(),
            changes.to_remove.len()
        );
        if self.sink.total == 0 {
            self.sink.emit().await;
        }

        self.embed_phase(changes.to_add, false).await;
        self.embed_phase(changes.to_update, true).await;
        self.remove_phase(changes.to_remove).await;

        let indexed_files = self.index.sync_metadata().await?.indexed_files;
        self.summary.indexed_files = indexed_files;
        self.summary.cancelled = self.sink.cancelled();

        info!(
            "Indexing finished in {:?}: {} added, {} updated, {} removed, {} failed, {} chunks written, {} files indexed",
            started.elapsed(),
            self.summary.added,
            self.summary.updated,
            self.summary.removed,
            self.summary.failed,
            self.summary.chunks_written,
            indexed_files
        );

        match self.aborted.take() {
            Some(failure) => Err(IndexerError::Aborted {
                relative_path: failure.relative_path,
                source: Box::new(failure.error),
            }),
            None => Ok(self.summary.clone()),
        }
    }

    /// Whether later files should be skipped; aborted files still settle
    async fn skip_remaining(&mut self, files: usize) -> bool {
        if self.sink.cancelled() {
            return true;
        }
        if self.aborted.is_some() {
            self.summary.failed += files;
            self.sink.settle(files).await;
            return true;
        }
        false
    }

    async fn embed_phase(&mut self, paths: BTreeSet<String>, updated: bool) {
        let count = paths.len();
        if count == 0 || self.skip_remaining(count).await {
            return;
        }
        info!(
            "{}: {count} files",
            if updated { "Updating" } else { "Adding" }
        );

        let mut settled = 0;
        let mut files = self.index.pipeline.embed_files(paths.into_iter().collect());
        while let Some(item) = files.next().await {
            settled += 1;
            match item {
                Ok(file) => self.stage(file, updated).await,
                Err(failure) => {
                    let abort =
                        self.index.config.failure_policy == EmbeddingFailurePolicy::AbortRun;
                    self.report(&failure).await;
                    if abort {
                        self.aborted = Some(failure);
                    }
                }
            }
            if self.sink.cancelled() {
                break;
            }
        }
        drop(files);

        self.flush().await;
        self.skip_remaining(count - settled).await;
    }

    /// Buffer a file's rows, writing them once the buffer is full
    async fn stage(&mut self, file: EmbeddedFile, updated: bool) {
        let path = file.relative_path.clone();

        if file.chunks.is_empty() {
            debug!("{path} has no content left; removing it");
            self.remove(&path).await;
            return;
        }

        // Never let two generations of a file's rows coexist
        if (updated || self.stale_rows.contains(&path))
            && let Err(e) = self.index.store.delete_by_path(&path).await
        {
            self.report(&FileFailure {
                relative_path: path,
                error: e.into(),
            })
            .await;
            return;
        }

        self.rows.extend(self.index.records_for(&file));
        self.pending.push(PendingFile {
            relative_path: path,
            content_hash: file.content_hash,
            updated,
        });

        if self.rows.len() >= self.index.config.flush_threshold {
            self.flush().await;
        }
    }

    /// Write buffered rows, then commit the manifests they back
    async fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let rows = std::mem::take(&mut self.rows);
        let pending = std::mem::take(&mut self.pending);
        debug!("Flushing {} rows for {} files", rows.len(), pending.len());

        if let Err(e) = self.index.store.insert_batch(&rows).await {
            warn!("Failed to write {} rows: {e}", rows.len());
            let message = e.to_string();
            for file in pending {
                self.report(&FileFailure {
                    relative_path: file.relative_path,
                    error: VectorStoreError::AdditionFailed(message.clone()).into(),
                })
                .await;
            }
            return;
        }
        self.summary.chunks_written += rows.len();

        let manifests = pending
            .iter()
            .map(|file| {
                Manifest::new(
                    file.relative_path.clone(),
                    file.content_hash.clone(),
                    self.index.config.rag_version,
                )
            })
            .collect();
        if let Err(e) = self.index.manifests.put_many(manifests).await {
            warn!("Failed to commit {} manifests: {e}", pending.len());
            let message = e.to_string();
            for file in pending {
                self.report(&FileFailure {
                    relative_path: file.relative_path,
                    error: IndexerError::ManifestStore(message.clone()),
                })
                .await;
            }
            return;
        }

        for file in &pending {
            if file.updated {
                self.summary.updated += 1;
            } else {
                self.summary.added += 1;
            }
        }
        self.sink.settle(pending.len()).await;
    }

    async fn remove_phase(&mut self, paths: BTreeSet<String>) {
        let count = paths.len();
        if count == 0 || self.skip_remaining(count).await {
            return;
        }
        info!("Removing: {count} files");

        for path in paths {
            if self.sink.cancelled() {
                break;
            }
            self.remove(&path).await;
        }
    }

    /// Rows first, then the manifest
    async fn remove(&mut self, path: &str) {
        if let Err(e) = self.index.store.delete_by_path(path).await {
            self.report(&FileFailure {
                relative_path: path.to_string(),
                error: e.into(),
            })
            .await;
            return;
        }
        if let Err(e) = self.index.manifests.remove(path).await {
            self.report(&FileFailure {
                relative_path: path.to_string(),
                error: e,
            })
            .await;
            return;
        }

        if self.orphan_embeddings.contains(path) {
            self.summary.orphan_embeddings_removed += 1;
        } else {
            self.summary.removed += 1;
        }
        self.sink.settle(1).await;
    }

    /// Count a failed file and let the caller know
    async fn report(&mut self, failure: &FileFailure) {
        warn!("Failed to index {}: {}", failure.relative_path, failure.error);
        if let Some(callback) = &self.on_error {
            callback(failure);
        }
        self.summary.failed += 1;
        self.sink.settle(1).await;
    }
}
