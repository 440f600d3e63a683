use crate::error::{IndexerError, Result};
use crate::persist::{read_json, write_json_atomic};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::Mutex;

/// Key of the singleton record inside the metadata file
pub const METADATA_KEY: &str = "schema";

/// Singleton record describing the index as a whole
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub rag_version: u32,
    pub last_indexed_at: Option<DateTime<Utc>>,
    pub indexed_files: usize,
    pub schema_version: u32,
    pub initialized_at: DateTime<Utc>,
}

impl IndexMetadata {
    pub fn new(rag_version: u32, schema_version: u32) -> Self {
        Self {
            rag_version,
            last_indexed_at: None,
            indexed_files: 0,
            schema_version,
            initialized_at: Utc::now(),
        }
    }
}

/// What callers see of the metadata record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStatus {
    pub last_indexed_at: Option<DateTime<Utc>>,
    pub indexed_files: usize,
}

impl From<&IndexMetadata> for IndexStatus {
    fn from(metadata: &IndexMetadata) -> Self {
        Self {
            last_indexed_at: metadata.last_indexed_at,
            indexed_files: metadata.indexed_files,
        }
    }
}

/// File-backed store for the singleton [`IndexMetadata`]
pub struct MetadataStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl MetadataStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub async fn load(&self) -> Result<Option<IndexMetadata>> {
        let _guard = self.lock.lock().await;
        self.read()
    }

    /// Replace the record with a fresh one claiming nothing is indexed
    pub async fn reset(&self, rag_version: u32, schema_version: u32) -> Result<IndexMetadata> {
        let _guard = self.lock.lock().await;
        let metadata = IndexMetadata::new(rag_version, schema_version);
        self.write(&metadata)?;
        debug!("Metadata reset to rag_version {rag_version}");
        Ok(metadata)
    }

    /// Refresh counters at the end of a run, creating the record on first use
    pub async fn record_run(
        &self,
        indexed_files: usize,
        rag_version: u32,
        schema_version: u32,
    ) -> Result<IndexMetadata> {
        let _guard = self.lock.lock().await;
        let mut metadata = match self.read() {
            Ok(Some(metadata)) => metadata,
            Ok(None) => IndexMetadata::new(rag_version, schema_version),
            Err(e) => {
                warn!("{e}; recreating metadata");
                IndexMetadata::new(rag_version, schema_version)
            }
        };

        metadata.rag_version = rag_version;
        metadata.schema_version = schema_version;
        metadata.indexed_files = indexed_files;
        metadata.last_indexed_at = Some(Utc::now());

        self.write(&metadata)?;
        Ok(metadata)
    }

    /// Zeros when no run has completed yet
    pub async fn status(&self) -> Result<IndexStatus> {
        Ok(self
            .load()
            .await?
            .as_ref()
            .map(IndexStatus::from)
            .unwrap_or_default())
    }

    fn read(&self) -> Result<Option<IndexMetadata>> {
        let mut records: BTreeMap<String, IndexMetadata> = read_json(&self.path)
            .map_err(|e| {
                IndexerError::MetadataStore(format!("failed to read {}: {e}", self.path.display()))
            })?
            .unwrap_or_default();
        Ok(records.remove(METADATA_KEY))
    }

    fn write(&self, metadata: &IndexMetadata) -> Result<()> {
        let records = BTreeMap::from([(METADATA_KEY, metadata)]);
        write_json_atomic(&self.path, &records).map_err(|e| {
            IndexerError::MetadataStore(format!("failed to write {}: {e}", self.path.display()))
        })
    }
}
