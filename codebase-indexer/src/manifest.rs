use crate::error::{IndexerError, Result};
use crate::persist::{read_json, write_json_atomic};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// Fingerprint of one indexed file.
///
/// Its presence claims that the vector store holds at least one row for
/// `relative_path`, produced under `rag_version` from content hashing to
/// `content_hash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub relative_path: String,

    /// SHA256 hash of file content
    pub content_hash: String,

    pub rag_version: u32,

    pub indexed_at: DateTime<Utc>,
}

impl Manifest {
    pub fn new(relative_path: impl Into<String>, content_hash: impl Into<String>, rag_version: u32) -> Self {
        Self {
            relative_path: relative_path.into(),
            content_hash: content_hash.into(),
            rag_version,
            indexed_at: Utc::now(),
        }
    }

    /// Whether this manifest already describes `content_hash` under `rag_version`
    pub fn is_current(&self, content_hash: &str, rag_version: u32) -> bool {
        self.content_hash == content_hash && self.rag_version == rag_version
    }
}

/// Compute SHA256 hash of file content, lowercase hex
pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Durable `relative_path → Manifest` map
#[async_trait]
pub trait ManifestStore: Send + Sync {
    async fn get(&self, relative_path: &str) -> Result<Option<Manifest>>;

    async fn all(&self) -> Result<HashMap<String, Manifest>>;

    /// Insert or replace the manifest for its path
    async fn put(&self, manifest: Manifest) -> Result<()>;

    /// Insert or replace several manifests in one durable write
    async fn put_many(&self, manifests: Vec<Manifest>) -> Result<()>;

    /// Returns whether a manifest was removed; removing an unknown path is a no-op
    async fn remove(&self, relative_path: &str) -> Result<bool>;

    async fn clear(&self) -> Result<()>;

    async fn len(&self) -> Result<usize>;

    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}

/// Manifest store persisted as a single JSON file.
///
/// Every mutation rewrites the file atomically; reads are served from an
/// in-memory copy loaded on first use.
pub struct JsonManifestStore {
    path: PathBuf,
    cache: RwLock<Option<BTreeMap<String, Manifest>>>,
}

impl JsonManifestStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: RwLock::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, Manifest>> {
        read_json(&self.path)
            .map(Option::unwrap_or_default)
            .map_err(|e| {
                IndexerError::ManifestStore(format!("failed to read {}: {e}", self.path.display()))
            })
    }

    /// Like `load`, but an unreadable file is replaced by the next write
    fn load_for_write(&self) -> BTreeMap<String, Manifest> {
        self.load().unwrap_or_else(|e| {
            warn!("{e}; starting from an empty manifest set");
            BTreeMap::new()
        })
    }

    async fn with_entries<R>(&self, f: impl FnOnce(&BTreeMap<String, Manifest>) -> R) -> Result<R> {
        {
            let guard = self.cache.read().await;
            if let Some(entries) = guard.as_ref() {
                return Ok(f(entries));
            }
        }

        let mut guard = self.cache.write().await;
        let entries = match guard.take() {
            Some(entries) => entries,
            None => self.load()?,
        };
        let result = f(&entries);
        *guard = Some(entries);
        Ok(result)
    }

    async fn mutate<R>(&self, f: impl FnOnce(&mut BTreeMap<String, Manifest>) -> R) -> Result<R> {
        let mut guard = self.cache.write().await;
        let mut entries = match guard.as_ref() {
            Some(entries) => entries.clone(),
            None => self.load_for_write(),
        };
        let result = f(&mut entries);

        write_json_atomic(&self.path, &entries).map_err(|e| {
            IndexerError::ManifestStore(format!("failed to write {}: {e}", self.path.display()))
        })?;
        *guard = Some(entries);
        Ok(result)
    }
}

#[async_trait]
impl ManifestStore for JsonManifestStore {
    async fn get(&self, relative_path: &str) -> Result<Option<Manifest>> {
        self.with_entries(|entries| entries.get(relative_path).cloned())
            .await
    }

    async fn all(&self) -> Result<HashMap<String, Manifest>> {
        self.with_entries(|entries| {
            entries
                .iter()
                .map(|(path, manifest)| (path.clone(), manifest.clone()))
                .collect()
        })
        .await
    }

    async fn put(&self, manifest: Manifest) -> Result<()> {
        self.mutate(|entries| {
            entries.insert(manifest.relative_path.clone(), manifest);
        })
        .await
    }

    async fn put_many(&self, manifests: Vec<Manifest>) -> Result<()> {
        if manifests.is_empty() {
            return Ok(());
        }
        self.mutate(|entries| {
            for manifest in manifests {
                entries.insert(manifest.relative_path.clone(), manifest);
            }
        })
        .await
    }

    async fn remove(&self, relative_path: &str) -> Result<bool> {
        let known = self
            .with_entries(|entries| entries.contains_key(relative_path))
            .await
            .unwrap_or(true);
        if !known {
            return Ok(false);
        }

        self.mutate(|entries| entries.remove(relative_path).is_some())
            .await
    }

    async fn clear(&self) -> Result<()> {
        self.mutate(BTreeMap::clear).await
    }

    async fn len(&self) -> Result<usize> {
        self.with_entries(BTreeMap::len).await
    }
}
