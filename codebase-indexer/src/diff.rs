use crate::allowlist::Allowlist;
use crate::error::Result;
use crate::fs::FileSystem;
use crate::manifest::{Manifest, ManifestStore, content_hash};
use futures::StreamExt;
use log::{debug, info, warn};
use std::collections::{BTreeSet, HashMap};

const READ_CONCURRENCY: usize = 16;

/// Files whose index state disagrees with the workspace
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// On disk, no manifest
    pub to_add: BTreeSet<String>,
    /// Manifest exists but hash or rag version differ
    pub to_update: BTreeSet<String>,
    /// Manifest exists, file is gone or no longer indexable
    pub to_remove: BTreeSet<String>,
    /// Eligible files whose manifest is current
    pub unchanged: usize,
}

impl ChangeSet {
    pub fn total(&self) -> usize {
        self.to_add.len() + self.to_update.len() + self.to_remove.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Whether file content is worth a chunk: not blank and not oversized
pub fn is_indexable(bytes: &[u8], max_file_bytes: u64) -> bool {
    bytes.len() as u64 <= max_file_bytes && !bytes.iter().all(u8::is_ascii_whitespace)
}

/// All manifests, or none when the store cannot be read
pub async fn load_manifests_or_empty(store: &dyn ManifestStore) -> HashMap<String, Manifest> {
    match store.all().await {
        Ok(manifests) => manifests,
        Err(e) => {
            warn!("Manifest store unreadable, treating index as empty: {e}");
            HashMap::new()
        }
    }
}

/// Diff the workspace against the manifest store
pub async fn diff(
    fs: &dyn FileSystem,
    allowlist: &Allowlist,
    manifest_store: &dyn ManifestStore,
    rag_version: u32,
    max_file_bytes: u64,
) -> Result<ChangeSet> {
    let manifests = load_manifests_or_empty(manifest_store).await;
    compute_changes(fs, allowlist, &manifests, rag_version, max_file_bytes).await
}

/// Diff the workspace against an already loaded manifest map.
///
/// Change detection looks at content hashes and rag versions only, never at
/// timestamps. Files that cannot be read are neither added nor removed.
pub async fn compute_changes(
    fs: &dyn FileSystem,
    allowlist: &Allowlist,
    manifests: &HashMap<String, Manifest>,
    rag_version: u32,
    max_file_bytes: u64,
) -> Result<ChangeSet> {
    let listed = fs.list_files().await?;

    let by_extension: BTreeSet<&String> = listed
        .iter()
        .filter(|path| allowlist.matches_extension(path))
        .collect();
    let by_filename: BTreeSet<&String> = listed
        .iter()
        .filter(|path| allowlist.matches_filename(path))
        .collect();
    let eligible: BTreeSet<&String> = by_extension.union(&by_filename).copied().collect();

    debug!(
        "{} of {} listed files are eligible",
        eligible.len(),
        listed.len()
    );

    let mut reads = futures::stream::iter(eligible.into_iter().cloned())
        .map(|path| async move {
            let read = fs.read(&path).await;
            (path, read)
        })
        .buffer_unordered(READ_CONCURRENCY);

    let mut changes = ChangeSet::default();
    let mut present = BTreeSet::new();

    while let Some((path, read)) = reads.next().await {
        let bytes = match read {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Skipping unreadable file {path}: {e}");
                present.insert(path.clone());
                continue;
            }
        };

        if !is_indexable(&bytes, max_file_bytes) {
            debug!("Skipping {path}: empty or larger than {max_file_bytes} bytes");
            continue;
        }
        present.insert(path.clone());

        let hash = content_hash(&bytes);
        match manifests.get(path.as_str()) {
            None => {
                changes.to_add.insert(path.clone());
            }
            Some(manifest) if !manifest.is_current(&hash, rag_version) => {
                changes.to_update.insert(path.clone());
            }
            Some(_) => changes.unchanged += 1,
        }
    }

    changes.to_remove = manifests
        .keys()
        .filter(|path| !present.contains(*path))
        .cloned()
        .collect();

    info!(
        "Diff: {} to add, {} to update, {} to remove, {} unchanged",
        changes.to_add.len(),
        changes.to_update.len(),
        changes.to_remove.len(),
        changes.unchanged
    );

    Ok(changes)
}
