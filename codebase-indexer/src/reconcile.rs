use crate::error::{IndexerError, Result};
use crate::manifest::{Manifest, ManifestStore};
use crate::metadata::MetadataStore;
use coderag_vector_store::{SchemaCheck, VectorIndex};
use log::{info, warn};
use std::collections::{BTreeSet, HashMap};

/// Disagreements between the vector store and the manifest store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Orphans {
    /// Paths with vector rows but no manifest
    pub orphan_embeddings: BTreeSet<String>,
    /// Paths with a manifest but no vector row
    pub orphan_manifests: BTreeSet<String>,
}

impl Orphans {
    pub fn is_empty(&self) -> bool {
        self.orphan_embeddings.is_empty() && self.orphan_manifests.is_empty()
    }
}

/// Compare the paths present in the vector store with `manifests`
pub async fn find_orphans(
    store: &dyn VectorIndex,
    manifests: &HashMap<String, Manifest>,
) -> Result<Orphans> {
    let indexed = store.indexed_paths().await?;

    let orphans = Orphans {
        orphan_embeddings: indexed
            .iter()
            .filter(|path| !manifests.contains_key(*path))
            .cloned()
            .collect(),
        orphan_manifests: manifests
            .keys()
            .filter(|path| !indexed.contains(*path))
            .cloned()
            .collect(),
    };

    if !orphans.is_empty() {
        info!(
            "Found {} orphan embeddings and {} orphan manifests",
            orphans.orphan_embeddings.len(),
            orphans.orphan_manifests.len()
        );
    }
    Ok(orphans)
}

/// Validate the vector table and, when it had to be rebuilt, void every
/// completion claim held by the manifest and metadata stores.
pub async fn reconcile_schema(
    store: &dyn VectorIndex,
    manifests: &dyn ManifestStore,
    metadata: &MetadataStore,
    rag_version: u32,
    schema_version: u32,
) -> Result<SchemaCheck> {
    let check = store.ensure_schema().await?;

    if let SchemaCheck::Rebuilt { reason } = &check {
        warn!("Vector table rebuilt ({reason}); clearing manifests and metadata");
        manifests
            .clear()
            .await
            .map_err(|e| IndexerError::SchemaReset(format!("clearing manifests: {e}")))?;
        metadata
            .reset(rag_version, schema_version)
            .await
            .map_err(|e| IndexerError::SchemaReset(format!("resetting metadata: {e}")))?;
    }

    Ok(check)
}
