use coderag_indexer::{IndexerConfig, JsonManifestStore, RAG_VERSION, RagIndex};
use coderag_vector_store::{VectorStore, VectorStoreConfig};
use indexer_test_support::{MockEmbeddingProvider, Workspace};
use std::sync::Arc;

mod cancellation;
mod incremental;
mod query;
mod self_heal;

pub(crate) const DIM: usize = 8;

pub(crate) fn config_for(workspace: &Workspace) -> IndexerConfig {
    IndexerConfig::new(workspace.root())
}

pub(crate) async fn open_index(
    workspace: &Workspace,
    provider: Arc<MockEmbeddingProvider>,
) -> RagIndex {
    RagIndex::open(config_for(workspace), provider).await.unwrap()
}

/// A fresh handle on the index's vector table, seeing every committed write
pub(crate) async fn vector_store(workspace: &Workspace, rag_version: u32) -> VectorStore {
    VectorStore::open(
        &config_for(workspace).vector_db_path(),
        VectorStoreConfig::new(DIM, rag_version),
    )
    .await
    .unwrap()
}

pub(crate) async fn current_vector_store(workspace: &Workspace) -> VectorStore {
    vector_store(workspace, RAG_VERSION).await
}

/// A fresh handle on the manifest file
pub(crate) fn manifest_store(workspace: &Workspace) -> JsonManifestStore {
    JsonManifestStore::new(config_for(workspace).manifest_path())
}
