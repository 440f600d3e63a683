use super::{DIM, config_for, current_vector_store, manifest_store, open_index, vector_store};
use coderag_indexer::{FileEvent, ManifestStore, RAG_VERSION, RagIndex};
use coderag_vector_store::{EmbeddingRecord, VectorStore, VectorStoreConfig};
use indexer_test_support::{MockEmbeddingProvider, Workspace};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn stray_row(path: &str) -> EmbeddingRecord {
    EmbeddingRecord {
        absolute_path: format!("/elsewhere/{path}"),
        relative_path: path.to_string(),
        chunk_index: 0,
        total_chunks: 1,
        content: "left behind by a crash".to_string(),
        embedding: vec![0.5; DIM],
        start_line: 1,
        end_line: 1,
        rag_version: RAG_VERSION,
        indexed_at: 0,
    }
}

async fn indexed_workspace(files: &[(&str, &str)]) -> Workspace {
    let workspace = Workspace::new();
    for (path, content) in files {
        workspace.write(path, content);
    }
    let index = open_index(&workspace, Arc::new(MockEmbeddingProvider::new(DIM))).await;
    index.initialize_rag(None).wait().await.unwrap();
    workspace
}

#[test_log::test(tokio::test)]
async fn version_bump_rebuilds_everything() {
    let workspace = indexed_workspace(&[("a.ts", "x"), ("b.ts", "y")]).await;

    let mut config = config_for(&workspace);
    config.rag_version = RAG_VERSION + 1;
    let provider = Arc::new(MockEmbeddingProvider::new(DIM));
    let index = RagIndex::open(config, provider.clone()).await.unwrap();

    let summary = index.initialize_rag(None).wait().await.unwrap();

    assert!(summary.schema_rebuilt);
    assert_eq!(summary.added, 2);
    assert_eq!(summary.indexed_files, 2);
    assert_eq!(provider.embedded_count(), 2);

    let manifests = manifest_store(&workspace).all().await.unwrap();
    assert!(manifests.values().all(|m| m.rag_version == RAG_VERSION + 1));
    let store = vector_store(&workspace, RAG_VERSION + 1).await;
    assert_eq!(store.count().await.unwrap(), 2);
}

#[tokio::test]
async fn dimension_change_rebuilds_everything() {
    let workspace = indexed_workspace(&[("a.ts", "x")]).await;

    let index = RagIndex::open(
        config_for(&workspace),
        Arc::new(MockEmbeddingProvider::new(4)),
    )
    .await
    .unwrap();
    let summary = index.initialize_rag(None).wait().await.unwrap();

    assert!(summary.schema_rebuilt);
    assert_eq!(summary.added, 1);

    let store = VectorStore::open(
        &config_for(&workspace).vector_db_path(),
        VectorStoreConfig::new(4, RAG_VERSION),
    )
    .await
    .unwrap();
    assert!(!store.ensure_schema().await.unwrap().is_rebuilt());
    assert_eq!(store.count().await.unwrap(), 1);
    assert!(store.search(&[0.0; DIM], 1).await.is_err());
}

#[tokio::test]
async fn rebuild_on_file_event_voids_old_claims() {
    let workspace = indexed_workspace(&[("a.ts", "x"), ("b.ts", "y")]).await;

    let mut config = config_for(&workspace);
    config.rag_version = RAG_VERSION + 1;
    let index = RagIndex::open(config, Arc::new(MockEmbeddingProvider::new(DIM)))
        .await
        .unwrap();

    index
        .update_rag("a.ts", FileEvent::Update)
        .await
        .unwrap();

    let manifests = manifest_store(&workspace).all().await.unwrap();
    assert_eq!(manifests.len(), 1);
    assert!(manifests.contains_key("a.ts"));
    assert_eq!(index.get_metadata().await.unwrap().indexed_files, 1);
}

#[tokio::test]
async fn manifest_without_rows_is_reindexed() {
    let workspace = indexed_workspace(&[("a.ts", "x"), ("b.ts", "y")]).await;
    current_vector_store(&workspace)
        .await
        .delete_by_path("b.ts")
        .await
        .unwrap();

    let provider = Arc::new(MockEmbeddingProvider::new(DIM));
    let index = open_index(&workspace, provider.clone()).await;
    let summary = index.initialize_rag(None).wait().await.unwrap();

    assert_eq!(summary.orphan_manifests_removed, 1);
    assert_eq!(summary.added, 1);
    assert_eq!(provider.embedded_count(), 1);
    let store = current_vector_store(&workspace).await;
    assert_eq!(store.count_for_path("b.ts").await.unwrap(), 1);
}

#[tokio::test]
async fn rows_without_manifest_are_cleaned_up() {
    let workspace = indexed_workspace(&[("a.ts", "x")]).await;
    workspace.write("crashed.ts", "half way");
    current_vector_store(&workspace)
        .await
        .insert_batch(&[stray_row("ghost.ts"), stray_row("crashed.ts")])
        .await
        .unwrap();

    let index = open_index(&workspace, Arc::new(MockEmbeddingProvider::new(DIM))).await;
    let summary = index.initialize_rag(None).wait().await.unwrap();

    assert_eq!(summary.orphan_embeddings_removed, 1);
    assert_eq!(summary.added, 1);
    assert_eq!(summary.indexed_files, 2);

    let store = current_vector_store(&workspace).await;
    assert_eq!(store.count_for_path("ghost.ts").await.unwrap(), 0);
    assert_eq!(store.count_for_path("crashed.ts").await.unwrap(), 1);
    let hits = index.query("half way", Some(1)).await.unwrap();
    assert_eq!(hits[0].content, "half way");
}

#[tokio::test]
async fn corrupt_manifest_file_rebuilds_without_duplicates() {
    let workspace = indexed_workspace(&[("a.ts", "x"), ("b.ts", "y")]).await;
    std::fs::write(config_for(&workspace).manifest_path(), "{ not json").unwrap();

    let index = open_index(&workspace, Arc::new(MockEmbeddingProvider::new(DIM))).await;
    let summary = index.initialize_rag(None).wait().await.unwrap();

    assert_eq!(summary.added, 2);
    assert_eq!(summary.indexed_files, 2);
    let store = current_vector_store(&workspace).await;
    assert_eq!(store.count_for_path("a.ts").await.unwrap(), 1);
    assert_eq!(store.count_for_path("b.ts").await.unwrap(), 1);
}
