use super::{DIM, config_for, current_vector_store, manifest_store};
use coderag_indexer::{ManifestStore, RagIndex};
use indexer_test_support::{MockEmbeddingProvider, Workspace};
use pretty_assertions::assert_eq;
use std::sync::Arc;

const FILES: usize = 20;

async fn cancellable_index(workspace: &Workspace) -> RagIndex {
    for i in 0..FILES {
        workspace.write(&format!("src/file{i:02}.rs"), &format!("fn f{i}() {{}}"));
    }
    let mut config = config_for(workspace);
    config.progress_buffer = 1;
    config.flush_threshold = 1;
    config.max_concurrent_embeddings = 1;
    RagIndex::open(config, Arc::new(MockEmbeddingProvider::new(DIM)))
        .await
        .unwrap()
}

#[test_log::test(tokio::test)]
async fn dropping_the_receiver_stops_the_run() {
    let workspace = Workspace::new();
    let index = cancellable_index(&workspace).await;

    let mut run = index.initialize_rag(None);
    let first = run.progress.recv().await.unwrap();
    assert_eq!(first.total, FILES);
    let summary = run.cancel().await.unwrap();

    assert!(summary.cancelled);
    assert!(summary.added >= 1);
    assert!(summary.added < FILES);

    // Whatever was committed is fully backed by vector rows
    let manifests = manifest_store(&workspace).all().await.unwrap();
    assert_eq!(manifests.len(), summary.indexed_files);
    let indexed = current_vector_store(&workspace)
        .await
        .indexed_paths()
        .await
        .unwrap();
    assert!(manifests.keys().all(|path| indexed.contains(path)));
    assert_eq!(indexed.len(), manifests.len());
}

#[tokio::test]
async fn next_run_finishes_a_cancelled_one() {
    let workspace = Workspace::new();
    let index = cancellable_index(&workspace).await;

    let mut run = index.initialize_rag(None);
    run.progress.recv().await.unwrap();
    let cancelled = run.cancel().await.unwrap();

    let resumed = index.initialize_rag(None).wait().await.unwrap();

    assert!(!resumed.cancelled);
    assert_eq!(resumed.added, FILES - cancelled.added);
    assert_eq!(resumed.indexed_files, FILES);
    assert_eq!(current_vector_store(&workspace).await.count().await.unwrap(), FILES);
}
