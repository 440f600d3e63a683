use super::{DIM, config_for, current_vector_store, manifest_store, open_index};
use coderag_indexer::{
    FileEvent, IndexProgress, ManifestStore, RagIndex, UpdateOutcome, content_hash,
};
use indexer_test_support::{MockEmbeddingProvider, Workspace, numbered_lines};
use pretty_assertions::assert_eq;
use std::sync::Arc;

#[test_log::test(tokio::test)]
async fn add_edit_delete_round() {
    let workspace = Workspace::new();
    workspace.write("a.ts", "x");
    workspace.write("b.ts", "y");
    let provider = Arc::new(MockEmbeddingProvider::new(DIM));
    let index = open_index(&workspace, provider.clone()).await;

    let first = index.initialize_rag(None).wait().await.unwrap();
    assert_eq!(first.added, 2);
    assert_eq!(first.indexed_files, 2);
    assert_eq!(current_vector_store(&workspace).await.count().await.unwrap(), 2);
    assert_eq!(index.get_metadata().await.unwrap().indexed_files, 2);

    workspace.write("a.ts", "z");
    let second = index.initialize_rag(None).wait().await.unwrap();
    assert_eq!(second.updated, 1);
    assert_eq!(second.added, 0);
    assert_eq!(manifest_store(&workspace).len().await.unwrap(), 2);

    let store = current_vector_store(&workspace).await;
    assert_eq!(store.count_for_path("a.ts").await.unwrap(), 1);
    let hits = index.query("z", Some(1)).await.unwrap();
    assert_eq!(hits[0].relative_path, "a.ts");
    assert_eq!(hits[0].content, "z");

    workspace.remove("b.ts");
    let third = index.initialize_rag(None).wait().await.unwrap();
    assert_eq!(third.removed, 1);
    assert_eq!(third.indexed_files, 1);

    let store = current_vector_store(&workspace).await;
    assert_eq!(store.count_for_path("b.ts").await.unwrap(), 0);
    assert_eq!(manifest_store(&workspace).get("b.ts").await.unwrap(), None);
    assert_eq!(index.get_metadata().await.unwrap().indexed_files, 1);
}

#[tokio::test]
async fn second_run_without_changes_does_nothing() {
    let workspace = Workspace::new();
    workspace.write("src/lib.rs", "pub fn answer() -> u32 { 42 }");
    workspace.write("README.md", "# demo");
    workspace.write("Dockerfile", "FROM scratch");
    let provider = Arc::new(MockEmbeddingProvider::new(DIM));
    let index = open_index(&workspace, provider.clone()).await;

    let first = index.initialize_rag(None).wait().await.unwrap();
    assert_eq!(first.added, 3);
    let calls = provider.call_count();

    let (events, second) = index.initialize_rag(None).collect().await;
    let second = second.unwrap();

    assert_eq!(events, vec![IndexProgress { progress: 0, total: 0 }]);
    assert_eq!(second.added + second.updated + second.removed, 0);
    assert_eq!(second.indexed_files, 3);
    assert_eq!(provider.call_count(), calls);
}

#[tokio::test]
async fn only_the_edited_file_is_embedded_again() {
    let workspace = Workspace::new();
    for i in 0..5 {
        workspace.write(&format!("mod{i}.py"), &format!("def f{i}(): pass"));
    }
    let provider = Arc::new(MockEmbeddingProvider::new(DIM));
    let index = open_index(&workspace, provider.clone()).await;
    index.initialize_rag(None).wait().await.unwrap();
    let embedded = provider.embedded_count();

    workspace.write("mod3.py", "def f3(): return 3");
    let summary = index.initialize_rag(None).wait().await.unwrap();

    assert_eq!(summary.updated, 1);
    assert_eq!(summary.added, 0);
    assert_eq!(provider.embedded_count(), embedded + 1);

    let manifest = manifest_store(&workspace).get("mod3.py").await.unwrap().unwrap();
    assert_eq!(manifest.content_hash, content_hash(b"def f3(): return 3"));
}

#[tokio::test]
async fn ineligible_and_ignored_files_are_never_indexed() {
    let workspace = Workspace::new();
    workspace.write("main.go", "package main");
    workspace.write("logo.png", "not really a png");
    workspace.write("node_modules/dep/index.js", "module.exports = 1");
    workspace.write("app.min.js", "var a=1");
    workspace.write("empty.ts", "   \n");
    workspace.write(".gitignore", "generated/\n");
    workspace.write("generated/out.ts", "export const x = 1");
    let index = open_index(&workspace, Arc::new(MockEmbeddingProvider::new(DIM))).await;

    let summary = index.initialize_rag(None).wait().await.unwrap();

    let mut paths: Vec<String> = manifest_store(&workspace)
        .all()
        .await
        .unwrap()
        .into_keys()
        .collect();
    paths.sort();
    assert_eq!(paths, vec!["main.go".to_string()]);
    assert_eq!(summary.indexed_files, 1);
}

#[tokio::test]
async fn multi_chunk_files_across_flushes() {
    let workspace = Workspace::new();
    workspace.write("big.rs", &numbered_lines(230));
    workspace.write("small.rs", "fn small() {}");
    let mut config = config_for(&workspace);
    config.flush_threshold = 2;
    let provider = Arc::new(MockEmbeddingProvider::new(DIM).with_batch_size(2));
    let index = RagIndex::open(config, provider).await.unwrap();

    let summary = index.initialize_rag(None).wait().await.unwrap();

    assert_eq!(summary.added, 2);
    assert_eq!(summary.chunks_written, 6);
    let store = current_vector_store(&workspace).await;
    assert_eq!(store.count_for_path("big.rs").await.unwrap(), 5);
    assert_eq!(store.count_for_path("small.rs").await.unwrap(), 1);

    let hits = index.query(&numbered_lines(50), Some(1)).await.unwrap();
    assert_eq!(hits[0].relative_path, "big.rs");
    assert_eq!((hits[0].start_line, hits[0].end_line), (1, 50));
}

#[tokio::test]
async fn progress_counts_every_file_once() {
    let workspace = Workspace::new();
    for i in 0..12 {
        workspace.write(&format!("f{i:02}.ts"), &format!("export const v = {i};"));
    }
    let provider = Arc::new(MockEmbeddingProvider::new(DIM));
    provider.fail_when_contains("v = 7;");
    let index = open_index(&workspace, provider).await;

    let (events, summary) = index.initialize_rag(None).collect().await;
    let summary = summary.unwrap();

    assert_eq!(summary.added, 11);
    assert_eq!(summary.failed, 1);
    assert_eq!(events.len(), 12);
    for (i, event) in events.iter().enumerate() {
        assert_eq!(*event, IndexProgress { progress: i + 1, total: 12 });
    }
}

#[tokio::test]
async fn file_events_keep_the_index_current() {
    let workspace = Workspace::new();
    workspace.write("a.ts", "x");
    let provider = Arc::new(MockEmbeddingProvider::new(DIM));
    let index = open_index(&workspace, provider.clone()).await;
    index.initialize_rag(None).wait().await.unwrap();

    workspace.write("b.ts", "y");
    assert_eq!(
        index.update_rag("b.ts", FileEvent::Add).await.unwrap(),
        UpdateOutcome::Indexed { chunks: 1 }
    );

    workspace.write("a.ts", "x2");
    assert_eq!(
        index.update_rag("a.ts", FileEvent::Update).await.unwrap(),
        UpdateOutcome::Indexed { chunks: 1 }
    );
    assert_eq!(current_vector_store(&workspace).await.count().await.unwrap(), 2);

    workspace.remove("b.ts");
    assert_eq!(
        index.update_rag("b.ts", FileEvent::Update).await.unwrap(),
        UpdateOutcome::Removed
    );
    assert_eq!(index.get_metadata().await.unwrap().indexed_files, 1);

    let summary = index.initialize_rag(None).wait().await.unwrap();
    assert_eq!(summary.added + summary.updated + summary.removed, 0);
}

#[tokio::test]
async fn file_events_for_ignored_paths_are_skipped() {
    let workspace = Workspace::new();
    workspace.write("a.ts", "x");
    workspace.write("node_modules/dep/index.js", "module.exports = 1");
    workspace.write(".gitignore", "generated/\n");
    workspace.write("generated/out.ts", "export const x = 1");
    let provider = Arc::new(MockEmbeddingProvider::new(DIM));
    let index = open_index(&workspace, provider.clone()).await;
    index.initialize_rag(None).wait().await.unwrap();
    let calls = provider.call_count();
    let metadata_path = config_for(&workspace).metadata_path();
    let metadata_before = std::fs::read_to_string(&metadata_path).unwrap();

    for (path, event) in [
        ("node_modules/dep/index.js", FileEvent::Add),
        ("generated/out.ts", FileEvent::Update),
        (".coderag/metadata.json", FileEvent::Update),
        (".coderag/manifests.json", FileEvent::Add),
    ] {
        assert_eq!(
            index.update_rag(path, event).await.unwrap(),
            UpdateOutcome::Ignored,
            "{path}"
        );
    }

    assert_eq!(provider.call_count(), calls);
    assert_eq!(std::fs::read_to_string(&metadata_path).unwrap(), metadata_before);
    let paths: Vec<String> = manifest_store(&workspace)
        .all()
        .await
        .unwrap()
        .into_keys()
        .collect();
    assert_eq!(paths, vec!["a.ts".to_string()]);
}

#[tokio::test]
async fn parent_segments_cannot_leave_the_workspace() {
    let workspace = Workspace::new();
    workspace.write("src/a.ts", "x");
    let index = open_index(&workspace, Arc::new(MockEmbeddingProvider::new(DIM))).await;

    let err = index
        .update_rag("src/../../secret.ts", FileEvent::Add)
        .await
        .unwrap_err();
    assert!(matches!(err, coderag_indexer::IndexerError::InvalidPath(_)));

    assert_eq!(
        index.update_rag("lib/../src/a.ts", FileEvent::Add).await.unwrap(),
        UpdateOutcome::Indexed { chunks: 1 }
    );
    assert!(manifest_store(&workspace).get("src/a.ts").await.unwrap().is_some());
}
