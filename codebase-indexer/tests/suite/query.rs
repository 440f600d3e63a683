use super::{DIM, open_index};
use coderag_indexer::{ErrorKind, IndexStatus};
use indexer_test_support::{MockEmbeddingProvider, Workspace};
use pretty_assertions::assert_eq;
use std::sync::Arc;

#[tokio::test]
async fn query_before_indexing_is_empty() {
    let workspace = Workspace::new();
    workspace.write("a.ts", "x");
    let index = open_index(&workspace, Arc::new(MockEmbeddingProvider::new(DIM))).await;

    assert!(index.query("x", Some(5)).await.unwrap().is_empty());
    assert_eq!(index.get_metadata().await.unwrap(), IndexStatus::default());
}

#[tokio::test]
async fn query_ranks_exact_chunk_first_and_honours_limit() {
    let workspace = Workspace::new();
    workspace.write("auth/session.ts", "export function persistSession() {}");
    workspace.write("auth/login.ts", "export function login() {}");
    workspace.write("ui/button.tsx", "export const Button = () => null;");
    let index = open_index(&workspace, Arc::new(MockEmbeddingProvider::new(DIM))).await;
    index.initialize_rag(None).wait().await.unwrap();

    let hits = index
        .query("export function persistSession() {}", Some(2))
        .await
        .unwrap();

    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].relative_path, "auth/session.ts");
    assert!(hits[0].distance.abs() < 1e-6);
    assert!(hits[0].distance <= hits[1].distance);
    assert_eq!(index.query("anything", Some(0)).await.unwrap(), vec![]);
}

#[tokio::test]
async fn blank_query_is_a_validation_error() {
    let workspace = Workspace::new();
    let index = open_index(&workspace, Arc::new(MockEmbeddingProvider::new(DIM))).await;

    let err = index.query(" \n", Some(3)).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn metadata_tracks_last_run() {
    let workspace = Workspace::new();
    workspace.write("a.ts", "x");
    let index = open_index(&workspace, Arc::new(MockEmbeddingProvider::new(DIM))).await;

    index.initialize_rag(None).wait().await.unwrap();
    let status = index.get_metadata().await.unwrap();

    assert_eq!(status.indexed_files, 1);
    assert!(status.last_indexed_at.is_some());
}
