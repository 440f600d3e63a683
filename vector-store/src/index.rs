use crate::error::Result;
use crate::record::{EmbeddingRecord, SearchHit};
use crate::store::{SchemaCheck, VectorStore, VectorStoreConfig};
use async_trait::async_trait;
use std::collections::BTreeSet;

/// The row operations an indexer needs from a vector table.
///
/// [`VectorStore`] is the LanceDB implementation; callers hold this trait so
/// the table can be wrapped or replaced.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    fn config(&self) -> &VectorStoreConfig;

    async fn ensure_schema(&self) -> Result<SchemaCheck>;

    async fn insert_batch(&self, records: &[EmbeddingRecord]) -> Result<()>;

    async fn delete_by_path(&self, relative_path: &str) -> Result<()>;

    async fn search(&self, query_vector: &[f32], limit: usize) -> Result<Vec<SearchHit>>;

    async fn indexed_paths(&self) -> Result<BTreeSet<String>>;

    async fn count(&self) -> Result<usize>;

    async fn reset(&self) -> Result<()>;
}

#[async_trait]
impl VectorIndex for VectorStore {
    fn config(&self) -> &VectorStoreConfig {
        VectorStore::config(self)
    }

    async fn ensure_schema(&self) -> Result<SchemaCheck> {
        VectorStore::ensure_schema(self).await
    }

    async fn insert_batch(&self, records: &[EmbeddingRecord]) -> Result<()> {
        VectorStore::insert_batch(self, records).await
    }

    async fn delete_by_path(&self, relative_path: &str) -> Result<()> {
        VectorStore::delete_by_path(self, relative_path).await
    }

    async fn search(&self, query_vector: &[f32], limit: usize) -> Result<Vec<SearchHit>> {
        VectorStore::search(self, query_vector, limit).await
    }

    async fn indexed_paths(&self) -> Result<BTreeSet<String>> {
        VectorStore::indexed_paths(self).await
    }

    async fn count(&self) -> Result<usize> {
        VectorStore::count(self).await
    }

    async fn reset(&self) -> Result<()> {
        VectorStore::reset(self).await
    }
}
