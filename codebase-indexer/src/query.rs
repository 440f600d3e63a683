use crate::error::{IndexerError, Result};
use coderag_embeddings::EmbeddingProvider;
use coderag_vector_store::{SearchHit, VectorIndex};
use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const DEFAULT_QUERY_LIMIT: usize = 10;

/// One ranked search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub relative_path: String,
    pub content: String,
    pub start_line: u32,
    pub end_line: u32,
    /// Lower is more similar
    pub distance: f32,
}

impl From<SearchHit> for QueryResult {
    fn from(hit: SearchHit) -> Self {
        Self {
            relative_path: hit.relative_path,
            content: hit.content,
            start_line: hit.start_line,
            end_line: hit.end_line,
            distance: hit.distance,
        }
    }
}

/// Embeds query text and searches the vector store.
///
/// The provider must be the one the index was built with.
#[derive(Clone)]
pub struct QueryEngine {
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorIndex>,
}

impl QueryEngine {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, store: Arc<dyn VectorIndex>) -> Self {
        Self { provider, store }
    }

    /// At most `limit` results, [`DEFAULT_QUERY_LIMIT`] when `None`
    pub async fn query(&self, text: &str, limit: Option<usize>) -> Result<Vec<QueryResult>> {
        let limit = limit.unwrap_or(DEFAULT_QUERY_LIMIT);
        if text.trim().is_empty() {
            return Err(IndexerError::InvalidQuery("query text is empty".into()));
        }
        if limit == 0 {
            return Ok(Vec::new());
        }

        let vector = self.provider.embed_one(text).await?;
        let hits = self.store.search(&vector, limit).await?;
        debug!("Query returned {} results", hits.len());

        Ok(hits.into_iter().map(QueryResult::from).collect())
    }
}
