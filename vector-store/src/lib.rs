//! # Coderag Vector Store
//!
//! Columnar persistence for embedded code chunks, backed by LanceDB.
//!
//! Each row is one chunk of one file: its text, its line range, its embedding
//! and the index generation (`rag_version`) that produced it. The store knows
//! nothing about files on disk or embedding providers; it only appends,
//! deletes by path, and answers k-nearest-neighbour queries.
//!
//! ## Features
//!
//! - Fixed-size vector column validated against the configured dimension
//! - Schema drift detection with drop-and-recreate self-heal
//! - Deterministic result ordering on equal distances
//!
//! ## Example
//!
//! ```no_run
//! use coderag_vector_store::{VectorStore, VectorStoreConfig};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = VectorStore::open(
//!         Path::new(".coderag/vectors.lance"),
//!         VectorStoreConfig::new(768, 1),
//!     )
//!     .await?;
//!     store.ensure_schema().await?;
//!
//!     let hits = store.search(&vec![0.0; 768], 5).await?;
//!     println!("Found {} similar chunks", hits.len());
//!     Ok(())
//! }
//! ```

mod error;
mod index;
mod record;
mod store;

pub use error::{Result, VectorStoreError};
pub use index::VectorIndex;
pub use record::{EmbeddingRecord, SearchHit};
pub use store::{
    DEFAULT_TABLE_NAME, SchemaCheck, VectorStore, VectorStoreConfig, escape_predicate_literal,
};
