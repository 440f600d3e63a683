//! # CodeRAG Embeddings
//!
//! The embedding provider boundary for the codebase index: a black-box function
//! from text to a fixed-length vector.
//!
//! Two providers ship with the crate:
//!
//! - [`LocalEmbeddingProvider`]: Nomic-embed-text-v1.5 (or MiniLM) via fastembed-rs,
//!   running on ONNX Runtime in-process, with Matryoshka truncation
//! - [`HttpEmbeddingProvider`]: any OpenAI-compatible `/embeddings` endpoint, keyed by
//!   a [`ProviderCredential`] and a model identifier
//!
//! ## Example
//!
//! ```no_run
//! use coderag_embeddings::{EmbeddingProvider, LocalEmbeddingProvider};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let provider = LocalEmbeddingProvider::new().await?;
//!     let texts = vec!["fn hello() { println!(\"Hello\"); }".to_string()];
//!     let embeddings = provider.embed(&texts).await?;
//!     println!("Generated {} embeddings", embeddings.len());
//!     Ok(())
//! }
//! ```

mod error;
mod http;
mod local;
mod provider;

pub use error::EmbeddingError;
pub use http::{HttpEmbeddingConfig, HttpEmbeddingProvider};
pub use local::{EmbeddingConfig, EmbeddingModelType, LocalEmbeddingProvider};
pub use provider::{EmbeddingProvider, ProviderCredential, check_vectors};

/// Default embedding dimension for Nomic-embed-text-v1.5
pub const DEFAULT_EMBEDDING_DIM: usize = 768;

/// Compact embedding dimension (using Matryoshka truncation)
pub const COMPACT_EMBEDDING_DIM: usize = 256;
