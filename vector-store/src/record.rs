use serde::{Deserialize, Serialize};

/// One persisted row: a single embedded chunk of a file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingRecord {
    /// Absolute path of the file on disk when it was indexed
    pub absolute_path: String,

    /// Workspace-relative, forward-slash path
    pub relative_path: String,

    /// 0-based position of this chunk within its file
    pub chunk_index: u32,

    /// Number of chunks the file was split into
    pub total_chunks: u32,

    /// Raw text of the chunk
    pub content: String,

    /// Embedding vector; its length must equal the store's dimension
    pub embedding: Vec<f32>,

    /// Starting line number (1-indexed)
    pub start_line: u32,

    /// Ending line number (1-indexed, inclusive)
    pub end_line: u32,

    /// Index generation that produced the embedding
    pub rag_version: u32,

    /// Unix timestamp in milliseconds
    pub indexed_at: i64,
}

/// A row returned by a similarity search
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub relative_path: String,
    pub absolute_path: String,
    pub chunk_index: u32,
    pub total_chunks: u32,
    pub content: String,
    pub start_line: u32,
    pub end_line: u32,
    pub rag_version: u32,

    /// Distance from the query vector (lower is better)
    pub distance: f32,
}
