use thiserror::Error;

/// Errors that can occur during vector store operations
#[derive(Debug, Error)]
pub enum VectorStoreError {
    /// Failed to initialize the vector store
    #[error("Failed to initialize vector store: {0}")]
    Initialization(String),

    /// Failed to add data to the vector store
    #[error("Failed to add data: {0}")]
    AdditionFailed(String),

    /// Failed to delete rows
    #[error("Failed to delete: {0}")]
    DeletionFailed(String),

    /// Failed to search the vector store
    #[error("Failed to search: {0}")]
    SearchFailed(String),

    /// A vector's length differs from the configured dimension
    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A column is missing or has an unexpected type
    #[error("Invalid column '{0}'")]
    InvalidColumn(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
}

impl From<lancedb::Error> for VectorStoreError {
    fn from(err: lancedb::Error) -> Self {
        VectorStoreError::Database(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, VectorStoreError>;
