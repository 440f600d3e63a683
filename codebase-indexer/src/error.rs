use coderag_embeddings::EmbeddingError;
use coderag_vector_store::VectorStoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Manifest store error: {0}")]
    ManifestStore(String),

    #[error("Metadata store error: {0}")]
    MetadataStore(String),

    #[error("Schema reset failed: {0}")]
    SchemaReset(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Indexing task failed: {0}")]
    Task(String),

    #[error("Indexing aborted after '{relative_path}' failed: {source}")]
    Aborted {
        relative_path: String,
        #[source]
        source: Box<IndexerError>,
    },
}

/// Coarse classification used by callers to decide how to react
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Embedding provider failure (network, auth, rate limit, bad answer)
    TransientProvider,
    /// Dimension or version drift that could not be healed
    SchemaDrift,
    /// Manifest, metadata or vector store read/write failure
    StorageIo,
    /// Bad caller input; never retried
    Validation,
}

impl IndexerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IndexerError::Embedding(EmbeddingError::InvalidInput(_)) => ErrorKind::Validation,
            IndexerError::Embedding(_) => ErrorKind::TransientProvider,
            IndexerError::VectorStore(VectorStoreError::DimensionMismatch { .. }) => {
                ErrorKind::Validation
            }
            IndexerError::VectorStore(_)
            | IndexerError::Io(_)
            | IndexerError::Serialization(_)
            | IndexerError::ManifestStore(_)
            | IndexerError::MetadataStore(_)
            | IndexerError::Task(_) => ErrorKind::StorageIo,
            IndexerError::SchemaReset(_) => ErrorKind::SchemaDrift,
            IndexerError::Config(_)
            | IndexerError::InvalidQuery(_)
            | IndexerError::InvalidPath(_) => ErrorKind::Validation,
            IndexerError::Aborted { source, .. } => source.kind(),
        }
    }
}

pub type Result<T> = std::result::Result<T, IndexerError>;
