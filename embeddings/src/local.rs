use crate::error::EmbeddingError;
use crate::provider::{EmbeddingProvider, check_vectors};
use crate::{COMPACT_EMBEDDING_DIM, DEFAULT_EMBEDDING_DIM};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Configuration for the local embedding provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Model to use for embeddings
    pub model: EmbeddingModelType,

    /// Target embedding dimension (for Matryoshka truncation)
    pub dimension: usize,

    /// Maximum batch size for embedding generation
    pub batch_size: usize,

    /// Show download progress when downloading models
    pub show_download_progress: bool,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: EmbeddingModelType::NomicEmbedTextV15,
            dimension: DEFAULT_EMBEDDING_DIM,
            batch_size: 32,
            show_download_progress: false,
        }
    }
}

/// Supported local embedding models
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum EmbeddingModelType {
    /// Nomic-embed-text-v1.5 (recommended for code)
    NomicEmbedTextV15,
    /// All-MiniLM-L6-v2 (lightweight, faster)
    AllMiniLmL6V2,
}

impl EmbeddingModelType {
    fn to_fastembed_model(self) -> EmbeddingModel {
        match self {
            EmbeddingModelType::NomicEmbedTextV15 => EmbeddingModel::NomicEmbedTextV15,
            EmbeddingModelType::AllMiniLmL6V2 => EmbeddingModel::AllMiniLML6V2,
        }
    }

    fn id(self) -> &'static str {
        match self {
            EmbeddingModelType::NomicEmbedTextV15 => "nomic-embed-text-v1.5",
            EmbeddingModelType::AllMiniLmL6V2 => "all-minilm-l6-v2",
        }
    }

    /// Native output width of the model
    fn native_dimension(self) -> usize {
        match self {
            EmbeddingModelType::NomicEmbedTextV15 => 768,
            EmbeddingModelType::AllMiniLmL6V2 => 384,
        }
    }
}

/// Embedding provider running an ONNX model in-process via fastembed
pub struct LocalEmbeddingProvider {
    model: Arc<TextEmbedding>,
    config: EmbeddingConfig,
}

impl LocalEmbeddingProvider {
    /// Create a provider with default configuration
    pub async fn new() -> Result<Self, EmbeddingError> {
        Self::with_config(EmbeddingConfig::default()).await
    }

    /// Create a provider with custom configuration
    pub async fn with_config(config: EmbeddingConfig) -> Result<Self, EmbeddingError> {
        if config.dimension == 0 || config.dimension > config.model.native_dimension() {
            return Err(EmbeddingError::InvalidInput(format!(
                "dimension {} is not supported by {}",
                config.dimension,
                config.model.id()
            )));
        }

        info!(
            "Initializing embedding model {:?}, dimension {}",
            config.model, config.dimension
        );

        let init_options = InitOptions::new(config.model.to_fastembed_model())
            .with_show_download_progress(config.show_download_progress);

        // Model download and ONNX session setup block.
        let model = tokio::task::spawn_blocking(move || TextEmbedding::try_new(init_options))
            .await
            .map_err(|e| EmbeddingError::Other(e.to_string()))?
            .map_err(|e| {
                EmbeddingError::ModelInitialization(format!("Failed to initialize model: {e}"))
            })?;

        info!("Embedding model ready");

        Ok(Self {
            model: Arc::new(model),
            config,
        })
    }

    /// Create a compact provider (256 dimensions)
    pub async fn new_compact() -> Result<Self, EmbeddingError> {
        let config = EmbeddingConfig {
            dimension: COMPACT_EMBEDDING_DIM,
            ..Default::default()
        };
        Self::with_config(config).await
    }

    pub fn config(&self) -> &EmbeddingConfig {
        &self.config
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbeddingProvider {
    fn model_id(&self) -> &str {
        self.config.model.id()
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn max_batch_size(&self) -> usize {
        self.config.batch_size
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let model = Arc::clone(&self.model);
        let batch = texts.to_vec();
        let batch_size = self.config.batch_size;
        let mut embeddings =
            tokio::task::spawn_blocking(move || model.embed(batch, Some(batch_size)))
                .await
                .map_err(|e| EmbeddingError::Other(e.to_string()))??;

        for embedding in &mut embeddings {
            // Matryoshka truncation
            if embedding.len() > self.config.dimension {
                embedding.truncate(self.config.dimension);
            }
        }

        check_vectors(&embeddings, texts.len(), self.config.dimension)?;
        Ok(embeddings)
    }
}
