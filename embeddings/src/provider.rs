use crate::error::EmbeddingError;
use async_trait::async_trait;
use std::fmt;

/// A text → vector function.
///
/// Every vector returned by one provider has exactly [`EmbeddingProvider::dimension`]
/// components. Queries must be embedded with the same provider (and model) that
/// produced the index, otherwise distances are meaningless.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Identifier of the model behind this provider
    fn model_id(&self) -> &str;

    /// Length of every produced vector
    fn dimension(&self) -> usize;

    /// Largest number of texts accepted by a single [`EmbeddingProvider::embed`] call
    fn max_batch_size(&self) -> usize {
        1
    }

    /// Embed a batch of texts, returning one vector per input in input order
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Embed a single text
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| EmbeddingError::EmbeddingGeneration("No embedding generated".into()))
    }
}

/// Check that a provider answered with `count` vectors of length `dimension`.
pub fn check_vectors(
    vectors: &[Vec<f32>],
    count: usize,
    dimension: usize,
) -> Result<(), EmbeddingError> {
    if vectors.len() != count {
        return Err(EmbeddingError::EmbeddingGeneration(format!(
            "expected {count} embeddings, got {}",
            vectors.len()
        )));
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
        return Err(EmbeddingError::DimensionMismatch {
            expected: dimension,
            actual: bad.len(),
        });
    }
    Ok(())
}

/// API credential for a remote embedding provider.
///
/// `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderCredential(String);

impl ProviderCredential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Read the credential from an environment variable
    pub fn from_env(var: &str) -> Option<Self> {
        std::env::var(var)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(Self)
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ProviderCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ProviderCredential(***)")
    }
}
