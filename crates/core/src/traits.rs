use crate::error::EmbeddingError;
use async_trait::async_trait;

/// Turns text into fixed-length vectors.
///
/// `embed` is all-or-nothing: the output has exactly one vector per input,
/// in input order, or the whole call fails. Implementations batch internally.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_name(&self) -> &str;

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

#[async_trait]
impl<T> Embedder for Box<T>
where
    T: Embedder + ?Sized,
{
    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        (**self).embed(texts).await
    }
}

#[async_trait]
impl<T> Embedder for std::sync::Arc<T>
where
    T: Embedder + ?Sized,
{
    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        (**self).embed(texts).await
    }
}
