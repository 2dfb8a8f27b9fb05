pub mod openai;

pub use openai::OpenAiEmbedder;

use crate::config::{EmbeddingConfig, EmbeddingProvider};
use crate::embeddings::CharacterNgramEmbedder;
use crate::error::EmbeddingError;
use crate::traits::Embedder;

/// Constructs the embedder named by the config. The caller owns the result
/// and hands it to the engine.
pub fn build_embedder(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>, EmbeddingError> {
    match config.provider {
        EmbeddingProvider::OpenAi => Ok(Box::new(OpenAiEmbedder::from_config(config)?)),
        EmbeddingProvider::Ngram => Ok(Box::new(CharacterNgramEmbedder::new(config.dimensions)?)),
    }
}
