pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod ingest;
pub mod models;
pub mod orchestrator;
pub mod providers;
pub mod similarity;
pub mod store;
pub mod traits;

pub use chunking::{chunk_text, split_sentences, ChunkingConfig};
pub use config::{load_config, EmbeddingConfig, EmbeddingProvider, EngineConfig, RetrievalConfig, StoreConfig};
pub use embeddings::{CharacterNgramEmbedder, DEFAULT_EMBEDDING_BATCH_SIZE, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{ConfigError, EmbeddingError, RetrievalError, StoreError};
pub use ingest::{build_records, chunk_id};
pub use models::{
    ChunkMetadata, ChunkRecord, IngestionReport, SearchHit, SearchQuery, SourceDocument,
    SourceSummary,
};
pub use orchestrator::{cited_source_names, RetrievalEngine};
pub use providers::{build_embedder, OpenAiEmbedder};
pub use similarity::{cosine_similarity, select_with_coverage};
pub use store::VectorStore;
pub use traits::Embedder;
