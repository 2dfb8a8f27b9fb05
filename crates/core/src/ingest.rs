use crate::error::RetrievalError;
use crate::models::{ChunkMetadata, ChunkRecord, SourceDocument};

/// Stable id for the `chunk_index`-th chunk of a source inside a workspace.
pub fn chunk_id(workspace_id: &str, source_id: i64, chunk_index: usize) -> String {
    format!("{workspace_id}:source-{source_id}-chunk-{chunk_index}")
}

/// Pairs chunks with their embeddings. Indexes are dense and zero-based, and
/// every vector must be non-empty and share one length.
pub fn build_records(
    document: &SourceDocument,
    chunks: Vec<String>,
    embeddings: Vec<Vec<f32>>,
) -> Result<Vec<ChunkRecord>, RetrievalError> {
    if chunks.len() != embeddings.len() {
        return Err(RetrievalError::EmbeddingMismatch(format!(
            "embedding count {} doesn't match chunk count {}",
            embeddings.len(),
            chunks.len()
        )));
    }

    let dimensions = embeddings.first().map(Vec::len).unwrap_or_default();
    if embeddings
        .iter()
        .any(|vector| vector.is_empty() || vector.len() != dimensions)
    {
        return Err(RetrievalError::EmbeddingMismatch(format!(
            "embeddings for source {} have inconsistent or empty dimensions",
            document.source_id
        )));
    }

    Ok(chunks
        .into_iter()
        .zip(embeddings)
        .enumerate()
        .map(|(chunk_index, (text, embedding))| ChunkRecord {
            id: chunk_id(&document.workspace_id, document.source_id, chunk_index),
            text,
            embedding,
            metadata: ChunkMetadata {
                source_id: document.source_id,
                source_name: document.source_name.clone(),
                chunk_index,
                workspace_id: document.workspace_id.clone(),
            },
        })
        .collect())
}
