use crate::chunking::{chunk_text, ChunkingConfig};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::ingest::build_records;
use crate::similarity::{rank, select_with_coverage};
use crate::store::VectorStore;
use crate::traits::Embedder;
use crate::{
    ChunkRecord, IngestionReport, RetrievalError, SearchHit, SearchQuery, SourceDocument,
    SourceSummary,
};
use chrono::Utc;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Chunks, embeds, stores and searches workspace sources.
///
/// The engine owns its store and embedder; the hosting layer builds both
/// and shares the engine (e.g. behind an `Arc`) across requests.
pub struct RetrievalEngine<E> {
    store: VectorStore,
    embedder: E,
    chunking: ChunkingConfig,
}

impl<E> RetrievalEngine<E>
where
    E: Embedder,
{
    pub fn new(store: VectorStore, embedder: E, chunking: ChunkingConfig) -> Self {
        Self {
            store,
            embedder,
            chunking,
        }
    }

    pub fn from_config(config: &EngineConfig, embedder: E) -> Self {
        Self::new(VectorStore::new(config.store.path()), embedder, config.chunking)
    }

    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    /// Makes a source searchable, replacing any chunks it already had in the
    /// workspace. Nothing is written unless every chunk embedded successfully.
    pub async fn ingest_source(
        &self,
        document: &SourceDocument,
    ) -> Result<IngestionReport> {
        if document.workspace_id.trim().is_empty() {
            return Err(RetrievalError::InvalidArgument(
                "workspace id is empty".to_string(),
            ));
        }

        let chunks = chunk_text(&document.text, self.chunking);
        let embeddings = if chunks.is_empty() {
            Vec::new()
        } else {
            self.embedder.embed(&chunks).await?
        };
        let records = build_records(document, chunks, embeddings)?;
        let chunk_count = records.len();

        let replaced = self
            .store
            .replace_source(&document.workspace_id, document.source_id, records)
            .await?;

        info!(
            workspace_id = %document.workspace_id,
            source_id = document.source_id,
            chunk_count,
            replaced,
            model = self.embedder.model_name(),
            "source ingested"
        );

        Ok(IngestionReport {
            source_id: document.source_id,
            workspace_id: document.workspace_id.clone(),
            chunk_count,
            replaced,
            ingested_at: Utc::now(),
        })
    }

    /// Removes a source's chunks from every workspace.
    pub async fn remove_source(&self, source_id: i64) -> Result<usize> {
        Ok(self.store.remove_by_source(source_id).await?)
    }

    pub async fn remove_workspace_source(
        &self,
        workspace_id: &str,
        source_id: i64,
    ) -> Result<usize> {
        Ok(self
            .store
            .remove_workspace_source(workspace_id, source_id)
            .await?)
    }

    pub async fn sources(
        &self,
        workspace_id: Option<&str>,
    ) -> Result<Vec<SourceSummary>> {
        Ok(self.store.sources(workspace_id).await?)
    }

    /// Ranks stored chunks against the query text.
    ///
    /// Workspace and source filters apply before any scoring, and an empty
    /// candidate set returns without calling the embedder.
    pub async fn query(&self, query: &SearchQuery) -> Result<Vec<SearchHit>> {
        if query.text.trim().is_empty() {
            return Err(RetrievalError::InvalidArgument("query is empty".to_string()));
        }
        if query.limit == 0 {
            return Ok(Vec::new());
        }

        let records = self.store.load().await?;
        let allowed: Option<HashSet<i64>> = query
            .source_ids
            .as_ref()
            .map(|ids| ids.iter().copied().collect());

        let candidates: Vec<&ChunkRecord> = records
            .iter()
            .filter(|record| {
                query
                    .workspace_id
                    .as_deref()
                    .map_or(true, |workspace| record.metadata.workspace_id == workspace)
            })
            .filter(|record| {
                allowed
                    .as_ref()
                    .map_or(true, |ids| ids.contains(&record.metadata.source_id))
            })
            .collect();

        if candidates.is_empty() {
            debug!(workspace_id = ?query.workspace_id, "no candidates for query");
            return Ok(Vec::new());
        }

        let query_vector = self
            .embedder
            .embed(std::slice::from_ref(&query.text))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                RetrievalError::EmbeddingMismatch("embedder returned no query vector".to_string())
            })?;

        let candidate_count = candidates.len();
        let ranking = rank(&query_vector, candidates, query.min_similarity);
        if ranking.mismatched > 0 {
            warn!(
                skipped = ranking.mismatched,
                dimensions = query_vector.len(),
                "skipped chunks whose embedding length differs from the query"
            );
        }

        let hits: Vec<SearchHit> = select_with_coverage(ranking.ranked, query.limit)
            .into_iter()
            .map(|entry| SearchHit::from_record(entry.record, entry.similarity))
            .collect();

        debug!(
            candidates = candidate_count,
            returned = hits.len(),
            min_similarity = query.min_similarity,
            "query ranked"
        );
        Ok(hits)
    }
}

/// Distinct source names in hit order, for citation reporting.
pub fn cited_source_names(hits: &[SearchHit]) -> Vec<String> {
    let mut seen = HashSet::new();
    hits.iter()
        .filter(|hit| seen.insert(hit.metadata.source_name.as_str()))
        .map(|hit| hit.metadata.source_name.clone())
        .collect()
}
