use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_QUERY_LIMIT: usize = 5;
pub const DEFAULT_MIN_SIMILARITY: f64 = 0.3;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkMetadata {
    pub source_id: i64,
    pub source_name: String,
    pub chunk_index: usize,
    pub workspace_id: String,
}

/// A single persisted chunk. Workspace and source are fixed once written;
/// moving a chunk means deleting and re-adding it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkRecord {
    pub id: String,
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: ChunkMetadata,
}

impl ChunkRecord {
    pub fn belongs_to(&self, workspace_id: &str, source_id: i64) -> bool {
        self.metadata.workspace_id == workspace_id && self.metadata.source_id == source_id
    }
}

/// Plain text handed over by the ingestion collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDocument {
    pub source_id: i64,
    pub source_name: String,
    pub workspace_id: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchQuery {
    pub text: String,
    pub limit: usize,
    pub source_ids: Option<Vec<i64>>,
    pub workspace_id: Option<String>,
    pub min_similarity: f64,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            limit: DEFAULT_QUERY_LIMIT,
            source_ids: None,
            workspace_id: None,
            min_similarity: DEFAULT_MIN_SIMILARITY,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn in_workspace(mut self, workspace_id: impl Into<String>) -> Self {
        self.workspace_id = Some(workspace_id.into());
        self
    }

    pub fn restricted_to(mut self, source_ids: impl IntoIterator<Item = i64>) -> Self {
        self.source_ids = Some(source_ids.into_iter().collect());
        self
    }

    pub fn with_min_similarity(mut self, min_similarity: f64) -> Self {
        self.min_similarity = min_similarity;
        self
    }
}

/// A ranked passage. `distance` is always `1 - similarity`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub similarity: f64,
    pub distance: f64,
}

impl SearchHit {
    pub fn from_record(record: &ChunkRecord, similarity: f64) -> Self {
        Self {
            id: record.id.clone(),
            text: record.text.clone(),
            metadata: record.metadata.clone(),
            similarity,
            distance: 1.0 - similarity,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceSummary {
    pub workspace_id: String,
    pub source_id: i64,
    pub source_name: String,
    pub chunk_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionReport {
    pub source_id: i64,
    pub workspace_id: String,
    pub chunk_count: usize,
    pub replaced: usize,
    pub ingested_at: DateTime<Utc>,
}
