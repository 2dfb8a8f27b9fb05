//! File-backed chunk store.
//!
//! The whole store is one JSON array of [`ChunkRecord`]s, read lazily on first
//! access and rewritten in full on every mutation. A single async mutex
//! serialises load, mutate and persist, so concurrent writers cannot lose each
//! other's updates. Writes go to a sibling temp file that is renamed over the
//! blob; the cache is swapped only after the rename succeeds.

use crate::error::StoreError;
use crate::models::{ChunkRecord, SourceSummary};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

pub struct VectorStore {
    path: PathBuf,
    cache: Mutex<Option<Arc<Vec<ChunkRecord>>>>,
}

impl VectorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the cached records, reading the blob on first call. A missing
    /// file is an empty store; an unparsable one is [`StoreError::Corrupt`].
    pub async fn load(&self) -> Result<Arc<Vec<ChunkRecord>>, StoreError> {
        let mut cache = self.cache.lock().await;
        self.loaded(&mut cache).await
    }

    /// Appends records and persists. Rejects ids already present.
    pub async fn add(&self, records: Vec<ChunkRecord>) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut cache = self.cache.lock().await;
        let current = self.loaded(&mut cache).await?;

        validate_new_records(&current, &records)?;
        let added = records.len();
        let mut next = Vec::with_capacity(current.len() + added);
        next.extend(current.iter().cloned());
        next.extend(records);

        self.commit(&mut cache, next).await?;
        debug!(added, path = %self.path.display(), "records appended");
        Ok(())
    }

    /// Removes every record for `source_id` in any workspace. Only safe when
    /// source ids are globally unique; prefer
    /// [`remove_workspace_source`](Self::remove_workspace_source).
    pub async fn remove_by_source(&self, source_id: i64) -> Result<usize, StoreError> {
        self.retain(|record| record.metadata.source_id != source_id)
            .await
    }

    pub async fn remove_workspace_source(
        &self,
        workspace_id: &str,
        source_id: i64,
    ) -> Result<usize, StoreError> {
        self.retain(|record| !record.belongs_to(workspace_id, source_id))
            .await
    }

    /// Drops the existing chunks of `(workspace_id, source_id)` and appends
    /// `records` under one lock hold. Returns how many records were replaced.
    pub async fn replace_source(
        &self,
        workspace_id: &str,
        source_id: i64,
        records: Vec<ChunkRecord>,
    ) -> Result<usize, StoreError> {
        if let Some(stray) = records
            .iter()
            .find(|record| !record.belongs_to(workspace_id, source_id))
        {
            return Err(StoreError::InvalidRecord {
                id: stray.id.clone(),
                reason: format!("does not belong to {workspace_id}/{source_id}"),
            });
        }

        let mut cache = self.cache.lock().await;
        let current = self.loaded(&mut cache).await?;

        let kept: Vec<ChunkRecord> = current
            .iter()
            .filter(|record| !record.belongs_to(workspace_id, source_id))
            .cloned()
            .collect();
        let replaced = current.len() - kept.len();

        if replaced == 0 && records.is_empty() {
            return Ok(0);
        }

        validate_new_records(&kept, &records)?;
        let mut next = kept;
        next.extend(records);

        self.commit(&mut cache, next).await?;
        info!(workspace_id, source_id, replaced, "source chunks replaced");
        Ok(replaced)
    }

    /// Per-source chunk counts in store order, optionally for one workspace.
    pub async fn sources(&self, workspace_id: Option<&str>) -> Result<Vec<SourceSummary>, StoreError> {
        let records = self.load().await?;
        let mut summaries: Vec<SourceSummary> = Vec::new();

        for record in records.iter() {
            let meta = &record.metadata;
            if workspace_id.is_some_and(|workspace| workspace != meta.workspace_id) {
                continue;
            }
            match summaries
                .iter_mut()
                .find(|summary| summary.workspace_id == meta.workspace_id && summary.source_id == meta.source_id)
            {
                Some(summary) => summary.chunk_count += 1,
                None => summaries.push(SourceSummary {
                    workspace_id: meta.workspace_id.clone(),
                    source_id: meta.source_id,
                    source_name: meta.source_name.clone(),
                    chunk_count: 1,
                }),
            }
        }

        Ok(summaries)
    }

    async fn retain<F>(&self, keep: F) -> Result<usize, StoreError>
    where
        F: Fn(&ChunkRecord) -> bool,
    {
        let mut cache = self.cache.lock().await;
        let current = self.loaded(&mut cache).await?;

        let next: Vec<ChunkRecord> = current.iter().filter(|record| keep(*record)).cloned().collect();
        let removed = current.len() - next.len();
        if removed == 0 {
            return Ok(0);
        }

        self.commit(&mut cache, next).await?;
        info!(removed, path = %self.path.display(), "records removed");
        Ok(removed)
    }

    async fn loaded(
        &self,
        cache: &mut Option<Arc<Vec<ChunkRecord>>>,
    ) -> Result<Arc<Vec<ChunkRecord>>, StoreError> {
        if let Some(records) = cache.as_ref() {
            return Ok(Arc::clone(records));
        }

        let records = match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice::<Vec<ChunkRecord>>(&bytes).map_err(|source| {
                StoreError::Corrupt {
                    path: self.path.clone(),
                    source,
                }
            })?,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(error) => return Err(StoreError::io(&self.path, error)),
        };

        debug!(count = records.len(), path = %self.path.display(), "vector store loaded");
        let records = Arc::new(records);
        *cache = Some(Arc::clone(&records));
        Ok(records)
    }

    async fn commit(
        &self,
        cache: &mut Option<Arc<Vec<ChunkRecord>>>,
        records: Vec<ChunkRecord>,
    ) -> Result<(), StoreError> {
        self.persist(&records).await?;
        *cache = Some(Arc::new(records));
        Ok(())
    }

    async fn persist(&self, records: &[ChunkRecord]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|error| StoreError::io(parent, error))?;
        }

        let bytes = serde_json::to_vec(records)?;
        let staging = staging_path(&self.path);
        tokio::fs::write(&staging, &bytes)
            .await
            .map_err(|error| StoreError::io(&staging, error))?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .map_err(|error| StoreError::io(&self.path, error))?;

        debug!(count = records.len(), bytes = bytes.len(), "vector store persisted");
        Ok(())
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|name| name.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn validate_new_records(existing: &[ChunkRecord], incoming: &[ChunkRecord]) -> Result<(), StoreError> {
    let mut ids: HashSet<&str> = existing.iter().map(|record| record.id.as_str()).collect();

    for record in incoming {
        if record.text.trim().is_empty() {
            return Err(StoreError::InvalidRecord {
                id: record.id.clone(),
                reason: "text is empty".to_string(),
            });
        }
        if record.embedding.is_empty() {
            return Err(StoreError::InvalidRecord {
                id: record.id.clone(),
                reason: "embedding is empty".to_string(),
            });
        }
        if !ids.insert(record.id.as_str()) {
            return Err(StoreError::DuplicateId(record.id.clone()));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkMetadata;
    use tempfile::tempdir;

    fn record(workspace_id: &str, source_id: i64, chunk_index: usize) -> ChunkRecord {
        ChunkRecord {
            id: format!("{workspace_id}:source-{source_id}-chunk-{chunk_index}"),
            text: format!("text {chunk_index}"),
            embedding: vec![0.25, 0.5, chunk_index as f32],
            metadata: ChunkMetadata {
                source_id,
                source_name: format!("doc-{source_id}.pdf"),
                chunk_index,
                workspace_id: workspace_id.to_string(),
            },
        }
    }

    #[tokio::test]
    async fn missing_file_is_an_empty_store() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = VectorStore::new(dir.path().join("vectors.json"));
        assert!(store.load().await?.is_empty());
        assert!(!store.path().exists());
        Ok(())
    }

    #[tokio::test]
    async fn adding_nothing_leaves_the_disk_untouched() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("nested").join("vectors.json");
        let store = VectorStore::new(&path);

        store.add(Vec::new()).await?;

        assert!(!path.exists());
        assert!(!path.parent().map_or(false, Path::exists));
        assert!(store.load().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn added_records_survive_a_fresh_load() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("nested").join("vectors.json");
        let records = vec![record("a", 1, 0), record("a", 1, 1), record("b", 2, 0)];

        VectorStore::new(&path).add(records.clone()).await?;

        let reopened = VectorStore::new(&path);
        assert_eq!(*reopened.load().await?, records);
        assert!(!staging_path(&path).exists());
        Ok(())
    }

    #[tokio::test]
    async fn persisted_layout_uses_snake_case_metadata() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("vectors.json");
        VectorStore::new(&path).add(vec![record("a", 7, 0)]).await?;

        let raw: serde_json::Value = serde_json::from_slice(&std::fs::read(&path)?)?;
        let entry = &raw[0];
        assert_eq!(entry["id"], "a:source-7-chunk-0");
        assert_eq!(entry["metadata"]["source_id"], 7);
        assert_eq!(entry["metadata"]["workspace_id"], "a");
        assert_eq!(entry["metadata"]["chunk_index"], 0);
        assert_eq!(entry["metadata"]["source_name"], "doc-7.pdf");
        assert!(entry["embedding"].is_array());
        Ok(())
    }

    #[tokio::test]
    async fn remove_by_source_clears_every_workspace() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("vectors.json");
        let store = VectorStore::new(&path);
        store
            .add(vec![record("a", 1, 0), record("b", 1, 0), record("a", 2, 0)])
            .await?;

        assert_eq!(store.remove_by_source(1).await?, 2);

        let reloaded = VectorStore::new(&path).load().await?;
        assert_eq!(reloaded.len(), 1);
        assert!(reloaded.iter().all(|r| r.metadata.source_id != 1));
        Ok(())
    }

    #[tokio::test]
    async fn workspace_scoped_removal_leaves_other_tenants() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = VectorStore::new(dir.path().join("vectors.json"));
        store.add(vec![record("a", 1, 0), record("b", 1, 0)]).await?;

        assert_eq!(store.remove_workspace_source("a", 1).await?, 1);
        let remaining = store.load().await?;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].metadata.workspace_id, "b");
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected_without_writing() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = VectorStore::new(dir.path().join("vectors.json"));
        store.add(vec![record("a", 1, 0)]).await?;

        let result = store.add(vec![record("a", 1, 1), record("a", 1, 0)]).await;
        assert!(matches!(result, Err(StoreError::DuplicateId(id)) if id == "a:source-1-chunk-0"));
        assert_eq!(store.load().await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn empty_text_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = VectorStore::new(dir.path().join("vectors.json"));
        let mut blank = record("a", 1, 0);
        blank.text = "   ".to_string();

        let result = store.add(vec![blank]).await;
        assert!(matches!(result, Err(StoreError::InvalidRecord { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn replace_source_swaps_chunks_in_one_step() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = VectorStore::new(dir.path().join("vectors.json"));
        store
            .add(vec![record("a", 1, 0), record("a", 1, 1), record("a", 2, 0)])
            .await?;

        let replaced = store.replace_source("a", 1, vec![record("a", 1, 0)]).await?;
        assert_eq!(replaced, 2);

        let summaries = store.sources(Some("a")).await?;
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].source_id, 2);
        assert_eq!(summaries[1].source_id, 1);
        assert_eq!(summaries[1].chunk_count, 1);
        Ok(())
    }

    #[tokio::test]
    async fn replace_source_rejects_foreign_records() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = VectorStore::new(dir.path().join("vectors.json"));
        let result = store.replace_source("a", 1, vec![record("b", 1, 0)]).await;
        assert!(matches!(result, Err(StoreError::InvalidRecord { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn corrupt_blob_is_reported() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("vectors.json");
        std::fs::write(&path, b"{not json")?;

        let store = VectorStore::new(&path);
        assert!(matches!(store.load().await, Err(StoreError::Corrupt { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_additions_are_not_lost() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("vectors.json");
        let store = Arc::new(VectorStore::new(&path));

        let mut handles = Vec::new();
        for source_id in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .add(vec![record("a", source_id, 0), record("a", source_id, 1)])
                    .await
            }));
        }
        for handle in handles {
            handle.await??;
        }

        assert_eq!(VectorStore::new(&path).load().await?.len(), 16);
        Ok(())
    }
}
