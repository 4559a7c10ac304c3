//! In-memory [`ChunkStore`] implementation for tests and embedding callers.
//!
//! Chunks live in a `Vec` behind `std::sync::RwLock`, which keeps
//! insertion order for exports and detail views.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::error::ScanError;
use crate::models::{
    ChunkDetail, EmbeddingRow, FileReport, KeywordMatch, NewChunk, ProjectStatus, StoredChunk,
};

use super::{merge_detail_matches, merge_report_matches, ChunkStore, IdPolicy};

/// In-memory chunk store.
pub struct InMemoryStore {
    policy: IdPolicy,
    chunks: RwLock<Vec<StoredChunk>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_policy(IdPolicy::default())
    }

    pub fn with_policy(policy: IdPolicy) -> Self {
        Self {
            policy,
            chunks: RwLock::new(Vec::new()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Vec<StoredChunk>>> {
        self.chunks
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Vec<StoredChunk>>> {
        self.chunks
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

#[async_trait]
impl ChunkStore for InMemoryStore {
    async fn insert(&self, project: &str, chunks: &[NewChunk]) -> Result<Vec<String>> {
        let now = now_ts();
        let mut stored = self.write()?;
        let mut ids = Vec::with_capacity(chunks.len());
        for c in chunks {
            let id = self.policy.assign(project, c);
            if !stored.iter().any(|sc| sc.id == id) {
                stored.push(StoredChunk {
                    id: id.clone(),
                    project: project.to_string(),
                    file_name: c.file_name.clone(),
                    text: c.text.clone(),
                    page: c.page,
                    embedding: c.embedding.clone(),
                    created_at: now,
                    scanned: false,
                    scanned_at: None,
                    matches: Vec::new(),
                });
            }
            ids.push(id);
        }
        Ok(ids)
    }

    async fn export_embeddings(
        &self,
        project: &str,
        only_unscanned: bool,
    ) -> Result<Vec<EmbeddingRow>> {
        let stored = self.read()?;
        Ok(stored
            .iter()
            .filter(|sc| sc.project == project && !(only_unscanned && sc.scanned))
            .map(|sc| EmbeddingRow {
                id: sc.id.clone(),
                vector: sc.embedding.clone(),
            })
            .collect())
    }

    async fn annotate(&self, id: &str, keywords: &[String], scores: &[f32]) -> Result<bool> {
        if keywords.len() != scores.len() {
            return Err(ScanError::LengthMismatch {
                keywords: keywords.len(),
                scores: scores.len(),
            }
            .into());
        }

        let mut stored = self.write()?;
        let Some(chunk) = stored.iter_mut().find(|sc| sc.id == id) else {
            tracing::warn!(chunk_id = %id, "annotation target no longer exists; skipping");
            return Ok(false);
        };

        for (keyword, &score) in keywords.iter().zip(scores) {
            match chunk.matches.iter_mut().find(|m| &m.keyword == keyword) {
                Some(existing) => existing.score = score,
                None => chunk.matches.push(KeywordMatch::new(keyword.clone(), score)),
            }
        }
        Ok(true)
    }

    async fn mark_scanned(&self, project: &str) -> Result<u64> {
        let now = now_ts();
        let mut stored = self.write()?;
        let mut count = 0;
        for sc in stored.iter_mut().filter(|sc| sc.project == project) {
            sc.scanned = true;
            sc.scanned_at = Some(now);
            count += 1;
        }
        Ok(count)
    }

    async fn report(&self, project: &str) -> Result<Vec<FileReport>> {
        let stored = self.read()?;
        let mut files: BTreeMap<&str, Vec<&StoredChunk>> = BTreeMap::new();
        for sc in stored.iter().filter(|sc| sc.project == project) {
            files.entry(sc.file_name.as_str()).or_default().push(sc);
        }

        Ok(files
            .into_iter()
            .map(|(file_name, chunks)| FileReport {
                file_name: file_name.to_string(),
                uploaded_at: chunks.iter().map(|c| c.created_at).min().unwrap_or_default(),
                scanned: chunks.iter().all(|c| c.scanned),
                matches: merge_report_matches(
                    chunks
                        .iter()
                        .filter(|c| c.scanned)
                        .flat_map(|c| c.matches.iter().cloned()),
                ),
            })
            .collect())
    }

    async fn chunk_detail(&self, project: &str, file_name: &str) -> Result<Vec<ChunkDetail>> {
        let stored = self.read()?;
        let mut order: Vec<(&str, u32)> = Vec::new();
        let mut grouped: HashMap<(&str, u32), Vec<KeywordMatch>> = HashMap::new();

        for sc in stored
            .iter()
            .filter(|sc| sc.project == project && sc.file_name == file_name)
        {
            let key = (sc.text.as_str(), sc.page);
            grouped
                .entry(key)
                .or_insert_with(|| {
                    order.push(key);
                    Vec::new()
                })
                .extend(sc.matches.iter().cloned());
        }

        Ok(order
            .into_iter()
            .map(|key| ChunkDetail {
                text: key.0.to_string(),
                page: key.1,
                matches: merge_detail_matches(grouped.remove(&key).unwrap_or_default()),
            })
            .collect())
    }

    async fn delete_project(&self, project: &str) -> Result<u64> {
        let mut stored = self.write()?;
        let before = stored.len();
        stored.retain(|sc| sc.project != project);
        Ok((before - stored.len()) as u64)
    }

    async fn delete_file(&self, project: &str, file_name: &str) -> Result<u64> {
        let mut stored = self.write()?;
        let before = stored.len();
        stored.retain(|sc| !(sc.project == project && sc.file_name == file_name));
        Ok((before - stored.len()) as u64)
    }

    async fn reset(&self) -> Result<u64> {
        let mut stored = self.write()?;
        let count = stored.len() as u64;
        stored.clear();
        Ok(count)
    }

    async fn list_projects(&self) -> Result<BTreeSet<String>> {
        let stored = self.read()?;
        Ok(stored.iter().map(|sc| sc.project.clone()).collect())
    }

    async fn project_status(&self, project: &str) -> Result<Option<ProjectStatus>> {
        let stored = self.read()?;
        let chunks: Vec<&StoredChunk> = stored
            .iter()
            .filter(|sc| sc.project == project)
            .collect();
        let Some(created_at) = chunks.iter().map(|c| c.created_at).min() else {
            return Ok(None);
        };
        let files: BTreeSet<&str> = chunks.iter().map(|c| c.file_name.as_str()).collect();

        Ok(Some(ProjectStatus {
            project: project.to_string(),
            created_at,
            scanned: chunks.iter().all(|c| c.scanned),
            chunk_count: chunks.len() as u64,
            file_count: files.len() as u64,
        }))
    }

    async fn get_chunk(&self, id: &str) -> Result<Option<StoredChunk>> {
        let stored = self.read()?;
        Ok(stored.iter().find(|sc| sc.id == id).cloned())
    }
}
