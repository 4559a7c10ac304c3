//! Storage abstraction for chunkscan.
//!
//! The [`ChunkStore`] trait defines every persistence operation needed by
//! ingestion, the scan coordinator and the read views, so backends are
//! pluggable (SQLite in the app crate, [`memory::InMemoryStore`] here).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use std::collections::BTreeSet;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::models::{
    ChunkDetail, EmbeddingRow, FileReport, KeywordMatch, NewChunk, ProjectStatus, StoredChunk,
};

/// How chunk ids are assigned on insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdPolicy {
    /// Fresh UUID v4 per chunk. Re-ingesting a file duplicates its chunks.
    #[default]
    Random,
    /// SHA-256 of project, file, page and text. Re-inserting an identical
    /// chunk is a no-op that returns the existing id.
    ContentHash,
}

impl IdPolicy {
    pub fn assign(&self, project: &str, chunk: &NewChunk) -> String {
        match self {
            IdPolicy::Random => uuid::Uuid::new_v4().to_string(),
            IdPolicy::ContentHash => content_hash_id(project, chunk),
        }
    }
}

/// Deterministic chunk id. Fields are NUL-separated so that
/// `("ab", "c")` and `("a", "bc")` hash differently.
pub fn content_hash_id(project: &str, chunk: &NewChunk) -> String {
    let mut hasher = Sha256::new();
    hasher.update(project.as_bytes());
    hasher.update([0u8]);
    hasher.update(chunk.file_name.as_bytes());
    hasher.update([0u8]);
    hasher.update(chunk.page.to_le_bytes());
    hasher.update([0u8]);
    hasher.update(chunk.text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Abstract chunk storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert`](ChunkStore::insert) | Store new chunks, unscanned |
/// | [`export_embeddings`](ChunkStore::export_embeddings) | Snapshot `(id, vector)` rows for a scan |
/// | [`annotate`](ChunkStore::annotate) | Upsert keyword scores on one chunk |
/// | [`mark_scanned`](ChunkStore::mark_scanned) | Project-wide scanned barrier |
/// | [`report`](ChunkStore::report) | Per-file match summary |
/// | [`chunk_detail`](ChunkStore::chunk_detail) | Per-chunk matches of one file |
/// | [`delete_project`](ChunkStore::delete_project) / [`delete_file`](ChunkStore::delete_file) / [`reset`](ChunkStore::reset) | Removal |
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Insert chunks into `project` with `scanned = false`.
    ///
    /// Returns the assigned ids in input order.
    async fn insert(&self, project: &str, chunks: &[NewChunk]) -> Result<Vec<String>>;

    /// Point-in-time `(id, vector)` snapshot ordered by insertion.
    ///
    /// Rows whose stored embedding cannot be decoded are skipped with a
    /// warning.
    async fn export_embeddings(
        &self,
        project: &str,
        only_unscanned: bool,
    ) -> Result<Vec<EmbeddingRow>>;

    /// Upsert `(keyword, score)` pairs on chunk `id`.
    ///
    /// Fails with [`ScanError::LengthMismatch`](crate::ScanError::LengthMismatch)
    /// when the slices differ in length. Returns `Ok(false)` (with a
    /// warning) when the chunk no longer exists.
    async fn annotate(&self, id: &str, keywords: &[String], scores: &[f32]) -> Result<bool>;

    /// Mark every chunk currently in `project` as scanned. Returns the
    /// number of chunks affected.
    async fn mark_scanned(&self, project: &str) -> Result<u64>;

    async fn report(&self, project: &str) -> Result<Vec<FileReport>>;

    async fn chunk_detail(&self, project: &str, file_name: &str) -> Result<Vec<ChunkDetail>>;

    async fn delete_project(&self, project: &str) -> Result<u64>;

    async fn delete_file(&self, project: &str, file_name: &str) -> Result<u64>;

    /// Remove everything. Returns the number of chunks removed.
    async fn reset(&self) -> Result<u64>;

    async fn list_projects(&self) -> Result<BTreeSet<String>>;

    async fn project_status(&self, project: &str) -> Result<Option<ProjectStatus>>;

    async fn get_chunk(&self, id: &str) -> Result<Option<StoredChunk>>;
}

/// Deduplicate `(keyword, score)` pairs and sort by keyword, then score
/// descending. Used for [`FileReport::matches`].
pub fn merge_report_matches<I>(matches: I) -> Vec<KeywordMatch>
where
    I: IntoIterator<Item = KeywordMatch>,
{
    let mut out: Vec<KeywordMatch> = matches.into_iter().collect();
    out.sort_by(|a, b| {
        a.keyword
            .cmp(&b.keyword)
            .then(b.score.total_cmp(&a.score))
    });
    out.dedup_by(|a, b| a.keyword == b.keyword && a.score.to_bits() == b.score.to_bits());
    out
}

/// Deduplicate `(keyword, score)` pairs and sort by score descending
/// (keyword ascending on ties). Used for [`ChunkDetail::matches`].
pub fn merge_detail_matches<I>(matches: I) -> Vec<KeywordMatch>
where
    I: IntoIterator<Item = KeywordMatch>,
{
    let mut out: Vec<KeywordMatch> = matches.into_iter().collect();
    out.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.keyword.cmp(&b.keyword))
    });
    out.dedup_by(|a, b| a.keyword == b.keyword && a.score.to_bits() == b.score.to_bits());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(file: &str, text: &str, page: u32) -> NewChunk {
        NewChunk {
            file_name: file.to_string(),
            text: text.to_string(),
            page,
            embedding: vec![1.0],
        }
    }

    #[test]
    fn test_content_hash_stable_and_distinct() {
        let a = content_hash_id("p", &chunk("f", "text", 1));
        assert_eq!(a, content_hash_id("p", &chunk("f", "text", 1)));
        assert_eq!(a.len(), 64);
        assert_ne!(a, content_hash_id("p", &chunk("f", "text", 2)));
        assert_ne!(a, content_hash_id("q", &chunk("f", "text", 1)));
        assert_ne!(
            content_hash_id("p", &chunk("ab", "c", 1)),
            content_hash_id("p", &chunk("a", "bc", 1))
        );
    }

    #[test]
    fn test_random_policy_unique() {
        let c = chunk("f", "text", 1);
        assert_ne!(
            IdPolicy::Random.assign("p", &c),
            IdPolicy::Random.assign("p", &c)
        );
    }

    #[test]
    fn test_merge_report_matches() {
        let merged = merge_report_matches(vec![
            KeywordMatch::new("zeta", 0.6),
            KeywordMatch::new("alpha", 0.5),
            KeywordMatch::new("alpha", 0.9),
            KeywordMatch::new("alpha", 0.5),
        ]);
        let pairs: Vec<(&str, f32)> = merged
            .iter()
            .map(|m| (m.keyword.as_str(), m.score))
            .collect();
        assert_eq!(pairs, vec![("alpha", 0.9), ("alpha", 0.5), ("zeta", 0.6)]);
    }

    #[test]
    fn test_merge_detail_matches_keeps_distinct_pairs() {
        let merged = merge_detail_matches(vec![
            KeywordMatch::new("a", 0.5),
            KeywordMatch::new("b", 0.8),
            KeywordMatch::new("a", 0.7),
            KeywordMatch::new("a", 0.5),
        ]);
        let pairs: Vec<(&str, f32)> = merged
            .iter()
            .map(|m| (m.keyword.as_str(), m.score))
            .collect();
        assert_eq!(pairs, vec![("b", 0.8), ("a", 0.7), ("a", 0.5)]);
    }
}
