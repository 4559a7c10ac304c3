//! Core data models used throughout chunkscan.
//!
//! These types represent the pages, chunks, annotations, and read views
//! that flow through ingestion, scanning, and reporting.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Text of one page as supplied by the extraction collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    /// 1-based page number (1 for formats without pages).
    pub page: u32,
    pub text: String,
}

impl PageText {
    pub fn new(page: u32, text: impl Into<String>) -> Self {
        Self {
            page,
            text: text.into(),
        }
    }
}

/// A bounded, sentence-aligned span of normalized page text.
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    pub page: u32,
    pub text: String,
}

/// A chunk ready for insertion: text plus its embedding.
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub file_name: String,
    pub text: String,
    pub page: u32,
    pub embedding: Vec<f32>,
}

/// One (keyword, score) annotation on a chunk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeywordMatch {
    pub keyword: String,
    /// Cosine similarity of the keyword to the chunk, in `[-1.0, 1.0]`.
    pub score: f32,
}

impl KeywordMatch {
    pub fn new(keyword: impl Into<String>, score: f32) -> Self {
        Self {
            keyword: keyword.into(),
            score,
        }
    }
}

/// A chunk as read back from a store.
#[derive(Debug, Clone)]
pub struct StoredChunk {
    pub id: String,
    pub project: String,
    pub file_name: String,
    pub text: String,
    pub page: u32,
    pub embedding: Vec<f32>,
    /// Insertion time (unix seconds, UTC).
    pub created_at: i64,
    pub scanned: bool,
    pub scanned_at: Option<i64>,
    pub matches: Vec<KeywordMatch>,
}

/// `(id, vector)` pair returned by an embedding export.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRow {
    pub id: String,
    pub vector: Vec<f32>,
}

/// Per-file summary of a project's scan results.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub file_name: String,
    /// Earliest insertion time of the file's chunks (unix seconds).
    pub uploaded_at: i64,
    /// True when every chunk of the file has been scanned.
    pub scanned: bool,
    /// Deduplicated union of matches over the file's scanned chunks,
    /// sorted by keyword, then score descending.
    pub matches: Vec<KeywordMatch>,
}

/// Matches attached to one distinct `(text, page)` of a file.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkDetail {
    pub text: String,
    pub page: u32,
    pub matches: Vec<KeywordMatch>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectStatus {
    pub project: String,
    /// Earliest insertion time across the project (unix seconds).
    pub created_at: i64,
    /// True when every chunk in the project has been scanned.
    pub scanned: bool,
    pub chunk_count: u64,
    pub file_count: u64,
}

/// Named threshold preset controlling scan strictness.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Focused,
    #[default]
    Balanced,
    Broad,
    /// Explicit cosine cutoff.
    Threshold(f32),
}

impl FromStr for Scope {
    type Err = std::convert::Infallible;

    /// Unknown names fall back to [`Scope::Balanced`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_lowercase();
        Ok(match name.as_str() {
            "focused" | "focus" => Scope::Focused,
            "balanced" => Scope::Balanced,
            "broad" => Scope::Broad,
            other => match other.parse::<f32>() {
                Ok(t) if t.is_finite() => Scope::Threshold(t),
                _ => {
                    tracing::debug!(scope = %s, "unknown scope, using balanced");
                    Scope::Balanced
                }
            },
        })
    }
}

/// Cosine cutoffs for the named scopes.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct ScopeThresholds {
    #[serde(default = "default_focused")]
    pub focused: f32,
    #[serde(default = "default_balanced")]
    pub balanced: f32,
    #[serde(default = "default_broad")]
    pub broad: f32,
}

fn default_focused() -> f32 {
    0.7
}
fn default_balanced() -> f32 {
    0.5
}
fn default_broad() -> f32 {
    0.4
}

impl Default for ScopeThresholds {
    fn default() -> Self {
        Self {
            focused: default_focused(),
            balanced: default_balanced(),
            broad: default_broad(),
        }
    }
}

impl ScopeThresholds {
    pub fn resolve(&self, scope: Scope) -> f32 {
        match scope {
            Scope::Focused => self.focused,
            Scope::Balanced => self.balanced,
            Scope::Broad => self.broad,
            Scope::Threshold(t) => t,
        }
    }
}

/// A batch of keyword queries against one project.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub keywords: Vec<String>,
    pub scope: Scope,
    /// Only scan chunks not yet covered by a previous pass.
    pub incremental: bool,
}

impl SearchRequest {
    pub fn new<I, K>(keywords: I, scope: Scope) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self {
            keywords: keywords.into_iter().map(Into::into).collect(),
            scope,
            incremental: false,
        }
    }

    pub fn incremental(mut self, incremental: bool) -> Self {
        self.incremental = incremental;
        self
    }
}

/// What a scan pass did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchOutcome {
    /// Chunks in the exported snapshot.
    pub candidates: usize,
    /// Chunks that received at least one annotation.
    pub annotated_chunks: usize,
    /// Total (keyword, chunk) pairs at or above the threshold.
    pub hits: usize,
    pub threshold: f32,
    /// Whether the pass ended with the project-wide scanned barrier.
    pub marked_scanned: bool,
}
