//! Keyword scan coordinator.
//!
//! [`run_search`] runs one scan pass over a project: it snapshots the
//! project's embeddings, scores every keyword against every chunk, writes
//! the matches at or above the scope's threshold back as annotations, and
//! finally marks the project as scanned.
//!
//! # Algorithm
//!
//! 1. Resolve the scope to a cosine threshold.
//! 2. Clean the keyword list (trim, drop empty, dedupe).
//! 3. Export `(id, vector)` rows, all or only unscanned.
//! 4. Build a [`SimilarityIndex`] over the snapshot.
//! 5. Embed all keywords in one provider call.
//! 6. Score the batch and keep pairs with `score >= threshold`, grouped
//!    per chunk.
//! 7. Annotate each matched chunk.
//! 8. Mark the project scanned.
//!
//! Steps 1 to 6 perform no writes, so dropping the future before step 7
//! leaves the store untouched.

use std::collections::{HashMap, HashSet};

use anyhow::{bail, Context, Result};

use crate::embedding::EmbeddingProvider;
use crate::error::ScanError;
use crate::index::SimilarityIndex;
use crate::models::{ScopeThresholds, SearchOutcome, SearchRequest};
use crate::store::ChunkStore;

/// Matches accumulated for one chunk, as parallel arrays.
#[derive(Debug, Default)]
struct Pending {
    keywords: Vec<String>,
    scores: Vec<f32>,
}

/// Trim, drop empty entries, and dedupe keeping the first occurrence.
pub fn clean_keywords(keywords: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty() && seen.insert(*k))
        .map(str::to_string)
        .collect()
}

/// Run one scan pass of `request` over `project`.
pub async fn run_search<S, E>(
    store: &S,
    embedder: &E,
    project: &str,
    request: &SearchRequest,
    thresholds: &ScopeThresholds,
) -> Result<SearchOutcome>
where
    S: ChunkStore + ?Sized,
    E: EmbeddingProvider + ?Sized,
{
    let threshold = thresholds.resolve(request.scope);
    let mut outcome = SearchOutcome {
        threshold,
        ..Default::default()
    };

    let keywords = clean_keywords(&request.keywords);
    if keywords.is_empty() {
        tracing::info!(project, "no keywords to scan for");
        return Ok(outcome);
    }

    let rows = store
        .export_embeddings(project, request.incremental)
        .await
        .with_context(|| format!("exporting embeddings for project '{}'", project))?;
    if rows.is_empty() {
        tracing::info!(
            project,
            incremental = request.incremental,
            "nothing to scan"
        );
        return Ok(outcome);
    }
    outcome.candidates = rows.len();

    let index = SimilarityIndex::build(rows)
        .with_context(|| format!("building similarity index for project '{}'", project))?;

    let vectors = embedder
        .embed(&keywords)
        .await
        .context("embedding keywords")?;
    if vectors.len() != keywords.len() {
        bail!(
            "embedding provider returned {} vectors for {} keywords",
            vectors.len(),
            keywords.len()
        );
    }
    if let Some(v) = vectors.iter().find(|v| v.len() != index.dims()) {
        return Err(ScanError::DimensionMismatch {
            expected: index.dims(),
            actual: v.len(),
        }
        .into());
    }

    let ranked = index.search(&vectors)?;

    let mut order: Vec<&str> = Vec::new();
    let mut pending: HashMap<&str, Pending> = HashMap::new();
    for (keyword, hits) in keywords.iter().zip(&ranked) {
        let mut count = 0;
        for &(id, score) in hits.iter().take_while(|(_, s)| *s >= threshold) {
            let entry = pending.entry(id).or_insert_with(|| {
                order.push(id);
                Pending::default()
            });
            entry.keywords.push(keyword.clone());
            entry.scores.push(score);
            count += 1;
        }
        tracing::debug!(project, keyword = %keyword, hits = count, "keyword scored");
        outcome.hits += count;
    }

    for id in order {
        let Some(p) = pending.remove(id) else {
            continue;
        };
        if store.annotate(id, &p.keywords, &p.scores).await? {
            outcome.annotated_chunks += 1;
        }
    }

    store
        .mark_scanned(project)
        .await
        .with_context(|| format!("marking project '{}' scanned", project))?;
    outcome.marked_scanned = true;

    tracing::info!(
        project,
        keywords = keywords.len(),
        candidates = outcome.candidates,
        annotated = outcome.annotated_chunks,
        hits = outcome.hits,
        threshold,
        "scan pass complete"
    );
    Ok(outcome)
}
