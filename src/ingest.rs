//! Ingestion pipeline: files → pages → chunks → embeddings → store.
//!
//! Extraction and chunking are CPU-bound and run on blocking worker
//! threads, at most `workers` at a time. Embedding then runs per document
//! in batches of `batch_size`, and each document's chunks are inserted in
//! one store call. A document that fails extraction is logged and skipped;
//! the rest proceed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use chunkscan_core::chunk::Chunker;
use chunkscan_core::embedding::EmbeddingProvider;
use chunkscan_core::error::ScanError;
use chunkscan_core::models::{NewChunk, PageText, TextChunk};
use chunkscan_core::store::ChunkStore;

use crate::extract;

/// What an ingestion run did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestSummary {
    /// Documents whose chunks were stored.
    pub files: usize,
    /// Chunks inserted across all documents.
    pub chunks: usize,
    /// `(file, reason)` for every skipped document.
    pub failed_files: Vec<(String, String)>,
}

/// Tunables for [`ingest_files`].
#[derive(Debug, Clone, Copy)]
pub struct IngestOptions {
    pub chunker: Chunker,
    pub workers: usize,
    pub batch_size: usize,
}

/// Stored file name for a path: its final component.
pub fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Extract and chunk every path concurrently, then embed and store them.
pub async fn ingest_files(
    store: &dyn ChunkStore,
    embedder: &dyn EmbeddingProvider,
    project: &str,
    paths: &[PathBuf],
    options: IngestOptions,
) -> Result<IngestSummary> {
    let semaphore = Arc::new(Semaphore::new(options.workers.max(1)));
    let mut tasks = JoinSet::new();

    for (position, path) in paths.iter().cloned().enumerate() {
        let permit = semaphore.clone().acquire_owned().await?;
        let chunker = options.chunker;
        tasks.spawn_blocking(move || {
            let _permit = permit;
            let result = extract::extract_pages(&path).map(|pages| chunker.chunk_pages(&pages));
            (position, path, result)
        });
    }

    let mut extracted: Vec<(usize, PathBuf, Result<Vec<TextChunk>, ScanError>)> =
        Vec::with_capacity(paths.len());
    while let Some(joined) = tasks.join_next().await {
        extracted.push(joined.context("extraction worker panicked")?);
    }
    extracted.sort_by_key(|(position, _, _)| *position);

    let mut summary = IngestSummary::default();
    for (_, path, result) in extracted {
        let file_name = file_label(&path);
        match result {
            Ok(chunks) => {
                let ids =
                    store_chunks(store, embedder, project, &file_name, chunks, options.batch_size)
                        .await
                        .with_context(|| format!("ingesting '{}'", path.display()))?;
                tracing::info!(project, file = %file_name, chunks = ids.len(), "ingested");
                summary.files += 1;
                summary.chunks += ids.len();
            }
            Err(err) => {
                tracing::warn!(file = %path.display(), error = %err, "skipping document");
                summary.failed_files.push((path.display().to_string(), err.to_string()));
            }
        }
    }

    Ok(summary)
}

/// Chunk already-extracted pages and store them under `file_name`.
pub async fn ingest_pages(
    store: &dyn ChunkStore,
    embedder: &dyn EmbeddingProvider,
    project: &str,
    file_name: &str,
    pages: &[PageText],
    options: IngestOptions,
) -> Result<Vec<String>> {
    let chunks = options.chunker.chunk_pages(pages);
    store_chunks(store, embedder, project, file_name, chunks, options.batch_size).await
}

async fn store_chunks(
    store: &dyn ChunkStore,
    embedder: &dyn EmbeddingProvider,
    project: &str,
    file_name: &str,
    chunks: Vec<TextChunk>,
    batch_size: usize,
) -> Result<Vec<String>> {
    if chunks.is_empty() {
        tracing::debug!(project, file = %file_name, "document produced no chunks");
        return Ok(Vec::new());
    }

    let mut rows = Vec::with_capacity(chunks.len());
    for batch in chunks.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder.embed(&texts).await?;
        if vectors.len() != batch.len() {
            anyhow::bail!(
                "embedding provider returned {} vectors for {} chunks",
                vectors.len(),
                batch.len()
            );
        }
        rows.extend(batch.iter().zip(vectors).map(|(c, embedding)| NewChunk {
            file_name: file_name.to_string(),
            text: c.text.clone(),
            page: c.page,
            embedding,
        }));
    }

    store.insert(project, &rows).await
}
