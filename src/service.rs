//! The [`Scanner`] service object.
//!
//! Owns the chunk store, the embedding provider, the chunker and the scope
//! thresholds, and exposes the whole query surface. Build one with
//! [`Scanner::from_config`] (SQLite + configured provider) or
//! [`Scanner::new`] for any store/provider pair, and pass it around
//! explicitly.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use chunkscan_core::chunk::Chunker;
use chunkscan_core::embedding::EmbeddingProvider;
use chunkscan_core::models::{
    ChunkDetail, FileReport, PageText, ProjectStatus, Scope, ScopeThresholds, SearchOutcome,
    SearchRequest,
};
use chunkscan_core::search::run_search;
use chunkscan_core::store::ChunkStore;

use crate::config::Config;
use crate::embedding::create_provider;
use crate::ingest::{self, IngestOptions, IngestSummary};
use crate::sqlite_store::SqliteStore;

pub struct Scanner {
    store: Arc<dyn ChunkStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    chunker: Chunker,
    thresholds: ScopeThresholds,
    default_scope: Scope,
    workers: usize,
    batch_size: usize,
}

impl Scanner {
    /// A scanner with default chunking, thresholds and concurrency.
    pub fn new(store: Arc<dyn ChunkStore>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            store,
            embedder,
            chunker: Chunker::default(),
            thresholds: ScopeThresholds::default(),
            default_scope: Scope::default(),
            workers: 1,
            batch_size: 64,
        }
    }

    /// Open the configured SQLite database and embedding provider.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let store = SqliteStore::open(config).await?;
        let embedder = create_provider(&config.embedding)?;
        Ok(Self::new(Arc::new(store), Arc::from(embedder))
            .with_chunker(Chunker::new(config.chunking.max_chars))
            .with_thresholds(config.search.thresholds)
            .with_default_scope(config.search.default_scope())
            .with_workers(config.ingest.effective_workers())
            .with_batch_size(config.embedding.batch_size))
    }

    pub fn with_chunker(mut self, chunker: Chunker) -> Self {
        self.chunker = chunker;
        self
    }

    pub fn with_thresholds(mut self, thresholds: ScopeThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_default_scope(mut self, scope: Scope) -> Self {
        self.default_scope = scope;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn default_scope(&self) -> Scope {
        self.default_scope
    }

    pub fn store(&self) -> &dyn ChunkStore {
        self.store.as_ref()
    }

    fn ingest_options(&self) -> IngestOptions {
        IngestOptions {
            chunker: self.chunker,
            workers: self.workers,
            batch_size: self.batch_size,
        }
    }

    /// Extract, chunk, embed and store each file under `project`.
    pub async fn ingest_files(&self, project: &str, paths: &[PathBuf]) -> Result<IngestSummary> {
        ingest::ingest_files(
            self.store.as_ref(),
            self.embedder.as_ref(),
            project,
            paths,
            self.ingest_options(),
        )
        .await
    }

    /// Chunk, embed and store pages that were extracted elsewhere.
    pub async fn insert_document(
        &self,
        project: &str,
        file_name: &str,
        pages: &[PageText],
    ) -> Result<Vec<String>> {
        ingest::ingest_pages(
            self.store.as_ref(),
            self.embedder.as_ref(),
            project,
            file_name,
            pages,
            self.ingest_options(),
        )
        .await
    }

    pub async fn search(&self, project: &str, request: &SearchRequest) -> Result<SearchOutcome> {
        run_search(
            self.store.as_ref(),
            self.embedder.as_ref(),
            project,
            request,
            &self.thresholds,
        )
        .await
    }

    pub async fn report(&self, project: &str) -> Result<Vec<FileReport>> {
        self.store.report(project).await
    }

    pub async fn chunk_detail(&self, project: &str, file_name: &str) -> Result<Vec<ChunkDetail>> {
        self.store.chunk_detail(project, file_name).await
    }

    pub async fn project_status(&self, project: &str) -> Result<Option<ProjectStatus>> {
        self.store.project_status(project).await
    }

    pub async fn list_projects(&self) -> Result<BTreeSet<String>> {
        self.store.list_projects().await
    }

    pub async fn delete_project(&self, project: &str) -> Result<u64> {
        let removed = self.store.delete_project(project).await?;
        tracing::info!(project, removed, "deleted project");
        Ok(removed)
    }

    pub async fn delete_file(&self, project: &str, file_name: &str) -> Result<u64> {
        let removed = self.store.delete_file(project, file_name).await?;
        tracing::info!(project, file = %file_name, removed, "deleted file");
        Ok(removed)
    }

    pub async fn reset(&self) -> Result<u64> {
        let removed = self.store.reset().await?;
        tracing::warn!(removed, "all projects removed");
        Ok(removed)
    }
}
