//! # chunkscan core
//!
//! Runtime-free logic for chunkscan: data models, sentence chunking, the
//! chunk store abstraction, the exhaustive similarity index, and the
//! keyword scan coordinator.
//!
//! This crate contains no tokio, sqlx, or filesystem I/O. The application
//! crate supplies a durable [`store::ChunkStore`] and concrete
//! [`embedding::EmbeddingProvider`]s.
//!
//! ## Flow
//!
//! ```text
//! pages ─▶ Chunker ─▶ embed ─▶ ChunkStore::insert
//!                                   │
//!          search request ──────────┤ export_embeddings(project, only_unscanned)
//!                                   ▼
//!                          SimilarityIndex::build
//!                                   │ search(keyword vectors)
//!                                   ▼
//!                  threshold + accumulate per chunk
//!                                   │
//!             ChunkStore::annotate ─┴─ ChunkStore::mark_scanned
//! ```

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod index;
pub mod models;
pub mod search;
pub mod store;

pub use error::ScanError;
