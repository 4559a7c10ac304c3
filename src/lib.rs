//! # chunkscan
//!
//! A project-scoped chunk index with incremental keyword similarity
//! scanning.
//!
//! Documents are split into sentence-aligned chunks, embedded and stored
//! per project. A scan embeds a list of keywords, compares each against
//! every chunk by cosine similarity, and records the keywords whose score
//! clears the chosen scope's threshold on the matching chunks. Incremental
//! scans only visit chunks that no earlier scan has covered.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────┐   ┌──────────┐
//! │  extract  │──▶│ chunk+embed  │──▶│  SQLite  │
//! │ txt/pdf/… │   │   (ingest)   │   │  chunks  │
//! └───────────┘   └──────────────┘   └────┬─────┘
//!                                         │ export
//!                                         ▼
//!                 keywords ──▶ SimilarityIndex ──▶ annotate + mark scanned
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! chunkscan init
//! chunkscan ingest contracts ./docs/*.pdf
//! chunkscan search contracts "termination" "liability" --scope focused
//! chunkscan report contracts
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite [`ChunkStore`](chunkscan_core::store::ChunkStore) |
//! | [`embedding`] | Embedding providers |
//! | [`extract`] | Paged text extraction |
//! | [`ingest`] | Ingestion pipeline |
//! | [`service`] | The [`Scanner`](service::Scanner) service object |

pub mod config;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod ingest;
pub mod migrate;
pub mod service;
pub mod sqlite_store;

pub use service::Scanner;
