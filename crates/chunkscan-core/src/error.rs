//! Typed error kinds surfaced by the scan pipeline.
//!
//! Most functions return [`anyhow::Result`]; a [`ScanError`] travels inside
//! the `anyhow::Error` so callers can tell the kinds apart with
//! `err.downcast_ref::<ScanError>()`.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScanError {
    /// The extraction collaborator could not produce text for a document.
    #[error("could not extract text from '{file}': {reason}")]
    Extraction { file: String, reason: String },

    /// The document format has no extractor.
    #[error("unsupported file type '{extension}' for '{file}'")]
    UnsupportedFormat { file: String, extension: String },

    /// Query or stored vector dimensionality disagreement.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A similarity index was requested over zero vectors.
    #[error("cannot build a similarity index from zero vectors")]
    EmptyIndex,

    /// A zero-length, zero-magnitude, or non-finite vector.
    #[error("degenerate embedding for '{id}': vector cannot be normalized")]
    DegenerateVector { id: String },

    /// `annotate` was called with parallel arrays of different lengths.
    #[error("annotation arrays differ in length: {keywords} keywords, {scores} scores")]
    LengthMismatch { keywords: usize, scores: usize },
}

impl ScanError {
    /// Returns the scan error carried by an `anyhow::Error`, if any.
    pub fn find(err: &anyhow::Error) -> Option<&ScanError> {
        err.chain().find_map(|e| e.downcast_ref::<ScanError>())
    }
}
