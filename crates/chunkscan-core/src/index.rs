//! Exhaustive cosine-similarity index over a snapshot of chunk embeddings.
//!
//! Rows are L2-normalized once at build time into an `n × d` matrix, so
//! cosine similarity reduces to an inner product. A batch of queries is
//! scored with a single matrix product and every row is ranked in full;
//! there is no approximation and no thresholding here.

use anyhow::Result;
use ndarray::{Array2, Axis};

use crate::embedding::l2_norm;
use crate::error::ScanError;
use crate::models::EmbeddingRow;

/// Immutable similarity index built from `(id, vector)` rows.
#[derive(Debug, Clone)]
pub struct SimilarityIndex {
    ids: Vec<String>,
    matrix: Array2<f32>,
}

impl SimilarityIndex {
    /// Build an index from exported rows.
    ///
    /// Fails with [`ScanError::EmptyIndex`] for no rows,
    /// [`ScanError::DimensionMismatch`] when vector lengths disagree, and
    /// [`ScanError::DegenerateVector`] for zero-length, zero or non-finite
    /// vectors.
    pub fn build(rows: Vec<EmbeddingRow>) -> Result<Self> {
        let dims = match rows.first() {
            Some(first) => first.vector.len(),
            None => return Err(ScanError::EmptyIndex.into()),
        };

        let mut ids = Vec::with_capacity(rows.len());
        let mut data = Vec::with_capacity(rows.len() * dims);
        for row in rows {
            if row.vector.len() != dims {
                return Err(ScanError::DimensionMismatch {
                    expected: dims,
                    actual: row.vector.len(),
                }
                .into());
            }
            let norm = l2_norm(&row.vector)
                .ok_or_else(|| ScanError::DegenerateVector { id: row.id.clone() })?;
            data.extend(row.vector.iter().map(|x| x / norm));
            ids.push(row.id);
        }

        let matrix = Array2::from_shape_vec((ids.len(), dims), data)?;
        Ok(Self { ids, matrix })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn dims(&self) -> usize {
        self.matrix.ncols()
    }

    /// Ids in insertion order.
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Score every query against every row.
    ///
    /// Returns one list per query, each containing all `(id, score)` pairs
    /// sorted by descending score (ties keep insertion order).
    pub fn search(&self, queries: &[Vec<f32>]) -> Result<Vec<Vec<(&str, f32)>>> {
        if queries.is_empty() {
            return Ok(Vec::new());
        }

        let dims = self.dims();
        let mut data = Vec::with_capacity(queries.len() * dims);
        for (i, q) in queries.iter().enumerate() {
            if q.len() != dims {
                return Err(ScanError::DimensionMismatch {
                    expected: dims,
                    actual: q.len(),
                }
                .into());
            }
            let norm = l2_norm(q).ok_or_else(|| ScanError::DegenerateVector {
                id: format!("query #{}", i),
            })?;
            data.extend(q.iter().map(|x| x / norm));
        }
        let q = Array2::from_shape_vec((queries.len(), dims), data)?;

        let scores = q.dot(&self.matrix.t());

        Ok(scores
            .axis_iter(Axis(0))
            .map(|row| {
                let mut ranked: Vec<(usize, f32)> =
                    row.iter().map(|s| s.clamp(-1.0, 1.0)).enumerate().collect();
                ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
                ranked
                    .into_iter()
                    .map(|(i, s)| (self.ids[i].as_str(), s))
                    .collect()
            })
            .collect())
    }

    /// Convenience wrapper for a single query.
    pub fn search_one(&self, query: &[f32]) -> Result<Vec<(&str, f32)>> {
        Ok(self
            .search(&[query.to_vec()])?
            .into_iter()
            .next()
            .unwrap_or_default())
    }
}
