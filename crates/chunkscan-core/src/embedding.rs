//! The [`EmbeddingProvider`] seam and the vector helpers shared by the
//! store and the similarity index. Providers themselves live in the app
//! crate.

use anyhow::Result;
use async_trait::async_trait;

/// Turns text into fixed-width vectors.
///
/// One provider must embed both the stored chunks and the scan keywords;
/// [`run_search`](crate::search::run_search) rejects a keyword vector whose
/// width differs from the stored ones.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn model_name(&self) -> &str;
    /// Width of every vector this provider returns.
    fn dims(&self) -> usize;

    /// Embed a batch of texts, returning one vector per input in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        match vectors.pop() {
            Some(v) if vectors.is_empty() => Ok(v),
            _ => anyhow::bail!("embedding provider returned an unexpected number of vectors"),
        }
    }
}

/// Little-endian `f32` bytes, four per component. Decoding with
/// [`blob_to_vec`] gives back the exact same bits.
///
/// ```rust
/// use chunkscan_core::embedding::{blob_to_vec, vec_to_blob};
///
/// let original = vec![0.25f32, -7.0, 1e-3];
/// let stored = vec_to_blob(&original);
/// assert_eq!(stored.len(), 12);
/// assert_eq!(blob_to_vec(&stored), Some(original));
/// ```
pub fn vec_to_blob(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|x| x.to_le_bytes()).collect()
}

/// Decode a BLOB written by [`vec_to_blob`].
///
/// Returns `None` when the length is not a multiple of 4.
pub fn blob_to_vec(blob: &[u8]) -> Option<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return None;
    }
    Some(
        blob.chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
    )
}

/// Scalar cosine of two vectors; `0.0` when either is degenerate or the
/// widths differ. [`SimilarityIndex`](crate::index::SimilarityIndex)
/// computes the same value in bulk.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    match (l2_norm(a), l2_norm(b)) {
        (Some(na), Some(nb)) => {
            let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
            (dot / (na * nb)).clamp(-1.0, 1.0)
        }
        _ => 0.0,
    }
}

/// L2 norm of a vector, or `None` if it is zero or not finite.
pub fn l2_norm(v: &[f32]) -> Option<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    (norm.is_finite() && norm > f32::EPSILON).then_some(norm)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    #[async_trait]
    impl EmbeddingProvider for Fixed {
        fn model_name(&self) -> &str {
            "fixed"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    #[test]
    fn test_vec_blob_roundtrip_bit_identical() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001, f32::MIN_POSITIVE];
        let restored = blob_to_vec(&vec_to_blob(&vec)).unwrap();
        let a: Vec<u32> = vec.iter().map(|f| f.to_bits()).collect();
        let b: Vec<u32> = restored.iter().map(|f| f.to_bits()).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_blob_bad_length() {
        assert!(blob_to_vec(&[0u8, 1, 2]).is_none());
        assert_eq!(blob_to_vec(&[]), Some(vec![]));
    }

    #[test]
    fn test_cosine_reference_values() {
        let v = [1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0, 0.0], &[0.9, 0.1, 0.0]) - 0.9939).abs() < 1e-4);
    }

    #[test]
    fn test_cosine_degenerate_inputs_score_zero() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_l2_norm_degenerate() {
        assert!(l2_norm(&[0.0, 0.0]).is_none());
        assert!(l2_norm(&[f32::NAN, 1.0]).is_none());
        assert!(l2_norm(&[]).is_none());
        assert!((l2_norm(&[3.0, 4.0]).unwrap() - 5.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_embed_one() {
        let v = Fixed.embed_one("abc").await.unwrap();
        assert_eq!(v, vec![3.0, 1.0]);
    }
}
