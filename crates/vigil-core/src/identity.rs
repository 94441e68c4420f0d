//! Identity matching by cosine distance between face embeddings.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Embedding;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchError {
    #[error("embedding is empty")]
    Empty,
    #[error("embedding dimension mismatch: live {live}, reference {reference}")]
    DimensionMismatch { live: usize, reference: usize },
    #[error("embedding has zero norm")]
    ZeroNorm,
    #[error("invalid embedding value (NaN/Inf)")]
    InvalidValue,
}

/// Result of comparing a live embedding with a reference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub matched: bool,
    pub similarity: f64,
    /// `1 - similarity`.
    pub distance: f64,
}

/// Decides whether two embeddings belong to the same person.
pub trait Matcher: Send + Sync {
    fn compare(
        &self,
        live: &Embedding,
        reference: &Embedding,
        max_distance: f64,
    ) -> Result<MatchResult, MatchError>;
}

/// Matches when cosine distance is strictly below the threshold.
#[derive(Debug, Clone, Copy, Default)]
pub struct CosineMatcher;

impl Matcher for CosineMatcher {
    fn compare(
        &self,
        live: &Embedding,
        reference: &Embedding,
        max_distance: f64,
    ) -> Result<MatchResult, MatchError> {
        let similarity = cosine_similarity(&live.values, &reference.values)?;
        let distance = 1.0 - similarity;
        Ok(MatchResult {
            matched: distance < max_distance,
            similarity,
            distance,
        })
    }
}

/// `dot(a, b) / (|a| * |b|)`, accumulated in f64.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f64, MatchError> {
    if a.is_empty() || b.is_empty() {
        return Err(MatchError::Empty);
    }
    if a.len() != b.len() {
        return Err(MatchError::DimensionMismatch {
            live: a.len(),
            reference: b.len(),
        });
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if !denom.is_finite() {
        return Err(MatchError::InvalidValue);
    }
    if denom == 0.0 {
        return Err(MatchError::ZeroNorm);
    }
    Ok(dot / denom)
}

/// Reject empty embeddings and embeddings containing NaN or infinity.
pub fn validate_embedding(embedding: &Embedding) -> Result<(), MatchError> {
    if embedding.values.is_empty() {
        return Err(MatchError::Empty);
    }
    if embedding.values.iter().any(|v| !v.is_finite()) {
        return Err(MatchError::InvalidValue);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emb(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec())
    }

    #[test]
    fn test_identical_vectors_match() {
        let r = CosineMatcher
            .compare(&emb(&[1.0, 0.0]), &emb(&[1.0, 0.0]), 0.45)
            .unwrap();
        assert!(r.matched);
        assert!(r.distance.abs() < 1e-12);
    }

    #[test]
    fn test_orthogonal_vectors_do_not_match() {
        let r = CosineMatcher
            .compare(&emb(&[1.0, 0.0]), &emb(&[0.0, 1.0]), 0.45)
            .unwrap();
        assert!(!r.matched);
        assert!((r.distance - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_threshold_is_strict() {
        // cos(60°) = 0.5 → distance 0.5
        let a = emb(&[1.0, 0.0]);
        let b = emb(&[0.5, 3.0f32.sqrt() / 2.0]);
        assert!(!CosineMatcher.compare(&a, &b, 0.45).unwrap().matched);
        assert!(CosineMatcher.compare(&a, &b, 0.51).unwrap().matched);
    }

    #[test]
    fn test_distance_is_symmetric() {
        let a = emb(&[0.3, -1.2, 4.0, 0.01, 2.5]);
        let b = emb(&[1.1, 0.4, 3.3, -0.7, 0.0]);
        let ab = CosineMatcher.compare(&a, &b, 0.45).unwrap().distance;
        let ba = CosineMatcher.compare(&b, &a, 0.45).unwrap().distance;
        assert!((ab - ba).abs() < 1e-12);
    }

    #[test]
    fn test_scale_invariant() {
        let a = emb(&[1.0, 2.0, 3.0]);
        let b = emb(&[10.0, 20.0, 30.0]);
        assert!(CosineMatcher.compare(&a, &b, 0.45).unwrap().distance.abs() < 1e-9);
    }

    #[test]
    fn test_dimension_mismatch() {
        let err = cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]).unwrap_err();
        assert_eq!(
            err,
            MatchError::DimensionMismatch {
                live: 2,
                reference: 3
            }
        );
    }

    #[test]
    fn test_zero_norm() {
        assert_eq!(
            cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]).unwrap_err(),
            MatchError::ZeroNorm
        );
    }

    #[test]
    fn test_validate_rejects_nan_and_empty() {
        assert_eq!(validate_embedding(&emb(&[])), Err(MatchError::Empty));
        assert_eq!(
            validate_embedding(&emb(&[1.0, f32::NAN])),
            Err(MatchError::InvalidValue)
        );
        assert_eq!(
            validate_embedding(&emb(&[1.0, f32::INFINITY])),
            Err(MatchError::InvalidValue)
        );
        assert!(validate_embedding(&emb(&[0.1, 0.2])).is_ok());
    }
}
