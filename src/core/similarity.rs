use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Similarity metric used by the listing index
///
/// Vectors stored under one metric are only comparable under that same
/// metric, so the index records it at construction and never changes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityMetric {
    Cosine,
}

impl SimilarityMetric {
    /// Score two vectors of equal dimension; higher means more similar
    #[inline]
    pub fn score(self, query: &[f32], query_norm: f32, target: &[f32]) -> f32 {
        match self {
            SimilarityMetric::Cosine => cosine_similarity_with_norm(query, query_norm, target),
        }
    }
}

impl fmt::Display for SimilarityMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimilarityMetric::Cosine => f.write_str("cosine"),
        }
    }
}

impl FromStr for SimilarityMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cosine" => Ok(SimilarityMetric::Cosine),
            other => Err(format!("unsupported similarity metric: {}", other)),
        }
    }
}

/// L2 norm of a vector
#[inline]
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine similarity between two vectors
///
/// Returns 0.0 when either vector has zero norm or the lengths differ.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    cosine_similarity_with_norm(a, l2_norm(a), b)
}

/// Cosine similarity with the query norm precomputed
#[inline]
pub fn cosine_similarity_with_norm(query: &[f32], query_norm: f32, target: &[f32]) -> f32 {
    if query.len() != target.len() || query_norm < f32::EPSILON {
        return 0.0;
    }
    let target_norm = l2_norm(target);
    if target_norm < f32::EPSILON {
        return 0.0;
    }

    let dot: f32 = query.iter().zip(target.iter()).map(|(a, b)| a * b).sum();
    dot / (query_norm * target_norm)
}

/// Ranking order: descending score, then ascending identifier
#[inline]
pub fn rank_order(a_score: f32, a_id: &str, b_score: f32, b_id: &str) -> Ordering {
    b_score.total_cmp(&a_score).then_with(|| a_id.cmp(b_id))
}
