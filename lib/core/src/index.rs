use crate::vector::squared_l2;
use crate::{Error, Result, Vector};
use ordered_float::OrderedFloat;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Below this bank size the scan stays on the calling thread
const PARALLEL_SCAN_THRESHOLD: usize = 4_096;

/// A single nearest-neighbour result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub item_code: String,
    /// `1 - clamp(d² / 2, 0, 1)` over unit vectors
    pub similarity: f32,
    /// Squared L2 distance between the normalized vectors
    pub distance: f32,
}

/// Exact k-nearest-neighbour index over L2-normalized rows.
///
/// Rows live in one contiguous buffer for cache locality. Ties on distance are
/// broken by item code ascending so results are fully deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityIndex {
    dim: usize,
    item_codes: Vec<String>,
    vectors: Vec<f32>,
}

impl SimilarityIndex {
    /// Build the bank. Every row is normalized on the way in.
    ///
    /// An empty bank is accepted (searching it fails with `EmptyIndex`); a
    /// non-empty bank must have a nonzero, uniform dimension.
    pub fn build(vectors: Vec<Vector>, item_codes: Vec<String>) -> Result<Self> {
        if vectors.len() != item_codes.len() {
            return Err(Error::InvalidConfig(format!(
                "{} vectors but {} item codes",
                vectors.len(),
                item_codes.len()
            )));
        }

        let dim = vectors.first().map(Vector::dim).unwrap_or(0);
        if !vectors.is_empty() && dim == 0 {
            return Err(Error::InvalidConfig("feature vectors have zero dimension".into()));
        }

        let mut storage = Vec::with_capacity(vectors.len() * dim);
        for vector in &vectors {
            if vector.dim() != dim {
                return Err(Error::InvalidDimension {
                    expected: dim,
                    actual: vector.dim(),
                });
            }
            storage.extend_from_slice(vector.normalized().as_slice());
        }

        Ok(Self {
            dim,
            item_codes,
            vectors: storage,
        })
    }

    /// Check the internal layout after deserialization
    pub fn validate(&self) -> Result<()> {
        if self.vectors.len() != self.dim * self.item_codes.len() {
            return Err(Error::InvalidDimension {
                expected: self.dim * self.item_codes.len(),
                actual: self.vectors.len(),
            });
        }
        if !self.item_codes.is_empty() && self.dim == 0 {
            return Err(Error::InvalidConfig("index rows have zero dimension".into()));
        }
        Ok(())
    }

    #[inline]
    fn row(&self, idx: usize) -> &[f32] {
        let start = idx * self.dim;
        &self.vectors[start..start + self.dim]
    }

    /// Normalized stored vector for an item, if present
    pub fn vector_of(&self, item_code: &str) -> Option<Vector> {
        self.item_codes
            .iter()
            .position(|c| c == item_code)
            .map(|idx| Vector::from_slice(self.row(idx)))
    }

    /// Return the `k` nearest rows, dropping those below `threshold`.
    pub fn search(&self, query: &Vector, k: usize, threshold: f32) -> Result<Vec<SearchHit>> {
        if self.item_codes.is_empty() {
            return Err(Error::EmptyIndex);
        }
        if query.dim() != self.dim {
            return Err(Error::FeatureDimensionMismatch {
                expected: self.dim,
                actual: query.dim(),
            });
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let q = query.normalized();
        let q = q.as_slice();
        let n = self.item_codes.len();

        let mut scored: Vec<(OrderedFloat<f32>, usize)> = if n >= PARALLEL_SCAN_THRESHOLD {
            (0..n)
                .into_par_iter()
                .map(|i| (OrderedFloat(squared_l2(q, self.row(i))), i))
                .collect()
        } else {
            (0..n)
                .map(|i| (OrderedFloat(squared_l2(q, self.row(i))), i))
                .collect()
        };

        let by_distance_then_code = |a: &(OrderedFloat<f32>, usize), b: &(OrderedFloat<f32>, usize)| {
            a.0.cmp(&b.0)
                .then_with(|| self.item_codes[a.1].cmp(&self.item_codes[b.1]))
                .then_with(|| a.1.cmp(&b.1))
        };

        if k < n {
            scored.select_nth_unstable_by(k - 1, by_distance_then_code);
            scored.truncate(k);
        }
        scored.sort_unstable_by(by_distance_then_code);

        Ok(scored
            .into_iter()
            .map(|(dist, idx)| SearchHit {
                item_code: self.item_codes[idx].clone(),
                similarity: distance_to_similarity(dist.0),
                distance: dist.0,
            })
            .filter(|hit| hit.similarity >= threshold)
            .collect())
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.item_codes.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.item_codes.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn dim(&self) -> usize {
        self.dim
    }

    #[inline]
    pub fn item_codes(&self) -> &[String] {
        &self.item_codes
    }
}

/// Map a squared distance between unit vectors to a similarity in `[0, 1]`.
#[inline]
pub fn distance_to_similarity(squared_distance: f32) -> f32 {
    let half = squared_distance / 2.0;
    let clamped = match half.partial_cmp(&0.0) {
        Some(Ordering::Less) | None => 0.0,
        _ => half.min(1.0),
    };
    1.0 - clamped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bank() -> SimilarityIndex {
        SimilarityIndex::build(
            vec![
                Vector::new(vec![1.0, 0.0]),
                Vector::new(vec![0.0, 1.0]),
                Vector::new(vec![1.0, 1.0]),
            ],
            vec!["A".into(), "B".into(), "C".into()],
        )
        .unwrap()
    }

    #[test]
    fn test_exact_match_scores_one() {
        let index = bank();
        let hits = index.search(&Vector::new(vec![2.0, 0.0]), 1, 0.0).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].item_code, "A");
        assert!((hits[0].similarity - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_orthogonal_scores_zero() {
        let index = bank();
        let hits = index.search(&Vector::new(vec![1.0, 0.0]), 3, 0.0).unwrap();
        let b = hits.iter().find(|h| h.item_code == "B").unwrap();
        assert!(b.similarity.abs() < 1e-6);
    }

    #[test]
    fn test_ties_break_by_item_code() {
        let index = SimilarityIndex::build(
            vec![
                Vector::new(vec![1.0, 0.0]),
                Vector::new(vec![1.0, 0.0]),
                Vector::new(vec![1.0, 0.0]),
            ],
            vec!["Z".into(), "M".into(), "A".into()],
        )
        .unwrap();
        let hits = index.search(&Vector::new(vec![1.0, 0.0]), 2, 0.0).unwrap();
        let codes: Vec<_> = hits.iter().map(|h| h.item_code.as_str()).collect();
        assert_eq!(codes, vec!["A", "M"]);
    }

    #[test]
    fn test_sorted_by_similarity_desc() {
        let index = bank();
        let hits = index.search(&Vector::new(vec![1.0, 0.2]), 3, 0.0).unwrap();
        assert!(hits.windows(2).all(|w| w[0].similarity >= w[1].similarity));
        assert_eq!(hits[0].item_code, "A");
    }

    #[test]
    fn test_threshold_drops_results() {
        let index = bank();
        let hits = index.search(&Vector::new(vec![1.0, 0.0]), 3, 0.5).unwrap();
        assert!(hits.iter().all(|h| h.similarity >= 0.5));
        assert!(hits.iter().all(|h| h.item_code != "B"));
    }

    #[test]
    fn test_zero_k_returns_empty() {
        assert!(bank().search(&Vector::new(vec![1.0, 0.0]), 0, 0.0).unwrap().is_empty());
    }

    #[test]
    fn test_empty_index() {
        let index = SimilarityIndex::build(Vec::new(), Vec::new()).unwrap();
        assert!(matches!(
            index.search(&Vector::new(vec![1.0]), 1, 0.0),
            Err(Error::EmptyIndex)
        ));
    }

    #[test]
    fn test_build_validation() {
        assert!(SimilarityIndex::build(vec![Vector::new(vec![1.0])], Vec::new()).is_err());
        assert!(SimilarityIndex::build(vec![Vector::new(Vec::new())], vec!["A".into()]).is_err());
        assert!(matches!(
            SimilarityIndex::build(
                vec![Vector::new(vec![1.0]), Vector::new(vec![1.0, 2.0])],
                vec!["A".into(), "B".into()],
            ),
            Err(Error::InvalidDimension { .. })
        ));
    }

    #[test]
    fn test_query_dimension_mismatch() {
        assert!(matches!(
            bank().search(&Vector::new(vec![1.0, 0.0, 0.0]), 1, 0.0),
            Err(Error::FeatureDimensionMismatch { expected: 2, actual: 3 })
        ));
    }

    #[test]
    fn test_distance_to_similarity_clamps() {
        assert_eq!(distance_to_similarity(0.0), 1.0);
        assert_eq!(distance_to_similarity(4.0), 0.0);
        assert_eq!(distance_to_similarity(-1e-7), 1.0);
    }
}
