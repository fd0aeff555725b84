//! Reciprocal Rank Fusion: score = Σ 1/(k + rank_i)
//!
//! Combines the dense and sparse result lists into one ranking without
//! normalising scores across the two spaces.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::descriptor::TableDescriptor;
use crate::index::ScoredPoint;

/// Default smoothing constant. Higher values flatten the advantage of the
/// top positions in any single list.
pub const DEFAULT_RANK_CONSTANT: u32 = 60;

/// A point after fusion.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedPoint {
    pub id: String,
    pub payload: TableDescriptor,
    /// Fused RRF score (higher = more relevant).
    pub score: f64,
    /// 1-based rank in the dense list, if present there.
    pub dense_rank: Option<usize>,
    /// 1-based rank in the sparse list, if present there.
    pub sparse_rank: Option<usize>,
}

/// Fuse a dense and a sparse ranked list.
///
/// Ties on fused score are broken by dense rank (absent sorts last), then
/// sparse rank, then id, so the output is fully deterministic.
pub fn reciprocal_rank_fusion(
    dense: Vec<ScoredPoint>,
    sparse: Vec<ScoredPoint>,
    rank_constant: u32,
) -> Vec<FusedPoint> {
    let k = f64::from(rank_constant);
    let mut fused: HashMap<String, FusedPoint> = HashMap::new();

    for (position, point) in dense.into_iter().enumerate() {
        let rank = position + 1;
        let entry = fused.entry(point.id.clone()).or_insert_with(|| FusedPoint {
            id: point.id,
            payload: point.payload,
            score: 0.0,
            dense_rank: None,
            sparse_rank: None,
        });
        // Duplicate ids within one list keep their best rank only.
        if entry.dense_rank.is_none() {
            entry.dense_rank = Some(rank);
            entry.score += 1.0 / (k + rank as f64);
        }
    }

    for (position, point) in sparse.into_iter().enumerate() {
        let rank = position + 1;
        let entry = fused.entry(point.id.clone()).or_insert_with(|| FusedPoint {
            id: point.id,
            payload: point.payload,
            score: 0.0,
            dense_rank: None,
            sparse_rank: None,
        });
        if entry.sparse_rank.is_none() {
            entry.sparse_rank = Some(rank);
            entry.score += 1.0 / (k + rank as f64);
        }
    }

    let mut points: Vec<FusedPoint> = fused.into_values().collect();
    points.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| rank_order(a.dense_rank, b.dense_rank))
            .then_with(|| rank_order(a.sparse_rank, b.sparse_rank))
            .then_with(|| a.id.cmp(&b.id))
    });

    points
}

/// Present ranks sort before absent ones, lower ranks first.
fn rank_order(a: Option<usize>, b: Option<usize>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn point(id: &str) -> ScoredPoint {
        ScoredPoint {
            id: id.to_string(),
            score: 0.5,
            payload: TableDescriptor::new("public", id, ""),
        }
    }

    fn ids(points: &[FusedPoint]) -> Vec<&str> {
        points.iter().map(|p| p.id.as_str()).collect()
    }

    #[test]
    fn test_points_in_both_lists_rank_first() {
        let fused = reciprocal_rank_fusion(
            vec![point("a"), point("b"), point("c")],
            vec![point("c"), point("d")],
            60,
        );

        assert_eq!(fused[0].id, "c");
        let expected = 1.0 / 63.0 + 1.0 / 61.0;
        assert!((fused[0].score - expected).abs() < 1e-12);
        assert_eq!(fused[0].dense_rank, Some(3));
        assert_eq!(fused[0].sparse_rank, Some(1));
    }

    #[test]
    fn test_ties_break_by_dense_rank() {
        // a: dense 1; x: sparse 1; b: dense 2; y: sparse 2.
        let fused = reciprocal_rank_fusion(
            vec![point("a"), point("b")],
            vec![point("x"), point("y")],
            60,
        );

        assert_eq!(ids(&fused), vec!["a", "x", "b", "y"]);
    }

    #[test]
    fn test_fusion_is_deterministic() {
        let run = || {
            reciprocal_rank_fusion(
                vec![point("t1"), point("t2"), point("t3"), point("t4")],
                vec![point("t4"), point("t3"), point("t5")],
                60,
            )
        };
        let first = run();
        for _ in 0..10 {
            assert_eq!(run(), first);
        }
    }

    #[test]
    fn test_duplicate_ids_count_once_per_list() {
        let fused = reciprocal_rank_fusion(vec![point("a"), point("a")], Vec::new(), 60);
        assert_eq!(fused.len(), 1);
        assert!((fused[0].score - 1.0 / 61.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_lists() {
        assert!(reciprocal_rank_fusion(Vec::new(), Vec::new(), 60).is_empty());
    }
}
