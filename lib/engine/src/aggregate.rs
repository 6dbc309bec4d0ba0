//! Multi-candidate aggregation
//!
//! Merges ranked candidates into one synthetic routing. Operations are aligned
//! by position and the shortest routing decides the length. Times are
//! similarity-weighted means; the job code is the one with the largest
//! cumulative similarity weight.

use crate::response::{AggregatedRouting, Candidate};
use routewise_core::Operation;
use std::collections::BTreeMap;

/// Similarity-weighted mean over the finite values.
///
/// Falls back to the plain mean when every weight is zero.
fn weighted_mean(pairs: impl Iterator<Item = (f64, f64)>) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = pairs.filter(|(_, v)| v.is_finite()).collect();
    if pairs.is_empty() {
        return None;
    }
    let total_weight: f64 = pairs.iter().map(|(w, _)| w).sum();
    if total_weight > 0.0 {
        Some(pairs.iter().map(|(w, v)| w * v).sum::<f64>() / total_weight)
    } else {
        Some(pairs.iter().map(|(_, v)| v).sum::<f64>() / pairs.len() as f64)
    }
}

/// Value with the largest cumulative weight; ties go to the smallest value.
fn heaviest<'a>(votes: impl Iterator<Item = (&'a str, f64)>) -> Option<&'a str> {
    let mut totals: BTreeMap<&str, f64> = BTreeMap::new();
    for (value, weight) in votes {
        *totals.entry(value).or_insert(0.0) += weight;
    }
    let mut best: Option<(&str, f64)> = None;
    for (value, weight) in totals {
        if best.map_or(true, |(_, w)| weight > w) {
            best = Some((value, weight));
        }
    }
    best.map(|(value, _)| value)
}

fn merge_position(candidates: &[Candidate], pos: usize) -> Option<Operation> {
    let aligned: Vec<(f64, &Operation)> = candidates
        .iter()
        .map(|c| (f64::from(c.similarity_score).max(0.0), &c.operations[pos]))
        .collect();
    let (_, first) = aligned.first()?;

    let field = |f: fn(&Operation) -> f64| -> f64 {
        weighted_mean(aligned.iter().map(|(w, op)| (*w, f(op))))
            .unwrap_or(0.0)
            .max(0.0)
    };

    let job_code = heaviest(aligned.iter().map(|(w, op)| (op.job_code.as_str(), *w)))?.to_string();
    let same_code: Vec<&(f64, &Operation)> = aligned.iter().filter(|(_, op)| op.job_code == job_code).collect();
    let job_name = heaviest(same_code.iter().map(|(w, op)| (op.job_name.as_str(), *w)))
        .unwrap_or_default()
        .to_string();
    let original_job_code = same_code.iter().find_map(|(_, op)| op.original_job_code.clone());

    Some(Operation {
        proc_seq: first.proc_seq,
        job_code,
        job_name,
        original_job_code,
        setup_time: field(|op| op.setup_time),
        run_time: field(|op| op.run_time),
        wait_time: field(|op| op.wait_time),
        move_time: field(|op| op.move_time),
        run_std: field(|op| op.run_std),
        setup_std: field(|op| op.setup_std),
        work_order_count: aligned.iter().map(|(_, op)| op.work_order_count).sum(),
        work_order_confidence: field(|op| op.work_order_confidence).min(1.0),
        has_work_data: aligned.iter().any(|(_, op)| op.has_work_data),
    })
}

/// Combine ranked candidates into one routing. `None` for an empty slice.
pub fn aggregate(target_item: &str, candidates: &[Candidate]) -> Option<AggregatedRouting> {
    if candidates.is_empty() {
        return None;
    }
    let length = candidates.iter().map(|c| c.operations.len()).min().unwrap_or(0);
    let operations: Vec<Operation> = (0..length)
        .filter_map(|pos| merge_position(candidates, pos))
        .collect();

    let k = candidates.len();
    let weights = || candidates.iter().map(|c| f64::from(c.similarity_score).max(0.0));

    Some(AggregatedRouting {
        target_item: target_item.to_string(),
        operations,
        similar_items_used: k,
        avg_similarity: weights().sum::<f64>() / k as f64,
        source_items: candidates.iter().map(|c| c.reference_item.clone()).collect(),
        work_order_count: candidates.iter().map(|c| c.work_order_count).sum(),
        confidence: weighted_mean(weights().zip(candidates.iter().map(|c| c.confidence))).unwrap_or(0.0),
        outsourcing_replaced: candidates.iter().any(|c| c.outsourcing_replaced),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use routewise_core::RoutingRow;

    fn op(seq: i64, job: &str, run: f64) -> Operation {
        Operation::from_row(&RoutingRow {
            item_code: "R".into(),
            routing_no: "1".into(),
            proc_seq: seq,
            job_code: job.into(),
            job_name: format!("{} name", job),
            setup_time: Some(1.0),
            run_time: Some(run),
            wait_time: Some(0.0),
            move_time: Some(0.0),
            inserted_at: None,
        })
    }

    fn candidate(reference: &str, similarity: f32, operations: Vec<Operation>) -> Candidate {
        Candidate {
            target_item: "Q".into(),
            candidate_id: String::new(),
            reference_item: reference.into(),
            similarity_score: similarity,
            rank: 0,
            routing_no: "1".into(),
            operations,
            outsourcing_replaced: false,
            work_order_count: 0,
            confidence: 0.0,
        }
    }

    #[test]
    fn test_weighted_run_time() {
        let candidates = vec![
            candidate("A", 0.9, vec![op(1, "CUT", 10.0)]),
            candidate("B", 0.6, vec![op(1, "CUT", 20.0)]),
        ];
        let merged = aggregate("Q", &candidates).unwrap();
        assert!((merged.operations[0].run_time - 14.0).abs() < 1e-6);
        assert_eq!(merged.similar_items_used, 2);
        assert!((merged.avg_similarity - 0.75).abs() < 1e-6);
        assert_eq!(merged.source_items, vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn test_shortest_routing_truncates() {
        let candidates = vec![
            candidate("A", 0.9, vec![op(1, "CUT", 1.0), op(2, "DRILL", 1.0)]),
            candidate("B", 0.5, vec![op(1, "CUT", 1.0)]),
        ];
        assert_eq!(aggregate("Q", &candidates).unwrap().operations.len(), 1);
    }

    #[test]
    fn test_job_code_by_cumulative_weight() {
        let candidates = vec![
            candidate("A", 0.9, vec![op(1, "LATHE", 1.0)]),
            candidate("B", 0.5, vec![op(1, "CUT", 1.0)]),
            candidate("C", 0.5, vec![op(1, "CUT", 1.0)]),
        ];
        let merged = aggregate("Q", &candidates).unwrap();
        assert_eq!(merged.operations[0].job_code, "CUT");
        assert_eq!(merged.operations[0].job_name, "CUT name");
    }

    #[test]
    fn test_job_code_tie_is_lexicographic() {
        let candidates = vec![
            candidate("A", 0.5, vec![op(1, "MILL", 1.0)]),
            candidate("B", 0.5, vec![op(1, "DRILL", 1.0)]),
        ];
        assert_eq!(aggregate("Q", &candidates).unwrap().operations[0].job_code, "DRILL");
    }

    #[test]
    fn test_zero_weights_use_plain_mean() {
        let candidates = vec![
            candidate("A", 0.0, vec![op(1, "CUT", 2.0)]),
            candidate("B", 0.0, vec![op(1, "CUT", 4.0)]),
        ];
        assert_eq!(aggregate("Q", &candidates).unwrap().operations[0].run_time, 3.0);
        assert!(aggregate("Q", &[]).is_none());
    }
}
