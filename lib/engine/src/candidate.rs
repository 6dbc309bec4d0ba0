//! Candidate building
//!
//! Turns similarity hits into routing candidates: pick one routing per
//! reference item, substitute outsourced operations, then fold in the
//! reference item's work-order history.

use crate::deadline::Deadline;
use crate::response::Candidate;
use crate::substitution::SubstitutionPolicy;
use crate::workorder::WorkOrderAggregator;
use routewise_core::routing::compare_routing_no;
use routewise_core::{Error, Operation, Result, RoutingRow, SearchHit};
use routewise_erp::ErpSource;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Ranking key of one routing number on a reference item
#[derive(Debug)]
struct RoutingKey<'a> {
    routing_no: &'a str,
    outsourced: usize,
    latest: Option<chrono::NaiveDateTime>,
    rows: usize,
}

impl RoutingKey<'_> {
    /// `Less` means `self` is preferred
    fn preference(&self, other: &Self) -> Ordering {
        self.outsourced.cmp(&other.outsourced).then_with(|| {
            match (self.latest, other.latest) {
                (Some(a), Some(b)) => b
                    .cmp(&a)
                    .then_with(|| other.rows.cmp(&self.rows))
                    .then_with(|| compare_routing_no(other.routing_no, self.routing_no)),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => compare_routing_no(other.routing_no, self.routing_no),
            }
        })
    }
}

/// Pick the preferred routing number among an item's routing rows.
///
/// Fewest outsourced operations first, then the most recent `inserted_at`
/// (routings without one rank last, and between two such routings the higher
/// routing number wins), then the most rows. Returns the chosen rows sorted by
/// `proc_seq`, or `None` when there are no rows.
pub fn select_routing(rows: &[RoutingRow], policy: &SubstitutionPolicy) -> Option<(String, Vec<RoutingRow>)> {
    let mut groups: BTreeMap<&str, Vec<&RoutingRow>> = BTreeMap::new();
    for row in rows {
        groups.entry(row.routing_no.trim()).or_default().push(row);
    }

    let (routing_no, chosen) = groups
        .iter()
        .map(|(routing_no, group)| {
            let key = RoutingKey {
                routing_no: *routing_no,
                outsourced: group.iter().filter(|r| policy.is_outsourced(&r.job_code)).count(),
                latest: group.iter().filter_map(|r| r.inserted_at).max(),
                rows: group.len(),
            };
            (key, group)
        })
        .min_by(|(a, _), (b, _)| a.preference(b))
        .map(|(key, group)| (key.routing_no.to_string(), group))?;

    let mut selected: Vec<RoutingRow> = chosen.iter().map(|r| (*r).clone()).collect();
    selected.sort_by_key(|r| r.proc_seq);
    Some((routing_no, selected))
}

/// Candidates built for one request
#[derive(Debug, Clone, Default)]
pub struct BuildOutcome {
    /// Sorted by similarity descending, then reference item
    pub candidates: Vec<Candidate>,
    pub deadline_exceeded: bool,
    /// References skipped for lack of routing rows or a read failure
    pub skipped: usize,
}

pub struct CandidateBuilder<'a> {
    source: &'a dyn ErpSource,
    substitution: &'a SubstitutionPolicy,
    work_orders: &'a WorkOrderAggregator,
    max_variants: usize,
}

impl<'a> CandidateBuilder<'a> {
    pub fn new(
        source: &'a dyn ErpSource,
        substitution: &'a SubstitutionPolicy,
        work_orders: &'a WorkOrderAggregator,
        max_variants: usize,
    ) -> Self {
        Self {
            source,
            substitution,
            work_orders,
            max_variants: max_variants.max(1),
        }
    }

    /// Build up to `max_variants` candidates from the hits, in hit order.
    ///
    /// A reference whose reads fail is skipped. When every attempted reference
    /// failed on a read, the last read error is returned instead. With no
    /// candidate and no deadline hit the result is `NoCandidates`.
    pub fn build(&self, target_item: &str, hits: &[SearchHit], deadline: &Deadline) -> Result<BuildOutcome> {
        let mut outcome = BuildOutcome::default();
        let mut attempted = 0usize;
        let mut failed = 0usize;
        let mut last_error: Option<Error> = None;

        for hit in hits {
            if outcome.candidates.len() >= self.max_variants {
                break;
            }
            if deadline.expired() {
                info!(
                    item_code = %target_item,
                    built = outcome.candidates.len(),
                    "deadline reached while building candidates"
                );
                outcome.deadline_exceeded = true;
                break;
            }

            attempted += 1;
            match self.build_one(target_item, hit) {
                Ok(Some(candidate)) => outcome.candidates.push(candidate),
                Ok(None) => {
                    debug!(reference = %hit.item_code, "reference item has no routing");
                    outcome.skipped += 1;
                }
                Err(e) => {
                    warn!(reference = %hit.item_code, error = %e, "skipping reference item");
                    outcome.skipped += 1;
                    failed += 1;
                    last_error = Some(e);
                }
            }
        }

        if outcome.candidates.is_empty() {
            if attempted > 0 && failed == attempted {
                if let Some(e) = last_error {
                    return Err(e);
                }
            }
            if !outcome.deadline_exceeded {
                return Err(Error::NoCandidates(hits.len()));
            }
        }

        rank(target_item, &mut outcome.candidates);
        Ok(outcome)
    }

    fn build_one(&self, target_item: &str, hit: &SearchHit) -> Result<Option<Candidate>> {
        let rows = self.source.fetch_routings(&hit.item_code)?;
        let Some((routing_no, rows)) = select_routing(&rows, self.substitution) else {
            return Ok(None);
        };

        let mut operations: Vec<Operation> = rows.iter().map(Operation::from_row).collect();
        let outsourcing_replaced = self.substitution.apply(&mut operations);

        match self.source.fetch_work_orders(&hit.item_code) {
            Ok(records) => {
                for op in operations.iter_mut() {
                    self.work_orders.apply(op, &records);
                }
            }
            Err(e) => {
                warn!(reference = %hit.item_code, error = %e, "work-order history unavailable; keeping nominal times");
            }
        }

        let work_order_count = operations.iter().map(|op| op.work_order_count).sum();
        let confidence = if operations.is_empty() {
            0.0
        } else {
            operations.iter().map(|op| op.work_order_confidence).sum::<f64>() / operations.len() as f64
        };

        Ok(Some(Candidate {
            target_item: target_item.to_string(),
            candidate_id: String::new(),
            reference_item: hit.item_code.clone(),
            similarity_score: hit.similarity,
            rank: 0,
            routing_no,
            operations,
            outsourcing_replaced,
            work_order_count,
            confidence,
        }))
    }
}

/// Sort by similarity descending then reference ascending, and number the result.
pub fn rank(target_item: &str, candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        b.similarity_score
            .total_cmp(&a.similarity_score)
            .then_with(|| a.reference_item.cmp(&b.reference_item))
    });
    for (i, candidate) in candidates.iter_mut().enumerate() {
        candidate.rank = i + 1;
        candidate.candidate_id = format!("{}#{}", target_item, candidate.rank);
    }
}
