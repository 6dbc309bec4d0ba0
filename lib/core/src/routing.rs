//! Routing and work-order records as read from the ERP views, plus the
//! operation type carried through candidate building.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y%m%d%H%M%S",
];

/// Parse the timestamp shapes the ERP emits. Unparseable input is `None`.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    for fmt in TIMESTAMP_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
    }
    for fmt in ["%Y-%m-%d", "%Y%m%d"] {
        if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// Compare routing numbers: numerically when both parse as integers,
/// lexicographically otherwise.
pub fn compare_routing_no(a: &str, b: &str) -> Ordering {
    match (a.trim().parse::<i64>(), b.trim().parse::<i64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}

/// One row of the `ROUTING` view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingRow {
    pub item_code: String,
    pub routing_no: String,
    pub proc_seq: i64,
    pub job_code: String,
    pub job_name: String,
    pub setup_time: Option<f64>,
    pub run_time: Option<f64>,
    pub wait_time: Option<f64>,
    pub move_time: Option<f64>,
    pub inserted_at: Option<NaiveDateTime>,
}

/// One row of the `WORK_ORDER_RESULTS` view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkOrderRecord {
    pub item_code: String,
    pub proc_seq: Option<i64>,
    pub operation_code: String,
    pub act_setup_time: Option<f64>,
    pub act_run_time: Option<f64>,
    pub wait_time: Option<f64>,
    pub move_time: Option<f64>,
    /// Numeric hold-time columns present on this row, keyed by upper-cased column name.
    #[serde(default)]
    pub hold_times: BTreeMap<String, f64>,
}

/// One row of the `ROUTING_HISTORY` view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingHistoryRow {
    pub item_code: String,
    pub created_at: Option<NaiveDateTime>,
    pub received_at: Option<NaiveDateTime>,
}

/// One step of a candidate routing.
///
/// Nominal times come from the routing row; once work-order statistics are
/// applied they hold observed trimmed means instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub proc_seq: i64,
    pub job_code: String,
    pub job_name: String,
    /// Job code before outsourcing substitution, when one was applied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_job_code: Option<String>,
    pub setup_time: f64,
    pub run_time: f64,
    pub wait_time: f64,
    pub move_time: f64,
    #[serde(default)]
    pub run_std: f64,
    #[serde(default)]
    pub setup_std: f64,
    #[serde(default)]
    pub work_order_count: usize,
    #[serde(default)]
    pub work_order_confidence: f64,
    #[serde(default)]
    pub has_work_data: bool,
}

#[inline]
fn non_negative(v: Option<f64>) -> f64 {
    v.filter(|x| x.is_finite()).unwrap_or(0.0).max(0.0)
}

impl Operation {
    pub fn from_row(row: &RoutingRow) -> Self {
        Self {
            proc_seq: row.proc_seq,
            job_code: row.job_code.clone(),
            job_name: row.job_name.clone(),
            original_job_code: None,
            setup_time: non_negative(row.setup_time),
            run_time: non_negative(row.run_time),
            wait_time: non_negative(row.wait_time),
            move_time: non_negative(row.move_time),
            run_std: 0.0,
            setup_std: 0.0,
            work_order_count: 0,
            work_order_confidence: 0.0,
            has_work_data: false,
        }
    }

    /// Job code under which work-order history was recorded.
    #[inline]
    pub fn history_job_code(&self) -> &str {
        self.original_job_code.as_deref().unwrap_or(&self.job_code)
    }

    #[inline]
    pub fn total_time(&self) -> f64 {
        self.setup_time + self.run_time + self.wait_time + self.move_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(job: &str) -> RoutingRow {
        RoutingRow {
            item_code: "A".into(),
            routing_no: "1".into(),
            proc_seq: 10,
            job_code: job.into(),
            job_name: "Cut".into(),
            setup_time: Some(-3.0),
            run_time: Some(5.0),
            wait_time: None,
            move_time: Some(f64::NAN),
            inserted_at: None,
        }
    }

    #[test]
    fn test_operation_from_row_clamps_times() {
        let op = Operation::from_row(&row("CUT"));
        assert_eq!(op.setup_time, 0.0);
        assert_eq!(op.run_time, 5.0);
        assert_eq!(op.wait_time, 0.0);
        assert_eq!(op.move_time, 0.0);
        assert_eq!(op.history_job_code(), "CUT");
        assert!(!op.has_work_data);
    }

    #[test]
    fn test_history_job_code_prefers_original() {
        let mut op = Operation::from_row(&row("INHOUSE_8"));
        op.original_job_code = Some("OUTSOURCING_8".into());
        assert_eq!(op.history_job_code(), "OUTSOURCING_8");
    }

    #[test]
    fn test_parse_timestamp_variants() {
        assert!(parse_timestamp("2024-03-01 08:15:00").is_some());
        assert!(parse_timestamp("2024-03-01T08:15:00.123").is_some());
        assert!(parse_timestamp("2024-03-01T08:15:00Z").is_some());
        assert!(parse_timestamp("2024-03-01").is_some());
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_compare_routing_no() {
        assert_eq!(compare_routing_no("10", "9"), Ordering::Greater);
        assert_eq!(compare_routing_no("A", "B"), Ordering::Less);
    }
}
