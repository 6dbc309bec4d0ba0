//! Work-order statistics
//!
//! Replaces an operation's nominal times with what the shop floor actually
//! recorded for it: trimmed means per time field, hold time taken out of run
//! time, and a confidence score from the sample count and run-time spread.

use routewise_core::{Operation, RecommendConfig, WorkOrderRecord};
use serde::Serialize;

/// Mean after dropping `⌊n·ratio⌋` values from each end by rank.
///
/// Non-finite values are ignored. No trimming happens when the cut would take
/// every value. `None` when nothing finite remains.
pub fn trimmed_mean(values: &[f64], ratio: f64) -> Option<f64> {
    let mut finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return None;
    }
    finite.sort_by(f64::total_cmp);

    let n = finite.len();
    let cut = (n as f64 * ratio.max(0.0) + 1e-9).floor() as usize;
    let kept = if 2 * cut >= n { &finite[..] } else { &finite[cut..n - cut] };
    Some(kept.iter().sum::<f64>() / kept.len() as f64)
}

/// Population standard deviation of the finite values
pub fn population_std(values: &[f64]) -> Option<f64> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return None;
    }
    let n = finite.len() as f64;
    let mean = finite.iter().sum::<f64>() / n;
    let variance = finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some(variance.sqrt())
}

/// `max(0, base − min(0.3, cv))` rounded to 3 decimals, where
/// `base = n/(n+2)` once `n` reaches `minimum_samples` and `cv = std/run`.
pub fn confidence(samples: usize, run: f64, run_std: f64, minimum_samples: usize) -> f64 {
    let base = if samples < minimum_samples || samples == 0 {
        0.0
    } else {
        samples as f64 / (samples as f64 + 2.0)
    };
    let cv = if run > 0.0 { run_std / run } else { 0.0 };
    let conf = (base - cv.min(0.3)).max(0.0);
    (conf * 1000.0).round() / 1000.0
}

/// Observed statistics for one operation
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OperationStats {
    pub setup: Option<f64>,
    pub run: Option<f64>,
    pub wait: Option<f64>,
    pub move_time: Option<f64>,
    pub run_std: f64,
    pub setup_std: f64,
    pub samples: usize,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkOrderAggregator {
    trim_ratio: f64,
    minimum_samples: usize,
    /// Upper-cased hold column names
    hold_columns: Vec<String>,
}

impl WorkOrderAggregator {
    pub fn new(trim_ratio: f64, minimum_samples: usize, hold_columns: &[String]) -> Self {
        Self {
            trim_ratio,
            minimum_samples,
            hold_columns: hold_columns.iter().map(|c| c.trim().to_uppercase()).collect(),
        }
    }

    pub fn from_config(config: &RecommendConfig) -> Self {
        Self::new(config.trim_ratio, config.minimum_samples, &config.hold_time_columns)
    }

    fn matches(op: &Operation, record: &WorkOrderRecord) -> bool {
        record.operation_code.trim() == op.history_job_code().trim()
            && record.proc_seq.map_or(true, |seq| seq == op.proc_seq)
    }

    pub fn stats(&self, op: &Operation, records: &[WorkOrderRecord]) -> OperationStats {
        let matched: Vec<&WorkOrderRecord> = records.iter().filter(|r| Self::matches(op, r)).collect();
        let samples = matched.len();
        if samples == 0 {
            return OperationStats::default();
        }

        let column = |f: fn(&WorkOrderRecord) -> Option<f64>| -> Vec<f64> {
            matched.iter().filter_map(|r| f(r)).collect()
        };
        let setup_values = column(|r| r.act_setup_time);
        let run_values = column(|r| r.act_run_time);

        let hold: f64 = self
            .hold_columns
            .iter()
            .filter_map(|name| {
                let values: Vec<f64> = matched
                    .iter()
                    .filter_map(|r| r.hold_times.get(name).copied())
                    .collect();
                trimmed_mean(&values, self.trim_ratio)
            })
            .sum();

        let run = trimmed_mean(&run_values, self.trim_ratio).map(|run| (run - hold).max(0.0));
        let run_std = population_std(&run_values).unwrap_or(0.0);

        OperationStats {
            setup: trimmed_mean(&setup_values, self.trim_ratio).map(|v| v.max(0.0)),
            run,
            wait: trimmed_mean(&column(|r| r.wait_time), self.trim_ratio).map(|v| v.max(0.0)),
            move_time: trimmed_mean(&column(|r| r.move_time), self.trim_ratio).map(|v| v.max(0.0)),
            run_std,
            setup_std: population_std(&setup_values).unwrap_or(0.0),
            samples,
            confidence: confidence(samples, run.unwrap_or(0.0), run_std, self.minimum_samples),
        }
    }

    /// Overwrite nominal times with observed ones. Fields without observations
    /// keep their nominal value.
    pub fn apply(&self, op: &mut Operation, records: &[WorkOrderRecord]) {
        let stats = self.stats(op, records);
        if let Some(v) = stats.setup {
            op.setup_time = v;
        }
        if let Some(v) = stats.run {
            op.run_time = v;
        }
        if let Some(v) = stats.wait {
            op.wait_time = v;
        }
        if let Some(v) = stats.move_time {
            op.move_time = v;
        }
        op.run_std = stats.run_std;
        op.setup_std = stats.setup_std;
        op.work_order_count = stats.samples;
        op.work_order_confidence = stats.confidence;
        op.has_work_data = stats.samples > 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use routewise_core::RoutingRow;
    use std::collections::BTreeMap;

    fn op(job: &str, seq: i64) -> Operation {
        Operation::from_row(&RoutingRow {
            item_code: "A".into(),
            routing_no: "1".into(),
            proc_seq: seq,
            job_code: job.into(),
            job_name: job.into(),
            setup_time: Some(9.0),
            run_time: Some(9.0),
            wait_time: Some(9.0),
            move_time: Some(9.0),
            inserted_at: None,
        })
    }

    fn record(job: &str, seq: Option<i64>, run: f64) -> WorkOrderRecord {
        WorkOrderRecord {
            item_code: "A".into(),
            proc_seq: seq,
            operation_code: job.into(),
            act_setup_time: Some(1.0),
            act_run_time: Some(run),
            wait_time: None,
            move_time: Some(0.5),
            hold_times: BTreeMap::new(),
        }
    }

    #[test]
    fn test_trimmed_mean_drops_tails() {
        let values: Vec<f64> = (1..=9).map(f64::from).chain([100.0]).collect();
        assert!((trimmed_mean(&values, 0.1).unwrap() - 5.5).abs() < 1e-12);
    }

    #[test]
    fn test_trimmed_mean_small_samples_untrimmed() {
        assert_eq!(trimmed_mean(&[1.0, 3.0], 0.1), Some(2.0));
        // 2 * floor(2 * 0.49) = 0 < 2, still untrimmed
        assert_eq!(trimmed_mean(&[1.0, 3.0], 0.49), Some(2.0));
        assert_eq!(trimmed_mean(&[], 0.1), None);
        assert_eq!(trimmed_mean(&[f64::NAN], 0.1), None);
    }

    #[test]
    fn test_confidence_formula() {
        let values: Vec<f64> = (1..=9).map(f64::from).chain([100.0]).collect();
        let std = population_std(&values).unwrap();
        // cv is far above the 0.3 cap here
        assert!(std / 5.5 > 0.3);
        assert_eq!(confidence(10, 5.5, std, 3), 0.533);
        assert_eq!(confidence(2, 5.0, 0.0, 3), 0.0);
        assert_eq!(confidence(3, 5.0, 0.0, 3), 0.6);
        assert_eq!(confidence(5, 0.0, 1.0, 3), 0.714);
    }

    #[test]
    fn test_trimmed_run_and_confidence() {
        let aggregator = WorkOrderAggregator::from_config(&RecommendConfig::default());
        let records: Vec<_> = (1..=9)
            .map(f64::from)
            .chain([100.0])
            .map(|run| record("CUT", Some(10), run))
            .collect();
        let mut operation = op("CUT", 10);
        aggregator.apply(&mut operation, &records);

        assert!((operation.run_time - 5.5).abs() < 1e-12);
        assert_eq!(operation.setup_time, 1.0);
        assert_eq!(operation.move_time, 0.5);
        // no wait observations: nominal kept
        assert_eq!(operation.wait_time, 9.0);
        assert_eq!(operation.work_order_count, 10);
        assert!(operation.has_work_data);
        assert_eq!(operation.work_order_confidence, 0.533);
    }

    #[test]
    fn test_filters_by_code_and_sequence() {
        let aggregator = WorkOrderAggregator::from_config(&RecommendConfig::default());
        let records = vec![
            record("CUT", Some(10), 4.0),
            record("CUT", None, 6.0),
            record("CUT", Some(20), 100.0),
            record("DRILL", Some(10), 100.0),
        ];
        let stats = aggregator.stats(&op("CUT", 10), &records);
        assert_eq!(stats.samples, 2);
        assert_eq!(stats.run, Some(5.0));
        assert_eq!(stats.confidence, 0.0);
    }

    #[test]
    fn test_hold_time_subtracted_and_clamped() {
        let aggregator = WorkOrderAggregator::from_config(&RecommendConfig::default());
        let mut records = vec![record("CUT", Some(1), 5.0), record("CUT", Some(1), 5.0)];
        records[0].hold_times.insert("HOLD_TIME".into(), 2.0);
        records[1].hold_times.insert("HOLD_TIME".into(), 2.0);
        records[1].hold_times.insert("HOLDING_TIME".into(), 1.0);
        assert_eq!(aggregator.stats(&op("CUT", 1), &records).run, Some(2.0));

        records[0].hold_times.insert("HOLD_DURATION".into(), 50.0);
        assert_eq!(aggregator.stats(&op("CUT", 1), &records).run, Some(0.0));
    }

    #[test]
    fn test_no_history_keeps_nominal() {
        let aggregator = WorkOrderAggregator::from_config(&RecommendConfig::default());
        let mut operation = op("CUT", 1);
        aggregator.apply(&mut operation, &[]);
        assert_eq!(operation.run_time, 9.0);
        assert!(!operation.has_work_data);
        assert_eq!(operation.work_order_confidence, 0.0);
    }

    #[test]
    fn test_history_under_original_code() {
        let aggregator = WorkOrderAggregator::from_config(&RecommendConfig::default());
        let mut operation = op("INHOUSE_8_POLISH", 1);
        operation.original_job_code = Some("OUTSOURCING_8_POLISH".into());
        let records = vec![record("OUTSOURCING_8_POLISH", Some(1), 3.0)];
        aggregator.apply(&mut operation, &records);
        assert_eq!(operation.run_time, 3.0);
        assert_eq!(operation.work_order_count, 1);
    }
}
