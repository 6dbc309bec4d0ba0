//! Outsourcing substitution
//!
//! Rewrites job codes that name an outsourced process to their in-house
//! equivalent. The original code stays on the operation so work-order history
//! is still looked up under it.

use routewise_core::{Operation, RecommendConfig};
use std::collections::BTreeMap;
use tracing::warn;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubstitutionPolicy {
    /// (pattern, replacement), applied in pattern order
    rules: Vec<(String, String)>,
}

impl SubstitutionPolicy {
    pub fn new(replacements: &BTreeMap<String, String>) -> Self {
        Self {
            rules: replacements
                .iter()
                .filter(|(pattern, _)| !pattern.is_empty())
                .map(|(p, r)| (p.clone(), r.clone()))
                .collect(),
        }
    }

    pub fn from_config(config: &RecommendConfig) -> Self {
        Self::new(&config.outsourcing_replacements)
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Whether a job code contains any outsourcing pattern
    pub fn is_outsourced(&self, job_code: &str) -> bool {
        self.rules.iter().any(|(pattern, _)| job_code.contains(pattern.as_str()))
    }

    /// The substituted job code, or `None` when nothing matched
    pub fn substitute(&self, job_code: &str) -> Option<String> {
        if !self.is_outsourced(job_code) {
            return None;
        }
        let mut code = job_code.to_string();
        // A replacement may splice text into a new match; bounded re-application.
        for _ in 0..=self.rules.len() {
            for (pattern, replacement) in &self.rules {
                if code.contains(pattern.as_str()) {
                    code = code.replace(pattern.as_str(), replacement);
                }
            }
            if !self.is_outsourced(&code) {
                break;
            }
        }
        if self.is_outsourced(&code) {
            warn!(job_code, substituted = %code, "substitution left an outsourcing pattern in place");
        }
        Some(code)
    }

    /// Substitute in place. Returns true when any operation was rewritten.
    pub fn apply(&self, operations: &mut [Operation]) -> bool {
        let mut replaced = false;
        for op in operations.iter_mut() {
            if let Some(code) = self.substitute(&op.job_code) {
                op.original_job_code = Some(std::mem::replace(&mut op.job_code, code));
                replaced = true;
            }
        }
        replaced
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use routewise_core::RoutingRow;

    fn policy() -> SubstitutionPolicy {
        let mut map = BTreeMap::new();
        map.insert("OUTSOURCING_8".to_string(), "INHOUSE_8".to_string());
        SubstitutionPolicy::new(&map)
    }

    fn op(job: &str) -> Operation {
        Operation::from_row(&RoutingRow {
            item_code: "A".into(),
            routing_no: "1".into(),
            proc_seq: 1,
            job_code: job.into(),
            job_name: "Polish".into(),
            setup_time: Some(1.0),
            run_time: Some(2.0),
            wait_time: None,
            move_time: None,
            inserted_at: None,
        })
    }

    #[test]
    fn test_replaces_every_occurrence() {
        let policy = policy();
        assert_eq!(
            policy.substitute("OUTSOURCING_8_POLISH_OUTSOURCING_8").as_deref(),
            Some("INHOUSE_8_POLISH_INHOUSE_8")
        );
        assert_eq!(policy.substitute("CUT"), None);
    }

    #[test]
    fn test_apply_keeps_original_code() {
        let policy = policy();
        let mut ops = vec![op("CUT"), op("OUTSOURCING_8_POLISH")];
        assert!(policy.apply(&mut ops));
        assert_eq!(ops[1].job_code, "INHOUSE_8_POLISH");
        assert_eq!(ops[1].history_job_code(), "OUTSOURCING_8_POLISH");
        assert_eq!(ops[0].original_job_code, None);
        assert!(ops.iter().all(|o| !policy.is_outsourced(&o.job_code)));
    }

    #[test]
    fn test_no_match_no_flag() {
        let mut ops = vec![op("CUT")];
        assert!(!policy().apply(&mut ops));
        assert!(!SubstitutionPolicy::default().apply(&mut ops));
    }
}
