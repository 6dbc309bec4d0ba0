//! Prediction results as returned to callers
//!
//! Everything here serializes to the JSON the CLI prints.

use routewise_core::{Error, ErrorKind, Operation};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One routing proposal drawn from one reference item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub target_item: String,
    /// `<target>#<rank>`
    pub candidate_id: String,
    pub reference_item: String,
    pub similarity_score: f32,
    /// 1-based
    pub rank: usize,
    /// Routing number chosen on the reference item
    pub routing_no: String,
    pub operations: Vec<Operation>,
    pub outsourcing_replaced: bool,
    /// Work-order samples across all operations
    pub work_order_count: usize,
    /// Mean operation confidence
    pub confidence: f64,
}

impl Candidate {
    pub fn total_time(&self) -> f64 {
        self.operations.iter().map(Operation::total_time).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionMode {
    #[default]
    Detailed,
    Aggregated,
}

impl fmt::Display for PredictionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PredictionMode::Detailed => write!(f, "detailed"),
            PredictionMode::Aggregated => write!(f, "aggregated"),
        }
    }
}

impl FromStr for PredictionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "detailed" => Ok(PredictionMode::Detailed),
            "aggregated" => Ok(PredictionMode::Aggregated),
            other => Err(Error::InvalidConfig(format!("unknown prediction mode '{}'", other))),
        }
    }
}

/// Several candidates merged into one synthetic routing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedRouting {
    pub target_item: String,
    pub operations: Vec<Operation>,
    pub similar_items_used: usize,
    pub avg_similarity: f64,
    pub source_items: Vec<String>,
    pub work_order_count: usize,
    pub confidence: f64,
    pub outsourcing_replaced: bool,
}

/// Why a prediction carries no candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyReason {
    /// `top_k` was zero
    ZeroTopK,
    /// The bundle indexes no items
    EmptyIndex,
    /// Nothing scored above the similarity threshold
    NoSimilarItems,
    /// Every retrieved reference lacked a usable routing
    NoCandidates,
    /// The deadline passed before any candidate was built
    DeadlineExceeded,
}

impl EmptyReason {
    pub fn from_error(error: &Error) -> Option<Self> {
        match error.kind() {
            ErrorKind::EmptyIndex => Some(EmptyReason::EmptyIndex),
            ErrorKind::NoCandidates => Some(EmptyReason::NoCandidates),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionMetrics {
    /// Hits returned by the similarity search
    pub retrieved: usize,
    pub candidates: usize,
    pub elapsed_ms: u64,
    pub deadline_exceeded: bool,
    pub bundle_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub empty_reason: Option<EmptyReason>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub item_code: String,
    pub mode: PredictionMode,
    pub candidates: Vec<Candidate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregated: Option<AggregatedRouting>,
    pub metrics: PredictionMetrics,
}

impl Prediction {
    pub fn empty(item_code: &str, mode: PredictionMode, reason: EmptyReason) -> Self {
        Self {
            item_code: item_code.to_string(),
            mode,
            candidates: Vec::new(),
            aggregated: None,
            metrics: PredictionMetrics {
                empty_reason: Some(reason),
                ..Default::default()
            },
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Per-item result of a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemOutcome {
    Ok { prediction: Prediction },
    Failed { error_kind: String, message: String },
}

impl ItemOutcome {
    pub fn failed(error: &Error) -> Self {
        ItemOutcome::Failed {
            error_kind: error.kind().as_str().to_string(),
            message: error.to_string(),
        }
    }

    pub fn prediction(&self) -> Option<&Prediction> {
        match self {
            ItemOutcome::Ok { prediction } => Some(prediction),
            ItemOutcome::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchEntry {
    pub item_code: String,
    #[serde(flatten)]
    pub outcome: ItemOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchPrediction {
    pub bundle_version: String,
    pub items: Vec<BatchEntry>,
    pub elapsed_ms: u64,
    pub deadline_exceeded: bool,
}

impl BatchPrediction {
    pub fn succeeded(&self) -> usize {
        self.items.iter().filter(|e| e.outcome.prediction().is_some()).count()
    }

    pub fn get(&self, item_code: &str) -> Option<&ItemOutcome> {
        self.items
            .iter()
            .find(|e| e.item_code == item_code)
            .map(|e| &e.outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parse() {
        assert_eq!("Aggregated".parse::<PredictionMode>().unwrap(), PredictionMode::Aggregated);
        assert_eq!(" detailed ".parse::<PredictionMode>().unwrap(), PredictionMode::Detailed);
        assert!("best".parse::<PredictionMode>().is_err());
        assert_eq!(PredictionMode::Aggregated.to_string(), "aggregated");
    }

    #[test]
    fn test_empty_prediction_json() {
        let prediction = Prediction::empty("A", PredictionMode::Detailed, EmptyReason::ZeroTopK);
        let json = serde_json::to_value(&prediction).unwrap();
        assert_eq!(json["metrics"]["empty_reason"], "zero_top_k");
        assert!(json.get("aggregated").is_none());
        assert_eq!(json["candidates"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn test_outcome_tagged() {
        let entry = BatchEntry {
            item_code: "X".into(),
            outcome: ItemOutcome::failed(&Error::ItemNotFound("X".into())),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error_kind"], "item_not_found");
        assert_eq!(json["item_code"], "X");
    }

    #[test]
    fn test_reason_from_error() {
        assert_eq!(EmptyReason::from_error(&Error::EmptyIndex), Some(EmptyReason::EmptyIndex));
        assert_eq!(EmptyReason::from_error(&Error::NoCandidates(3)), Some(EmptyReason::NoCandidates));
        assert_eq!(EmptyReason::from_error(&Error::DeadlineExceeded), None);
    }
}
