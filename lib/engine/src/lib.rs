//! # Routewise Engine
//!
//! Training and prediction on top of the feature, storage and ERP crates.
//!
//! ```text
//! item ──vectorize──> query ──search──> hits
//!                                        │
//!           ┌────────────────────────────┘
//!           v
//!   select routing ─> substitute outsourcing ─> work-order statistics
//!           │
//!           v
//!   ranked candidates ──(aggregated mode)──> one merged routing
//! ```

pub mod aggregate;
pub mod candidate;
pub mod deadline;
pub mod predictor;
pub mod response;
pub mod substitution;
pub mod trainer;
pub mod workorder;

pub use aggregate::aggregate;
pub use candidate::{rank, select_routing, BuildOutcome, CandidateBuilder};
pub use deadline::Deadline;
pub use predictor::{PredictOptions, Predictor};
pub use response::{
    AggregatedRouting, BatchEntry, BatchPrediction, Candidate, EmptyReason, ItemOutcome,
    Prediction, PredictionMetrics, PredictionMode,
};
pub use substitution::SubstitutionPolicy;
pub use trainer::{TrainedModel, Trainer, TrainingReport};
pub use workorder::{confidence, population_std, trimmed_mean, OperationStats, WorkOrderAggregator};
