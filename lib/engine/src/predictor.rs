//! Online prediction
//!
//! One [`Predictor`] serves every request thread. Each request takes its own
//! `Arc` to the current bundle, so a bundle swap mid-request is invisible to it.
//! Requests pick up a newly published or stale-marked bundle on entry.

use crate::aggregate::aggregate;
use crate::candidate::CandidateBuilder;
use crate::deadline::Deadline;
use crate::response::{
    BatchEntry, BatchPrediction, EmptyReason, ItemOutcome, Prediction, PredictionMetrics,
    PredictionMode,
};
use crate::substitution::SubstitutionPolicy;
use crate::workorder::WorkOrderAggregator;
use rayon::prelude::*;
use routewise_core::{
    normalize_item_code, Error, ErrorKind, ItemRecord, RecommendConfig, Recovery, Result,
};
use routewise_erp::ErpSource;
use routewise_storage::{ArtifactBundle, BundleLoader};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Per-request knobs; defaults come from [`RecommendConfig`]
#[derive(Debug, Clone, PartialEq)]
pub struct PredictOptions {
    pub top_k: usize,
    pub mode: PredictionMode,
    pub similarity_threshold: f32,
    pub timeout: Option<Duration>,
}

impl PredictOptions {
    pub fn from_config(config: &RecommendConfig) -> Self {
        Self {
            top_k: config.top_k,
            mode: PredictionMode::Detailed,
            similarity_threshold: config.similarity_threshold,
            timeout: config.request_timeout(),
        }
    }

    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    #[must_use]
    pub fn with_mode(mut self, mode: PredictionMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for PredictOptions {
    fn default() -> Self {
        Self::from_config(&RecommendConfig::default())
    }
}

pub struct Predictor {
    loader: Arc<BundleLoader>,
    source: Arc<dyn ErpSource>,
    config: RecommendConfig,
    substitution: SubstitutionPolicy,
    work_orders: WorkOrderAggregator,
}

impl Predictor {
    pub fn new(loader: Arc<BundleLoader>, source: Arc<dyn ErpSource>, config: RecommendConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            loader,
            source,
            substitution: SubstitutionPolicy::from_config(&config),
            work_orders: WorkOrderAggregator::from_config(&config),
            config,
        })
    }

    pub fn loader(&self) -> &Arc<BundleLoader> {
        &self.loader
    }

    pub fn config(&self) -> &RecommendConfig {
        &self.config
    }

    /// Options with the configured defaults
    pub fn options(&self) -> PredictOptions {
        PredictOptions::from_config(&self.config)
    }

    /// The served bundle, loading it on first use.
    ///
    /// A newer `LATEST` or a bundle marked stale is reloaded here. When the
    /// reload fails the previous bundle keeps serving.
    fn bundle(&self) -> Result<Arc<ArtifactBundle>> {
        let current = match self.loader.current() {
            Ok(bundle) => bundle,
            Err(_) => return self.loader.load(),
        };
        match self.loader.refresh() {
            Ok(true) => self.loader.current(),
            Ok(false) => Ok(current),
            Err(e) => {
                warn!(
                    version = %current.version(),
                    error = %e,
                    "bundle reload failed; serving previous bundle"
                );
                Ok(current)
            }
        }
    }

    /// Recommend routings for an item in `ITEM_MASTER`.
    pub fn predict(&self, item_code: &str, options: &PredictOptions) -> Result<Prediction> {
        let started = Instant::now();
        let item_code = normalize_item_code(item_code);
        if options.top_k == 0 {
            return Ok(self.zero_top_k(&item_code, options.mode));
        }

        let deadline = Deadline::after(options.timeout);
        let bundle = self.bundle()?;
        let record = self.lookup(&item_code)?;
        self.run(&bundle, &record, options, &deadline, started)
    }

    /// Recommend routings for an item described only by its attributes, such as
    /// a part not yet saved to the item master.
    pub fn predict_record(&self, record: &ItemRecord, options: &PredictOptions) -> Result<Prediction> {
        let started = Instant::now();
        if options.top_k == 0 {
            return Ok(self.zero_top_k(&normalize_item_code(&record.item_code), options.mode));
        }

        let deadline = Deadline::after(options.timeout);
        let bundle = self.bundle()?;
        self.run(&bundle, record, options, &deadline, started)
    }

    /// Predict several items against one bundle under one deadline.
    ///
    /// Items that fail on their own (unknown code, unresolvable required
    /// column) are reported per item. Any other failure fails the batch.
    pub fn predict_batch(&self, item_codes: &[String], options: &PredictOptions) -> Result<BatchPrediction> {
        let started = Instant::now();
        let deadline = Deadline::after(options.timeout);

        let bundle = if options.top_k == 0 { None } else { Some(self.bundle()?) };
        let bundle_version = bundle
            .as_ref()
            .map(|b| b.version().to_string())
            .or_else(|| self.loader.current_version())
            .unwrap_or_default();

        let results: Vec<Result<ItemOutcome>> = item_codes
            .par_iter()
            .map(|raw| {
                let item_code = normalize_item_code(raw);
                let Some(bundle) = bundle.as_ref() else {
                    return Ok(ItemOutcome::Ok {
                        prediction: self.zero_top_k(&item_code, options.mode),
                    });
                };
                if deadline.expired() {
                    let mut prediction = Prediction::empty(&item_code, options.mode, EmptyReason::DeadlineExceeded);
                    prediction.metrics.deadline_exceeded = true;
                    prediction.metrics.bundle_version = bundle.version().to_string();
                    return Ok(ItemOutcome::Ok { prediction });
                }
                let item_started = Instant::now();
                let outcome = self
                    .lookup(&item_code)
                    .and_then(|record| self.run(bundle, &record, options, &deadline, item_started));
                match outcome {
                    Ok(prediction) => Ok(ItemOutcome::Ok { prediction }),
                    Err(e) if e.recovery() == Recovery::SkipItem => {
                        debug!(item_code = %item_code, error = %e, "batch item failed");
                        Ok(ItemOutcome::failed(&e))
                    }
                    Err(e) => Err(e),
                }
            })
            .collect();

        let mut items = Vec::with_capacity(item_codes.len());
        for (raw, result) in item_codes.iter().zip(results) {
            items.push(BatchEntry {
                item_code: normalize_item_code(raw),
                outcome: result?,
            });
        }

        let deadline_exceeded = items.iter().any(|e| {
            e.outcome
                .prediction()
                .is_some_and(|p| p.metrics.deadline_exceeded)
        });
        let batch = BatchPrediction {
            bundle_version,
            items,
            elapsed_ms: started.elapsed().as_millis() as u64,
            deadline_exceeded,
        };
        info!(
            items = batch.items.len(),
            succeeded = batch.succeeded(),
            elapsed_ms = batch.elapsed_ms,
            "batch prediction finished"
        );
        Ok(batch)
    }

    fn zero_top_k(&self, item_code: &str, mode: PredictionMode) -> Prediction {
        let mut prediction = Prediction::empty(item_code, mode, EmptyReason::ZeroTopK);
        prediction.metrics.bundle_version = self.loader.current_version().unwrap_or_default();
        prediction
    }

    fn lookup(&self, item_code: &str) -> Result<ItemRecord> {
        self.source
            .fetch_item(item_code)?
            .ok_or_else(|| Error::ItemNotFound(item_code.to_string()))
    }

    /// A broken vector layout means the served bundle cannot be trusted.
    fn check_integrity(&self, bundle: &ArtifactBundle, e: Error) -> Error {
        if e.kind() == ErrorKind::FeatureDimensionMismatch {
            error!(version = %bundle.version(), error = %e, "feature dimension mismatch");
            self.loader.mark_stale();
        }
        e
    }

    fn run(
        &self,
        bundle: &ArtifactBundle,
        record: &ItemRecord,
        options: &PredictOptions,
        deadline: &Deadline,
        started: Instant,
    ) -> Result<Prediction> {
        let item_code = normalize_item_code(&record.item_code);
        let finish = |mut prediction: Prediction| {
            prediction.metrics.bundle_version = bundle.version().to_string();
            prediction.metrics.elapsed_ms = started.elapsed().as_millis() as u64;
            prediction
        };
        let empty = |reason: EmptyReason, retrieved: usize| {
            let mut prediction = Prediction::empty(&item_code, options.mode, reason);
            prediction.metrics.retrieved = retrieved;
            finish(prediction)
        };

        let vector = bundle
            .vectorize(record)
            .map_err(|e| self.check_integrity(bundle, e))?;
        let hits = match bundle.search(&vector, options.top_k, options.similarity_threshold) {
            Ok(hits) => hits,
            Err(e) if e.recovery() == Recovery::EmptyResult => {
                return Ok(empty(EmptyReason::from_error(&e).unwrap_or(EmptyReason::EmptyIndex), 0));
            }
            Err(e) => return Err(self.check_integrity(bundle, e)),
        };
        if hits.is_empty() {
            return Ok(empty(EmptyReason::NoSimilarItems, 0));
        }

        let builder = CandidateBuilder::new(
            self.source.as_ref(),
            &self.substitution,
            &self.work_orders,
            self.config.max_variants,
        );
        let outcome = match builder.build(&item_code, &hits, deadline) {
            Ok(outcome) => outcome,
            Err(e) if e.recovery() == Recovery::EmptyResult => {
                return Ok(empty(EmptyReason::from_error(&e).unwrap_or(EmptyReason::NoCandidates), hits.len()));
            }
            Err(e) => return Err(e),
        };

        let aggregated = match options.mode {
            PredictionMode::Aggregated => aggregate(&item_code, &outcome.candidates),
            PredictionMode::Detailed => None,
        };
        let empty_reason = (outcome.candidates.is_empty() && outcome.deadline_exceeded)
            .then_some(EmptyReason::DeadlineExceeded);

        Ok(finish(Prediction {
            item_code: item_code.clone(),
            mode: options.mode,
            metrics: PredictionMetrics {
                retrieved: hits.len(),
                candidates: outcome.candidates.len(),
                deadline_exceeded: outcome.deadline_exceeded,
                empty_reason,
                ..Default::default()
            },
            candidates: outcome.candidates,
            aggregated,
        }))
    }
}
