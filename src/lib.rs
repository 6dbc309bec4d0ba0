//! # Routewise
//!
//! Routing recommendations for manufactured items.
//!
//! Given an item's attributes, Routewise finds the most similar historically
//! routed items and proposes their routings as candidates, with nominal times
//! replaced by trimmed means of what the shop floor actually recorded.
//!
//! ## Quick Start
//!
//! ### From the command line
//!
//! ```bash
//! routewise --erp erp.sqlite --models ./models train
//! routewise --erp erp.sqlite --models ./models predict ITEM-100 --top-k 3
//! routewise --models ./models verify
//! ```
//!
//! ### As a Library
//!
//! ```rust,no_run
//! use routewise::prelude::*;
//! use std::sync::Arc;
//!
//! let config = RecommendConfig::default();
//! let source: Arc<dyn ErpSource> = Arc::new(SqliteErpSource::open("erp.sqlite", &config)?);
//! let store = ArtifactStore::new("./models")?;
//!
//! Trainer::new(FeatureSchema::erp_default(), config.clone())?.train(source.as_ref(), &store)?;
//!
//! let loader = Arc::new(BundleLoader::open(store)?);
//! let predictor = Predictor::new(loader, source, config)?;
//! let prediction = predictor.predict("ITEM-100", &predictor.options().with_top_k(3))?;
//! for candidate in &prediction.candidates {
//!     println!("{} {:.3}", candidate.reference_item, candidate.similarity_score);
//! }
//! # Ok::<(), routewise::Error>(())
//! ```
//!
//! ## Crate Structure
//!
//! - `routewise-core` - error taxonomy, configuration, item/routing model, similarity index
//! - `routewise-features` - feature schema, assembler, categorical and numeric pipelines
//! - `routewise-storage` - manifest, versioned artifact store, bundle loader
//! - `routewise-erp` - connection pool, retry, ERP view access
//! - `routewise-engine` - candidate building, work-order statistics, training, prediction

// Re-export core types
pub use routewise_core::{
    Error, ErrorKind, ItemRecord, Operation, RecommendConfig, Recovery, Result, RoutingRow,
    SearchHit, SimilarityIndex, Vector, WorkOrderRecord,
};

pub use routewise_features::{FeatureColumn, FeatureKind, FeaturePipeline, FeatureSchema};

pub use routewise_storage::{ArtifactBundle, ArtifactStore, BundleLoader, LoaderState, Manifest};

pub use routewise_erp::{ErpSource, MemorySource, RetryPolicy, SqliteErpSource, ViewAliases};

pub use routewise_engine::{
    AggregatedRouting, BatchPrediction, Candidate, EmptyReason, ItemOutcome, PredictOptions,
    Prediction, PredictionMode, Predictor, SubstitutionPolicy, Trainer, TrainingReport,
    WorkOrderAggregator,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        ArtifactStore, BundleLoader, Candidate, EmptyReason, ErpSource, Error, FeatureColumn,
        FeatureSchema, ItemRecord, PredictOptions, Prediction, PredictionMode, Predictor,
        RecommendConfig, Result, SqliteErpSource, Trainer,
    };
}
