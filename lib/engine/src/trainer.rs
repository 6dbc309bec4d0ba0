//! Offline training
//!
//! Reads the item master, fits the feature pipelines, builds the similarity
//! index and publishes the result as a new artifact bundle. Training never
//! touches a bundle that is already published.

use routewise_core::{normalize_item_code, ItemRecord, RecommendConfig, Result, SimilarityIndex};
use routewise_erp::ErpSource;
use routewise_features::{FeatureAssembler, FeaturePipeline, FeatureSchema};
use routewise_storage::ArtifactStore;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{info, warn};

/// Fitted pipeline and index, not yet written anywhere
#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub pipeline: FeaturePipeline,
    pub index: SimilarityIndex,
    /// Items dropped by feature assembly
    pub rejected: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub version: String,
    pub item_count: usize,
    pub rejected: usize,
    pub dimension: usize,
    pub elapsed_ms: u64,
}

pub struct Trainer {
    schema: FeatureSchema,
    config: RecommendConfig,
}

impl Trainer {
    pub fn new(schema: FeatureSchema, config: RecommendConfig) -> Result<Self> {
        schema.validate()?;
        config.validate()?;
        Ok(Self { schema, config })
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Fit on the given records.
    ///
    /// Records are ordered by normalized item code and de-duplicated (first
    /// occurrence wins) so the same item master always yields the same bytes.
    pub fn fit(&self, records: &[ItemRecord]) -> Result<TrainedModel> {
        let mut unique: BTreeMap<String, &ItemRecord> = BTreeMap::new();
        let mut duplicates = 0usize;
        for record in records {
            let code = normalize_item_code(&record.item_code);
            if code.is_empty() {
                continue;
            }
            if unique.contains_key(&code) {
                duplicates += 1;
            } else {
                unique.insert(code, record);
            }
        }
        if duplicates > 0 {
            warn!(duplicates, "duplicate item codes in item master; first occurrence kept");
        }

        let assembler = FeatureAssembler::new(self.schema.clone());
        let (table, rejected) = assembler.assemble_lenient(unique.values().copied());
        let pipeline = FeaturePipeline::fit(&self.schema, &table)?;
        let vectors = pipeline.transform(&table)?;
        let index = SimilarityIndex::build(vectors, table.item_codes().to_vec())?;

        Ok(TrainedModel {
            pipeline,
            index,
            rejected: rejected.len(),
        })
    }

    /// Fit on the full item master and publish a bundle.
    pub fn train(&self, source: &dyn ErpSource, store: &ArtifactStore) -> Result<TrainingReport> {
        let started = Instant::now();
        let records = source.fetch_items()?;
        info!(items = records.len(), "training started");

        let model = self.fit(&records)?;
        let version = store.write_bundle(
            &self.schema,
            &model.pipeline,
            &model.index,
            self.config.compatible_profiles.clone(),
        )?;

        let report = TrainingReport {
            version,
            item_count: model.index.len(),
            rejected: model.rejected,
            dimension: model.pipeline.dim(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            version = %report.version,
            items = report.item_count,
            rejected = report.rejected,
            dimension = report.dimension,
            elapsed_ms = report.elapsed_ms,
            "training finished"
        );
        Ok(report)
    }
}
