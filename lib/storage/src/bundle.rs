//! In-memory artifact bundle
//!
//! Everything prediction needs from a training run, immutable once built.
//! Shared between request threads behind an `Arc`.

use crate::manifest::{ArtifactKind, BundleMetadata, Manifest};
use routewise_core::{Error, ItemRecord, Result, SearchHit, SimilarityIndex, Vector};
use routewise_features::{
    CategoricalPipeline, FeatureAssembler, FeaturePipeline, FeatureSchema, NumericPipeline,
};
use serde::de::DeserializeOwned;
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct ArtifactBundle {
    version: String,
    manifest: Manifest,
    assembler: FeatureAssembler,
    pipeline: FeaturePipeline,
    index: SimilarityIndex,
}

/// Serialized artifacts, in manifest order
pub(crate) struct EncodedArtifacts {
    pub(crate) blobs: Vec<(ArtifactKind, Vec<u8>)>,
}

impl ArtifactBundle {
    /// Assemble a bundle and check that its parts agree with each other
    pub fn new(
        version: String,
        manifest: Manifest,
        schema: FeatureSchema,
        pipeline: FeaturePipeline,
        index: SimilarityIndex,
    ) -> Result<Self> {
        pipeline.check_schema(&schema)?;
        index.validate()?;
        if !index.is_empty() && index.dim() != pipeline.dim() {
            return Err(Error::FeatureDimensionMismatch {
                expected: pipeline.dim(),
                actual: index.dim(),
            });
        }
        Ok(Self {
            version,
            manifest,
            assembler: FeatureAssembler::new(schema),
            pipeline,
            index,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn schema(&self) -> &FeatureSchema {
        self.assembler.schema()
    }

    pub fn pipeline(&self) -> &FeaturePipeline {
        &self.pipeline
    }

    pub fn index(&self) -> &SimilarityIndex {
        &self.index
    }

    pub fn metadata(&self) -> BundleMetadata {
        BundleMetadata {
            item_count: self.index.len(),
            dimension: self.pipeline.dim(),
            feature_schema_version: self.schema().version,
        }
    }

    /// Feature vector for one item, through the frozen schema and pipelines
    pub fn vectorize(&self, record: &ItemRecord) -> Result<Vector> {
        let table = self.assembler.assemble([record])?;
        self.pipeline
            .transform(&table)?
            .pop()
            .ok_or(Error::FeatureDimensionMismatch {
                expected: self.pipeline.dim(),
                actual: 0,
            })
    }

    pub fn search(&self, query: &Vector, k: usize, threshold: f32) -> Result<Vec<SearchHit>> {
        self.index.search(query, k, threshold)
    }

    pub(crate) fn decode(version: String, manifest: Manifest, blobs: &[(ArtifactKind, Vec<u8>)]) -> Result<Self> {
        let blob = |kind: ArtifactKind| -> Result<&[u8]> {
            blobs
                .iter()
                .find(|(k, _)| *k == kind)
                .map(|(_, bytes)| bytes.as_slice())
                .ok_or_else(|| Error::BundleInvalid(format!("artifact '{}' not loaded", kind.name())))
        };

        let schema: FeatureSchema = decode_blob(ArtifactKind::FeatureColumns, blob(ArtifactKind::FeatureColumns)?)?;
        let categorical: CategoricalPipeline = decode_blob(ArtifactKind::Encoder, blob(ArtifactKind::Encoder)?)?;
        let numeric: NumericPipeline = decode_blob(ArtifactKind::Scaler, blob(ArtifactKind::Scaler)?)?;
        let index: SimilarityIndex =
            decode_blob(ArtifactKind::SimilarityEngine, blob(ArtifactKind::SimilarityEngine)?)?;

        Self::new(
            version,
            manifest,
            schema,
            FeaturePipeline::new(categorical, numeric),
            index,
        )
        .map_err(|e| match e {
            Error::BundleInvalid(_) => e,
            other => Error::BundleInvalid(format!("inconsistent artifacts: {}", other)),
        })
    }
}

pub(crate) fn encode_parts(
    schema: &FeatureSchema,
    pipeline: &FeaturePipeline,
    index: &SimilarityIndex,
) -> Result<EncodedArtifacts> {
    Ok(EncodedArtifacts {
        blobs: vec![
            (ArtifactKind::FeatureColumns, encode_blob(schema)?),
            (ArtifactKind::Encoder, encode_blob(pipeline.categorical())?),
            (ArtifactKind::Scaler, encode_blob(pipeline.numeric())?),
            (ArtifactKind::SimilarityEngine, encode_blob(index)?),
        ],
    })
}

fn encode_blob<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(|e| Error::Serialization(e.to_string()))
}

fn decode_blob<T: DeserializeOwned>(kind: ArtifactKind, bytes: &[u8]) -> Result<T> {
    bincode::deserialize(bytes)
        .map_err(|e| Error::BundleInvalid(format!("artifact '{}' undecodable: {}", kind.name(), e)))
}
