//! On-disk artifact store
//!
//! Layout under the models root:
//!
//! ```text
//! models/
//!   LATEST                         name of the published version
//!   <version>/manifest.json
//!   <version>/feature_columns.bin
//!   <version>/encoder.bin
//!   <version>/scaler.bin
//!   <version>/similarity_engine.bin
//!   .staging-<version>/            in-flight writes, never read
//! ```
//!
//! A version directory is complete before it appears: files are staged and the
//! directory is published with a single rename. Published versions are never
//! rewritten.

use crate::bundle::{encode_parts, ArtifactBundle};
use crate::manifest::{ArtifactEntry, ArtifactKind, BundleMetadata, Manifest, MANIFEST_FILE};
use atomicwrites::{AtomicFile, OverwriteBehavior};
use chrono::Utc;
use routewise_core::{Error, Result, SimilarityIndex};
use routewise_features::{FeaturePipeline, FeatureSchema};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const LATEST_FILE: &str = "LATEST";
const STAGING_PREFIX: &str = ".staging-";

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn version_dir(&self, version: &str) -> PathBuf {
        self.root.join(version)
    }

    /// Sortable, unique version name: UTC timestamp plus a short random suffix
    fn generate_version() -> String {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!("{}-{}", Utc::now().format("%Y%m%dT%H%M%S%.3fZ"), &suffix[..8])
    }

    /// Write a new bundle, publish it, and point `LATEST` at it.
    pub fn write_bundle(
        &self,
        schema: &FeatureSchema,
        pipeline: &FeaturePipeline,
        index: &SimilarityIndex,
        compatible_profiles: Vec<String>,
    ) -> Result<String> {
        let version = Self::generate_version();
        let staging = self.root.join(format!("{}{}", STAGING_PREFIX, version));
        fs::create_dir_all(&staging)?;

        let encoded = encode_parts(schema, pipeline, index)?;
        let mut manifest = Manifest::new(
            compatible_profiles,
            BundleMetadata {
                item_count: index.len(),
                dimension: pipeline.dim(),
                feature_schema_version: schema.version,
            },
        );

        let written = (|| -> Result<()> {
            for (kind, bytes) in &encoded.blobs {
                write_atomic(&staging.join(kind.file_name()), bytes)?;
                manifest.insert(*kind, ArtifactEntry::for_bytes(*kind, bytes));
                debug!(artifact = kind.name(), size = bytes.len(), "artifact staged");
            }
            write_atomic(&staging.join(MANIFEST_FILE), &manifest.to_json()?)?;
            fs::rename(&staging, self.version_dir(&version))?;
            Ok(())
        })();

        if let Err(e) = written {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }

        write_atomic(&self.root.join(LATEST_FILE), version.as_bytes())?;
        info!(
            version = %version,
            items = index.len(),
            dimension = pipeline.dim(),
            "artifact bundle published"
        );
        Ok(version)
    }

    /// The version `LATEST` points at, if any
    pub fn latest_version(&self) -> Result<Option<String>> {
        match fs::read_to_string(self.root.join(LATEST_FILE)) {
            Ok(contents) => {
                let version = contents.trim();
                Ok((!version.is_empty()).then(|| version.to_string()))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Published versions, oldest first
    pub fn list_versions(&self) -> Result<Vec<String>> {
        let mut versions = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || !entry.path().join(MANIFEST_FILE).is_file() {
                continue;
            }
            versions.push(name);
        }
        versions.sort();
        Ok(versions)
    }

    pub fn read_manifest(&self, version: &str) -> Result<Manifest> {
        let path = self.version_dir(version).join(MANIFEST_FILE);
        let bytes = fs::read(&path).map_err(|e| {
            Error::BundleInvalid(format!("cannot read {}: {}", path.display(), e))
        })?;
        Manifest::from_json(&bytes)
    }

    fn read_verified(&self, version: &str) -> Result<(Manifest, Vec<(ArtifactKind, Vec<u8>)>)> {
        let manifest = self.read_manifest(version)?;
        let dir = self.version_dir(version);
        let mut blobs = Vec::with_capacity(ArtifactKind::ALL.len());
        for kind in ArtifactKind::ALL {
            let entry = manifest.entry(kind)?;
            let path = dir.join(&entry.path);
            let bytes = fs::read(&path).map_err(|e| {
                Error::BundleInvalid(format!("cannot read {}: {}", path.display(), e))
            })?;
            manifest.check(kind, &bytes)?;
            blobs.push((kind, bytes));
        }
        Ok((manifest, blobs))
    }

    /// Check every artifact hash without decoding anything
    pub fn verify(&self, version: &str) -> Result<Manifest> {
        let (manifest, _) = self.read_verified(version)?;
        Ok(manifest)
    }

    /// Read, verify and decode one version
    pub fn read_bundle(&self, version: &str) -> Result<ArtifactBundle> {
        let (manifest, blobs) = self.read_verified(version)?;
        ArtifactBundle::decode(version.to_string(), manifest, &blobs)
    }

    /// Read the version `LATEST` points at
    pub fn read_latest(&self) -> Result<ArtifactBundle> {
        let version = self
            .latest_version()?
            .ok_or_else(|| Error::BundleInvalid(format!("no bundle published under {}", self.root.display())))?;
        self.read_bundle(&version)
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    AtomicFile::new(path, OverwriteBehavior::AllowOverwrite)
        .write(|f| f.write_all(bytes))
        .map_err(|e| match e {
            atomicwrites::Error::Internal(e) | atomicwrites::Error::User(e) => Error::Io(e),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use routewise_core::ItemRecord;
    use routewise_features::{FeatureAssembler, FeatureColumn};
    use tempfile::TempDir;

    fn trained() -> (FeatureSchema, FeaturePipeline, SimilarityIndex) {
        let schema = FeatureSchema::new(vec![
            FeatureColumn::categorical("mat"),
            FeatureColumn::numeric("d"),
        ]);
        let records = vec![
            ItemRecord::new("A").with_attr("mat", "STS").with_attr("d", 10.0),
            ItemRecord::new("B").with_attr("mat", "AL").with_attr("d", 30.0),
        ];
        let table = FeatureAssembler::new(schema.clone()).assemble(&records).unwrap();
        let pipeline = FeaturePipeline::fit(&schema, &table).unwrap();
        let vectors = pipeline.transform(&table).unwrap();
        let index = SimilarityIndex::build(vectors, table.item_codes().to_vec()).unwrap();
        (schema, pipeline, index)
    }

    fn publish(store: &ArtifactStore) -> String {
        let (schema, pipeline, index) = trained();
        store
            .write_bundle(&schema, &pipeline, &index, vec!["erp-v1".into()])
            .unwrap()
    }

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path().join("models")).unwrap();
        let version = publish(&store);

        assert_eq!(store.latest_version().unwrap().as_deref(), Some(version.as_str()));
        assert_eq!(store.list_versions().unwrap(), vec![version.clone()]);

        let bundle = store.read_latest().unwrap();
        assert_eq!(bundle.version(), version);
        assert_eq!(bundle.index().len(), 2);
        for kind in ArtifactKind::ALL {
            assert!(store.version_dir(&version).join(kind.file_name()).is_file());
        }
    }

    #[test]
    fn test_no_staging_left_behind() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path()).unwrap();
        publish(&store);
        let leftovers = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(STAGING_PREFIX))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_corrupted_artifact_rejected() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path()).unwrap();
        let version = publish(&store);

        let path = store.version_dir(&version).join(ArtifactKind::Scaler.file_name());
        let mut bytes = fs::read(&path).unwrap();
        bytes[0] ^= 0x01;
        fs::write(&path, bytes).unwrap();

        assert!(matches!(store.verify(&version), Err(Error::BundleInvalid(_))));
        assert!(matches!(store.read_bundle(&version), Err(Error::BundleInvalid(_))));
    }

    #[test]
    fn test_missing_artifact_rejected() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path()).unwrap();
        let version = publish(&store);
        fs::remove_file(store.version_dir(&version).join(ArtifactKind::Encoder.file_name())).unwrap();
        assert!(matches!(store.read_bundle(&version), Err(Error::BundleInvalid(_))));
    }

    #[test]
    fn test_empty_store() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path()).unwrap();
        assert_eq!(store.latest_version().unwrap(), None);
        assert!(store.list_versions().unwrap().is_empty());
        assert!(matches!(store.read_latest(), Err(Error::BundleInvalid(_))));
    }

    #[test]
    fn test_retraining_changes_only_timestamp() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path()).unwrap();
        let first = store.read_manifest(&publish(&store)).unwrap();
        let second = store.read_manifest(&publish(&store)).unwrap();
        assert_eq!(first.artifacts, second.artifacts);
        assert_eq!(first.metadata, second.metadata);
        assert_eq!(store.list_versions().unwrap().len(), 2);
    }
}
