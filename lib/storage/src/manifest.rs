//! Bundle manifest
//!
//! `manifest.json` is the authority on what a bundle contains: one entry per
//! artifact with its SHA-256, plus the generation timestamp and the SQL view
//! profiles the bundle was trained against.

use chrono::{DateTime, Utc};
use routewise_core::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const MANIFEST_SCHEMA_VERSION: u32 = 1;
pub const HASH_ALGORITHM: &str = "sha256";

/// The four artifacts every bundle carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArtifactKind {
    FeatureColumns,
    Encoder,
    Scaler,
    SimilarityEngine,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 4] = [
        ArtifactKind::FeatureColumns,
        ArtifactKind::Encoder,
        ArtifactKind::Scaler,
        ArtifactKind::SimilarityEngine,
    ];

    /// Key used in the manifest
    pub fn name(self) -> &'static str {
        match self {
            ArtifactKind::FeatureColumns => "feature_columns",
            ArtifactKind::Encoder => "encoder",
            ArtifactKind::Scaler => "scaler",
            ArtifactKind::SimilarityEngine => "similarity_engine",
        }
    }

    pub fn file_name(self) -> String {
        format!("{}.bin", self.name())
    }
}

/// Lowercase hex SHA-256 of a byte slice
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    /// File name relative to the version directory
    pub path: String,
    pub sha256: String,
    pub size: u64,
}

impl ArtifactEntry {
    pub fn for_bytes(kind: ArtifactKind, bytes: &[u8]) -> Self {
        Self {
            path: kind.file_name(),
            sha256: sha256_hex(bytes),
            size: bytes.len() as u64,
        }
    }
}

/// Summary of what was trained; informational only
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleMetadata {
    pub item_count: usize,
    pub dimension: usize,
    pub feature_schema_version: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub schema_version: u32,
    pub generated_at: DateTime<Utc>,
    pub hash_algorithm: String,
    pub compatible_profiles: Vec<String>,
    pub artifacts: BTreeMap<String, ArtifactEntry>,
    pub metadata: BundleMetadata,
}

impl Manifest {
    pub fn new(compatible_profiles: Vec<String>, metadata: BundleMetadata) -> Self {
        Self {
            schema_version: MANIFEST_SCHEMA_VERSION,
            generated_at: Utc::now(),
            hash_algorithm: HASH_ALGORITHM.to_string(),
            compatible_profiles,
            artifacts: BTreeMap::new(),
            metadata,
        }
    }

    pub fn insert(&mut self, kind: ArtifactKind, entry: ArtifactEntry) {
        self.artifacts.insert(kind.name().to_string(), entry);
    }

    pub fn entry(&self, kind: ArtifactKind) -> Result<&ArtifactEntry> {
        self.artifacts.get(kind.name()).ok_or_else(|| {
            Error::BundleInvalid(format!("manifest has no entry for '{}'", kind.name()))
        })
    }

    /// Parse and check the schema version and artifact set
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let manifest: Manifest = serde_json::from_slice(bytes)
            .map_err(|e| Error::BundleInvalid(format!("unreadable manifest: {}", e)))?;
        if manifest.schema_version != MANIFEST_SCHEMA_VERSION {
            return Err(Error::BundleInvalid(format!(
                "unsupported manifest schema version {}",
                manifest.schema_version
            )));
        }
        if manifest.hash_algorithm != HASH_ALGORITHM {
            return Err(Error::BundleInvalid(format!(
                "unsupported hash algorithm '{}'",
                manifest.hash_algorithm
            )));
        }
        for kind in ArtifactKind::ALL {
            manifest.entry(kind)?;
        }
        Ok(manifest)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Compare artifact bytes against the recorded hash
    pub fn check(&self, kind: ArtifactKind, bytes: &[u8]) -> Result<()> {
        let entry = self.entry(kind)?;
        let actual = sha256_hex(bytes);
        if actual != entry.sha256 {
            return Err(Error::BundleInvalid(format!(
                "hash mismatch for '{}': manifest {}, file {}",
                kind.name(),
                entry.sha256,
                actual
            )));
        }
        Ok(())
    }

    /// True when this bundle was trained against one of the given view profiles
    pub fn supports_profile(&self, profile: &str) -> bool {
        self.compatible_profiles.iter().any(|p| p == profile)
    }
}
