//! # Routewise Storage
//!
//! Versioned artifact bundles on disk and the loader that serves them.
//!
//! - [`ArtifactStore`] writes a bundle (staged, hashed, published by rename)
//!   and reads it back, rejecting any artifact whose SHA-256 disagrees with
//!   `manifest.json`
//! - [`BundleLoader`] keeps the current [`ArtifactBundle`] behind an `Arc` and
//!   swaps in newer versions as they appear

pub mod bundle;
pub mod loader;
pub mod manifest;
pub mod store;

pub use bundle::ArtifactBundle;
pub use loader::{BundleLoader, LoaderState, WatcherHandle};
pub use manifest::{
    sha256_hex, ArtifactEntry, ArtifactKind, BundleMetadata, Manifest, HASH_ALGORITHM,
    MANIFEST_FILE, MANIFEST_SCHEMA_VERSION,
};
pub use store::{ArtifactStore, LATEST_FILE};
