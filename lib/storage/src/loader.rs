//! Bundle loader
//!
//! Holds the bundle every request reads from and swaps it when a newer one is
//! published. Readers clone the `Arc` and keep using their bundle until they
//! drop it, so a swap never pulls a bundle out from under a request.
//!
//! ```text
//!   Unloaded ──load──> Loading ──ok──> Ready ──new LATEST──> Stale
//!       ^                 │                                    │
//!       └────failure──────┘<───────────────reload──────────────┘
//! ```
//!
//! A failed reload while a bundle is already being served keeps that bundle
//! and leaves the loader `Stale`, so the next poll tries again.

use crate::bundle::ArtifactBundle;
use crate::store::ArtifactStore;
use parking_lot::{Condvar, Mutex, RwLock};
use routewise_core::{Error, Result};
use serde::Serialize;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoaderState {
    Unloaded,
    Loading,
    Ready,
    Stale,
}

pub struct BundleLoader {
    store: ArtifactStore,
    current: RwLock<Option<Arc<ArtifactBundle>>>,
    state: Mutex<LoaderState>,
    // Serializes loads; readers never take it
    load_lock: Mutex<()>,
}

impl BundleLoader {
    pub fn new(store: ArtifactStore) -> Self {
        Self {
            store,
            current: RwLock::new(None),
            state: Mutex::new(LoaderState::Unloaded),
            load_lock: Mutex::new(()),
        }
    }

    /// Create a loader and load the latest bundle immediately
    pub fn open(store: ArtifactStore) -> Result<Self> {
        let loader = Self::new(store);
        loader.load()?;
        Ok(loader)
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn state(&self) -> LoaderState {
        *self.state.lock()
    }

    /// The bundle currently served
    pub fn current(&self) -> Result<Arc<ArtifactBundle>> {
        self.current
            .read()
            .clone()
            .ok_or_else(|| Error::BundleInvalid("no artifact bundle loaded".into()))
    }

    pub fn current_version(&self) -> Option<String> {
        self.current.read().as_ref().map(|b| b.version().to_string())
    }

    /// Load the version `LATEST` points at and swap it in.
    pub fn load(&self) -> Result<Arc<ArtifactBundle>> {
        let _guard = self.load_lock.lock();
        self.load_locked()
    }

    // Caller holds `load_lock`
    fn load_locked(&self) -> Result<Arc<ArtifactBundle>> {
        *self.state.lock() = LoaderState::Loading;

        match self.store.read_latest() {
            Ok(bundle) => {
                let bundle = Arc::new(bundle);
                let previous = self.current.write().replace(bundle.clone());
                *self.state.lock() = LoaderState::Ready;
                info!(
                    version = %bundle.version(),
                    previous = previous.as_ref().map(|b| b.version()).unwrap_or("-"),
                    items = bundle.index().len(),
                    "artifact bundle loaded"
                );
                Ok(bundle)
            }
            Err(e) => {
                let fallback = if self.current.read().is_some() {
                    LoaderState::Stale
                } else {
                    LoaderState::Unloaded
                };
                *self.state.lock() = fallback;
                error!(error = %e, "artifact bundle load failed");
                Err(e)
            }
        }
    }

    /// Flag the served bundle as outdated; the next reload replaces it
    pub fn mark_stale(&self) {
        let mut state = self.state.lock();
        if *state == LoaderState::Ready {
            *state = LoaderState::Stale;
            warn!(version = ?self.current_version(), "artifact bundle marked stale");
        }
    }

    /// Compare `LATEST` with the served version; returns true when they differ.
    pub fn check_for_update(&self) -> Result<bool> {
        let latest = self.store.latest_version()?;
        let changed = latest.is_some() && latest != self.current_version();
        if changed {
            self.mark_stale();
        }
        Ok(changed)
    }

    /// Reload when stale or never loaded. Returns true when a new bundle was swapped in.
    ///
    /// Concurrent callers that find the loader stale reload it once; the
    /// others wait on the load and then see it `Ready`.
    pub fn refresh(&self) -> Result<bool> {
        self.check_for_update()?;
        if !self.needs_load() {
            return Ok(false);
        }
        let _guard = self.load_lock.lock();
        if !self.needs_load() {
            return Ok(false);
        }
        self.load_locked()?;
        Ok(true)
    }

    fn needs_load(&self) -> bool {
        matches!(self.state(), LoaderState::Stale | LoaderState::Unloaded)
    }

    /// Poll for new bundles on a background thread until the handle is dropped.
    pub fn spawn_watcher(self: &Arc<Self>, interval: Duration) -> Result<WatcherHandle> {
        let loader = Arc::clone(self);
        let stop = Arc::new((Mutex::new(false), Condvar::new()));
        let signal = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("bundle-watcher".into())
            .spawn(move || {
                let (flag, condvar) = &*signal;
                loop {
                    {
                        let mut stopped = flag.lock();
                        if !*stopped {
                            condvar.wait_for(&mut stopped, interval);
                        }
                        if *stopped {
                            break;
                        }
                    }
                    if let Err(e) = loader.refresh() {
                        warn!(error = %e, "bundle refresh failed; keeping current bundle");
                    }
                }
            })?;

        Ok(WatcherHandle {
            stop,
            handle: Some(handle),
        })
    }
}

/// Stops the watcher thread on drop
pub struct WatcherHandle {
    stop: Arc<(Mutex<bool>, Condvar)>,
    handle: Option<JoinHandle<()>>,
}

impl WatcherHandle {
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let (flag, condvar) = &*self.stop;
        *flag.lock() = true;
        condvar.notify_all();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ArtifactKind;
    use routewise_core::{ItemRecord, SimilarityIndex};
    use routewise_features::{FeatureAssembler, FeatureColumn, FeaturePipeline, FeatureSchema};
    use std::fs;
    use tempfile::TempDir;

    fn publish(store: &ArtifactStore, items: &[(&str, f64)]) -> String {
        let schema = FeatureSchema::new(vec![FeatureColumn::numeric("d")]);
        let records: Vec<_> = items
            .iter()
            .map(|(code, d)| ItemRecord::new(code).with_attr("d", *d))
            .collect();
        let table = FeatureAssembler::new(schema.clone()).assemble(&records).unwrap();
        let pipeline = FeaturePipeline::fit(&schema, &table).unwrap();
        let index =
            SimilarityIndex::build(pipeline.transform(&table).unwrap(), table.item_codes().to_vec()).unwrap();
        store.write_bundle(&schema, &pipeline, &index, vec![]).unwrap()
    }

    #[test]
    fn test_state_transitions() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path()).unwrap();
        let loader = BundleLoader::new(store.clone());
        assert_eq!(loader.state(), LoaderState::Unloaded);

        assert!(loader.load().is_err());
        assert_eq!(loader.state(), LoaderState::Unloaded);

        let v1 = publish(&store, &[("A", 1.0), ("B", 2.0)]);
        loader.load().unwrap();
        assert_eq!(loader.state(), LoaderState::Ready);
        assert_eq!(loader.current_version().as_deref(), Some(v1.as_str()));
        assert!(!loader.check_for_update().unwrap());

        let v2 = publish(&store, &[("A", 1.0), ("B", 2.0), ("C", 3.0)]);
        assert!(loader.check_for_update().unwrap());
        assert_eq!(loader.state(), LoaderState::Stale);

        assert!(loader.refresh().unwrap());
        assert_eq!(loader.state(), LoaderState::Ready);
        assert_eq!(loader.current_version().as_deref(), Some(v2.as_str()));
    }

    #[test]
    fn test_old_bundle_survives_swap_for_readers() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path()).unwrap();
        publish(&store, &[("A", 1.0), ("B", 2.0)]);
        let loader = BundleLoader::open(store.clone()).unwrap();

        let held = loader.current().unwrap();
        publish(&store, &[("A", 1.0), ("B", 2.0), ("C", 3.0)]);
        loader.refresh().unwrap();

        assert_eq!(held.index().len(), 2);
        assert_eq!(loader.current().unwrap().index().len(), 3);
    }

    #[test]
    fn test_failed_reload_keeps_serving() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path()).unwrap();
        let v1 = publish(&store, &[("A", 1.0), ("B", 2.0)]);
        let loader = BundleLoader::open(store.clone()).unwrap();

        let v2 = publish(&store, &[("A", 1.0), ("C", 3.0)]);
        let path = store.version_dir(&v2).join(ArtifactKind::SimilarityEngine.file_name());
        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        fs::write(&path, bytes).unwrap();

        assert!(matches!(loader.refresh(), Err(Error::BundleInvalid(_))));
        assert_eq!(loader.state(), LoaderState::Stale);
        assert_eq!(loader.current_version().as_deref(), Some(v1.as_str()));
    }

    #[test]
    fn test_marked_stale_reloads_same_version() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path()).unwrap();
        let v1 = publish(&store, &[("A", 1.0), ("B", 2.0)]);
        let loader = BundleLoader::open(store).unwrap();
        let before = loader.current().unwrap();

        loader.mark_stale();
        assert_eq!(loader.state(), LoaderState::Stale);
        assert!(loader.refresh().unwrap());
        assert_eq!(loader.state(), LoaderState::Ready);
        assert_eq!(loader.current_version().as_deref(), Some(v1.as_str()));
        assert!(!Arc::ptr_eq(&before, &loader.current().unwrap()));

        assert!(!loader.refresh().unwrap());
    }

    #[test]
    fn test_scaler_index_disagreement_stays_stale_until_fixed() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path()).unwrap();
        let v1 = publish(&store, &[("A", 1.0), ("B", 2.0)]);
        let loader = BundleLoader::open(store.clone()).unwrap();

        // One numeric column, but a two-wide index
        let schema = FeatureSchema::new(vec![FeatureColumn::numeric("d")]);
        let records = vec![ItemRecord::new("A").with_attr("d", 1.0)];
        let table = FeatureAssembler::new(schema.clone()).assemble(&records).unwrap();
        let pipeline = FeaturePipeline::fit(&schema, &table).unwrap();
        let wide = SimilarityIndex::build(
            vec![routewise_core::Vector::new(vec![1.0, 0.0])],
            vec!["A".to_string()],
        )
        .unwrap();
        store.write_bundle(&schema, &pipeline, &wide, vec![]).unwrap();

        assert!(matches!(loader.refresh(), Err(Error::BundleInvalid(_))));
        assert_eq!(loader.state(), LoaderState::Stale);
        assert_eq!(loader.current_version().as_deref(), Some(v1.as_str()));

        let v3 = publish(&store, &[("A", 1.0), ("C", 3.0)]);
        assert!(loader.refresh().unwrap());
        assert_eq!(loader.state(), LoaderState::Ready);
        assert_eq!(loader.current_version().as_deref(), Some(v3.as_str()));
    }

    #[test]
    fn test_watcher_picks_up_new_bundle() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path()).unwrap();
        publish(&store, &[("A", 1.0), ("B", 2.0)]);
        let loader = Arc::new(BundleLoader::open(store.clone()).unwrap());
        let watcher = loader.spawn_watcher(Duration::from_millis(10)).unwrap();

        let v2 = publish(&store, &[("A", 1.0), ("B", 2.0), ("C", 3.0)]);
        let mut swapped = false;
        for _ in 0..200 {
            if loader.current_version().as_deref() == Some(v2.as_str()) {
                swapped = true;
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        watcher.stop();
        assert!(swapped);
    }
}
