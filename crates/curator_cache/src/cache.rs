//! High-level cache orchestrator.
//!
//! The `CuratorCache` type ties together the manifest, the stamp store and
//! file hashing into a single interface for the curator. It is shared between
//! the thread driving the curator and the transform workers, so all mutable
//! state sits behind a lock.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use curator_common::{normalize_path, AssetGuid, ContentHash};
use parking_lot::Mutex;

use crate::error::CacheError;
use crate::hasher::SourceHasher;
use crate::manifest::{AssetRecord, CuratorManifest};
use crate::stamp::StampStore;

/// Persisted curator state for one project.
///
/// All reads are fail-safe: corruption or version mismatches result in
/// cache misses rather than errors.
pub struct CuratorCache {
    /// Root directory for all cache files.
    cache_dir: PathBuf,

    /// File status and asset records.
    manifest: Mutex<CuratorManifest>,

    /// Per-platform transform stamps.
    stamps: StampStore,
}

impl CuratorCache {
    /// Loads an existing cache or creates a fresh one.
    ///
    /// If a manifest exists and is compatible with the current curator
    /// version, it is loaded. Otherwise a new empty manifest is created.
    pub fn load_or_create(cache_dir: &Path, curator_version: &str) -> Self {
        let manifest = match CuratorManifest::load(cache_dir) {
            Some(m) if m.is_compatible(curator_version) => m,
            Some(m) => {
                tracing::info!(
                    found = %m.curator_version,
                    expected = curator_version,
                    "discarding manifest from another curator version"
                );
                CuratorManifest::new(curator_version)
            }
            None => CuratorManifest::new(curator_version),
        };

        Self {
            cache_dir: cache_dir.to_path_buf(),
            manifest: Mutex::new(manifest),
            stamps: StampStore::new(cache_dir, curator_version),
        }
    }

    /// Returns the cache directory.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Returns the stamp store.
    pub fn stamps(&self) -> &StampStore {
        &self.stamps
    }

    /// Returns the content hash of `path`, re-reading the file only if its
    /// timestamp or size changed since it was last hashed.
    ///
    /// A file that can no longer be read is dropped from the status cache.
    pub fn hash_file(&self, path: &Path) -> Result<ContentHash, CacheError> {
        let key = normalize_path(path);
        let previous = self.manifest.lock().files.get(&key).copied();

        // Hash without holding the lock so workers can read files in parallel.
        match SourceHasher::refresh(path, previous.as_ref()) {
            Ok(status) => {
                self.manifest.lock().files.insert(key, status);
                Ok(status.hash)
            }
            Err(e) => {
                self.manifest.lock().files.remove(&key);
                Err(e)
            }
        }
    }

    #[cfg(test)]
    fn cached_file_hash(&self, path: &Path) -> Option<ContentHash> {
        self.manifest
            .lock()
            .files
            .get(&normalize_path(path))
            .map(|s| s.hash)
    }

    /// Forgets the recorded status of `path`, forcing the next
    /// [`hash_file`](Self::hash_file) to read it.
    pub fn forget_file(&self, path: &Path) {
        self.manifest.lock().files.remove(&normalize_path(path));
    }

    /// Returns a snapshot of the persisted asset records.
    pub fn asset_records(&self) -> BTreeMap<AssetGuid, AssetRecord> {
        self.manifest.lock().assets.clone()
    }

    /// Replaces the persisted asset records.
    pub fn set_asset_records(&self, records: BTreeMap<AssetGuid, AssetRecord>) {
        self.manifest.lock().assets = records;
    }

    /// Returns when the last full transform finished (Unix millis).
    pub fn last_full_transform(&self) -> Option<u64> {
        self.manifest.lock().last_full_transform
    }

    /// Records when a full transform finished.
    pub fn set_last_full_transform(&self, at_ms: u64) {
        self.manifest.lock().last_full_transform = Some(at_ms);
    }

    /// Persists the current manifest to disk.
    pub fn save(&self) -> Result<(), CacheError> {
        let snapshot = self.manifest.lock().clone();
        snapshot.save(&self.cache_dir)
    }

    /// Deletes every stamp and forgets every file status.
    ///
    /// Returns the number of stamps removed.
    pub fn clear(&self) -> Result<usize, CacheError> {
        self.manifest.lock().files.clear();
        self.stamps.clear()
    }

    /// Removes stamps of assets that are no longer known.
    pub fn gc(&self, live: &HashSet<AssetGuid>) -> Result<usize, CacheError> {
        self.stamps.gc(live)
    }
}
