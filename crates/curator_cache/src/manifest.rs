//! Curator manifest that tracks per-file status and per-asset records.
//!
//! The manifest is stored as `manifest.json` in the cache directory. File
//! status entries let a restarted curator skip re-reading files whose
//! timestamp and size did not change; asset records remember where each GUID
//! lived so moves across restarts are recognized.

use std::collections::BTreeMap;
use std::path::Path;

use curator_common::{AssetGuid, ContentHash, LogEntry};
use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// Name of the manifest file within the cache directory.
const MANIFEST_FILE: &str = "manifest.json";

/// Top-level manifest of persisted curator state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CuratorManifest {
    /// Curator version that produced this manifest. Invalidate on version change.
    pub curator_version: String,

    /// Per-file status, keyed by normalized absolute path.
    pub files: BTreeMap<String, FileStatus>,

    /// Per-asset records, keyed by GUID.
    pub assets: BTreeMap<AssetGuid, AssetRecord>,

    /// Completion time of the last successful full transform (Unix millis).
    #[serde(default)]
    pub last_full_transform: Option<u64>,
}

/// Cached status of a single file on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStatus {
    /// Modification time when the file was last hashed (Unix nanoseconds).
    pub modified_ns: u64,
    /// File size in bytes when the file was last hashed.
    pub size: u64,
    /// Content hash of the file.
    pub hash: ContentHash,
}

/// Persisted record of a known asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRecord {
    /// Data-directory-relative path of the asset document.
    pub path: String,
    /// Document type name.
    pub type_name: String,
    /// Last time the asset was accessed (Unix millis).
    #[serde(default)]
    pub last_access_ms: u64,
    /// Last-known content hash on the active platform.
    #[serde(default)]
    pub content_hash: Option<ContentHash>,
    /// Last-known combined hash of the asset's dependencies.
    #[serde(default)]
    pub dependency_hash: Option<ContentHash>,
    /// Log of the most recent transform, successful or not.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub log: Vec<LogEntry>,
}

impl CuratorManifest {
    /// Creates a new, empty manifest for the given curator version.
    pub fn new(curator_version: &str) -> Self {
        Self {
            curator_version: curator_version.to_string(),
            files: BTreeMap::new(),
            assets: BTreeMap::new(),
            last_full_transform: None,
        }
    }

    /// Loads the manifest from the cache directory, returning `None` if
    /// the file doesn't exist or can't be parsed.
    ///
    /// This is fail-safe: any error results in `None` (cache miss).
    pub fn load(cache_dir: &Path) -> Option<Self> {
        let path = cache_dir.join(MANIFEST_FILE);
        let content = std::fs::read_to_string(&path).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Saves the manifest to the cache directory.
    ///
    /// Creates the cache directory if it doesn't exist. The file is written
    /// to a temporary sibling first and renamed into place.
    pub fn save(&self, cache_dir: &Path) -> Result<(), CacheError> {
        std::fs::create_dir_all(cache_dir).map_err(|e| CacheError::Io {
            path: cache_dir.to_path_buf(),
            source: e,
        })?;
        let path = cache_dir.join(MANIFEST_FILE);
        let json = serde_json::to_string_pretty(self).map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })?;
        crate::stamp::write_atomic(&path, json.as_bytes())
    }

    /// Returns `true` if this manifest was produced by a compatible curator version.
    pub fn is_compatible(&self, current_version: &str) -> bool {
        self.curator_version == current_version
    }
}
