//! Persisted curator state.
//!
//! This crate stores everything the curator needs to survive a restart without
//! re-hashing and re-transforming the whole project: a JSON manifest with
//! per-file status (timestamp, size, content hash) and per-asset records, and
//! binary side-car stamps recording the content hash of every asset's last
//! successful transform per platform.

#![warn(missing_docs)]

pub mod cache;
pub mod error;
pub mod hasher;
pub mod manifest;
pub mod stamp;

pub use cache::CuratorCache;
pub use error::CacheError;
pub use hasher::{FileFingerprint, SourceHasher};
pub use manifest::{AssetRecord, CuratorManifest, FileStatus};
pub use stamp::{write_atomic, StampStore, TransformStamp};

/// Milliseconds since the Unix epoch for a [`std::time::SystemTime`].
///
/// Times before the epoch clamp to zero.
pub fn unix_millis(time: std::time::SystemTime) -> u64 {
    time.duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
