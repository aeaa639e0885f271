//! File hashing and cheap change detection.
//!
//! Reading and hashing every file on every scan is expensive, so each file's
//! modification time and size are recorded alongside its hash. A file whose
//! fingerprint is unchanged reuses the recorded hash.

use std::path::Path;
use std::time::UNIX_EPOCH;

use curator_common::ContentHash;

use crate::error::CacheError;
use crate::manifest::FileStatus;

/// Modification time and size of a file at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileFingerprint {
    /// Modification time (Unix nanoseconds).
    pub modified_ns: u64,
    /// Size in bytes.
    pub size: u64,
}

impl FileFingerprint {
    /// Reads the fingerprint of `path` from file system metadata.
    pub fn of(path: &Path) -> Result<Self, CacheError> {
        let meta = std::fs::metadata(path).map_err(|e| CacheError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let modified = meta.modified().map_err(|e| CacheError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let modified_ns = modified
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        Ok(Self {
            modified_ns,
            size: meta.len(),
        })
    }

    /// Returns `true` if `status` was recorded for a file with this fingerprint.
    pub fn matches(&self, status: &FileStatus) -> bool {
        status.modified_ns == self.modified_ns && status.size == self.size
    }
}

/// Utility for computing content hashes of files.
pub struct SourceHasher;

impl SourceHasher {
    /// Computes the content hash of a single file.
    ///
    /// Reads the file and returns its XXH3-128 content hash.
    pub fn hash_file(path: &Path) -> Result<ContentHash, CacheError> {
        let content = std::fs::read(path).map_err(|e| CacheError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(ContentHash::from_bytes(&content))
    }

    /// Hashes `path`, reusing `previous` when the fingerprint still matches.
    ///
    /// Returns the (possibly unchanged) status to record for the file.
    pub fn refresh(path: &Path, previous: Option<&FileStatus>) -> Result<FileStatus, CacheError> {
        let fingerprint = FileFingerprint::of(path)?;
        if let Some(status) = previous.filter(|s| fingerprint.matches(s)) {
            return Ok(*status);
        }
        Ok(FileStatus {
            modified_ns: fingerprint.modified_ns,
            size: fingerprint.size,
            hash: Self::hash_file(path)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_file_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("box.mesh");
        std::fs::write(&path, "vertices").unwrap();

        let h1 = SourceHasher::hash_file(&path).unwrap();
        let h2 = SourceHasher::hash_file(&path).unwrap();
        assert_eq!(h1, h2);
    }

    #[test]
    fn hash_file_different_content() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.mesh");
        let b = dir.path().join("b.mesh");
        std::fs::write(&a, "a").unwrap();
        std::fs::write(&b, "b").unwrap();
        assert_ne!(
            SourceHasher::hash_file(&a).unwrap(),
            SourceHasher::hash_file(&b).unwrap()
        );
    }

    #[test]
    fn hash_file_nonexistent_errors() {
        let err = SourceHasher::hash_file(Path::new("/nonexistent/file.mesh")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn refresh_reuses_matching_status() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.png");
        std::fs::write(&path, "pixels").unwrap();
        let fingerprint = FileFingerprint::of(&path).unwrap();

        // A recorded hash with a matching fingerprint is trusted without reading.
        let recorded = FileStatus {
            modified_ns: fingerprint.modified_ns,
            size: fingerprint.size,
            hash: ContentHash::from_bytes(b"recorded"),
        };
        let status = SourceHasher::refresh(&path, Some(&recorded)).unwrap();
        assert_eq!(status.hash, recorded.hash);
    }

    #[test]
    fn refresh_rehashes_on_size_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.png");
        std::fs::write(&path, "pixels").unwrap();
        let fingerprint = FileFingerprint::of(&path).unwrap();
        let recorded = FileStatus {
            modified_ns: fingerprint.modified_ns,
            size: fingerprint.size + 1,
            hash: ContentHash::from_bytes(b"recorded"),
        };
        let status = SourceHasher::refresh(&path, Some(&recorded)).unwrap();
        assert_eq!(status.hash, ContentHash::from_bytes(b"pixels"));
        assert_eq!(status.size, 6);
    }

    #[test]
    fn refresh_rehashes_same_size_rewrite_within_a_millisecond() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.png");
        std::fs::write(&path, "pixels").unwrap();
        let fingerprint = FileFingerprint::of(&path).unwrap();
        // Same size, recorded a few hundred nanoseconds before the rewrite.
        let recorded = FileStatus {
            modified_ns: fingerprint.modified_ns.saturating_sub(300),
            size: fingerprint.size,
            hash: ContentHash::from_bytes(b"pixelz"),
        };
        let status = SourceHasher::refresh(&path, Some(&recorded)).unwrap();
        assert_eq!(status.hash, ContentHash::from_bytes(b"pixels"));
        assert_eq!(status.modified_ns, fingerprint.modified_ns);
    }

    #[test]
    fn refresh_without_previous_hashes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.png");
        std::fs::write(&path, "pixels").unwrap();
        let status = SourceHasher::refresh(&path, None).unwrap();
        assert_eq!(status.hash, ContentHash::from_bytes(b"pixels"));
    }
}
