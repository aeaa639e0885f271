//! Side-car transform stamps.
//!
//! Every successful transform leaves a stamp at
//! `<cache_dir>/stamps/<platform>/<guid>.stamp` recording the content hash the
//! outputs were produced from. Each stamp has a header containing magic
//! bytes, format version, and a checksum for integrity validation. A missing
//! or damaged stamp reads as "never transformed".

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use curator_common::{AssetGuid, ContentHash};
use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// Magic bytes identifying a curator transform stamp.
const STAMP_MAGIC: [u8; 4] = *b"CURA";

/// Current stamp format version. Increment on breaking changes to
/// the header or payload format.
const STAMP_FORMAT_VERSION: u32 = 1;

/// Subdirectory of the cache directory holding stamps.
const STAMP_SUBDIR: &str = "stamps";

/// File extension for stamps.
const STAMP_EXT: &str = "stamp";

/// Header prepended to every stamp for validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StampHeader {
    /// Magic bytes: must be `b"CURA"`.
    pub magic: [u8; 4],

    /// Stamp format version.
    pub format_version: u32,

    /// Curator version that produced this stamp.
    pub curator_version: String,

    /// Content hash of the payload data (for integrity checks).
    pub checksum: ContentHash,
}

/// Record of one successful transform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformStamp {
    /// Content hash of the asset when it was transformed.
    pub content_hash: ContentHash,
    /// Output files produced, relative to the project root.
    pub outputs: Vec<String>,
    /// When the transform finished (Unix millis).
    pub transformed_at_ms: u64,
}

/// Writes `data` to `path` through a temporary file in the same directory.
///
/// Readers observe either the old or the new contents, never a partial write.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<(), CacheError> {
    use std::io::Write;

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| CacheError::Io {
        path: dir.to_path_buf(),
        source: e,
    })?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| CacheError::Io {
        path: dir.to_path_buf(),
        source: e,
    })?;
    tmp.write_all(data).map_err(|e| CacheError::Io {
        path: tmp.path().to_path_buf(),
        source: e,
    })?;
    tmp.persist(path).map_err(|e| CacheError::Io {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}

/// Store for per-platform transform stamps.
pub struct StampStore {
    /// Root cache directory.
    cache_dir: PathBuf,

    /// Curator version written into every header.
    curator_version: String,
}

impl StampStore {
    /// Creates a new stamp store rooted at the given cache directory.
    pub fn new(cache_dir: &Path, curator_version: &str) -> Self {
        Self {
            cache_dir: cache_dir.to_path_buf(),
            curator_version: curator_version.to_string(),
        }
    }

    /// Returns the file path of the stamp for `guid` on `platform`.
    pub fn stamp_path(&self, platform: &str, guid: AssetGuid) -> PathBuf {
        self.cache_dir
            .join(STAMP_SUBDIR)
            .join(platform)
            .join(format!("{guid}.{STAMP_EXT}"))
    }

    /// Writes a stamp, replacing any previous one atomically.
    pub fn write_stamp(
        &self,
        platform: &str,
        guid: AssetGuid,
        stamp: &TransformStamp,
    ) -> Result<(), CacheError> {
        let payload = bincode::serde::encode_to_vec(stamp, bincode::config::standard())
            .map_err(|e| CacheError::Serialization {
                reason: e.to_string(),
            })?;

        let header = StampHeader {
            magic: STAMP_MAGIC,
            format_version: STAMP_FORMAT_VERSION,
            curator_version: self.curator_version.clone(),
            checksum: ContentHash::from_bytes(&payload),
        };
        let header_bytes = bincode::serde::encode_to_vec(&header, bincode::config::standard())
            .map_err(|e| CacheError::Serialization {
                reason: e.to_string(),
            })?;

        // 4-byte header length (little-endian) + header + payload
        let header_len = header_bytes.len() as u32;
        let mut output = Vec::with_capacity(4 + header_bytes.len() + payload.len());
        output.extend_from_slice(&header_len.to_le_bytes());
        output.extend_from_slice(&header_bytes);
        output.extend_from_slice(&payload);

        write_atomic(&self.stamp_path(platform, guid), &output)
    }

    /// Reads a stamp, validating its header.
    ///
    /// Returns `None` if the file doesn't exist, the header is invalid,
    /// the format version doesn't match, or the checksum doesn't verify.
    pub fn read_stamp(&self, platform: &str, guid: AssetGuid) -> Option<TransformStamp> {
        let raw = std::fs::read(self.stamp_path(platform, guid)).ok()?;

        if raw.len() < 4 {
            return None;
        }
        let header_len = u32::from_le_bytes(raw[..4].try_into().ok()?) as usize;
        if raw.len() < 4 + header_len {
            return None;
        }

        let header: StampHeader =
            bincode::serde::decode_from_slice(&raw[4..4 + header_len], bincode::config::standard())
                .ok()?
                .0;
        if header.magic != STAMP_MAGIC || header.format_version != STAMP_FORMAT_VERSION {
            return None;
        }

        let payload = &raw[4 + header_len..];
        if ContentHash::from_bytes(payload) != header.checksum {
            return None;
        }

        bincode::serde::decode_from_slice(payload, bincode::config::standard())
            .ok()
            .map(|(stamp, _)| stamp)
    }

    /// Removes every stamp of every platform. Returns the number removed.
    pub fn clear(&self) -> Result<usize, CacheError> {
        self.sweep(|_| true)
    }

    /// Removes stamps whose GUID is not in `live`. Returns the number removed.
    pub fn gc(&self, live: &HashSet<AssetGuid>) -> Result<usize, CacheError> {
        self.sweep(|guid| match guid {
            Some(guid) => !live.contains(&guid),
            None => true,
        })
    }

    /// Visits every stamp file and deletes those for which `doomed` returns
    /// `true`. Files whose stem is not a GUID are passed as `None`.
    fn sweep(&self, doomed: impl Fn(Option<AssetGuid>) -> bool) -> Result<usize, CacheError> {
        let root = self.cache_dir.join(STAMP_SUBDIR);
        if !root.exists() {
            return Ok(0);
        }

        let mut removed = 0;
        for platform_dir in read_dir(&root)? {
            if !platform_dir.is_dir() {
                continue;
            }
            for path in read_dir(&platform_dir)? {
                if path.extension().and_then(|e| e.to_str()) != Some(STAMP_EXT) {
                    continue;
                }
                let guid = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .and_then(|s| s.parse::<AssetGuid>().ok());
                if doomed(guid) {
                    std::fs::remove_file(&path).map_err(|e| CacheError::Io {
                        path: path.clone(),
                        source: e,
                    })?;
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }
}

fn read_dir(dir: &Path) -> Result<Vec<PathBuf>, CacheError> {
    let entries = std::fs::read_dir(dir).map_err(|e| CacheError::Io {
        path: dir.to_path_buf(),
        source: e,
    })?;
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| CacheError::Io {
            path: dir.to_path_buf(),
            source: e,
        })?;
        paths.push(entry.path());
    }
    Ok(paths)
}
