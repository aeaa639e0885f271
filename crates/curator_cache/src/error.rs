//! Errors from persisting curator state.

use std::path::PathBuf;

/// Failure to write persisted state or to hash a tracked file.
///
/// Reads never produce this: a missing or corrupt manifest or stamp is a
/// cache miss.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// A file could not be read, written or renamed.
    #[error("{path}: {source}")]
    Io {
        /// The file involved.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A manifest or stamp could not be encoded.
    #[error("cannot encode cache data: {reason}")]
    Serialization {
        /// Encoder message.
        reason: String,
    },
}

impl CacheError {
    /// Returns `true` if the underlying I/O error is `NotFound`.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}
