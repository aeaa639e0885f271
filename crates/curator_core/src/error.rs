//! Error types for curator operations.

use std::path::PathBuf;

use curator_cache::CacheError;
use curator_common::AssetGuid;
use curator_config::ConfigError;

/// Errors produced by the curator.
///
/// Per-asset transform failures inside a batch are reported as
/// [`TransformResult`](crate::TransformResult) values, not as `Err`s; this
/// enum covers failures of a whole operation and the reasons recorded on
/// individual results.
#[derive(Debug, thiserror::Error)]
pub enum CuratorError {
    /// The asset's source document no longer exists.
    #[error("source of asset {guid} is missing: {path}")]
    SourceMissing {
        /// The asset whose source is gone.
        guid: AssetGuid,
        /// The expected source path.
        path: PathBuf,
    },

    /// The dependency graph contains a cycle through the named assets.
    #[error("cyclic dependency: {}", cycle.join(" -> "))]
    CyclicDependency {
        /// Relative paths (or GUIDs) along the cycle, first element repeated at the end.
        cycle: Vec<String>,
    },

    /// Two different documents claim the same GUID.
    #[error("asset GUID {guid} is claimed by both '{existing}' and '{duplicate}'")]
    DuplicateGuid {
        /// The contested GUID.
        guid: AssetGuid,
        /// Relative path of the document that owns the GUID.
        existing: String,
        /// Relative path of the rejected document.
        duplicate: String,
    },

    /// An asset type's transform reported an error.
    #[error("transform of '{asset}' failed: {message}")]
    TransformFailed {
        /// Relative path of the asset.
        asset: String,
        /// Message reported by the transform.
        message: String,
    },

    /// An I/O error occurred.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A dependency is neither a known asset nor an existing file.
    #[error("asset '{asset}' depends on missing '{dependency}'")]
    DanglingDependency {
        /// Relative path of the dependent asset.
        asset: String,
        /// The unresolved dependency (GUID or path).
        dependency: String,
    },

    /// No asset matches the given GUID or path.
    #[error("unknown asset '{0}'")]
    UnknownAsset(String),

    /// An asset document or lookup table could not be parsed.
    #[error("invalid asset document {path}: {reason}")]
    InvalidDocument {
        /// The offending file.
        path: PathBuf,
        /// Description of the problem.
        reason: String,
    },

    /// The named platform profile is not configured.
    #[error("unknown platform '{0}'")]
    UnknownPlatform(String),

    /// Writing the lookup tables failed for one or more platforms.
    #[error("failed to write asset tables for {}: {message}", platforms.join(", "))]
    TableWrite {
        /// Platforms whose table could not be written.
        platforms: Vec<String>,
        /// The first failure message.
        message: String,
    },

    /// Some assets of a bulk transform failed.
    #[error("{failed} of {total} assets failed to transform")]
    BatchFailed {
        /// Number of failed assets.
        failed: usize,
        /// Number of assets visited.
        total: usize,
    },

    /// The operation was cancelled before it completed.
    #[error("operation cancelled")]
    Cancelled,

    /// The transform worker pool or a background job thread could not be started.
    #[error("failed to start transform workers: {0}")]
    WorkerPool(String),

    /// A cache operation failed.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The project configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cyclic_dependency_display() {
        let err = CuratorError::CyclicDependency {
            cycle: vec!["a.mat".into(), "b.mat".into(), "a.mat".into()],
        };
        assert_eq!(err.to_string(), "cyclic dependency: a.mat -> b.mat -> a.mat");
    }

    #[test]
    fn duplicate_guid_display() {
        let err = CuratorError::DuplicateGuid {
            guid: AssetGuid::from_u128(1),
            existing: "meshes/box.mesh".into(),
            duplicate: "meshes/copy.mesh".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("meshes/box.mesh"));
        assert!(msg.contains("meshes/copy.mesh"));
        assert!(msg.contains("00000000-0000-0000-0000-000000000001"));
    }

    #[test]
    fn dangling_dependency_display() {
        let err = CuratorError::DanglingDependency {
            asset: "materials/box.mat".into(),
            dependency: "textures/gone.png".into(),
        };
        assert_eq!(
            err.to_string(),
            "asset 'materials/box.mat' depends on missing 'textures/gone.png'"
        );
    }

    #[test]
    fn table_write_display() {
        let err = CuratorError::TableWrite {
            platforms: vec!["android".into(), "pc".into()],
            message: "disk full".into(),
        };
        assert_eq!(
            err.to_string(),
            "failed to write asset tables for android, pc: disk full"
        );
    }

    #[test]
    fn batch_failed_display() {
        let err = CuratorError::BatchFailed { failed: 2, total: 9 };
        assert_eq!(err.to_string(), "2 of 9 assets failed to transform");
    }

    #[test]
    fn config_error_is_transparent() {
        let err = CuratorError::from(ConfigError::UnknownPlatform("ps2".into()));
        assert_eq!(err.to_string(), "unknown platform 'ps2'");
    }
}
