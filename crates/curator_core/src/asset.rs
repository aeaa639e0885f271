//! Asset metadata records.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use curator_common::{AssetGuid, ContentHash, LogEntry};

use crate::scheduler::TransformResult;

/// Transform status of an asset, as shown in a status bar or browser badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TransformState {
    /// Not evaluated since the last change.
    Unknown,
    /// Outputs match the current content hash.
    UpToDate,
    /// Outputs are missing or out of date.
    NeedsTransform,
    /// The last transform for the current content hash failed.
    TransformError,
    /// A dependency is neither a known asset nor an existing file.
    MissingDependency,
    /// A reference does not resolve. Transforms are still allowed.
    MissingReference,
    /// The asset is part of a dependency cycle.
    CircularDependency,
    /// The source document no longer exists.
    SourceMissing,
}

impl TransformState {
    /// All states, in display order.
    pub const ALL: [TransformState; 8] = [
        TransformState::Unknown,
        TransformState::UpToDate,
        TransformState::NeedsTransform,
        TransformState::TransformError,
        TransformState::MissingDependency,
        TransformState::MissingReference,
        TransformState::CircularDependency,
        TransformState::SourceMissing,
    ];

    /// Returns a short human-readable name.
    pub fn as_str(self) -> &'static str {
        match self {
            TransformState::Unknown => "unknown",
            TransformState::UpToDate => "up-to-date",
            TransformState::NeedsTransform => "needs-transform",
            TransformState::TransformError => "transform-error",
            TransformState::MissingDependency => "missing-dependency",
            TransformState::MissingReference => "missing-reference",
            TransformState::CircularDependency => "circular-dependency",
            TransformState::SourceMissing => "source-missing",
        }
    }
}

impl fmt::Display for TransformState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A declared link of an asset document: another asset by GUID or a plain
/// file by data-directory-relative path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DependencyRef {
    /// Another asset.
    Asset(AssetGuid),
    /// A plain file, relative to a data directory.
    File(String),
}

impl DependencyRef {
    /// Parses a declared dependency string: GUIDs become asset links,
    /// everything else a file path.
    pub fn parse(s: &str) -> Self {
        match s.parse::<AssetGuid>() {
            Ok(guid) => DependencyRef::Asset(guid),
            Err(_) => DependencyRef::File(s.trim().replace('\\', "/")),
        }
    }
}

impl fmt::Display for DependencyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyRef::Asset(guid) => write!(f, "{guid}"),
            DependencyRef::File(path) => f.write_str(path),
        }
    }
}

/// A resolved dependency as returned by graph queries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dependency {
    /// Another asset.
    Asset(AssetGuid),
    /// A plain file, as a normalized absolute path.
    File(PathBuf),
}

/// Everything the curator knows about one asset.
#[derive(Debug, Clone)]
pub struct AssetInfo {
    /// Persisted identity.
    pub guid: AssetGuid,
    /// Absolute path of the source document.
    pub absolute_path: PathBuf,
    /// Data-directory-relative path with `/` separators.
    pub relative_path: String,
    /// Document type name.
    pub type_name: String,
    /// Hash of the source document bytes when it was last read.
    pub source_hash: Option<ContentHash>,
    /// Hash of the per-asset transform settings.
    pub settings_hash: ContentHash,
    /// Last-known content hash for the active platform.
    pub content_hash: Option<ContentHash>,
    /// Last-known combined hash of all transform dependencies.
    pub dependency_hash: Option<ContentHash>,
    /// Outputs of the last successful transform, relative to the project root.
    pub outputs: Vec<String>,
    /// Direct transform dependencies.
    pub dependencies: Vec<DependencyRef>,
    /// Direct weak references, used only for "find uses" queries.
    pub references: Vec<DependencyRef>,
    /// Last access time (Unix millis).
    pub last_access_ms: u64,
    /// Cached transform state.
    pub state: TransformState,
    /// Result of the most recent transform on the active platform.
    pub last_result: Option<Arc<TransformResult>>,
    /// Log of the most recent transform callback. Persisted across restarts.
    pub log: Vec<LogEntry>,
}

impl AssetInfo {
    /// Creates a record with no cached hashes or results.
    pub fn new(
        guid: AssetGuid,
        absolute_path: PathBuf,
        relative_path: String,
        type_name: String,
        settings_hash: ContentHash,
    ) -> Self {
        Self {
            guid,
            absolute_path,
            relative_path,
            type_name,
            source_hash: None,
            settings_hash,
            content_hash: None,
            dependency_hash: None,
            outputs: Vec::new(),
            dependencies: Vec::new(),
            references: Vec::new(),
            last_access_ms: 0,
            state: TransformState::Unknown,
            last_result: None,
            log: Vec::new(),
        }
    }

    /// Drops cached hashes and state so they are recomputed on next use.
    pub fn invalidate(&mut self) {
        self.content_hash = None;
        self.dependency_hash = None;
        self.state = TransformState::Unknown;
    }
}
