//! Incremental asset dependency tracking and transform engine.
//!
//! The [`Curator`] is the service object of one open project. It discovers
//! asset documents in the configured data directories, keeps their identity
//! and declared dependencies in an [`AssetStore`] and a [`DependencyGraph`],
//! decides staleness by content hashing, and runs the per-type transforms of
//! stale assets in dependency order on a bounded worker pool.
//!
//! ```no_run
//! use std::path::Path;
//! use curator_core::{CancellationToken, Curator, TransformFlags};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let root = Path::new("/path/to/project");
//! let config = curator_config::load_config(root)?;
//! let curator = Curator::open_with_config_types(root, config)?;
//! let guid = curator.resolve_asset_spec("meshes/box.mesh")?;
//! let status = curator.transform_asset(
//!     guid,
//!     TransformFlags::TRIGGERED_MANUALLY,
//!     &CancellationToken::new(),
//! )?;
//! assert!(status.is_success());
//! curator.write_asset_tables()?;
//! curator.close()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod asset;
pub mod curator;
pub mod error;
pub mod events;
pub mod graph;
pub mod manager;
pub mod scan;
pub mod scheduler;
mod staleness;
pub mod store;
pub mod tables;
pub mod transform;
pub mod updates;

pub use asset::{AssetInfo, Dependency, DependencyRef, TransformState};
pub use curator::{Curator, CURATOR_VERSION};
pub use curator_common::{LogEntry, LogLevel};
pub use error::CuratorError;
pub use events::{CuratorEvent, EventBus, Subscription};
pub use graph::{DepNode, DependencyGraph, EdgeKind, Schedule};
pub use manager::{
    AssetDocumentInfo, AssetTypeFlags, AssetTypeManager, DocumentDescriptor, TomlAssetManager,
    TransformContext,
};
pub use scan::DiscoveredFile;
pub use scheduler::{CancellationToken, FailureKind, TransformFlags, TransformResult, TransformStatus};
pub use store::{AssetStore, UpsertOutcome};
pub use tables::{read_asset_table, table_path};
pub use updates::ScanSummary;
