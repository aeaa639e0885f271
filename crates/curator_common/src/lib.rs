//! Shared foundational types used across the asset curator.
//!
//! This crate provides the stable asset identifier, content hashing used for
//! staleness detection, interned file paths used as dependency graph nodes
//! and the log lines captured by transforms.

#![warn(missing_docs)]

pub mod guid;
pub mod hash;
pub mod log;
pub mod path;

pub use guid::{AssetGuid, ParseGuidError};
pub use hash::{ContentHash, HashBuilder};
pub use log::{LogEntry, LogLevel};
pub use path::{normalize_path, FileId, PathInterner};
