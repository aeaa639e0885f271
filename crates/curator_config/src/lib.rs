//! Parsing and validation of `curator.toml` project configuration files.
//!
//! This crate reads the project configuration file and produces a strongly-typed
//! [`ProjectConfig`] describing data directories, asset types, platform
//! profiles, scheduler bounds and the cache location.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod resolve;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_file, load_config_from_str, CONFIG_FILE};
pub use resolve::{default_platform, resolve_platform, resolve_platforms, PlatformProfile};
pub use types::*;
