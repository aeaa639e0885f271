//! Errors raised while reading `curator.toml`.

use std::path::PathBuf;

/// A `curator.toml` that could not be read or does not describe a usable project.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("cannot read {path}: {source}")]
    Read {
        /// The configuration file.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The file is not valid TOML or does not match the expected layout.
    #[error("invalid curator.toml: {0}")]
    Parse(String),

    /// A platform name that has no `[platforms.<name>]` section.
    #[error("unknown platform '{0}'")]
    UnknownPlatform(String),

    /// A required section or key is absent or empty.
    #[error("curator.toml has no {0}")]
    MissingField(String),

    /// An asset type without any file extension.
    #[error("asset type '{0}' declares no extensions")]
    NoExtensions(String),

    /// Two asset types claim the same file extension.
    #[error("extension '{extension}' is claimed by asset types '{first}' and '{second}'")]
    DuplicateExtension {
        /// The extension, lowercased and without a leading dot.
        extension: String,
        /// The type that claimed it first.
        first: String,
        /// The type that claimed it again.
        second: String,
    },

    /// Any other out-of-range value.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
