//! Stable 128-bit asset identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// The persisted identity of an asset.
///
/// A GUID is assigned once when the asset document is created and stored in
/// its header, so it survives renames and moves of the source file. It is never
/// derived from the path and never reused.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetGuid(Uuid);

/// Error returned when a string is not a valid GUID.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid asset GUID '{0}'")]
pub struct ParseGuidError(pub String);

impl AssetGuid {
    /// Generates a new random GUID.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a GUID from its raw 128-bit value.
    pub const fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }

    /// Returns the raw 128-bit value.
    pub fn as_u128(&self) -> u128 {
        self.0.as_u128()
    }

    /// Returns `true` if `s` parses as a GUID.
    ///
    /// Dependency lists mix GUIDs and data-directory-relative paths; this is
    /// how the two are told apart.
    pub fn is_guid_str(s: &str) -> bool {
        Uuid::parse_str(s.trim()).is_ok()
    }
}

impl FromStr for AssetGuid {
    type Err = ParseGuidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| ParseGuidError(s.to_string()))
    }
}

impl fmt::Display for AssetGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl fmt::Debug for AssetGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssetGuid({})", self.0.hyphenated())
    }
}
