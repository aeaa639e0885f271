//! Configuration types deserialized from `curator.toml`.

use serde::Deserialize;
use std::collections::BTreeMap;

/// The top-level project configuration parsed from `curator.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectConfig {
    /// Core project metadata.
    pub project: ProjectMeta,
    /// Data directories scanned for asset documents, in priority order.
    #[serde(default)]
    pub data_dirs: Vec<DataDirConfig>,
    /// Asset document types keyed by type name (e.g. "mesh", "material").
    #[serde(default)]
    pub types: BTreeMap<String, AssetTypeConfig>,
    /// Output platform profiles keyed by name (e.g. "pc", "android").
    #[serde(default)]
    pub platforms: BTreeMap<String, PlatformConfig>,
    /// Transform worker pool settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Location of persisted curator state and lookup tables.
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Core project metadata required in every `curator.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectMeta {
    /// The project name.
    pub name: String,
    /// A brief description of the project.
    #[serde(default)]
    pub description: String,
}

/// A registered data directory.
#[derive(Debug, Clone, Deserialize)]
pub struct DataDirConfig {
    /// Directory path, relative to the project root unless absolute.
    pub path: String,
}

/// Settings for one asset document type.
#[derive(Debug, Clone, Deserialize)]
pub struct AssetTypeConfig {
    /// File extensions (without the leading dot) handled by this type.
    pub extensions: Vec<String>,
    /// Extension of the transform output file.
    #[serde(default = "default_output_extension")]
    pub output_extension: String,
    /// Skip automatic transforms; only transform when triggered manually.
    #[serde(default)]
    pub only_transform_manually: bool,
    /// Never transform assets of this type.
    #[serde(default)]
    pub disable_transform: bool,
}

impl AssetTypeConfig {
    /// Returns `true` if `ext` is one of this type's extensions (case-insensitive).
    pub fn handles_extension(&self, ext: &str) -> bool {
        let ext = ext.trim_start_matches('.');
        self.extensions
            .iter()
            .any(|e| e.trim_start_matches('.').eq_ignore_ascii_case(ext))
    }
}

fn default_output_extension() -> String {
    "bin".to_string()
}

/// An output platform profile.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlatformConfig {
    /// Free-form settings fed into every transform for this platform.
    #[serde(default)]
    pub settings: toml::Table,
}

/// Transform worker pool settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum number of concurrently running transforms.
    #[serde(default)]
    pub workers: Option<usize>,
}

impl SchedulerConfig {
    /// Returns the configured worker count, or the available parallelism.
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}

/// Location of persisted curator state.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Directory for the manifest and transform stamps, relative to the project root.
    #[serde(default = "default_cache_dir")]
    pub dir: String,
    /// Directory for lookup tables and transform outputs, relative to the project root.
    #[serde(default = "default_tables_dir")]
    pub tables_dir: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            tables_dir: default_tables_dir(),
        }
    }
}

fn default_cache_dir() -> String {
    ".curator".to_string()
}

fn default_tables_dir() -> String {
    "AssetCache".to_string()
}

impl ProjectConfig {
    /// Returns the asset type that handles files with extension `ext`.
    pub fn type_for_extension(&self, ext: &str) -> Option<(&str, &AssetTypeConfig)> {
        self.types
            .iter()
            .find(|(_, t)| t.handles_extension(ext))
            .map(|(name, t)| (name.as_str(), t))
    }
}
