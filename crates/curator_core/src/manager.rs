//! Per-type asset document managers.
//!
//! The curator knows nothing about meshes, textures or materials. Every asset
//! type is served by an [`AssetTypeManager`] that reads the document header
//! (GUID, dependencies, references, settings), names the output files for a
//! platform, and performs the actual transform.

use std::path::{Path, PathBuf};

use bitflags::bitflags;
use curator_common::{AssetGuid, ContentHash, HashBuilder, LogEntry, LogLevel};
use curator_config::{AssetTypeConfig, PlatformProfile};
use parking_lot::Mutex;
use serde::Deserialize;

use crate::asset::DependencyRef;

bitflags! {
    /// Behaviour flags of an asset type.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AssetTypeFlags: u8 {
        /// Skip automatic transforms; only transform when triggered manually.
        const ONLY_TRANSFORM_MANUALLY = 1 << 0;
        /// Never transform; assets of this type always count as up to date.
        const DISABLE_TRANSFORM = 1 << 1;
    }
}

/// Header information read from an asset document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetDocumentInfo {
    /// Persisted identity.
    pub guid: AssetGuid,
    /// Declared transform dependencies.
    pub dependencies: Vec<DependencyRef>,
    /// Declared weak references.
    pub references: Vec<DependencyRef>,
    /// Hash of the transform settings stored in the document.
    pub settings_hash: ContentHash,
}

/// Description of a registered document type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentDescriptor {
    /// Type name.
    pub type_name: String,
    /// Handled file extensions.
    pub extensions: Vec<String>,
    /// Behaviour flags.
    pub flags: AssetTypeFlags,
}

/// Inputs of one transform invocation.
#[derive(Debug)]
pub struct TransformContext<'a> {
    /// The asset being transformed.
    pub guid: AssetGuid,
    /// Absolute path of the source document.
    pub source_path: &'a Path,
    /// Data-directory-relative path of the source document.
    pub relative_path: &'a str,
    /// Target platform.
    pub platform: &'a PlatformProfile,
    /// Absolute paths of the plain-file dependencies, in declaration order.
    pub file_dependencies: &'a [PathBuf],
    /// Absolute paths the transform must write.
    pub outputs: &'a [PathBuf],
    pub(crate) log: &'a TransformLog,
}

impl TransformContext<'_> {
    /// Appends a line to the asset's transform log. The line is also
    /// emitted as a `tracing` event.
    pub fn log(&self, level: LogLevel, text: impl Into<String>) {
        let text = text.into();
        match level {
            LogLevel::Info => tracing::debug!(asset = self.relative_path, "{text}"),
            LogLevel::Warning => tracing::warn!(asset = self.relative_path, "{text}"),
            LogLevel::Error => tracing::error!(asset = self.relative_path, "{text}"),
        }
        self.log.push(LogEntry::new(level, text));
    }
}

/// Lines collected from one transform callback.
#[derive(Debug, Default)]
pub(crate) struct TransformLog {
    entries: Mutex<Vec<LogEntry>>,
}

impl TransformLog {
    pub(crate) fn push(&self, entry: LogEntry) {
        self.entries.lock().push(entry);
    }

    pub(crate) fn into_entries(self) -> Vec<LogEntry> {
        self.entries.into_inner()
    }
}

/// A document manager serving one asset type.
///
/// Implementations are shared between transform workers and must be
/// thread-safe.
pub trait AssetTypeManager: Send + Sync {
    /// The type name, e.g. `"mesh"`.
    fn type_name(&self) -> &str;

    /// File extensions (without the leading dot) handled by this type.
    fn extensions(&self) -> &[String];

    /// Behaviour flags.
    fn flags(&self) -> AssetTypeFlags {
        AssetTypeFlags::empty()
    }

    /// Reads the document header from the raw document bytes.
    fn read_document_info(&self, path: &Path, bytes: &[u8]) -> Result<AssetDocumentInfo, String>;

    /// Output files for `relative_path` on `platform`, relative to the
    /// project root with `/` separators. The first output is the one
    /// recorded in the lookup tables.
    fn output_paths(&self, relative_path: &str, platform: &PlatformProfile) -> Vec<String>;

    /// Produces the outputs. Errors are reported as a message.
    fn transform(&self, ctx: &TransformContext<'_>) -> Result<(), String>;

    /// Returns `true` if this manager handles files with extension `ext`.
    fn handles_extension(&self, ext: &str) -> bool {
        let ext = ext.trim_start_matches('.');
        self.extensions()
            .iter()
            .any(|e| e.trim_start_matches('.').eq_ignore_ascii_case(ext))
    }

    /// Returns the descriptor of this type.
    fn descriptor(&self) -> DocumentDescriptor {
        DocumentDescriptor {
            type_name: self.type_name().to_string(),
            extensions: self.extensions().to_vec(),
            flags: self.flags(),
        }
    }
}

/// On-disk layout of a TOML asset document.
#[derive(Debug, Deserialize)]
struct TomlDocument {
    guid: AssetGuid,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default)]
    references: Vec<String>,
    #[serde(default)]
    settings: toml::Table,
}

/// Manager for TOML asset documents configured through `[types.*]`.
///
/// Its transform concatenates the document with every plain-file dependency
/// and writes the result to `<tables_dir>/<platform>/<relative path>.<ext>`.
pub struct TomlAssetManager {
    type_name: String,
    config: AssetTypeConfig,
    tables_dir: String,
}

impl TomlAssetManager {
    /// Creates a manager for one configured type.
    pub fn new(type_name: &str, config: AssetTypeConfig, tables_dir: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
            config,
            tables_dir: tables_dir.trim_end_matches('/').to_string(),
        }
    }

    /// Renders a new document with a fresh GUID.
    pub fn new_document(dependencies: &[&str], references: &[&str]) -> String {
        format!(
            "guid = \"{}\"\ndependencies = {:?}\nreferences = {:?}\n\n[settings]\n",
            AssetGuid::generate(),
            dependencies,
            references
        )
    }
}

impl AssetTypeManager for TomlAssetManager {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn extensions(&self) -> &[String] {
        &self.config.extensions
    }

    fn flags(&self) -> AssetTypeFlags {
        let mut flags = AssetTypeFlags::empty();
        flags.set(
            AssetTypeFlags::ONLY_TRANSFORM_MANUALLY,
            self.config.only_transform_manually,
        );
        flags.set(AssetTypeFlags::DISABLE_TRANSFORM, self.config.disable_transform);
        flags
    }

    fn read_document_info(&self, _path: &Path, bytes: &[u8]) -> Result<AssetDocumentInfo, String> {
        let text = std::str::from_utf8(bytes).map_err(|e| e.to_string())?;
        let doc: TomlDocument = toml::from_str(text).map_err(|e| e.to_string())?;
        let settings = toml::to_string(&doc.settings).map_err(|e| e.to_string())?;
        Ok(AssetDocumentInfo {
            guid: doc.guid,
            dependencies: doc.dependencies.iter().map(|d| DependencyRef::parse(d)).collect(),
            references: doc.references.iter().map(|r| DependencyRef::parse(r)).collect(),
            settings_hash: HashBuilder::new()
                .str(&self.type_name)
                .str(&self.config.output_extension)
                .str(&settings)
                .finish(),
        })
    }

    fn output_paths(&self, relative_path: &str, platform: &PlatformProfile) -> Vec<String> {
        vec![format!(
            "{}/{}/{}.{}",
            self.tables_dir, platform.name, relative_path, self.config.output_extension
        )]
    }

    fn transform(&self, ctx: &TransformContext<'_>) -> Result<(), String> {
        let mut payload =
            std::fs::read(ctx.source_path).map_err(|e| format!("{}: {e}", ctx.source_path.display()))?;
        for dep in ctx.file_dependencies {
            let bytes = std::fs::read(dep).map_err(|e| format!("{}: {e}", dep.display()))?;
            payload.extend_from_slice(&bytes);
        }
        for output in ctx.outputs {
            if let Some(parent) = output.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| format!("{}: {e}", parent.display()))?;
            }
            std::fs::write(output, &payload).map_err(|e| format!("{}: {e}", output.display()))?;
        }
        ctx.log(
            LogLevel::Info,
            format!(
                "wrote {} bytes from {} input(s) for {}",
                payload.len(),
                ctx.file_dependencies.len() + 1,
                ctx.platform.name
            ),
        );
        Ok(())
    }
}
