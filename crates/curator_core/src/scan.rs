//! Data directory discovery.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use curator_common::normalize_path;

use crate::manager::AssetTypeManager;

/// An asset document found under a data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    /// Absolute path.
    pub absolute: PathBuf,
    /// Path relative to its data directory, with `/` separators.
    pub relative: String,
    /// Type name of the manager that handles the file.
    pub type_name: String,
}

/// Walks every data directory collecting files some manager handles.
///
/// Directories whose name starts with a dot are skipped. Unreadable
/// directories are logged and skipped. Results are sorted by absolute path.
pub fn scan_data_dirs(
    data_dirs: &[PathBuf],
    managers: &[Arc<dyn AssetTypeManager>],
) -> Vec<DiscoveredFile> {
    let mut files = Vec::new();
    for root in data_dirs {
        let mut stack = vec![root.clone()];
        while let Some(dir) = stack.pop() {
            let entries = match std::fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(dir = %dir.display(), error = %e, "skipping unreadable directory");
                    continue;
                }
            };
            for entry in entries.flatten() {
                let path = entry.path();
                let hidden = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with('.'));
                if path.is_dir() {
                    if !hidden {
                        stack.push(path);
                    }
                    continue;
                }
                let Some(manager) = manager_for(managers, &path) else {
                    continue;
                };
                let Ok(relative) = path.strip_prefix(root) else {
                    continue;
                };
                files.push(DiscoveredFile {
                    relative: normalize_path(relative),
                    type_name: manager.type_name().to_string(),
                    absolute: path,
                });
            }
        }
    }
    files.sort_by(|a, b| a.absolute.cmp(&b.absolute));
    files
}

/// Returns the manager handling `path` by extension.
pub fn manager_for<'a>(
    managers: &'a [Arc<dyn AssetTypeManager>],
    path: &Path,
) -> Option<&'a Arc<dyn AssetTypeManager>> {
    let ext = path.extension()?.to_str()?;
    managers.iter().find(|m| m.handles_extension(ext))
}

/// Resolves a data-directory-relative path to an absolute one.
///
/// The first data directory containing the file wins; if none does, the path
/// is placed under the first data directory.
pub fn resolve_data_path(data_dirs: &[PathBuf], relative: &str) -> PathBuf {
    data_dirs
        .iter()
        .map(|dir| dir.join(relative))
        .find(|candidate| candidate.exists())
        .or_else(|| data_dirs.first().map(|dir| dir.join(relative)))
        .unwrap_or_else(|| PathBuf::from(relative))
}

/// Returns the data directory and relative path of an absolute path.
pub fn split_data_path(data_dirs: &[PathBuf], path: &Path) -> Option<(PathBuf, String)> {
    let normalized = PathBuf::from(normalize_path(path));
    data_dirs.iter().find_map(|dir| {
        let dir = PathBuf::from(normalize_path(dir));
        normalized
            .strip_prefix(&dir)
            .ok()
            .map(|rel| (dir.clone(), normalize_path(rel)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::TomlAssetManager;
    use curator_config::AssetTypeConfig;

    fn managers() -> Vec<Arc<dyn AssetTypeManager>> {
        let mesh = AssetTypeConfig {
            extensions: vec!["mesh".into()],
            output_extension: "bin".into(),
            only_transform_manually: false,
            disable_transform: false,
        };
        let mat = AssetTypeConfig {
            extensions: vec!["mat".into()],
            ..mesh.clone()
        };
        vec![
            Arc::new(TomlAssetManager::new("mesh", mesh, "AssetCache")),
            Arc::new(TomlAssetManager::new("material", mat, "AssetCache")),
        ]
    }

    #[test]
    fn discovers_handled_files_recursively() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        std::fs::create_dir_all(data.join("meshes/props")).unwrap();
        std::fs::create_dir_all(data.join(".hidden")).unwrap();
        std::fs::write(data.join("meshes/box.mesh"), "").unwrap();
        std::fs::write(data.join("meshes/props/crate.mesh"), "").unwrap();
        std::fs::write(data.join("meshes/box.obj"), "").unwrap();
        std::fs::write(data.join("wood.mat"), "").unwrap();
        std::fs::write(data.join(".hidden/ghost.mesh"), "").unwrap();

        let found = scan_data_dirs(&[data], &managers());
        let rel: Vec<(&str, &str)> = found
            .iter()
            .map(|f| (f.relative.as_str(), f.type_name.as_str()))
            .collect();
        assert_eq!(
            rel,
            vec![
                ("meshes/box.mesh", "mesh"),
                ("meshes/props/crate.mesh", "mesh"),
                ("wood.mat", "material"),
            ]
        );
    }

    #[test]
    fn missing_data_dir_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(scan_data_dirs(&[dir.path().join("nope")], &managers()).is_empty());
    }

    #[test]
    fn resolve_prefers_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base");
        let extra = dir.path().join("extra");
        std::fs::create_dir_all(&extra).unwrap();
        std::fs::write(extra.join("a.png"), "").unwrap();
        let dirs = vec![base.clone(), extra.clone()];
        assert_eq!(resolve_data_path(&dirs, "a.png"), extra.join("a.png"));
        assert_eq!(resolve_data_path(&dirs, "b.png"), base.join("b.png"));
    }

    #[test]
    fn split_finds_owning_data_dir() {
        let dirs = vec![PathBuf::from("/p/base"), PathBuf::from("/p/extra")];
        let (dir, rel) = split_data_path(&dirs, Path::new("/p/extra/meshes/../a.mesh")).unwrap();
        assert_eq!(dir, PathBuf::from("/p/extra"));
        assert_eq!(rel, "a.mesh");
        assert!(split_data_path(&dirs, Path::new("/q/a.mesh")).is_none());
    }
}
