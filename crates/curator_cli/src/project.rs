//! Project discovery shared by the CLI commands.

use std::path::{Path, PathBuf};

use curator_common::AssetGuid;
use curator_config::{load_config, load_config_file, CONFIG_FILE};
use curator_core::Curator;

use crate::GlobalArgs;

/// Walks up from `start` looking for the nearest directory containing `curator.toml`.
///
/// Returns the directory containing `curator.toml`, or an error if none is found.
pub fn find_project_root(start: &Path) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let mut current = start.to_path_buf();
    loop {
        if current.join(CONFIG_FILE).exists() {
            return Ok(current);
        }
        if !current.pop() {
            return Err(format!(
                "could not find {CONFIG_FILE} in {} or any parent directory",
                start.display()
            )
            .into());
        }
    }
}

/// Resolves the project root directory from global CLI args.
///
/// If `--config` is specified, uses that path (file → parent dir, dir → itself).
/// Otherwise walks up from the current directory looking for `curator.toml`.
pub fn resolve_project_root(global: &GlobalArgs) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let root = match global.config {
        Some(ref config_path) => {
            let p = PathBuf::from(config_path);
            if p.is_file() {
                p.parent()
                    .map(|p| p.to_path_buf())
                    .unwrap_or_else(|| PathBuf::from("."))
            } else {
                p
            }
        }
        None => find_project_root(&std::env::current_dir()?)?,
    };
    if root.is_absolute() {
        Ok(root)
    } else {
        Ok(std::env::current_dir()?.join(root))
    }
}

/// Opens the project selected by the global args and switches to the
/// requested platform.
pub fn open_project(global: &GlobalArgs) -> Result<Curator, Box<dyn std::error::Error>> {
    let root = resolve_project_root(global)?;
    tracing::debug!(root = %root.display(), "opening project");
    let config = match global.config {
        Some(ref path) if Path::new(path).is_file() => load_config_file(Path::new(path))?,
        _ => load_config(&root)?,
    };
    let curator = Curator::open_with_config_types(&root, config)?;
    if let Some(ref platform) = global.platform {
        curator.set_active_platform(platform)?;
    }
    Ok(curator)
}

/// Display name of an asset: its relative path, or the GUID if unknown.
pub fn asset_name(curator: &Curator, guid: AssetGuid) -> String {
    curator
        .lookup(guid)
        .map(|info| info.relative_path)
        .unwrap_or_else(|| guid.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn global(config: Option<String>) -> GlobalArgs {
        GlobalArgs {
            quiet: true,
            verbose: false,
            config,
            platform: None,
        }
    }

    #[test]
    fn finds_root_from_nested_directory() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(CONFIG_FILE), "").unwrap();
        let nested = tmp.path().join("data").join("meshes");
        std::fs::create_dir_all(&nested).unwrap();
        assert_eq!(find_project_root(&nested).unwrap(), tmp.path());
    }

    #[test]
    fn missing_config_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let err = find_project_root(tmp.path()).unwrap_err();
        assert!(err.to_string().contains("could not find curator.toml"));
    }

    #[test]
    fn config_file_selects_its_directory() {
        let tmp = TempDir::new().unwrap();
        let config = tmp.path().join(CONFIG_FILE);
        std::fs::write(&config, "").unwrap();
        let root = resolve_project_root(&global(Some(config.display().to_string()))).unwrap();
        assert_eq!(root, tmp.path());
    }

    #[test]
    fn config_directory_is_the_root() {
        let tmp = TempDir::new().unwrap();
        let root =
            resolve_project_root(&global(Some(tmp.path().display().to_string()))).unwrap();
        assert_eq!(root, tmp.path());
    }
}
