//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::ProjectConfig;
use std::collections::HashMap;
use std::path::Path;

/// File name of the project configuration.
pub const CONFIG_FILE: &str = "curator.toml";

/// Loads and validates a `curator.toml` configuration from a project directory.
///
/// Reads `<project_dir>/curator.toml`, parses it, and validates required fields.
pub fn load_config(project_dir: &Path) -> Result<ProjectConfig, ConfigError> {
    load_config_file(&project_dir.join(CONFIG_FILE))
}

/// Loads and validates a configuration from an explicit file path.
pub fn load_config_file(path: &Path) -> Result<ProjectConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    load_config_from_str(&content)
}

/// Parses and validates a `curator.toml` configuration from a string.
///
/// Useful for testing without filesystem dependencies.
pub fn load_config_from_str(content: &str) -> Result<ProjectConfig, ConfigError> {
    let config: ProjectConfig =
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Validates that required fields are present and configuration values are consistent.
fn validate_config(config: &ProjectConfig) -> Result<(), ConfigError> {
    if config.project.name.is_empty() {
        return Err(ConfigError::MissingField("project.name".to_string()));
    }
    if config.data_dirs.is_empty() {
        return Err(ConfigError::MissingField("data_dirs".to_string()));
    }
    if let Some(dir) = config.data_dirs.iter().find(|d| d.path.trim().is_empty()) {
        return Err(ConfigError::Invalid(format!(
            "data directory path '{}' is empty",
            dir.path
        )));
    }
    if config.platforms.is_empty() {
        return Err(ConfigError::MissingField("platforms".to_string()));
    }
    if config.scheduler.workers == Some(0) {
        return Err(ConfigError::Invalid(
            "scheduler.workers must be at least 1".to_string(),
        ));
    }

    let mut claimed: HashMap<String, &str> = HashMap::new();
    for (name, asset_type) in &config.types {
        if asset_type.extensions.is_empty() {
            return Err(ConfigError::NoExtensions(name.clone()));
        }
        for ext in &asset_type.extensions {
            let key = ext.trim_start_matches('.').to_ascii_lowercase();
            if let Some(other) = claimed.insert(key.clone(), name.as_str()) {
                return Err(ConfigError::DuplicateExtension {
                    extension: key,
                    first: other.to_string(),
                    second: name.clone(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[project]
name = "demo"

[[data_dirs]]
path = "data/base"

[platforms.pc]
"#;

    #[test]
    fn parse_minimal_config() {
        let config = load_config_from_str(MINIMAL).unwrap();
        assert_eq!(config.project.name, "demo");
        assert_eq!(config.data_dirs.len(), 1);
        assert_eq!(config.data_dirs[0].path, "data/base");
        assert!(config.platforms.contains_key("pc"));
        assert!(config.types.is_empty());
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
[project]
name = "demo"
description = "sample game"

[[data_dirs]]
path = "data/base"

[[data_dirs]]
path = "data/project"

[types.mesh]
extensions = ["mesh"]
output_extension = "ezMesh"

[types.material]
extensions = ["mat", "material"]
only_transform_manually = true

[types.collection]
extensions = ["col"]
disable_transform = true

[platforms.pc]
settings = { compression = "none" }

[platforms.android]
settings = { compression = "etc2", max_size = 1024 }

[scheduler]
workers = 4

[cache]
dir = ".state"
tables_dir = "Tables"
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.project.description, "sample game");
        assert_eq!(config.data_dirs.len(), 2);
        assert_eq!(config.types["mesh"].output_extension, "ezMesh");
        assert_eq!(config.types["material"].output_extension, "bin");
        assert!(config.types["material"].only_transform_manually);
        assert!(config.types["collection"].disable_transform);
        assert_eq!(config.platforms.len(), 2);
        assert_eq!(
            config.platforms["android"].settings["max_size"].as_integer(),
            Some(1024)
        );
        assert_eq!(config.scheduler.worker_count(), 4);
        assert_eq!(config.cache.dir, ".state");
        assert_eq!(config.cache.tables_dir, "Tables");
        assert_eq!(
            config.type_for_extension("material").map(|(n, _)| n),
            Some("material")
        );
    }

    #[test]
    fn missing_name_errors() {
        let toml = MINIMAL.replace("name = \"demo\"", "name = \"\"");
        let err = load_config_from_str(&toml).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField(f) if f == "project.name"));
    }

    #[test]
    fn missing_data_dirs_errors() {
        let toml = r#"
[project]
name = "demo"

[platforms.pc]
"#;
        let err = load_config_from_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField(f) if f == "data_dirs"));
    }

    #[test]
    fn missing_platforms_errors() {
        let toml = r#"
[project]
name = "demo"

[[data_dirs]]
path = "data"
"#;
        let err = load_config_from_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField(f) if f == "platforms"));
    }

    #[test]
    fn zero_workers_errors() {
        let toml = format!("{MINIMAL}\n[scheduler]\nworkers = 0\n");
        let err = load_config_from_str(&toml).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn type_without_extensions_errors() {
        let toml = format!("{MINIMAL}\n[types.mesh]\nextensions = []\n");
        let err = load_config_from_str(&toml).unwrap_err();
        assert!(err.to_string().contains("declares no extensions"));
    }

    #[test]
    fn duplicate_extension_errors() {
        let toml = format!(
            "{MINIMAL}\n[types.a]\nextensions = [\"dat\"]\n[types.b]\nextensions = [\".DAT\"]\n"
        );
        let err = load_config_from_str(&toml).unwrap_err();
        assert!(err.to_string().contains("extension 'dat' is claimed"));
    }

    #[test]
    fn invalid_toml_errors() {
        let err = load_config_from_str("this is not valid toml {{{}}}").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), MINIMAL).unwrap();
        let config = load_config(dir.path()).unwrap();
        assert_eq!(config.project.name, "demo");
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
