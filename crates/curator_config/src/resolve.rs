//! Platform profile resolution.

use crate::error::ConfigError;
use crate::types::ProjectConfig;
use curator_common::{ContentHash, HashBuilder};

/// A fully resolved output platform.
///
/// The settings hash feeds into every asset's content hash, so changing a
/// platform's settings makes every asset stale for that platform only.
#[derive(Debug, Clone)]
pub struct PlatformProfile {
    /// The platform name.
    pub name: String,
    /// The platform settings table.
    pub settings: toml::Table,
    /// Stable hash of the name and settings.
    pub settings_hash: ContentHash,
}

/// Resolves a named platform profile.
pub fn resolve_platform(
    config: &ProjectConfig,
    platform_name: &str,
) -> Result<PlatformProfile, ConfigError> {
    let platform = config
        .platforms
        .get(platform_name)
        .ok_or_else(|| ConfigError::UnknownPlatform(platform_name.to_string()))?;

    // `toml::Table` is ordered, so the rendered text is stable across runs.
    let rendered = toml::to_string(&platform.settings)
        .map_err(|e| ConfigError::Invalid(format!("platform '{platform_name}': {e}")))?;
    let settings_hash = HashBuilder::new()
        .str(platform_name)
        .str(&rendered)
        .finish();

    Ok(PlatformProfile {
        name: platform_name.to_string(),
        settings: platform.settings.clone(),
        settings_hash,
    })
}

/// Resolves every configured platform, sorted by name.
pub fn resolve_platforms(config: &ProjectConfig) -> Result<Vec<PlatformProfile>, ConfigError> {
    config
        .platforms
        .keys()
        .map(|name| resolve_platform(config, name))
        .collect()
}

/// Returns the default platform: the first one by sorted name.
pub fn default_platform(config: &ProjectConfig) -> Option<&str> {
    config.platforms.keys().next().map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::load_config_from_str;

    fn config() -> ProjectConfig {
        load_config_from_str(
            r#"
[project]
name = "demo"

[[data_dirs]]
path = "data"

[platforms.pc]
settings = { compression = "none" }

[platforms.android]
settings = { compression = "etc2" }
"#,
        )
        .unwrap()
    }

    #[test]
    fn resolve_known_platform() {
        let p = resolve_platform(&config(), "pc").unwrap();
        assert_eq!(p.name, "pc");
        assert_eq!(p.settings["compression"].as_str(), Some("none"));
    }

    #[test]
    fn resolve_unknown_platform_errors() {
        let err = resolve_platform(&config(), "ps2").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownPlatform(name) if name == "ps2"));
    }

    #[test]
    fn settings_hash_is_stable() {
        let a = resolve_platform(&config(), "pc").unwrap();
        let b = resolve_platform(&config(), "pc").unwrap();
        assert_eq!(a.settings_hash, b.settings_hash);
    }

    #[test]
    fn settings_hash_differs_between_platforms() {
        let cfg = config();
        let pc = resolve_platform(&cfg, "pc").unwrap();
        let android = resolve_platform(&cfg, "android").unwrap();
        assert_ne!(pc.settings_hash, android.settings_hash);
    }

    #[test]
    fn default_is_first_sorted() {
        assert_eq!(default_platform(&config()), Some("android"));
    }

    #[test]
    fn resolve_all_sorted() {
        let names: Vec<String> = resolve_platforms(&config())
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["android", "pc"]);
    }
}
