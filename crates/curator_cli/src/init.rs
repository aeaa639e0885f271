//! `curator init`: project scaffolding command.
//!
//! Creates a project directory with a `curator.toml`, a `data/` directory and
//! one example mesh document.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use curator_config::CONFIG_FILE;
use curator_core::TomlAssetManager;

/// Runs `curator init`, in a new directory `name` or else in the current one.
pub fn run(name: Option<String>) -> Result<i32, Box<dyn std::error::Error>> {
    let project_dir = match name.map(PathBuf::from) {
        Some(dir) if dir.exists() => {
            return Err(format!("directory '{}' already exists", dir.display()).into());
        }
        Some(dir) => {
            fs::create_dir_all(&dir)?;
            dir
        }
        None => std::env::current_dir()?,
    };
    if project_dir.join(CONFIG_FILE).exists() {
        return Err(format!("{} already contains {CONFIG_FILE}", project_dir.display()).into());
    }

    let project_name = project_dir
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("assets");

    eprintln!("  Creating new curator project `{project_name}`");

    fs::create_dir_all(project_dir.join("data"))?;
    write_config(&project_dir, project_name)?;
    let example = project_dir.join("data").join("example.mesh");
    fs::write(&example, TomlAssetManager::new_document(&[], &[]))?;

    eprintln!("     Created {}", project_dir.join(CONFIG_FILE).display());
    eprintln!("     Created {}", example.display());

    Ok(0)
}

/// Writes the `curator.toml` configuration file.
fn write_config(root: &Path, name: &str) -> io::Result<()> {
    let content = format!(
        r#"[project]
name = "{name}"

[[data_dirs]]
path = "data"

[types.mesh]
extensions = ["mesh"]
output_extension = "bin"

[platforms.pc]

[scheduler]
# workers = 4

[cache]
dir = ".curator"
tables_dir = "AssetCache"
"#
    );
    fs::write(root.join(CONFIG_FILE), content)
}
