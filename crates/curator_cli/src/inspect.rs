//! Read-only commands: `scan`, `deps`, `uses`, `graph` and `stats`.

use std::path::Path;
use std::time::UNIX_EPOCH;

use curator_core::{Curator, Dependency};

use crate::project::{asset_name, open_project};
use crate::GlobalArgs;

/// Runs `curator scan`: lists every asset with its state and type.
pub fn scan(global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let curator = open_project(global)?;
    let summary = curator.check_file_system();
    for error in &summary.errors {
        eprintln!("warning: {error}");
    }
    curator.transform_stats();

    let assets = curator.assets();
    for info in &assets {
        println!(
            "{:<20} {:<12} {}",
            info.state.as_str(),
            info.type_name,
            info.relative_path
        );
    }
    if !global.quiet {
        eprintln!(
            "  {} assets on platform `{}`",
            assets.len(),
            curator.active_platform().name
        );
    }
    curator.close()?;
    Ok(if summary.errors.is_empty() { 0 } else { 1 })
}

/// Runs `curator deps`.
pub fn deps(
    asset: &str,
    transitive: bool,
    global: &GlobalArgs,
) -> Result<i32, Box<dyn std::error::Error>> {
    let curator = open_project(global)?;
    let guid = curator.resolve_asset_spec(asset)?;
    let deps = if transitive {
        curator.transitive_dependencies(guid)
    } else {
        curator.get_direct_dependencies(guid)
    };
    for dep in &deps {
        println!("{}", describe(&curator, dep));
    }
    curator.close()?;
    Ok(0)
}

/// Runs `curator uses`. Accepts assets and plain files.
pub fn uses(
    asset: &str,
    transitive: bool,
    global: &GlobalArgs,
) -> Result<i32, Box<dyn std::error::Error>> {
    let curator = open_project(global)?;
    let users = match curator.resolve_asset_spec(asset) {
        Ok(guid) => curator.find_all_uses(guid, transitive),
        Err(_) => {
            let path = Path::new(asset);
            if !curator.is_referenced(path) {
                return Err(format!("'{asset}' is neither a known asset nor a used file").into());
            }
            let mut users = curator.find_all_uses_of_file(path);
            if transitive {
                let direct: Vec<_> = users.iter().copied().collect();
                for guid in direct {
                    users.extend(curator.find_all_uses(guid, true));
                }
            }
            users
        }
    };
    for guid in users {
        println!("{}", asset_name(&curator, guid));
    }
    curator.close()?;
    Ok(0)
}

/// Runs `curator graph`.
pub fn graph(
    asset: &str,
    output: &Path,
    global: &GlobalArgs,
) -> Result<i32, Box<dyn std::error::Error>> {
    let curator = open_project(global)?;
    let guid = curator.resolve_asset_spec(asset)?;
    curator.write_dependency_dot(guid, output)?;
    if !global.quiet {
        eprintln!("     Wrote {}", output.display());
    }
    curator.close()?;
    Ok(0)
}

/// Runs `curator stats`.
pub fn stats(global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let curator = open_project(global)?;
    for (state, count) in curator.transform_stats() {
        println!("{:<20} {count}", state.as_str());
    }
    if let Some(at) = curator.last_full_transform_date() {
        let secs = at.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
        println!("last full transform: {secs} (unix seconds)");
    }
    curator.close()?;
    Ok(0)
}

fn describe(curator: &Curator, dep: &Dependency) -> String {
    match dep {
        Dependency::Asset(guid) => format!("asset {}", asset_name(curator, *guid)),
        Dependency::File(path) => {
            let shown = path.strip_prefix(curator.project_root()).unwrap_or(path);
            format!("file  {}", shown.display())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn project() -> (TempDir, GlobalArgs) {
        let tmp = TempDir::new().unwrap();
        crate::init::run(Some(tmp.path().join("p").to_str().unwrap().to_string())).unwrap();
        let root = tmp.path().join("p");
        std::fs::write(root.join("data/rock.obj"), "v 0 0 0").unwrap();
        std::fs::write(
            root.join("data/rock.mesh"),
            "guid = \"00000000-0000-0000-0000-000000000001\"\ndependencies = [\"rock.obj\"]\n",
        )
        .unwrap();
        let global = GlobalArgs {
            quiet: true,
            verbose: false,
            config: Some(root.display().to_string()),
            platform: None,
        };
        (tmp, global)
    }

    #[test]
    fn queries_succeed() {
        let (_tmp, global) = project();
        assert_eq!(scan(&global).unwrap(), 0);
        assert_eq!(deps("rock.mesh", true, &global).unwrap(), 0);
        assert_eq!(uses("rock.obj", false, &global).unwrap(), 0);
        assert_eq!(stats(&global).unwrap(), 0);
    }

    #[test]
    fn graph_writes_dot_file() {
        let (tmp, global) = project();
        let out: PathBuf = tmp.path().join("out").join("rock.dot");
        assert_eq!(graph("rock.mesh", &out, &global).unwrap(), 0);
        let dot = std::fs::read_to_string(out).unwrap();
        assert!(dot.starts_with("digraph"));
        assert!(dot.contains("rock.obj"));
    }

    #[test]
    fn unknown_asset_fails() {
        let (_tmp, global) = project();
        assert!(deps("nope.mesh", false, &global).is_err());
        assert!(uses("nope.png", false, &global).is_err());
    }
}
