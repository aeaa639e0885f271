//! Curator CLI: the command-line front end of the asset curator.
//!
//! Provides `curator init` for project scaffolding, `curator scan` and
//! `curator stats` for inspecting asset state, `curator transform` and
//! `curator transform-all` for running transforms, `curator tables` for the
//! lookup tables, and `curator deps`, `curator uses` and `curator graph` for
//! dependency queries.

#![warn(missing_docs)]

mod init;
mod inspect;
mod project;
mod transform;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Curator: incremental asset transforms.
#[derive(Parser, Debug)]
#[command(name = "curator", version, about = "Incremental asset dependency tracker")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose (debug-level) output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a custom `curator.toml` configuration file or project directory.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Platform profile to work on instead of the default one.
    #[arg(short, long, global = true)]
    pub platform: Option<String>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a new curator project.
    Init {
        /// Project name (creates a subdirectory). If omitted, initializes in
        /// the current directory.
        name: Option<String>,
    },
    /// List every asset with its type and transform state.
    Scan,
    /// Transform one asset and its stale dependencies.
    Transform {
        /// Asset GUID or path.
        asset: String,

        /// Retransform the asset even if it is up to date.
        #[arg(long)]
        force: bool,
    },
    /// Transform every asset and write the lookup tables.
    TransformAll {
        /// Retransform every asset even if it is up to date.
        #[arg(long)]
        force: bool,
    },
    /// Write the lookup tables of every platform.
    Tables,
    /// Show what an asset depends on.
    Deps {
        /// Asset GUID or path.
        asset: String,

        /// Include indirect dependencies.
        #[arg(long)]
        transitive: bool,
    },
    /// Show which assets use an asset or plain file.
    Uses {
        /// Asset GUID, asset path or plain file path.
        asset: String,

        /// Include indirect users.
        #[arg(long)]
        transitive: bool,
    },
    /// Export an asset's dependency graph as Graphviz DOT.
    Graph {
        /// Asset GUID or path.
        asset: String,

        /// Output file.
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Count assets per transform state.
    Stats,
    /// Delete transform stamps of assets that no longer exist.
    Gc,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// Whether to print verbose/debug information.
    pub verbose: bool,
    /// Optional path to a custom config file or project directory.
    pub config: Option<String>,
    /// Optional platform override.
    pub platform: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    let global = GlobalArgs {
        quiet: cli.quiet,
        verbose: cli.verbose,
        config: cli.config,
        platform: cli.platform,
    };
    init_tracing(&global);

    let result = match cli.command {
        Command::Init { name } => init::run(name),
        Command::Scan => inspect::scan(&global),
        Command::Transform { ref asset, force } => transform::run(asset, force, &global),
        Command::TransformAll { force } => transform::run_all(force, &global),
        Command::Tables => transform::tables(&global),
        Command::Deps {
            ref asset,
            transitive,
        } => inspect::deps(asset, transitive, &global),
        Command::Uses {
            ref asset,
            transitive,
        } => inspect::uses(asset, transitive, &global),
        Command::Graph {
            ref asset,
            ref output,
        } => inspect::graph(asset, output, &global),
        Command::Stats => inspect::stats(&global),
        Command::Gc => transform::gc(&global),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}

/// Installs the log subscriber. `RUST_LOG` overrides the level chosen by
/// `--quiet` and `--verbose`.
fn init_tracing(global: &GlobalArgs) {
    let level = if global.quiet {
        "error"
    } else if global.verbose {
        "debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parse_init_default() {
        let cli = Cli::parse_from(["curator", "init"]);
        match cli.command {
            Command::Init { name } => assert!(name.is_none()),
            _ => panic!("expected Init command"),
        }
    }

    #[test]
    fn parse_init_with_name() {
        let cli = Cli::parse_from(["curator", "init", "my_game"]);
        match cli.command {
            Command::Init { name } => assert_eq!(name.as_deref(), Some("my_game")),
            _ => panic!("expected Init command"),
        }
    }

    #[test]
    fn parse_transform_force() {
        let cli = Cli::parse_from(["curator", "transform", "meshes/box.mesh", "--force"]);
        match cli.command {
            Command::Transform { asset, force } => {
                assert_eq!(asset, "meshes/box.mesh");
                assert!(force);
            }
            _ => panic!("expected Transform command"),
        }
    }

    #[test]
    fn parse_transform_all() {
        let cli = Cli::parse_from(["curator", "transform-all"]);
        assert!(matches!(cli.command, Command::TransformAll { force: false }));
    }

    #[test]
    fn parse_gc() {
        let cli = Cli::parse_from(["curator", "gc"]);
        assert!(matches!(cli.command, Command::Gc));
    }

    #[test]
    fn parse_deps_transitive() {
        let cli = Cli::parse_from(["curator", "deps", "box.mat", "--transitive"]);
        match cli.command {
            Command::Deps { asset, transitive } => {
                assert_eq!(asset, "box.mat");
                assert!(transitive);
            }
            _ => panic!("expected Deps command"),
        }
    }

    #[test]
    fn parse_graph_output() {
        let cli = Cli::parse_from(["curator", "graph", "box.mat", "-o", "out/box.dot"]);
        match cli.command {
            Command::Graph { asset, output } => {
                assert_eq!(asset, "box.mat");
                assert_eq!(output, PathBuf::from("out/box.dot"));
            }
            _ => panic!("expected Graph command"),
        }
    }

    #[test]
    fn parse_global_flags() {
        let cli = Cli::parse_from([
            "curator",
            "--quiet",
            "--platform",
            "android",
            "--config",
            "/path/to/curator.toml",
            "stats",
        ]);
        assert!(cli.quiet);
        assert!(!cli.verbose);
        assert_eq!(cli.platform.as_deref(), Some("android"));
        assert_eq!(cli.config.as_deref(), Some("/path/to/curator.toml"));
        assert!(matches!(cli.command, Command::Stats));
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::parse_from(["curator", "scan", "--verbose"]);
        assert!(cli.verbose);
        assert!(matches!(cli.command, Command::Scan));
    }
}
