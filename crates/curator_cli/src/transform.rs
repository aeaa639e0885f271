//! `curator transform`, `curator transform-all`, `curator tables` and
//! `curator gc`.

use std::sync::Arc;
use std::time::Duration;

use curator_core::{
    table_path, CancellationToken, Curator, CuratorError, CuratorEvent, TransformFlags,
    TransformStatus,
};

use crate::project::{asset_name, open_project};
use crate::GlobalArgs;

/// Runs `curator transform`: transforms one asset and its stale dependencies.
pub fn run(asset: &str, force: bool, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let curator = open_project(global)?;
    let guid = curator.resolve_asset_spec(asset)?;
    let status = curator.transform_asset(guid, flags(force), &CancellationToken::new())?;
    report(&curator, &status, global);
    curator.close()?;
    Ok(if status.is_success() { 0 } else { 1 })
}

/// Runs `curator transform-all`: transforms everything in the background and
/// writes the tables, printing progress from the main thread.
pub fn run_all(force: bool, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let curator = Arc::new(open_project(global)?);
    let quiet = global.quiet;
    let _progress = curator.subscribe(move |event| {
        if let CuratorEvent::TransformProgress { completed, total } = event {
            if !quiet {
                eprint!("\r  {completed}/{total} assets");
            }
        }
    });

    let job = curator.spawn_transform_all(flags(force), CancellationToken::new())?;
    while !job.is_finished() {
        curator.main_thread_tick();
        std::thread::sleep(Duration::from_millis(50));
    }
    curator.main_thread_tick();
    if !quiet {
        eprintln!();
    }
    let outcome = job.join().map_err(|_| "transform thread panicked")?;

    let code = match outcome {
        Ok(status) => {
            report(&curator, &status, global);
            0
        }
        Err(e @ CuratorError::BatchFailed { .. }) => {
            for info in curator.assets() {
                if let Some(result) = info.last_result.filter(|r| !r.is_success()) {
                    eprintln!("  failed {}: {}", info.relative_path, result.message);
                }
            }
            eprintln!("error: {e}");
            1
        }
        Err(e) => return Err(e.into()),
    };
    curator.save_caches()?;
    Ok(code)
}

/// Runs `curator gc`: deletes transform stamps of assets that no longer exist.
pub fn gc(global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let curator = open_project(global)?;
    let removed = curator.gc_stamps()?;
    if !global.quiet {
        eprintln!("   Removed {removed} stale stamp(s)");
    }
    curator.close()?;
    Ok(0)
}

/// Runs `curator tables`: writes the lookup table of every platform.
pub fn tables(global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let curator = open_project(global)?;
    curator.write_asset_tables()?;
    if !global.quiet {
        for platform in curator.platforms() {
            eprintln!(
                "     Wrote {}",
                table_path(curator.tables_dir(), &platform.name).display()
            );
        }
    }
    curator.close()?;
    Ok(0)
}

fn flags(force: bool) -> TransformFlags {
    let mut flags = TransformFlags::TRIGGERED_MANUALLY;
    if force {
        flags |= TransformFlags::FORCE_TRANSFORM;
    }
    flags
}

fn report(curator: &Curator, status: &TransformStatus, global: &GlobalArgs) {
    for (guid, result) in &status.results {
        if !result.is_success() {
            eprintln!("  failed {}: {}", asset_name(curator, *guid), result.message);
        }
    }
    if !global.quiet {
        eprintln!(
            "  {} transformed, {} up to date, {} skipped, {} failed{}",
            status.transformed,
            status.up_to_date,
            status.skipped,
            status.failed(),
            if status.cancelled { " (cancelled)" } else { "" }
        );
    }
}
