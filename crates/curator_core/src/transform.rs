//! Transform execution and lookup table writing.
//!
//! A transform call resolves the dependency closure of its roots, orders it
//! into topological generations and runs each generation on the worker pool.
//! Nodes are visited dependencies-first; a node whose dependency failed in
//! the same call fails without running, as does a node whose manual-only
//! dependency was skipped while out of date. Assets on or behind a cycle are
//! reported as [`FailureKind::CyclicDependency`] while the rest of the
//! closure proceeds.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::SystemTime;

use curator_cache::{unix_millis, TransformStamp};
use curator_common::{normalize_path, AssetGuid, LogEntry, LogLevel};
use curator_config::PlatformProfile;
use rayon::prelude::*;

use crate::asset::DependencyRef;
use crate::curator::Curator;
use crate::error::CuratorError;
use crate::events::CuratorEvent;
use crate::graph::DepNode;
use crate::manager::{AssetTypeFlags, TransformContext, TransformLog};
use crate::scan::resolve_data_path;
use crate::scheduler::{
    CancellationToken, FailureKind, Slot, TransformFlags, TransformResult, TransformStatus,
};
use crate::staleness::{display_name, stamp_is_current, ComputedHash};
use crate::tables::{table_path, write_asset_table};

/// What happened to one scheduled node.
enum Visit {
    /// The type's transform callback ran (successfully or not).
    Ran(Arc<TransformResult>),
    /// The asset was already up to date.
    Current(Arc<TransformResult>),
    /// The asset failed before its callback could run.
    Failed(Arc<TransformResult>),
    /// Another caller was transforming the asset; this is its result.
    Joined(Arc<TransformResult>),
    /// The type only transforms manually. `current` tells whether its
    /// outputs are still usable by dependents.
    Skipped { current: bool },
    /// The asset disappeared while the call was running.
    Gone,
    Cancelled,
}

/// A node's inputs, snapshotted under the read lock.
struct NodeSnapshot {
    type_name: String,
    relative: String,
    absolute: PathBuf,
    file_dependencies: Vec<PathBuf>,
    /// A dependency that cannot be used, and why.
    blocked_by: Option<String>,
}

/// Why a dependency keeps its dependents from running.
#[derive(Clone, Copy)]
enum Blocker {
    Failed,
    SkippedStale,
}

impl Curator {
    /// Transforms `guid` and every stale asset it depends on.
    ///
    /// Dependencies are always visited before their dependents. Only the
    /// requested asset is affected by [`TransformFlags::FORCE_TRANSFORM`].
    /// Per-asset failures are reported in the returned status; `Err` is
    /// returned only for an unknown GUID.
    #[tracing::instrument(skip(self, cancel))]
    pub fn transform_asset(
        &self,
        guid: AssetGuid,
        flags: TransformFlags,
        cancel: &CancellationToken,
    ) -> Result<TransformStatus, CuratorError> {
        if self.db.read().store.lookup(guid).is_none() {
            return Err(CuratorError::UnknownAsset(guid.to_string()));
        }
        let status = self.run_transforms(&[guid], flags, cancel);
        if let Some((failed, result)) = status.first_failure() {
            tracing::warn!(
                asset = %display_name(&self.db.read().store, failed),
                reason = %result.failure.map(|k| k.to_string()).unwrap_or_default(),
                message = %result.message,
                "transform did not succeed"
            );
        }
        Ok(status)
    }

    /// Transforms every known asset, then writes the lookup tables and
    /// records the completion date.
    ///
    /// Fails with [`CuratorError::Cancelled`] or [`CuratorError::BatchFailed`]
    /// if not every asset could be brought up to date; the tables are only
    /// written after a clean run.
    #[tracing::instrument(skip(self, cancel))]
    pub fn transform_all(
        &self,
        flags: TransformFlags,
        cancel: &CancellationToken,
    ) -> Result<TransformStatus, CuratorError> {
        let roots = self.db.read().store.guids();
        let status = self.run_transforms(&roots, flags, cancel);
        tracing::info!(
            transformed = status.transformed,
            up_to_date = status.up_to_date,
            skipped = status.skipped,
            failed = status.failed(),
            "transform all finished"
        );

        if status.cancelled {
            self.save_caches()?;
            return Err(CuratorError::Cancelled);
        }
        let failed = status.failed();
        if failed > 0 {
            self.save_caches()?;
            return Err(CuratorError::BatchFailed {
                failed,
                total: status.results.len(),
            });
        }
        self.write_asset_tables()?;
        self.cache.set_last_full_transform(unix_millis(SystemTime::now()));
        self.save_caches()?;
        Ok(status)
    }

    /// Runs [`transform_all`](Self::transform_all) on a background thread.
    ///
    /// Progress is queued as [`CuratorEvent::TransformProgress`] and reaches
    /// subscribers through [`main_thread_tick`](Self::main_thread_tick) while
    /// the job runs. Cancel it through `cancel`; join the handle for the
    /// outcome.
    pub fn spawn_transform_all(
        self: &Arc<Self>,
        flags: TransformFlags,
        cancel: CancellationToken,
    ) -> Result<JoinHandle<Result<TransformStatus, CuratorError>>, CuratorError> {
        let curator = Arc::clone(self);
        std::thread::Builder::new()
            .name("curator-transform-all".to_string())
            .spawn(move || curator.transform_all(flags, &cancel))
            .map_err(|e| CuratorError::WorkerPool(e.to_string()))
    }

    /// Writes the lookup table of every platform.
    ///
    /// Each table lists every known asset with a successful transform for
    /// that platform, mapped to the absolute path of its first output. All
    /// platforms are attempted; the call fails if any of them could not be
    /// written.
    #[tracing::instrument(skip(self))]
    pub fn write_asset_tables(&self) -> Result<(), CuratorError> {
        let guids = self.db.read().store.guids();
        let mut failed = Vec::new();
        let mut first_message = None;

        for platform in self.platforms() {
            let entries: BTreeMap<AssetGuid, String> = guids
                .iter()
                .filter_map(|guid| {
                    let stamp = self.cache.stamps().read_stamp(&platform.name, *guid)?;
                    let output = stamp.outputs.into_iter().next()?;
                    Some((*guid, normalize_path(&self.project_root.join(output))))
                })
                .collect();
            let path = table_path(self.tables_dir(), &platform.name);
            match write_asset_table(&path, &entries) {
                Ok(()) => {
                    tracing::info!(platform = %platform.name, entries = entries.len(), "wrote asset table");
                }
                Err(e) => {
                    tracing::error!(platform = %platform.name, error = %e, "failed to write asset table");
                    first_message.get_or_insert_with(|| e.to_string());
                    failed.push(platform.name.clone());
                }
            }
        }

        match first_message {
            None => Ok(()),
            Some(message) => Err(CuratorError::TableWrite {
                platforms: failed,
                message,
            }),
        }
    }

    fn run_transforms(
        &self,
        roots: &[AssetGuid],
        flags: TransformFlags,
        cancel: &CancellationToken,
    ) -> TransformStatus {
        let platform = self.active_platform().clone();
        let schedule = self.db.read().graph.schedule(roots);
        let roots: HashSet<AssetGuid> = roots.iter().copied().collect();
        let total = schedule.len();
        let completed = AtomicUsize::new(0);
        let mut status = TransformStatus::default();
        let mut blocked: HashMap<AssetGuid, Blocker> = HashMap::new();

        let progress = || {
            let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
            self.events.queue(CuratorEvent::TransformProgress {
                completed: done,
                total,
            });
        };

        for generation in &schedule.generations {
            let visits: Vec<(AssetGuid, Visit)> = self.pool.install(|| {
                generation
                    .par_iter()
                    .map(|&guid| {
                        if cancel.is_cancelled() {
                            return (guid, Visit::Cancelled);
                        }
                        let visit =
                            self.visit(guid, flags, roots.contains(&guid), &platform, &blocked);
                        progress();
                        (guid, visit)
                    })
                    .collect()
            });
            for (guid, visit) in visits {
                absorb(&mut status, &mut blocked, guid, visit);
            }
            if status.cancelled {
                break;
            }
        }

        for &guid in &schedule.blocked {
            if status.cancelled || cancel.is_cancelled() {
                status.cancelled = true;
                break;
            }
            let visit = self.fail_blocked(guid);
            progress();
            absorb(&mut status, &mut blocked, guid, visit);
        }
        status
    }

    /// Runs one scheduled node, joining a transform of the same asset that
    /// is already in flight.
    ///
    /// A forced root never adopts another caller's result: it waits for the
    /// running transform to finish and then runs its own.
    fn visit(
        &self,
        guid: AssetGuid,
        flags: TransformFlags,
        is_root: bool,
        platform: &PlatformProfile,
        blocked: &HashMap<AssetGuid, Blocker>,
    ) -> Visit {
        let Some(node) = self.snapshot(guid, blocked) else {
            return Visit::Gone;
        };
        let type_flags = self.type_flags(&node.type_name);
        if type_flags.contains(AssetTypeFlags::ONLY_TRANSFORM_MANUALLY)
            && !flags.contains(TransformFlags::TRIGGERED_MANUALLY)
        {
            let current = matches!(self.is_stale(guid), Ok(false));
            tracing::debug!(asset = %node.relative, current, "skipping manual-only asset");
            return Visit::Skipped { current };
        }

        let force = is_root && flags.contains(TransformFlags::FORCE_TRANSFORM);
        let guard = loop {
            match self.in_flight.acquire(guid) {
                Slot::Leader(guard) => break guard,
                Slot::Follower(_) if force => continue,
                Slot::Follower(result) => return Visit::Joined(result),
            }
        };
        let visit = self.lead(guid, &node, type_flags, force, platform);
        let result = match &visit {
            Visit::Ran(r) | Visit::Current(r) | Visit::Failed(r) | Visit::Joined(r) => {
                Arc::clone(r)
            }
            Visit::Skipped { .. } | Visit::Gone | Visit::Cancelled => {
                Arc::new(TransformResult::failed(
                    FailureKind::TransformFailed,
                    "transform was not run",
                    None,
                ))
            }
        };
        guard.complete(result);
        visit
    }

    fn snapshot(
        &self,
        guid: AssetGuid,
        blocked: &HashMap<AssetGuid, Blocker>,
    ) -> Option<NodeSnapshot> {
        let db = self.db.read();
        let info = db.store.lookup(guid)?;
        let blocked_by = db
            .graph
            .direct_dependencies(guid)
            .into_iter()
            .filter_map(DepNode::as_asset)
            .find_map(|dep| blocked.get(&dep).map(|blocker| (dep, *blocker)))
            .map(|(dep, blocker)| {
                let name = display_name(&db.store, dep);
                match blocker {
                    Blocker::Failed => format!("dependency '{name}' failed to transform"),
                    Blocker::SkippedStale => format!(
                        "dependency '{name}' is out of date and only transforms manually"
                    ),
                }
            });
        let file_dependencies = info
            .dependencies
            .iter()
            .filter_map(|dep| match dep {
                DependencyRef::File(relative) => Some(resolve_data_path(&self.data_dirs, relative)),
                DependencyRef::Asset(_) => None,
            })
            .collect();
        Some(NodeSnapshot {
            type_name: info.type_name.clone(),
            relative: info.relative_path.clone(),
            absolute: info.absolute_path.clone(),
            file_dependencies,
            blocked_by,
        })
    }

    /// Decides whether `guid` needs its callback, runs it and records the
    /// outcome. Called only while holding the asset's in-flight slot.
    fn lead(
        &self,
        guid: AssetGuid,
        node: &NodeSnapshot,
        type_flags: AssetTypeFlags,
        force: bool,
        platform: &PlatformProfile,
    ) -> Visit {
        let Some((_, hash)) = self.refresh_hashes(&[guid]).pop() else {
            return Visit::Gone;
        };
        if let Some(message) = &node.blocked_by {
            let result = Arc::new(TransformResult::failed(
                FailureKind::DependencyFailed,
                message.clone(),
                hash.as_ref().ok().map(|h| h.content),
            ));
            self.store_result(guid, &result, &hash);
            return Visit::Failed(result);
        }
        let hash = match hash {
            Ok(hash) => hash,
            Err(e) => {
                let result = Arc::new(TransformResult::failed(failure_kind(&e), e.to_string(), None));
                self.store_result(guid, &result, &Err(e));
                return Visit::Failed(result);
            }
        };

        if type_flags.contains(AssetTypeFlags::DISABLE_TRANSFORM) {
            let result = Arc::new(TransformResult::success(Vec::new(), hash.content));
            self.store_result(guid, &result, &Ok(hash));
            return Visit::Current(result);
        }

        let stamp = self.cache.stamps().read_stamp(&platform.name, guid);
        if !force && stamp_is_current(stamp.as_ref(), hash.content, &self.project_root) {
            let previous = self.db.read().store.lookup(guid).and_then(|info| {
                info.last_result
                    .clone()
                    .filter(|r| r.is_success() && r.content_hash == Some(hash.content))
            });
            let result = previous.unwrap_or_else(|| {
                let outputs = stamp.map(|s| s.outputs).unwrap_or_default();
                Arc::new(TransformResult::success(outputs, hash.content))
            });
            self.store_result(guid, &result, &Ok(hash));
            return Visit::Current(result);
        }

        let result = Arc::new(self.run_callback(guid, node, hash, platform));
        if let Some(info) = self.db.write().store.lookup_mut(guid) {
            info.log = result.log.clone();
        }
        self.store_result(guid, &result, &Ok(hash));
        Visit::Ran(result)
    }

    fn run_callback(
        &self,
        guid: AssetGuid,
        node: &NodeSnapshot,
        hash: ComputedHash,
        platform: &PlatformProfile,
    ) -> TransformResult {
        let Some(manager) = self.manager(&node.type_name) else {
            return TransformResult::failed(
                FailureKind::TransformFailed,
                format!("no document manager for type '{}'", node.type_name),
                Some(hash.content),
            );
        };
        let outputs = manager.output_paths(&node.relative, platform);
        let absolute_outputs: Vec<PathBuf> =
            outputs.iter().map(|o| self.project_root.join(o)).collect();
        let log = TransformLog::default();
        let ctx = TransformContext {
            guid,
            source_path: &node.absolute,
            relative_path: &node.relative,
            platform,
            file_dependencies: &node.file_dependencies,
            outputs: &absolute_outputs,
            log: &log,
        };

        tracing::debug!(asset = %node.relative, platform = %platform.name, "transforming");
        let outcome = manager.transform(&ctx);
        let mut entries = log.into_entries();
        if let Err(message) = outcome {
            tracing::error!(asset = %node.relative, %message, "transform failed");
            entries.push(LogEntry::new(LogLevel::Error, message.clone()));
            return TransformResult::failed(FailureKind::TransformFailed, message, Some(hash.content))
                .with_log(entries);
        }

        let stamp = TransformStamp {
            content_hash: hash.content,
            outputs: outputs.clone(),
            transformed_at_ms: unix_millis(SystemTime::now()),
        };
        if let Err(e) = self.cache.stamps().write_stamp(&platform.name, guid, &stamp) {
            tracing::error!(asset = %node.relative, error = %e, "failed to write transform stamp");
            entries.push(LogEntry::new(LogLevel::Error, e.to_string()));
            return TransformResult::failed(FailureKind::Io, e.to_string(), Some(hash.content))
                .with_log(entries);
        }
        TransformResult::success(outputs, hash.content).with_log(entries)
    }

    /// Records a failure for an asset on or behind a dependency cycle.
    fn fail_blocked(&self, guid: AssetGuid) -> Visit {
        let Some((_, hash)) = self.refresh_hashes(&[guid]).pop() else {
            return Visit::Gone;
        };
        let message = match &hash {
            Err(e @ CuratorError::CyclicDependency { .. }) => e.to_string(),
            _ => format!(
                "'{}' is part of or depends on a dependency cycle",
                display_name(&self.db.read().store, guid)
            ),
        };
        let result = Arc::new(TransformResult::failed(
            FailureKind::CyclicDependency,
            message,
            None,
        ));
        self.store_result(guid, &result, &hash);
        Visit::Failed(result)
    }

    fn store_result(
        &self,
        guid: AssetGuid,
        result: &Arc<TransformResult>,
        hash: &Result<ComputedHash, CuratorError>,
    ) {
        {
            let mut db = self.db.write();
            if let Some(info) = db.store.lookup_mut(guid) {
                info.last_result = Some(Arc::clone(result));
                if result.is_success() {
                    info.outputs = result.outputs.clone();
                }
            }
        }
        self.record_state(guid, hash);
        let mut db = self.db.write();
        db.store.touch(guid);
        self.publish(&mut db.store);
    }
}

fn failure_kind(error: &CuratorError) -> FailureKind {
    match error {
        CuratorError::SourceMissing { .. } => FailureKind::SourceMissing,
        CuratorError::CyclicDependency { .. } => FailureKind::CyclicDependency,
        CuratorError::DanglingDependency { .. } => FailureKind::DanglingDependency,
        CuratorError::Io { .. } | CuratorError::Cache(_) => FailureKind::Io,
        _ => FailureKind::TransformFailed,
    }
}

fn absorb(
    status: &mut TransformStatus,
    blocked: &mut HashMap<AssetGuid, Blocker>,
    guid: AssetGuid,
    visit: Visit,
) {
    let result = match visit {
        Visit::Ran(result) => {
            status.transformed += 1;
            result
        }
        Visit::Current(result) => {
            status.up_to_date += 1;
            result
        }
        Visit::Failed(result) | Visit::Joined(result) => result,
        Visit::Skipped { current } => {
            status.skipped += 1;
            if !current {
                blocked.insert(guid, Blocker::SkippedStale);
            }
            return;
        }
        Visit::Gone => return,
        Visit::Cancelled => {
            status.cancelled = true;
            return;
        }
    };
    if !result.is_success() {
        blocked.insert(guid, Blocker::Failed);
    }
    status.results.push((guid, result));
}
