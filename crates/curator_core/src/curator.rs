//! The curator service object.
//!
//! A [`Curator`] owns everything tracked for one open project: the asset
//! store and dependency graph (behind one reader-biased lock), the persisted
//! cache, the registered document managers, the platform profiles, the event
//! bus and the transform worker pool. It is created when a project is opened
//! and consumed by [`Curator::close`]; collaborators receive it by reference.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use curator_cache::{unix_millis, AssetRecord, CuratorCache};
use curator_common::{normalize_path, AssetGuid, PathInterner};
use curator_config::{resolve_platforms, ConfigError, PlatformProfile, ProjectConfig};
use parking_lot::RwLock;

use crate::asset::{AssetInfo, Dependency, DependencyRef, TransformState};
use crate::error::CuratorError;
use crate::events::{CuratorEvent, EventBus, Subscription};
use crate::graph::{DepNode, DependencyGraph};
use crate::manager::{AssetTypeFlags, AssetTypeManager, DocumentDescriptor, TomlAssetManager};
use crate::scan::{resolve_data_path, split_data_path};
use crate::scheduler::InFlightTable;
use crate::staleness::{
    classify, compute_content_hash, display_name, has_missing_reference, stamp_is_current,
    ComputedHash, HashInputs, StateInputs,
};
use crate::store::AssetStore;

/// Version written into persisted state; a different version discards it.
pub const CURATOR_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Store and graph, guarded together so they never disagree.
#[derive(Default)]
pub(crate) struct CuratorDb {
    pub store: AssetStore,
    pub graph: DependencyGraph,
}

/// Incremental asset dependency tracker and transform engine for one project.
pub struct Curator {
    pub(crate) project_root: PathBuf,
    config: ProjectConfig,
    pub(crate) data_dirs: Vec<PathBuf>,
    tables_dir: PathBuf,
    managers: Vec<Arc<dyn AssetTypeManager>>,
    platforms: Vec<PlatformProfile>,
    active_platform: RwLock<usize>,
    pub(crate) db: RwLock<CuratorDb>,
    pub(crate) interner: PathInterner,
    pub(crate) cache: CuratorCache,
    pub(crate) events: Arc<EventBus>,
    pub(crate) pool: rayon::ThreadPool,
    pub(crate) in_flight: InFlightTable,
}

impl Curator {
    /// Opens a project: loads persisted state and scans every data directory.
    ///
    /// `project_root` should be absolute; data, cache and table directories
    /// from `config` are resolved against it.
    #[tracing::instrument(skip_all, fields(root = %project_root.display()))]
    pub fn open(
        project_root: &Path,
        config: ProjectConfig,
        managers: Vec<Arc<dyn AssetTypeManager>>,
    ) -> Result<Self, CuratorError> {
        let platforms = resolve_platforms(&config)?;
        if platforms.is_empty() {
            return Err(ConfigError::MissingField("platforms".to_string()).into());
        }
        let root = PathBuf::from(normalize_path(project_root));
        let data_dirs = config
            .data_dirs
            .iter()
            .map(|d| PathBuf::from(normalize_path(&root.join(&d.path))))
            .collect();
        let tables_dir = root.join(&config.cache.tables_dir);
        let cache = CuratorCache::load_or_create(&root.join(&config.cache.dir), CURATOR_VERSION);
        let workers = config.scheduler.worker_count();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("curator-transform-{i}"))
            .build()
            .map_err(|e| CuratorError::WorkerPool(e.to_string()))?;

        let curator = Self {
            project_root: root,
            config,
            data_dirs,
            tables_dir,
            managers,
            platforms,
            active_platform: RwLock::new(0),
            db: RwLock::new(CuratorDb::default()),
            interner: PathInterner::new(),
            cache,
            events: EventBus::new(),
            pool,
            in_flight: InFlightTable::default(),
        };

        let summary = curator.check_file_system();
        curator.restore_records();
        curator.refresh_all();
        // Nobody can have subscribed yet; drop the initial reset.
        curator.events.flush();
        tracing::info!(
            assets = summary.added,
            errors = summary.errors.len(),
            workers,
            "project opened"
        );
        Ok(curator)
    }

    /// Opens a project using a [`TomlAssetManager`] for every `[types.*]`
    /// section of the configuration.
    pub fn open_with_config_types(
        project_root: &Path,
        config: ProjectConfig,
    ) -> Result<Self, CuratorError> {
        let managers = config
            .types
            .iter()
            .map(|(name, t)| {
                Arc::new(TomlAssetManager::new(
                    name,
                    t.clone(),
                    &config.cache.tables_dir,
                )) as Arc<dyn AssetTypeManager>
            })
            .collect();
        Self::open(project_root, config, managers)
    }

    /// Saves persisted state and releases the project.
    pub fn close(self) -> Result<(), CuratorError> {
        self.save_caches()
    }

    /// Project root directory.
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// The project configuration.
    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    /// Absolute data directories, in priority order.
    pub fn data_dirs(&self) -> &[PathBuf] {
        &self.data_dirs
    }

    /// Directory holding the lookup tables.
    pub fn tables_dir(&self) -> &Path {
        &self.tables_dir
    }

    // ---- events ----

    /// Registers an event handler. The handler stays registered until the
    /// returned [`Subscription`] is dropped.
    pub fn subscribe(
        &self,
        handler: impl Fn(&CuratorEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.events.subscribe(handler)
    }

    /// Delivers queued events. Call regularly from the thread that owns the
    /// subscribers. Returns the number of events delivered.
    pub fn main_thread_tick(&self) -> usize {
        self.events.flush()
    }

    pub(crate) fn publish(&self, store: &mut AssetStore) {
        self.events.queue_all(store.take_events());
    }

    // ---- lookups ----

    /// Returns a snapshot of the asset with `guid`.
    pub fn lookup(&self, guid: AssetGuid) -> Option<AssetInfo> {
        self.db.read().store.lookup(guid).cloned()
    }

    /// Looks up an asset by absolute or data-directory-relative path.
    pub fn lookup_by_path(&self, path: &Path) -> Option<AssetInfo> {
        let db = self.db.read();
        if path.is_absolute() {
            db.store.lookup_by_path(path).cloned()
        } else {
            db.store
                .lookup_by_relative_path(&normalize_path(path))
                .cloned()
        }
    }

    /// Resolves a GUID string or a path (data-directory-relative, relative to
    /// the project root, or absolute) to a known asset.
    pub fn resolve_asset_spec(&self, spec: &str) -> Result<AssetGuid, CuratorError> {
        if let Ok(guid) = spec.parse::<AssetGuid>() {
            return self
                .db
                .read()
                .store
                .lookup(guid)
                .map(|info| info.guid)
                .ok_or_else(|| CuratorError::UnknownAsset(spec.to_string()));
        }
        let path = Path::new(spec);
        self.lookup_by_path(path)
            .or_else(|| self.lookup_by_path(&self.project_root.join(path)))
            .map(|info| info.guid)
            .ok_or_else(|| CuratorError::UnknownAsset(spec.to_string()))
    }

    /// Snapshots of every asset, sorted by relative path.
    pub fn assets(&self) -> Vec<AssetInfo> {
        let mut assets: Vec<AssetInfo> = self.db.read().store.iter().cloned().collect();
        assets.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        assets
    }

    /// Snapshots of every asset of one type, sorted by relative path.
    pub fn all_of_type(&self, type_name: &str) -> Vec<AssetInfo> {
        let mut assets: Vec<AssetInfo> = self
            .db
            .read()
            .store
            .all_of_type(type_name)
            .cloned()
            .collect();
        assets.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        assets
    }

    /// Descriptors of every registered document type.
    pub fn get_all_document_descriptors(&self) -> Vec<DocumentDescriptor> {
        self.managers.iter().map(|m| m.descriptor()).collect()
    }

    pub(crate) fn manager(&self, type_name: &str) -> Option<&Arc<dyn AssetTypeManager>> {
        self.managers.iter().find(|m| m.type_name() == type_name)
    }

    pub(crate) fn managers(&self) -> &[Arc<dyn AssetTypeManager>] {
        &self.managers
    }

    pub(crate) fn type_flags(&self, type_name: &str) -> AssetTypeFlags {
        self.manager(type_name)
            .map(|m| m.flags())
            .unwrap_or_default()
    }

    // ---- graph queries ----

    /// Direct transform dependencies of `guid`.
    pub fn get_direct_dependencies(&self, guid: AssetGuid) -> Vec<Dependency> {
        let db = self.db.read();
        db.graph
            .direct_dependencies(guid)
            .into_iter()
            .map(|n| self.to_dependency(n))
            .collect()
    }

    /// Direct references of `guid`.
    pub fn get_direct_references(&self, guid: AssetGuid) -> Vec<Dependency> {
        let db = self.db.read();
        db.graph
            .direct_references(guid)
            .into_iter()
            .map(|n| self.to_dependency(n))
            .collect()
    }

    /// Assets whose transform is affected by `guid`, nearest first.
    pub fn get_transitive_dependents(&self, guid: AssetGuid) -> Vec<AssetGuid> {
        self.db
            .read()
            .graph
            .transitive_dependents(DepNode::Asset(guid))
            .to_vec()
    }

    /// Everything the transform of `guid` reads from, nearest first.
    pub fn transitive_dependencies(&self, guid: AssetGuid) -> Vec<Dependency> {
        let db = self.db.read();
        db.graph
            .transitive_dependencies(guid)
            .into_iter()
            .map(|n| self.to_dependency(n))
            .collect()
    }

    /// Assets that depend on or reference `guid`.
    pub fn find_all_uses(&self, guid: AssetGuid, transitive: bool) -> BTreeSet<AssetGuid> {
        self.db.read().graph.users(DepNode::Asset(guid), transitive)
    }

    /// Assets that depend on or reference the plain file at `path`.
    ///
    /// `path` may be absolute or data-directory-relative.
    pub fn find_all_uses_of_file(&self, path: &Path) -> BTreeSet<AssetGuid> {
        match self.file_id(path) {
            Some(id) => self.db.read().graph.users(DepNode::File(id), false),
            None => BTreeSet::new(),
        }
    }

    /// Returns `true` if any asset's transform reads the plain file at `path`.
    pub fn is_referenced(&self, path: &Path) -> bool {
        self.file_id(path)
            .is_some_and(|id| self.db.read().graph.has_dependents(DepNode::File(id)))
    }

    /// Searches for a dependency cycle; returns it as relative paths with the
    /// first element repeated at the end.
    pub fn detect_cycle(&self) -> Option<Vec<String>> {
        let db = self.db.read();
        db.graph
            .detect_cycle()
            .map(|cycle| cycle.into_iter().map(|n| self.node_label(&db, n)).collect())
    }

    /// Writes the dependency and reference hull of `guid` as Graphviz DOT.
    #[tracing::instrument(skip(self))]
    pub fn write_dependency_dot(&self, guid: AssetGuid, path: &Path) -> Result<(), CuratorError> {
        let dot = {
            let db = self.db.read();
            if db.store.lookup(guid).is_none() {
                return Err(CuratorError::UnknownAsset(guid.to_string()));
            }
            db.graph.to_dot(guid, |n| self.node_label(&db, n))
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| CuratorError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        std::fs::write(path, dot).map_err(|e| CuratorError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub(crate) fn dep_node(&self, dep: &DependencyRef) -> DepNode {
        match dep {
            DependencyRef::Asset(guid) => DepNode::Asset(*guid),
            DependencyRef::File(relative) => {
                DepNode::File(self.interner.intern(&resolve_data_path(&self.data_dirs, relative)))
            }
        }
    }

    fn file_id(&self, path: &Path) -> Option<curator_common::FileId> {
        if path.is_absolute() {
            self.interner.get(path)
        } else {
            self.interner
                .get(&resolve_data_path(&self.data_dirs, &normalize_path(path)))
        }
    }

    fn to_dependency(&self, node: DepNode) -> Dependency {
        match node {
            DepNode::Asset(guid) => Dependency::Asset(guid),
            DepNode::File(id) => Dependency::File(PathBuf::from(self.interner.resolve(id))),
        }
    }

    pub(crate) fn node_label(&self, db: &CuratorDb, node: DepNode) -> String {
        match node {
            DepNode::Asset(guid) => display_name(&db.store, guid),
            DepNode::File(id) => {
                let path = Path::new(self.interner.resolve(id));
                split_data_path(&self.data_dirs, path)
                    .map(|(_, rel)| rel)
                    .unwrap_or_else(|| normalize_path(path))
            }
        }
    }

    // ---- platforms ----

    /// Every configured platform, sorted by name.
    pub fn platforms(&self) -> &[PlatformProfile] {
        &self.platforms
    }

    /// The platform transforms and state queries target.
    pub fn active_platform(&self) -> &PlatformProfile {
        &self.platforms[*self.active_platform.read()]
    }

    /// Switches the active platform. Every cached hash and result is dropped.
    #[tracing::instrument(skip(self))]
    pub fn set_active_platform(&self, name: &str) -> Result<(), CuratorError> {
        let index = self
            .platforms
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| CuratorError::UnknownPlatform(name.to_string()))?;
        {
            let mut active = self.active_platform.write();
            if *active == index {
                return Ok(());
            }
            *active = index;
        }
        {
            let mut db = self.db.write();
            for info in db.store.iter_mut() {
                info.invalidate();
                info.last_result = None;
                info.outputs.clear();
                info.log.clear();
            }
        }
        self.events.queue(CuratorEvent::ActivePlatformChanged {
            platform: name.to_string(),
        });
        tracing::info!(platform = name, "active platform changed");
        Ok(())
    }

    // ---- staleness ----

    /// Recomputes the content hashes of `guids` and stores them.
    ///
    /// Hashes are computed under the read lock. When a stored hash changed,
    /// the cached hashes of its transitive dependents that were not part of
    /// this pass are dropped, since they were derived from the old value.
    pub(crate) fn refresh_hashes(
        &self,
        guids: &[AssetGuid],
    ) -> Vec<(AssetGuid, Result<ComputedHash, CuratorError>)> {
        let platform = self.active_platform().clone();
        let (outcomes, computed) = {
            let db = self.db.read();
            let inputs = HashInputs {
                store: &db.store,
                cache: &self.cache,
                platform: &platform,
                data_dirs: &self.data_dirs,
            };
            let mut computed = HashMap::new();
            let outcomes: Vec<_> = guids
                .iter()
                .map(|&guid| {
                    let hash = compute_content_hash(&inputs, guid, &mut computed, &mut Vec::new());
                    (guid, hash)
                })
                .collect();
            (outcomes, computed)
        };

        let mut db = self.db.write();
        let CuratorDb { store, graph } = &mut *db;
        for (guid, hash) in &computed {
            let changed = match store.lookup_mut(*guid) {
                Some(info) => {
                    info.dependency_hash = Some(hash.dependency);
                    let previous = info.content_hash.replace(hash.content);
                    previous.is_some_and(|p| p != hash.content)
                }
                None => false,
            };
            if changed {
                for dependent in graph.transitive_dependents(DepNode::Asset(*guid)).iter() {
                    if !computed.contains_key(dependent) {
                        if let Some(info) = store.lookup_mut(*dependent) {
                            info.invalidate();
                        }
                    }
                }
            }
        }
        for (guid, hash) in &outcomes {
            if hash.is_err() {
                if let Some(info) = store.lookup_mut(*guid) {
                    info.content_hash = None;
                    info.dependency_hash = None;
                }
            }
        }
        outcomes
    }

    /// Refreshes every asset in dependency order and records its state.
    pub(crate) fn refresh_all(&self) -> BTreeMap<TransformState, usize> {
        let order: Vec<AssetGuid> = {
            let db = self.db.read();
            let schedule = db.graph.schedule(&db.store.guids());
            schedule
                .generations
                .into_iter()
                .flatten()
                .chain(schedule.blocked)
                .filter(|g| db.store.lookup(*g).is_some())
                .collect()
        };
        let outcomes = self.refresh_hashes(&order);
        let mut stats = BTreeMap::new();
        for (guid, hash) in &outcomes {
            if let Some(state) = self.record_state(*guid, hash) {
                *stats.entry(state).or_insert(0) += 1;
            }
        }
        stats
    }

    /// Derives and stores the state of `guid` for a freshly computed hash.
    pub(crate) fn record_state(
        &self,
        guid: AssetGuid,
        hash: &Result<ComputedHash, CuratorError>,
    ) -> Option<TransformState> {
        let platform = self.active_platform();
        let state = {
            let db = self.db.read();
            let info = db.store.lookup(guid)?;
            let current = match hash {
                Ok(h) => stamp_is_current(
                    self.cache.stamps().read_stamp(&platform.name, guid).as_ref(),
                    h.content,
                    &self.project_root,
                ),
                Err(_) => false,
            };
            classify(
                info,
                StateInputs {
                    hash,
                    cyclic: db.graph.is_cyclic(guid),
                    disabled: self
                        .type_flags(&info.type_name)
                        .contains(AssetTypeFlags::DISABLE_TRANSFORM),
                    current,
                    missing_reference: has_missing_reference(&db.store, &self.data_dirs, info),
                },
            )
        };
        let mut db = self.db.write();
        if let Some(info) = db.store.lookup_mut(guid) {
            info.state = state;
        }
        Some(state)
    }

    /// Returns `true` if `guid` needs a transform on the active platform.
    ///
    /// The asset's own hash is recomputed; dependencies contribute their
    /// last-known hashes. An asset whose hash cannot be computed (missing
    /// source, cycle, dangling dependency) reports that error instead.
    #[tracing::instrument(skip(self))]
    pub fn is_stale(&self, guid: AssetGuid) -> Result<bool, CuratorError> {
        let type_name = self
            .db
            .read()
            .store
            .lookup(guid)
            .map(|info| info.type_name.clone())
            .ok_or_else(|| CuratorError::UnknownAsset(guid.to_string()))?;
        let (_, hash) = self
            .refresh_hashes(&[guid])
            .pop()
            .ok_or_else(|| CuratorError::UnknownAsset(guid.to_string()))?;
        let hash = hash?;
        if self
            .type_flags(&type_name)
            .contains(AssetTypeFlags::DISABLE_TRANSFORM)
        {
            return Ok(false);
        }
        let stamp = self
            .cache
            .stamps()
            .read_stamp(&self.active_platform().name, guid);
        Ok(!stamp_is_current(stamp.as_ref(), hash.content, &self.project_root))
    }

    /// Recomputes and returns the transform state of `guid`.
    pub fn transform_state(&self, guid: AssetGuid) -> Result<TransformState, CuratorError> {
        let (_, hash) = self
            .refresh_hashes(&[guid])
            .pop()
            .ok_or_else(|| CuratorError::UnknownAsset(guid.to_string()))?;
        self.record_state(guid, &hash)
            .ok_or_else(|| CuratorError::UnknownAsset(guid.to_string()))
    }

    /// Number of assets per transform state, after re-evaluating every asset.
    /// States with no assets are included with a count of zero.
    #[tracing::instrument(skip(self))]
    pub fn transform_stats(&self) -> BTreeMap<TransformState, usize> {
        let mut stats: BTreeMap<TransformState, usize> =
            TransformState::ALL.iter().map(|s| (*s, 0)).collect();
        for (state, count) in self.refresh_all() {
            stats.insert(state, count);
        }
        stats
    }

    // ---- persistence ----

    /// Marks `guid` as accessed now.
    pub fn update_asset_last_access_time(&self, guid: AssetGuid) -> Result<(), CuratorError> {
        let mut db = self.db.write();
        let info = db
            .store
            .lookup_mut(guid)
            .ok_or_else(|| CuratorError::UnknownAsset(guid.to_string()))?;
        info.last_access_ms = unix_millis(SystemTime::now());
        Ok(())
    }

    /// When the last successful [`transform_all`](Self::transform_all) finished.
    pub fn last_full_transform_date(&self) -> Option<SystemTime> {
        self.cache
            .last_full_transform()
            .map(|ms| UNIX_EPOCH + Duration::from_millis(ms))
    }

    /// Writes the manifest with the current asset records.
    #[tracing::instrument(skip(self))]
    pub fn save_caches(&self) -> Result<(), CuratorError> {
        let records: BTreeMap<AssetGuid, AssetRecord> = self
            .db
            .read()
            .store
            .iter()
            .map(|info| {
                (
                    info.guid,
                    AssetRecord {
                        path: info.relative_path.clone(),
                        type_name: info.type_name.clone(),
                        last_access_ms: info.last_access_ms,
                        content_hash: info.content_hash,
                        dependency_hash: info.dependency_hash,
                        log: info.log.clone(),
                    },
                )
            })
            .collect();
        self.cache.set_asset_records(records);
        self.cache.save()?;
        Ok(())
    }

    /// Restores access times and last-known hashes from the manifest for
    /// assets still found at their recorded path.
    fn restore_records(&self) {
        let records = self.cache.asset_records();
        let mut db = self.db.write();
        for (guid, record) in records {
            if let Some(info) = db.store.lookup_mut(guid) {
                if info.relative_path == record.path {
                    info.last_access_ms = record.last_access_ms;
                    info.content_hash = record.content_hash;
                    info.dependency_hash = record.dependency_hash;
                    info.log = record.log;
                }
            }
        }
    }

    /// Deletes every transform output and stamp so that every asset is stale.
    /// Returns the number of stamps removed.
    #[tracing::instrument(skip(self))]
    pub fn clear_asset_caches(&self) -> Result<usize, CuratorError> {
        let guids = self.db.read().store.guids();
        for platform in &self.platforms {
            for guid in &guids {
                let Some(stamp) = self.cache.stamps().read_stamp(&platform.name, *guid) else {
                    continue;
                };
                for output in &stamp.outputs {
                    let path = self.project_root.join(output);
                    match std::fs::remove_file(&path) {
                        Ok(()) => {}
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                        Err(e) => return Err(CuratorError::Io { path, source: e }),
                    }
                }
            }
        }
        let removed = self.cache.clear()?;

        let mut db = self.db.write();
        db.store.begin_bulk();
        for guid in &guids {
            if let Some(info) = db.store.lookup_mut(*guid) {
                info.invalidate();
                info.last_result = None;
                info.outputs.clear();
                info.log.clear();
            }
            db.store.touch(*guid);
        }
        db.store.end_bulk();
        self.publish(&mut db.store);
        tracing::info!(stamps = removed, "cleared asset caches");
        Ok(removed)
    }

    /// Removes stamps of assets that are no longer known.
    pub fn gc_stamps(&self) -> Result<usize, CuratorError> {
        let live: HashSet<AssetGuid> = self.db.read().store.guids().into_iter().collect();
        Ok(self.cache.gc(&live)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curator_config::load_config_from_str;

    const CONFIG: &str = r#"
[project]
name = "unit"

[[data_dirs]]
path = "data"

[types.mesh]
extensions = ["mesh"]

[types.material]
extensions = ["mat"]

[platforms.pc]

[platforms.android]
settings = { compression = "etc2" }

[scheduler]
workers = 2
"#;

    fn doc(guid: u128, deps: &[String]) -> String {
        format!(
            "guid = \"{}\"\ndependencies = {:?}\n",
            AssetGuid::from_u128(guid),
            deps
        )
    }

    fn project() -> (tempfile::TempDir, Curator) {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        std::fs::create_dir_all(data.join("meshes")).unwrap();
        std::fs::write(data.join("meshes/box.obj"), "verts").unwrap();
        std::fs::write(
            data.join("meshes/box.mesh"),
            doc(1, &["meshes/box.obj".to_string()]),
        )
        .unwrap();
        std::fs::write(
            data.join("box.mat"),
            doc(2, &[AssetGuid::from_u128(1).to_string()]),
        )
        .unwrap();
        let config = load_config_from_str(CONFIG).unwrap();
        let curator = Curator::open_with_config_types(dir.path(), config).unwrap();
        (dir, curator)
    }

    #[test]
    fn open_discovers_assets() {
        let (_dir, curator) = project();
        let assets = curator.assets();
        let paths: Vec<&str> = assets.iter().map(|a| a.relative_path.as_str()).collect();
        assert_eq!(paths, vec!["box.mat", "meshes/box.mesh"]);
        assert_eq!(curator.all_of_type("mesh").len(), 1);
        assert_eq!(curator.get_all_document_descriptors().len(), 2);
    }

    #[test]
    fn resolve_asset_spec_accepts_guid_and_paths() {
        let (dir, curator) = project();
        let g1 = AssetGuid::from_u128(1);
        assert_eq!(curator.resolve_asset_spec(&g1.to_string()).unwrap(), g1);
        assert_eq!(curator.resolve_asset_spec("meshes/box.mesh").unwrap(), g1);
        assert_eq!(curator.resolve_asset_spec("data/meshes/box.mesh").unwrap(), g1);
        let absolute = dir.path().join("data/meshes/box.mesh");
        assert_eq!(
            curator.resolve_asset_spec(absolute.to_str().unwrap()).unwrap(),
            g1
        );
        assert!(matches!(
            curator.resolve_asset_spec("nope.mesh"),
            Err(CuratorError::UnknownAsset(_))
        ));
        assert!(curator
            .resolve_asset_spec(&AssetGuid::from_u128(99).to_string())
            .is_err());
    }

    #[test]
    fn dependency_queries() {
        let (dir, curator) = project();
        let g1 = AssetGuid::from_u128(1);
        let g2 = AssetGuid::from_u128(2);
        assert_eq!(curator.get_direct_dependencies(g2), vec![Dependency::Asset(g1)]);
        let obj = PathBuf::from(normalize_path(&dir.path().join("data/meshes/box.obj")));
        assert_eq!(curator.get_direct_dependencies(g1), vec![Dependency::File(obj.clone())]);
        assert_eq!(
            curator.transitive_dependencies(g2),
            vec![Dependency::Asset(g1), Dependency::File(obj.clone())]
        );
        assert_eq!(curator.get_transitive_dependents(g1), vec![g2]);
        assert_eq!(curator.find_all_uses(g1, false), BTreeSet::from([g2]));
        assert_eq!(
            curator.find_all_uses_of_file(Path::new("meshes/box.obj")),
            BTreeSet::from([g1])
        );
        assert!(curator.is_referenced(&obj));
        assert!(!curator.is_referenced(Path::new("meshes/other.obj")));
        assert!(curator.detect_cycle().is_none());
    }

    #[test]
    fn fresh_project_needs_transform() {
        let (_dir, curator) = project();
        let g1 = AssetGuid::from_u128(1);
        assert!(curator.is_stale(g1).unwrap());
        assert_eq!(curator.transform_state(g1).unwrap(), TransformState::NeedsTransform);
        let stats = curator.transform_stats();
        assert_eq!(stats[&TransformState::NeedsTransform], 2);
        assert_eq!(stats[&TransformState::UpToDate], 0);
    }

    #[test]
    fn unknown_asset_errors() {
        let (_dir, curator) = project();
        let ghost = AssetGuid::from_u128(42);
        assert!(matches!(curator.is_stale(ghost), Err(CuratorError::UnknownAsset(_))));
        assert!(curator.update_asset_last_access_time(ghost).is_err());
        assert!(curator.lookup(ghost).is_none());
    }

    #[test]
    fn platform_switch() {
        let (_dir, curator) = project();
        assert_eq!(curator.active_platform().name, "android");
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = curator.subscribe(move |e| sink.lock().push(e.clone()));

        curator.set_active_platform("pc").unwrap();
        curator.set_active_platform("pc").unwrap();
        assert!(matches!(
            curator.set_active_platform("ps2"),
            Err(CuratorError::UnknownPlatform(_))
        ));
        curator.main_thread_tick();
        assert_eq!(
            *seen.lock(),
            vec![CuratorEvent::ActivePlatformChanged { platform: "pc".into() }]
        );
    }

    #[test]
    fn last_access_time_persists() {
        let (dir, curator) = project();
        let g1 = AssetGuid::from_u128(1);
        curator.update_asset_last_access_time(g1).unwrap();
        let stamp = curator.lookup(g1).unwrap().last_access_ms;
        assert!(stamp > 0);
        curator.close().unwrap();

        let config = load_config_from_str(CONFIG).unwrap();
        let reopened = Curator::open_with_config_types(dir.path(), config).unwrap();
        assert_eq!(reopened.lookup(g1).unwrap().last_access_ms, stamp);
        assert!(reopened.last_full_transform_date().is_none());
    }

    #[test]
    fn dot_export() {
        let (dir, curator) = project();
        let out = dir.path().join("graphs/box.dot");
        curator
            .write_dependency_dot(AssetGuid::from_u128(2), &out)
            .unwrap();
        let dot = std::fs::read_to_string(out).unwrap();
        assert!(dot.contains("box.mat"));
        assert!(dot.contains("meshes/box.mesh"));
        assert!(dot.contains("meshes/box.obj"));
        assert!(curator
            .write_dependency_dot(AssetGuid::from_u128(7), &dir.path().join("x.dot"))
            .is_err());
    }
}
