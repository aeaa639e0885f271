//! Keeping the store in sync with the data directories.
//!
//! A full [`Curator::check_file_system`] rescan runs as one bulk update and
//! emits a single `AssetListReset`. Change notifications from a file watcher
//! update just the affected asset and invalidate its transitive dependents.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use curator_common::{normalize_path, AssetGuid, ContentHash};

use crate::asset::{AssetInfo, TransformState};
use crate::curator::{Curator, CuratorDb};
use crate::error::CuratorError;
use crate::graph::DepNode;
use crate::scan::{manager_for, resolve_data_path, scan_data_dirs, split_data_path};

/// What a rescan changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Newly discovered assets.
    pub added: usize,
    /// Assets whose document changed.
    pub updated: usize,
    /// Assets found at a new path.
    pub moved: usize,
    /// Assets whose document disappeared.
    pub removed: usize,
    /// Assets whose document did not change.
    pub unchanged: usize,
    /// Documents that could not be processed, as messages.
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FileOutcome {
    Added,
    Updated,
    Moved,
    Unchanged,
}

impl Curator {
    /// Rescans every data directory.
    ///
    /// New documents are added, changed ones re-read, moved ones relocated
    /// and vanished ones removed. Every asset's cached state is dropped.
    #[tracing::instrument(skip(self))]
    pub fn check_file_system(&self) -> ScanSummary {
        let files = scan_data_dirs(&self.data_dirs, self.managers());
        let mut summary = ScanSummary::default();
        let mut seen: HashSet<AssetGuid> = HashSet::new();

        self.db.write().store.begin_bulk();
        for file in &files {
            match self.process_file(&file.absolute, &file.relative, &file.type_name) {
                Ok((guid, outcome)) => {
                    seen.insert(guid);
                    match outcome {
                        FileOutcome::Added => summary.added += 1,
                        FileOutcome::Updated => summary.updated += 1,
                        FileOutcome::Moved => summary.moved += 1,
                        FileOutcome::Unchanged => summary.unchanged += 1,
                    }
                }
                Err(e) => {
                    tracing::warn!(path = %file.relative, error = %e, "skipping asset document");
                    summary.errors.push(e.to_string());
                }
            }
        }

        let mut db = self.db.write();
        let gone: Vec<AssetGuid> = db
            .store
            .guids()
            .into_iter()
            .filter(|g| !seen.contains(g))
            .collect();
        for guid in gone {
            self.remove_asset_locked(&mut db, guid);
            summary.removed += 1;
        }
        for info in db.store.iter_mut() {
            info.invalidate();
        }
        db.store.end_bulk();
        self.publish(&mut db.store);
        tracing::debug!(?summary, "file system check finished");
        summary
    }

    /// Handles a change of the file at `path` (absolute or
    /// data-directory-relative).
    ///
    /// Asset documents are re-read. For plain files, every asset whose
    /// transform reads the file is invalidated. A path that no longer exists
    /// is handled like [`notify_file_removed`](Self::notify_file_removed).
    #[tracing::instrument(skip(self))]
    pub fn notify_file_changed(&self, path: &Path) -> Result<(), CuratorError> {
        let absolute = self.absolute_data_path(path);
        if !absolute.exists() {
            return self.notify_file_removed(&absolute);
        }
        self.cache.forget_file(&absolute);

        if let Some(manager) = manager_for(self.managers(), &absolute) {
            if let Some((_, relative)) = split_data_path(&self.data_dirs, &absolute) {
                let type_name = manager.type_name().to_string();
                self.process_file(&absolute, &relative, &type_name)?;
                return Ok(());
            }
        }
        self.invalidate_file_users(&absolute);
        Ok(())
    }

    /// Handles removal of the file at `path` (absolute or
    /// data-directory-relative).
    #[tracing::instrument(skip(self))]
    pub fn notify_file_removed(&self, path: &Path) -> Result<(), CuratorError> {
        let absolute = self.absolute_data_path(path);
        self.cache.forget_file(&absolute);
        let mut db = self.db.write();
        if let Some(guid) = db.store.lookup_by_path(&absolute).map(|info| info.guid) {
            self.remove_asset_locked(&mut db, guid);
            self.publish(&mut db.store);
            return Ok(());
        }
        drop(db);
        self.invalidate_file_users(&absolute);
        Ok(())
    }

    /// Re-reads the document of `guid` and invalidates it and every
    /// transitive dependent.
    #[tracing::instrument(skip(self))]
    pub fn notify_asset_changed(&self, guid: AssetGuid) -> Result<(), CuratorError> {
        let (absolute, relative, type_name) = self
            .db
            .read()
            .store
            .lookup(guid)
            .map(|info| {
                (
                    info.absolute_path.clone(),
                    info.relative_path.clone(),
                    info.type_name.clone(),
                )
            })
            .ok_or_else(|| CuratorError::UnknownAsset(guid.to_string()))?;

        self.cache.forget_file(&absolute);
        if !absolute.exists() {
            return self.notify_file_removed(&absolute);
        }
        self.process_file(&absolute, &relative, &type_name)?;

        let mut db = self.db.write();
        self.invalidate_locked(&mut db, DepNode::Asset(guid));
        if let Some(info) = db.store.lookup_mut(guid) {
            info.invalidate();
        }
        db.store.touch(guid);
        self.publish(&mut db.store);
        Ok(())
    }

    /// Drops the cached state of every asset currently in `state` and of
    /// their transitive dependents. Failed results of the matching assets
    /// are forgotten, so the next transform retries them. Returns the number
    /// of matching assets.
    #[tracing::instrument(skip(self))]
    pub fn invalidate_assets_with_state(&self, state: TransformState) -> usize {
        let mut db = self.db.write();
        let matching: Vec<AssetGuid> = db
            .store
            .iter()
            .filter(|info| info.state == state)
            .map(|info| info.guid)
            .collect();
        for guid in &matching {
            self.invalidate_locked(&mut db, DepNode::Asset(*guid));
            if let Some(info) = db.store.lookup_mut(*guid) {
                info.invalidate();
                if info.last_result.as_ref().is_some_and(|r| !r.is_success()) {
                    info.last_result = None;
                }
            }
            db.store.touch(*guid);
        }
        self.publish(&mut db.store);
        tracing::info!(count = matching.len(), "invalidated assets");
        matching.len()
    }

    /// Reads one asset document and merges it into the store and graph.
    pub(crate) fn process_file(
        &self,
        absolute: &Path,
        relative: &str,
        type_name: &str,
    ) -> Result<(AssetGuid, FileOutcome), CuratorError> {
        let manager = self
            .manager(type_name)
            .map(Arc::clone)
            .ok_or_else(|| CuratorError::InvalidDocument {
                path: absolute.to_path_buf(),
                reason: format!("no document manager for type '{type_name}'"),
            })?;

        let hash = self.cache.hash_file(absolute)?;
        let unchanged = self
            .db
            .read()
            .store
            .lookup_by_path(absolute)
            .filter(|info| info.source_hash == Some(hash))
            .map(|info| info.guid);
        if let Some(guid) = unchanged {
            return Ok((guid, FileOutcome::Unchanged));
        }

        let bytes = std::fs::read(absolute).map_err(|e| CuratorError::Io {
            path: absolute.to_path_buf(),
            source: e,
        })?;
        let doc = manager
            .read_document_info(absolute, &bytes)
            .map_err(|reason| CuratorError::InvalidDocument {
                path: absolute.to_path_buf(),
                reason,
            })?;
        let guid = doc.guid;
        let deps: Vec<DepNode> = doc.dependencies.iter().map(|d| self.dep_node(d)).collect();
        let refs: Vec<DepNode> = doc.references.iter().map(|r| self.dep_node(r)).collect();

        let mut info = AssetInfo::new(
            guid,
            absolute.to_path_buf(),
            relative.to_string(),
            type_name.to_string(),
            doc.settings_hash,
        );
        info.source_hash = Some(ContentHash::from_bytes(&bytes));
        info.dependencies = doc.dependencies;
        info.references = doc.references;

        let mut db = self.db.write();
        let mut outcome = FileOutcome::Added;
        if let Some(existing) = db.store.lookup(guid) {
            info.last_access_ms = existing.last_access_ms;
            info.last_result = existing.last_result.clone();
            info.log = existing.log.clone();
            info.outputs = existing.outputs.clone();
            outcome = FileOutcome::Updated;
            if normalize_path(&existing.absolute_path) != normalize_path(absolute) {
                if existing.absolute_path.exists() {
                    return Err(CuratorError::DuplicateGuid {
                        guid,
                        existing: existing.relative_path.clone(),
                        duplicate: relative.to_string(),
                    });
                }
                outcome = FileOutcome::Moved;
            }
        }

        if outcome == FileOutcome::Moved {
            db.store
                .relocate(guid, absolute.to_path_buf(), relative.to_string())?;
            tracing::info!(%guid, path = relative, "asset moved");
        }
        let replaced = db
            .store
            .lookup_by_path(absolute)
            .map(|other| other.guid)
            .filter(|other| *other != guid);
        if let Some(old) = replaced {
            self.invalidate_locked(&mut db, DepNode::Asset(old));
            db.graph.remove_asset(old);
        }
        db.store.upsert(info)?;

        if let Some(cycle) = db.graph.set_dependencies(guid, &deps) {
            let names: Vec<String> = cycle.into_iter().map(|n| self.node_label(&db, n)).collect();
            tracing::warn!(cycle = %names.join(" -> "), "dependency cycle introduced");
        }
        db.graph.set_references(guid, &refs);
        for dep in deps.iter().filter_map(|d| d.as_asset()) {
            if db.store.lookup(dep).is_none() {
                tracing::debug!(asset = relative, dependency = %dep, "dependency not known yet");
            }
        }
        self.invalidate_locked(&mut db, DepNode::Asset(guid));
        self.publish(&mut db.store);
        Ok((guid, outcome))
    }

    /// Drops an asset from the store and graph; its dependents are
    /// invalidated and keep a dangling edge to it.
    pub(crate) fn remove_asset_locked(&self, db: &mut CuratorDb, guid: AssetGuid) {
        self.invalidate_locked(db, DepNode::Asset(guid));
        db.graph.remove_asset(guid);
        if let Some(info) = db.store.remove(guid) {
            self.cache.forget_file(&info.absolute_path);
            tracing::info!(%guid, path = %info.relative_path, "asset removed");
        }
    }

    /// Invalidates every transitive dependent of `node`.
    fn invalidate_locked(&self, db: &mut CuratorDb, node: DepNode) {
        let dependents = db.graph.transitive_dependents(node);
        for guid in dependents.iter() {
            if let Some(info) = db.store.lookup_mut(*guid) {
                info.invalidate();
            }
            db.store.touch(*guid);
        }
    }

    fn invalidate_file_users(&self, absolute: &Path) {
        let Some(id) = self.interner.get(absolute) else {
            return;
        };
        let mut db = self.db.write();
        self.invalidate_locked(&mut db, DepNode::File(id));
        self.publish(&mut db.store);
    }

    fn absolute_data_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            PathBuf::from(normalize_path(path))
        } else {
            resolve_data_path(&self.data_dirs, &normalize_path(path))
        }
    }
}
