//! The asset identity and metadata store.
//!
//! Maps GUIDs to [`AssetInfo`] records with a secondary index by source path.
//! Every mutation queues a [`CuratorEvent`]; during a bulk update the
//! individual add/remove events are coalesced into a single
//! [`CuratorEvent::AssetListReset`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use curator_common::{normalize_path, AssetGuid};

use crate::asset::AssetInfo;
use crate::error::CuratorError;
use crate::events::CuratorEvent;

/// What an [`AssetStore::upsert`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// A new GUID was inserted.
    Added,
    /// An existing record was replaced.
    Updated,
}

/// In-memory asset metadata store.
#[derive(Default)]
pub struct AssetStore {
    assets: HashMap<AssetGuid, AssetInfo>,
    by_path: HashMap<String, AssetGuid>,
    pending: Vec<CuratorEvent>,
    bulk_depth: u32,
    bulk_dirty: bool,
}

impl AssetStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up an asset by GUID.
    pub fn lookup(&self, guid: AssetGuid) -> Option<&AssetInfo> {
        self.assets.get(&guid)
    }

    /// Looks up an asset by GUID for modification.
    ///
    /// Changes made through this reference do not queue events.
    pub fn lookup_mut(&mut self, guid: AssetGuid) -> Option<&mut AssetInfo> {
        self.assets.get_mut(&guid)
    }

    /// Looks up an asset by absolute source path.
    pub fn lookup_by_path(&self, path: &Path) -> Option<&AssetInfo> {
        self.by_path
            .get(&normalize_path(path))
            .and_then(|guid| self.assets.get(guid))
    }

    /// Looks up an asset by data-directory-relative path.
    pub fn lookup_by_relative_path(&self, relative: &str) -> Option<&AssetInfo> {
        let relative = normalize_path(Path::new(relative));
        self.assets
            .values()
            .find(|info| info.relative_path == relative)
    }

    /// Inserts or replaces an asset.
    ///
    /// Fails with [`CuratorError::DuplicateGuid`] if the GUID is already
    /// claimed by a document at a different path. Moves go through
    /// [`relocate`](Self::relocate) first.
    pub fn upsert(&mut self, info: AssetInfo) -> Result<UpsertOutcome, CuratorError> {
        let key = normalize_path(&info.absolute_path);
        if let Some(existing) = self.assets.get(&info.guid) {
            if normalize_path(&existing.absolute_path) != key {
                return Err(CuratorError::DuplicateGuid {
                    guid: info.guid,
                    existing: existing.relative_path.clone(),
                    duplicate: info.relative_path.clone(),
                });
            }
        }
        if let Some(&other) = self.by_path.get(&key) {
            if other != info.guid {
                self.remove(other);
            }
        }

        let guid = info.guid;
        self.by_path.insert(key, guid);
        let outcome = match self.assets.insert(guid, info) {
            Some(_) => UpsertOutcome::Updated,
            None => UpsertOutcome::Added,
        };
        match outcome {
            UpsertOutcome::Added => self.queue(CuratorEvent::AssetAdded { guid }),
            UpsertOutcome::Updated => self.queue(CuratorEvent::AssetUpdated { guid }),
        }
        Ok(outcome)
    }

    /// Moves a known asset to a new source path, keeping its identity.
    pub fn relocate(
        &mut self,
        guid: AssetGuid,
        absolute_path: PathBuf,
        relative_path: String,
    ) -> Result<(), CuratorError> {
        let info = self
            .assets
            .get_mut(&guid)
            .ok_or_else(|| CuratorError::UnknownAsset(guid.to_string()))?;
        self.by_path.remove(&normalize_path(&info.absolute_path));
        self.by_path.insert(normalize_path(&absolute_path), guid);
        info.absolute_path = absolute_path;
        info.relative_path = relative_path;
        self.queue(CuratorEvent::AssetMoved { guid });
        Ok(())
    }

    /// Removes an asset, returning its record.
    pub fn remove(&mut self, guid: AssetGuid) -> Option<AssetInfo> {
        let info = self.assets.remove(&guid)?;
        self.by_path.remove(&normalize_path(&info.absolute_path));
        self.queue(CuratorEvent::AssetRemoved { guid });
        Some(info)
    }

    /// Iterates over all assets of one document type.
    pub fn all_of_type<'a>(&'a self, type_name: &'a str) -> impl Iterator<Item = &'a AssetInfo> + 'a {
        self.assets
            .values()
            .filter(move |info| info.type_name == type_name)
    }

    /// Iterates over all assets in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = &AssetInfo> {
        self.assets.values()
    }

    /// Iterates mutably over all assets. Does not queue events.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut AssetInfo> {
        self.assets.values_mut()
    }

    /// Returns all GUIDs, sorted.
    pub fn guids(&self) -> Vec<AssetGuid> {
        let mut guids: Vec<AssetGuid> = self.assets.keys().copied().collect();
        guids.sort();
        guids
    }

    /// Returns the number of assets.
    pub fn len(&self) -> usize {
        self.assets.len()
    }

    /// Returns `true` if the store holds no assets.
    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Starts a bulk update. Nested calls are counted.
    pub fn begin_bulk(&mut self) {
        self.bulk_depth += 1;
    }

    /// Ends a bulk update; the outermost call queues a single
    /// [`CuratorEvent::AssetListReset`] if anything changed.
    pub fn end_bulk(&mut self) {
        self.bulk_depth = self.bulk_depth.saturating_sub(1);
        if self.bulk_depth == 0 && self.bulk_dirty {
            self.bulk_dirty = false;
            self.pending.push(CuratorEvent::AssetListReset);
        }
    }

    /// Queues a "something changed" event for `guid` outside of upserts.
    pub fn touch(&mut self, guid: AssetGuid) {
        if self.assets.contains_key(&guid) {
            self.queue(CuratorEvent::AssetUpdated { guid });
        }
    }

    /// Drains the queued events.
    pub fn take_events(&mut self) -> Vec<CuratorEvent> {
        std::mem::take(&mut self.pending)
    }

    fn queue(&mut self, event: CuratorEvent) {
        if self.bulk_depth > 0 {
            self.bulk_dirty = true;
        } else {
            self.pending.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curator_common::ContentHash;

    fn info(guid: u128, path: &str) -> AssetInfo {
        AssetInfo::new(
            AssetGuid::from_u128(guid),
            PathBuf::from(format!("/p/data/{path}")),
            path.to_string(),
            path.rsplit('.').next().unwrap_or_default().to_string(),
            ContentHash::from_bytes(b""),
        )
    }

    #[test]
    fn upsert_and_lookup() {
        let mut store = AssetStore::new();
        assert_eq!(store.upsert(info(1, "meshes/box.mesh")).unwrap(), UpsertOutcome::Added);
        let g = AssetGuid::from_u128(1);
        assert_eq!(store.lookup(g).unwrap().relative_path, "meshes/box.mesh");
        assert_eq!(
            store
                .lookup_by_path(Path::new("/p/data/meshes/./box.mesh"))
                .unwrap()
                .guid,
            g
        );
        assert_eq!(
            store.lookup_by_relative_path("meshes/box.mesh").unwrap().guid,
            g
        );
        assert!(store.lookup(AssetGuid::from_u128(2)).is_none());
    }

    #[test]
    fn upsert_same_path_updates() {
        let mut store = AssetStore::new();
        store.upsert(info(1, "a.mesh")).unwrap();
        assert_eq!(store.upsert(info(1, "a.mesh")).unwrap(), UpsertOutcome::Updated);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn duplicate_guid_at_other_path_is_rejected() {
        let mut store = AssetStore::new();
        store.upsert(info(1, "a.mesh")).unwrap();
        let err = store.upsert(info(1, "copy.mesh")).unwrap_err();
        assert!(matches!(err, CuratorError::DuplicateGuid { .. }));
        assert_eq!(store.lookup(AssetGuid::from_u128(1)).unwrap().relative_path, "a.mesh");
    }

    #[test]
    fn new_guid_at_known_path_replaces_old_asset() {
        let mut store = AssetStore::new();
        store.upsert(info(1, "a.mesh")).unwrap();
        store.take_events();
        store.upsert(info(2, "a.mesh")).unwrap();
        assert!(store.lookup(AssetGuid::from_u128(1)).is_none());
        assert_eq!(
            store.take_events(),
            vec![
                CuratorEvent::AssetRemoved { guid: AssetGuid::from_u128(1) },
                CuratorEvent::AssetAdded { guid: AssetGuid::from_u128(2) },
            ]
        );
    }

    #[test]
    fn relocate_keeps_identity() {
        let mut store = AssetStore::new();
        store.upsert(info(1, "a.mesh")).unwrap();
        store
            .relocate(
                AssetGuid::from_u128(1),
                PathBuf::from("/p/data/moved/a.mesh"),
                "moved/a.mesh".into(),
            )
            .unwrap();
        assert!(store.lookup_by_path(Path::new("/p/data/a.mesh")).is_none());
        assert_eq!(
            store
                .lookup_by_path(Path::new("/p/data/moved/a.mesh"))
                .unwrap()
                .guid,
            AssetGuid::from_u128(1)
        );
    }

    #[test]
    fn remove_and_all_of_type() {
        let mut store = AssetStore::new();
        store.upsert(info(1, "a.mesh")).unwrap();
        store.upsert(info(2, "b.mesh")).unwrap();
        store.upsert(info(3, "c.mat")).unwrap();
        assert_eq!(store.all_of_type("mesh").count(), 2);
        assert!(store.remove(AssetGuid::from_u128(1)).is_some());
        assert!(store.remove(AssetGuid::from_u128(1)).is_none());
        assert_eq!(store.all_of_type("mesh").count(), 1);
        assert_eq!(store.guids(), vec![AssetGuid::from_u128(2), AssetGuid::from_u128(3)]);
    }

    #[test]
    fn single_mutations_queue_individual_events() {
        let mut store = AssetStore::new();
        store.upsert(info(1, "a.mesh")).unwrap();
        store.remove(AssetGuid::from_u128(1));
        assert_eq!(
            store.take_events(),
            vec![
                CuratorEvent::AssetAdded { guid: AssetGuid::from_u128(1) },
                CuratorEvent::AssetRemoved { guid: AssetGuid::from_u128(1) },
            ]
        );
        assert!(store.take_events().is_empty());
    }

    #[test]
    fn bulk_update_coalesces_into_one_reset() {
        let mut store = AssetStore::new();
        store.begin_bulk();
        for i in 0..50 {
            store.upsert(info(i, &format!("m{i}.mesh"))).unwrap();
        }
        store.begin_bulk();
        store.remove(AssetGuid::from_u128(0));
        store.end_bulk();
        assert!(store.take_events().is_empty(), "nested end must not flush");
        store.end_bulk();
        assert_eq!(store.take_events(), vec![CuratorEvent::AssetListReset]);
    }

    #[test]
    fn empty_bulk_update_is_silent() {
        let mut store = AssetStore::new();
        store.begin_bulk();
        store.end_bulk();
        assert!(store.take_events().is_empty());
    }
}
