//! Content hashing and staleness decisions.
//!
//! An asset's content hash covers its source bytes, its per-asset settings,
//! the active platform's settings and, for every dependency, that
//! dependency's last-known content hash (assets) or file hash (plain files).
//! Because dependency hashes feed into the dependent's hash, a change anywhere
//! below an asset changes the asset's own hash; deciding staleness never
//! needs a graph walk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use curator_cache::{CuratorCache, TransformStamp};
use curator_common::{AssetGuid, ContentHash, HashBuilder};
use curator_config::PlatformProfile;

use crate::asset::{AssetInfo, DependencyRef, TransformState};
use crate::error::CuratorError;
use crate::scan::resolve_data_path;
use crate::store::AssetStore;

/// Domain tag mixed into every content hash; bump to invalidate all stamps.
const CONTENT_HASH_DOMAIN: &str = "curator-content-v1";

/// Hashes computed for one asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ComputedHash {
    pub dependency: ContentHash,
    pub content: ContentHash,
}

/// Everything the hash computation reads.
pub(crate) struct HashInputs<'a> {
    pub store: &'a AssetStore,
    pub cache: &'a CuratorCache,
    pub platform: &'a PlatformProfile,
    pub data_dirs: &'a [PathBuf],
}

/// Computes the content hash of `guid`.
///
/// The asset's own source is always checked against the file status cache.
/// Asset dependencies contribute their last-known hash; one that has none yet
/// is computed on the spot and recorded in `computed` like every other
/// successfully hashed asset. `visiting` is the current recursion path and
/// turns a revisit into [`CuratorError::CyclicDependency`].
pub(crate) fn compute_content_hash(
    inputs: &HashInputs<'_>,
    guid: AssetGuid,
    computed: &mut HashMap<AssetGuid, ComputedHash>,
    visiting: &mut Vec<AssetGuid>,
) -> Result<ComputedHash, CuratorError> {
    if let Some(hash) = computed.get(&guid) {
        return Ok(*hash);
    }
    let info = inputs
        .store
        .lookup(guid)
        .ok_or_else(|| CuratorError::UnknownAsset(guid.to_string()))?;

    if let Some(start) = visiting.iter().position(|g| *g == guid) {
        let mut cycle: Vec<String> = visiting[start..]
            .iter()
            .map(|g| display_name(inputs.store, *g))
            .collect();
        cycle.push(info.relative_path.clone());
        return Err(CuratorError::CyclicDependency { cycle });
    }

    let source = inputs.cache.hash_file(&info.absolute_path).map_err(|e| {
        if e.is_not_found() {
            CuratorError::SourceMissing {
                guid,
                path: info.absolute_path.clone(),
            }
        } else {
            CuratorError::from(e)
        }
    })?;

    visiting.push(guid);
    let dependency = dependency_hash(inputs, info, computed, visiting);
    visiting.pop();
    let dependency = dependency?;

    let hash = ComputedHash {
        dependency,
        content: HashBuilder::new()
            .str(CONTENT_HASH_DOMAIN)
            .hash(&source)
            .hash(&info.settings_hash)
            .hash(&inputs.platform.settings_hash)
            .hash(&dependency)
            .finish(),
    };
    computed.insert(guid, hash);
    Ok(hash)
}

fn dependency_hash(
    inputs: &HashInputs<'_>,
    info: &AssetInfo,
    computed: &mut HashMap<AssetGuid, ComputedHash>,
    visiting: &mut Vec<AssetGuid>,
) -> Result<ContentHash, CuratorError> {
    let mut builder = HashBuilder::new();
    for dep in &info.dependencies {
        match dep {
            DependencyRef::Asset(dep_guid) => {
                let Some(dep_info) = inputs.store.lookup(*dep_guid) else {
                    return Err(dangling(info, dep));
                };
                let hash = match (computed.get(dep_guid), dep_info.content_hash) {
                    (Some(fresh), _) => fresh.content,
                    (None, Some(known)) if !visiting.contains(dep_guid) => known,
                    _ => match compute_content_hash(inputs, *dep_guid, computed, visiting) {
                        Ok(hash) => hash.content,
                        Err(e @ CuratorError::CyclicDependency { .. }) => return Err(e),
                        Err(_) => return Err(dangling(info, dep)),
                    },
                };
                builder.str("asset").hash(&hash);
            }
            DependencyRef::File(relative) => {
                let path = resolve_data_path(inputs.data_dirs, relative);
                let hash = inputs.cache.hash_file(&path).map_err(|e| {
                    if e.is_not_found() {
                        dangling(info, dep)
                    } else {
                        CuratorError::from(e)
                    }
                })?;
                builder.str("file").str(relative).hash(&hash);
            }
        }
    }
    Ok(builder.finish())
}

fn dangling(info: &AssetInfo, dep: &DependencyRef) -> CuratorError {
    CuratorError::DanglingDependency {
        asset: info.relative_path.clone(),
        dependency: dep.to_string(),
    }
}

/// Relative path of a known asset, or its GUID.
pub(crate) fn display_name(store: &AssetStore, guid: AssetGuid) -> String {
    store
        .lookup(guid)
        .map(|info| info.relative_path.clone())
        .unwrap_or_else(|| guid.to_string())
}

/// Returns `true` if `stamp` records a transform of exactly `content` whose
/// outputs still exist.
pub(crate) fn stamp_is_current(
    stamp: Option<&TransformStamp>,
    content: ContentHash,
    project_root: &Path,
) -> bool {
    stamp.is_some_and(|stamp| {
        stamp.content_hash == content
            && stamp
                .outputs
                .iter()
                .all(|output| project_root.join(output).exists())
    })
}

/// Facts feeding an asset's [`TransformState`].
pub(crate) struct StateInputs<'a> {
    pub hash: &'a Result<ComputedHash, CuratorError>,
    pub cyclic: bool,
    pub disabled: bool,
    pub current: bool,
    pub missing_reference: bool,
}

/// Derives the transform state of `info`.
///
/// Hard problems (missing source, cycle, unresolved dependency) win over
/// staleness; an unresolved reference only downgrades an otherwise healthy
/// asset.
pub(crate) fn classify(info: &AssetInfo, facts: StateInputs<'_>) -> TransformState {
    let state = match facts.hash {
        Err(CuratorError::SourceMissing { .. }) => TransformState::SourceMissing,
        _ if facts.cyclic => TransformState::CircularDependency,
        Err(CuratorError::CyclicDependency { .. }) => TransformState::CircularDependency,
        Err(CuratorError::DanglingDependency { .. }) => TransformState::MissingDependency,
        Err(_) => TransformState::TransformError,
        Ok(_) if facts.disabled => TransformState::UpToDate,
        Ok(_) if facts.current => TransformState::UpToDate,
        Ok(hash) => {
            let failed_same_input = info.last_result.as_ref().is_some_and(|result| {
                !result.is_success() && result.content_hash == Some(hash.content)
            });
            if failed_same_input {
                TransformState::TransformError
            } else {
                TransformState::NeedsTransform
            }
        }
    };
    match state {
        TransformState::UpToDate | TransformState::NeedsTransform if facts.missing_reference => {
            TransformState::MissingReference
        }
        other => other,
    }
}

/// Returns `true` if any declared reference of `info` does not resolve.
pub(crate) fn has_missing_reference(
    store: &AssetStore,
    data_dirs: &[PathBuf],
    info: &AssetInfo,
) -> bool {
    info.references.iter().any(|r| match r {
        DependencyRef::Asset(guid) => store.lookup(*guid).is_none(),
        DependencyRef::File(relative) => !resolve_data_path(data_dirs, relative).exists(),
    })
}
