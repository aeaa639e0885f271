//! Interned file paths for cheap graph nodes and O(1) equality comparison.

use lasso::ThreadedRodeo;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path};

/// A handle to an interned, normalized file path.
///
/// Plain-file dependencies (source images, meshes, ...) appear as nodes in the
/// dependency graph next to assets. Interning their paths keeps those nodes
/// `Copy` and makes equality a `u32` compare.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct FileId(u32);

impl FileId {
    /// Creates a `FileId` from a raw `u32` index.
    ///
    /// This is primarily intended for deserialization and testing.
    /// In normal use, ids should be created through [`PathInterner::intern`].
    pub fn from_raw(index: u32) -> Self {
        Self(index)
    }

    /// Returns the raw `u32` index of this id.
    pub fn as_raw(self) -> u32 {
        self.0
    }
}

// SAFETY: `FileId` wraps a `u32` which is always a valid `usize` on 32-bit and
// 64-bit platforms. `try_from_usize` rejects values that don't fit in `u32`.
unsafe impl lasso::Key for FileId {
    fn into_usize(self) -> usize {
        self.0 as usize
    }

    fn try_from_usize(int: usize) -> Option<Self> {
        u32::try_from(int).ok().map(FileId)
    }
}

/// Normalizes a path into the curator's canonical string form.
///
/// Separators become `/`, `.` components are dropped and `..` pops the
/// previous component lexically. The file system is never consulted, so the
/// path does not need to exist.
pub fn normalize_path(path: &Path) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut prefix = String::new();
    for component in path.components() {
        match component {
            Component::Prefix(p) => prefix = p.as_os_str().to_string_lossy().replace('\\', "/"),
            Component::RootDir => prefix.push('/'),
            Component::CurDir => {}
            Component::ParentDir => match parts.last().map(String::as_str) {
                Some("..") | None if prefix.is_empty() => parts.push("..".to_string()),
                None => {}
                Some(_) => {
                    parts.pop();
                }
            },
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
        }
    }
    format!("{prefix}{}", parts.join("/"))
}

/// Thread-safe path interner backed by [`lasso::ThreadedRodeo`].
///
/// Every path is normalized with [`normalize_path`] before interning, so
/// `a/./b.png` and `a/b.png` map to the same [`FileId`].
pub struct PathInterner {
    rodeo: ThreadedRodeo<FileId>,
}

impl PathInterner {
    /// Creates a new empty interner.
    pub fn new() -> Self {
        Self {
            rodeo: ThreadedRodeo::new(),
        }
    }

    /// Interns a path, returning its [`FileId`]. If the normalized path was
    /// already interned, returns the existing id without allocating.
    pub fn intern(&self, path: &Path) -> FileId {
        self.rodeo.get_or_intern(normalize_path(path))
    }

    /// Returns the id of an already interned path.
    pub fn get(&self, path: &Path) -> Option<FileId> {
        self.rodeo.get(normalize_path(path))
    }

    /// Resolves a [`FileId`] back to its normalized path string.
    ///
    /// # Panics
    ///
    /// Panics if the `FileId` was not created by this interner.
    pub fn resolve(&self, id: FileId) -> &str {
        self.rodeo.resolve(&id)
    }

    /// Returns the number of distinct interned paths.
    pub fn len(&self) -> usize {
        self.rodeo.len()
    }

    /// Returns `true` if nothing has been interned yet.
    pub fn is_empty(&self) -> bool {
        self.rodeo.is_empty()
    }
}

impl Default for PathInterner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_resolve_roundtrip() {
        let interner = PathInterner::new();
        let id = interner.intern(Path::new("meshes/box.obj"));
        assert_eq!(interner.resolve(id), "meshes/box.obj");
    }

    #[test]
    fn equivalent_paths_share_id() {
        let interner = PathInterner::new();
        let a = interner.intern(Path::new("meshes/./box.obj"));
        let b = interner.intern(Path::new("meshes/sub/../box.obj"));
        assert_eq!(a, b);
        assert_eq!(interner.len(), 1);
    }

    #[test]
    fn different_paths_different_ids() {
        let interner = PathInterner::new();
        let a = interner.intern(Path::new("a.png"));
        let b = interner.intern(Path::new("b.png"));
        assert_ne!(a, b);
    }

    #[test]
    fn get_does_not_intern() {
        let interner = PathInterner::new();
        assert!(interner.get(Path::new("x.png")).is_none());
        assert!(interner.is_empty());
        let id = interner.intern(Path::new("x.png"));
        assert_eq!(interner.get(Path::new("x.png")), Some(id));
    }

    #[test]
    fn normalize_keeps_absolute_root() {
        assert_eq!(normalize_path(Path::new("/data/base/a.mesh")), "/data/base/a.mesh");
        assert_eq!(normalize_path(Path::new("./a/b/../c")), "a/c");
        assert_eq!(normalize_path(Path::new("../up")), "../up");
    }

    #[test]
    fn serde_roundtrip() {
        let id = FileId(7);
        let json = serde_json::to_string(&id).unwrap();
        let back: FileId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
