//! Per-platform asset lookup tables.
//!
//! A table maps every successfully transformed asset to the absolute path of
//! its primary output file. It is plain UTF-8 text, one `guid;path` line per
//! asset sorted by GUID, and is always replaced as a whole.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use curator_common::AssetGuid;

use crate::error::CuratorError;

/// File extension of lookup tables.
pub const TABLE_EXT: &str = "aidlt";

/// Returns the table file of `platform` inside `tables_dir`.
pub fn table_path(tables_dir: &Path, platform: &str) -> PathBuf {
    tables_dir.join(format!("{platform}.{TABLE_EXT}"))
}

/// Renders table entries to the on-disk text form.
pub fn render_asset_table(entries: &BTreeMap<AssetGuid, String>) -> String {
    let mut out = String::new();
    for (guid, path) in entries {
        out.push_str(&guid.to_string());
        out.push(';');
        out.push_str(path);
        out.push('\n');
    }
    out
}

/// Writes a table atomically.
pub fn write_asset_table(
    path: &Path,
    entries: &BTreeMap<AssetGuid, String>,
) -> Result<(), CuratorError> {
    curator_cache::write_atomic(path, render_asset_table(entries).as_bytes())?;
    Ok(())
}

/// Reads a table back.
pub fn read_asset_table(path: &Path) -> Result<BTreeMap<AssetGuid, String>, CuratorError> {
    let text = std::fs::read_to_string(path).map_err(|e| CuratorError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_asset_table(&text).map_err(|reason| CuratorError::InvalidDocument {
        path: path.to_path_buf(),
        reason,
    })
}

fn parse_asset_table(text: &str) -> Result<BTreeMap<AssetGuid, String>, String> {
    let mut entries = BTreeMap::new();
    for (index, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let (guid, path) = line
            .split_once(';')
            .ok_or_else(|| format!("line {}: expected 'guid;path'", index + 1))?;
        let guid: AssetGuid = guid
            .parse()
            .map_err(|e| format!("line {}: {e}", index + 1))?;
        entries.insert(guid, path.to_string());
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries() -> BTreeMap<AssetGuid, String> {
        BTreeMap::from([
            (AssetGuid::from_u128(2), "/p/AssetCache/pc/b.mesh.bin".to_string()),
            (AssetGuid::from_u128(1), "/p/AssetCache/pc/a.mesh.bin".to_string()),
        ])
    }

    #[test]
    fn table_path_uses_platform_name() {
        assert_eq!(
            table_path(Path::new("/p/AssetCache"), "pc"),
            PathBuf::from("/p/AssetCache/pc.aidlt")
        );
    }

    #[test]
    fn rendered_lines_are_sorted_by_guid() {
        let text = render_asset_table(&entries());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with(&AssetGuid::from_u128(1).to_string()));
        assert!(lines[0].ends_with(";/p/AssetCache/pc/a.mesh.bin"));
    }

    #[test]
    fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = table_path(dir.path(), "pc");
        write_asset_table(&path, &entries()).unwrap();
        assert_eq!(read_asset_table(&path).unwrap(), entries());
    }

    #[test]
    fn empty_table_is_valid() {
        let dir = tempfile::tempdir().unwrap();
        let path = table_path(dir.path(), "pc");
        write_asset_table(&path, &BTreeMap::new()).unwrap();
        assert!(read_asset_table(&path).unwrap().is_empty());
    }

    #[test]
    fn malformed_line_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.aidlt");
        std::fs::write(&path, "not-a-guid;x\n").unwrap();
        let err = read_asset_table(&path).unwrap_err();
        assert!(matches!(err, CuratorError::InvalidDocument { .. }));
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn missing_table_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_asset_table(&dir.path().join("none.aidlt")).unwrap_err();
        assert!(matches!(err, CuratorError::Io { .. }));
    }
}
