use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tempfile::NamedTempFile;

use crate::core::error::{Error, Result};

/// Write a JSON value atomically: serialize to a temp file in the target
/// directory, fsync, rename over the destination, then best-effort sync the
/// directory so the rename itself survives a crash.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let data = serde_json::to_vec_pretty(value)?;
    write_bytes_atomic(path, &data)
}

pub fn write_bytes_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => Path::new(".").to_path_buf(),
    };
    fs::create_dir_all(&dir)?;

    let mut tmp = NamedTempFile::new_in(&dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| Error::from(e.error))?;

    // Durability of the rename depends on the directory entry reaching disk.
    if let Ok(d) = File::open(&dir) {
        let _ = d.sync_all();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn write_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");

        let mut value = BTreeMap::new();
        value.insert("count".to_string(), 3u32);
        write_json_atomic(&path, &value).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        let back: BTreeMap<String, u32> = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn overwrite_replaces_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");

        write_json_atomic(&path, &vec![1, 2, 3]).unwrap();
        write_json_atomic(&path, &vec![9]).unwrap();

        let back: Vec<u32> = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back, vec![9]);
    }
}
