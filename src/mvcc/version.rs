use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, SystemTime};

use sha2::{Digest, Sha256};

use crate::core::error::{Error, Result};
use crate::storage::atomic::write_json_atomic;

/// Snapshot of a file's physical state at read time.
#[derive(Debug, Clone)]
pub struct FileVersion {
    pub path: PathBuf,
    pub mtime: SystemTime,
    pub size: u64,
    pub content_digest: Option<String>,
}

/// Optimistic conflict detection for read-modify-write on shared files.
///
/// Lighter than the advisory lock for read-heavy, write-rare files: writers
/// snapshot, mutate, and re-check instead of excluding each other up front.
pub struct VersionTracker {
    pub use_content_digest: bool,
}

impl VersionTracker {
    pub fn new() -> Self {
        VersionTracker {
            use_content_digest: false,
        }
    }

    /// Opt into digest comparison for files where mtime/size can collide
    /// despite content changes.
    pub fn with_content_digest() -> Self {
        VersionTracker {
            use_content_digest: true,
        }
    }

    pub fn snapshot(&self, path: &Path) -> Result<FileVersion> {
        let meta = fs::metadata(path)?;
        let content_digest = if self.use_content_digest {
            Some(digest_file(path)?)
        } else {
            None
        };

        Ok(FileVersion {
            path: path.to_path_buf(),
            mtime: meta.modified()?,
            size: meta.len(),
            content_digest,
        })
    }

    /// Error with `ErrorKind::Conflict` if the file changed (or vanished)
    /// since the snapshot was taken.
    pub fn check(&self, version: &FileVersion) -> Result<()> {
        let meta = match fs::metadata(&version.path) {
            Ok(meta) => meta,
            Err(_) => {
                return Err(Error::conflict(format!(
                    "{}: file deleted since last read",
                    version.path.display()
                )));
            }
        };

        let mtime = meta.modified()?;
        if mtime != version.mtime || meta.len() != version.size {
            return Err(Error::conflict(format!(
                "{}: modified since last read (expected mtime={:?} size={}, actual mtime={:?} size={})",
                version.path.display(),
                version.mtime,
                version.size,
                mtime,
                meta.len(),
            )));
        }

        if let Some(expected) = &version.content_digest {
            let actual = digest_file(&version.path)?;
            if actual != *expected {
                return Err(Error::conflict(format!(
                    "{}: content changed under an unchanged mtime/size",
                    version.path.display()
                )));
            }
        }

        Ok(())
    }

    /// Read-modify-write a JSON file with bounded retries on conflict.
    pub fn safe_update<F>(&self, path: &Path, mut mutate: F, max_retries: u32)
        -> Result<serde_json::Value>
    where
        F: FnMut(serde_json::Value) -> serde_json::Value,
    {
        let mut last_err = None;

        for attempt in 0..=max_retries {
            let version = self.snapshot(path)?;
            let raw = fs::read_to_string(path)?;
            let data: serde_json::Value = serde_json::from_str(&raw)?;

            let modified = mutate(data);

            match self.check(&version) {
                Ok(()) => {
                    write_json_atomic(path, &modified)?;
                    return Ok(modified);
                }
                Err(e) => {
                    log::warn!(
                        "conflict on {}, retry {}/{}",
                        path.display(),
                        attempt + 1,
                        max_retries
                    );
                    last_err = Some(e);
                    thread::sleep(Duration::from_millis(10 * (attempt as u64 + 1)));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            Error::conflict(format!("{}: retries exhausted", path.display()))
        }))
    }
}

impl Default for VersionTracker {
    fn default() -> Self {
        VersionTracker::new()
    }
}

fn digest_file(path: &Path) -> Result<String> {
    let data = fs::read(path)?;
    let digest = Sha256::digest(&data);
    Ok(digest.iter().map(|b| format!("{:02x}", b)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;

    #[test]
    fn unchanged_file_passes_check() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        fs::write(&path, b"{\"count\": 0}").unwrap();

        let tracker = VersionTracker::new();
        let version = tracker.snapshot(&path).unwrap();
        tracker.check(&version).unwrap();
    }

    #[test]
    fn modified_file_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        fs::write(&path, b"{\"count\": 0}").unwrap();

        let tracker = VersionTracker::new();
        let version = tracker.snapshot(&path).unwrap();
        fs::write(&path, b"{\"count\": 10}").unwrap();

        let err = tracker.check(&version).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);
        assert!(err.context.contains("modified since last read"));
    }

    #[test]
    fn deleted_file_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        fs::write(&path, b"{}").unwrap();

        let tracker = VersionTracker::new();
        let version = tracker.snapshot(&path).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(tracker.check(&version).unwrap_err().kind, ErrorKind::Conflict);
    }

    #[test]
    fn digest_catches_same_size_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        fs::write(&path, b"{\"v\": 1}").unwrap();

        let tracker = VersionTracker::with_content_digest();
        let mut version = tracker.snapshot(&path).unwrap();
        fs::write(&path, b"{\"v\": 2}").unwrap();

        // Force the mtime/size fast path to pass so only the digest differs.
        let meta = fs::metadata(&path).unwrap();
        version.mtime = meta.modified().unwrap();
        version.size = meta.len();

        assert_eq!(tracker.check(&version).unwrap_err().kind, ErrorKind::Conflict);
    }

    #[test]
    fn safe_update_applies_mutation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counter.json");
        fs::write(&path, b"{\"count\": 41}").unwrap();

        let tracker = VersionTracker::new();
        let result = tracker
            .safe_update(
                &path,
                |mut v| {
                    let count = v["count"].as_i64().unwrap();
                    v["count"] = serde_json::json!(count + 1);
                    v
                },
                3,
            )
            .unwrap();
        assert_eq!(result["count"], 42);

        let on_disk: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk["count"], 42);
    }
}
