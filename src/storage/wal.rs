use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use crate::core::error::Result;
use crate::core::types::Record;
use crate::storage::layout::StoreLayout;

/// Append-only durability journal, written before any shard file is touched.
///
/// One serialized record per line. The pending counter is in-process only;
/// `pending_count` never re-scans the file.
pub struct WriteAheadLog {
    pub path: PathBuf,
    pub flush_threshold: usize,
    pub max_bytes: u64,
    write_count: usize,
}

impl WriteAheadLog {
    pub fn open(layout: &StoreLayout, flush_threshold: usize, max_bytes: u64) -> Self {
        WriteAheadLog {
            path: layout.wal_path(),
            flush_threshold,
            max_bytes,
            write_count: 0,
        }
    }

    /// Append one record as a JSON line.
    pub fn append(&mut self, record: &Record) -> Result<()> {
        let line = serde_json::to_string(record)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_all()?;

        self.write_count += 1;
        Ok(())
    }

    /// Read back every valid pending record. Lines that fail to parse are
    /// skipped so a crash mid-append never blocks startup.
    pub fn load_pending(&self) -> Vec<Record> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(_) => return Vec::new(),
        };

        let mut records = Vec::new();
        for line in raw.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<Record>(trimmed) {
                Ok(record) => records.push(record),
                Err(e) => {
                    log::debug!("skipping corrupt WAL line: {}", e);
                }
            }
        }
        records
    }

    /// Delete the journal after its contents are safely in shards.
    pub fn clear(&mut self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        self.write_count = 0;
        Ok(())
    }

    pub fn size_bytes(&self) -> u64 {
        fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }

    pub fn pending_count(&self) -> usize {
        self.write_count
    }

    pub fn should_flush(&self) -> bool {
        self.write_count >= self.flush_threshold || self.size_bytes() >= self.max_bytes
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wal_in(dir: &std::path::Path) -> (StoreLayout, WriteAheadLog) {
        let layout = StoreLayout::new(dir.to_path_buf()).unwrap();
        let wal = WriteAheadLog::open(&layout, 3, 1_000_000);
        (layout, wal)
    }

    #[test]
    fn append_and_replay() {
        let dir = tempfile::tempdir().unwrap();
        let (_layout, mut wal) = wal_in(dir.path());

        let a = Record::new("First line of pending work", "notes", 1, "general");
        let b = Record::new("Second line of pending work", "notes", 2, "general");
        wal.append(&a).unwrap();
        wal.append(&b).unwrap();

        assert_eq!(wal.pending_count(), 2);
        let replayed = wal.load_pending();
        assert_eq!(replayed.len(), 2);
        assert_eq!(replayed[0].hash, a.hash);
        assert_eq!(replayed[1].hash, b.hash);
    }

    #[test]
    fn corrupt_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let (_layout, mut wal) = wal_in(dir.path());

        let a = Record::new("A valid record before the torn write", "notes", 1, "general");
        wal.append(&a).unwrap();

        // Simulate a crash mid-append.
        let mut file = OpenOptions::new().append(true).open(&wal.path).unwrap();
        file.write_all(b"{\"hash\": \"dead\", \"content").unwrap();

        let replayed = wal.load_pending();
        assert_eq!(replayed.len(), 1);
        assert_eq!(replayed[0].hash, a.hash);
    }

    #[test]
    fn should_flush_on_count_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let (_layout, mut wal) = wal_in(dir.path());

        for i in 0..3 {
            let r = Record::new(format!("Pending record number {}", i), "notes", i, "general");
            wal.append(&r).unwrap();
        }
        assert!(wal.should_flush());

        wal.clear().unwrap();
        assert_eq!(wal.pending_count(), 0);
        assert!(!wal.exists());
        assert!(!wal.should_flush());
    }

    #[test]
    fn should_flush_on_size_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path().to_path_buf()).unwrap();
        let mut wal = WriteAheadLog::open(&layout, 1_000, 64);

        let r = Record::new("A record comfortably longer than the byte cap", "notes", 1, "general");
        wal.append(&r).unwrap();
        assert!(wal.should_flush());
    }
}
