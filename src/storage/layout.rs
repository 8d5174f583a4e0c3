use std::fs;
use std::path::PathBuf;

use crate::core::error::Result;
use crate::storage::shard::ShardKey;

/// Directory structure under the store root.
#[derive(Debug, Clone)]
pub struct StoreLayout {
    pub root: PathBuf,       // store root
    pub shards_dir: PathBuf, // shard files (shard_*.json)
    pub wal_dir: PathBuf,    // write-ahead log location
}

impl StoreLayout {
    pub fn new(root: PathBuf) -> Result<Self> {
        let shards_dir = root.join("shards");
        let wal_dir = root.join(".wal");

        fs::create_dir_all(&shards_dir)?;
        fs::create_dir_all(&wal_dir)?;

        Ok(StoreLayout {
            root,
            shards_dir,
            wal_dir,
        })
    }

    pub fn shard_path(&self, key: &ShardKey) -> PathBuf {
        self.shards_dir.join(key.filename())
    }

    pub fn index_path(&self) -> PathBuf {
        self.root.join("memory_index.json")
    }

    pub fn wal_path(&self) -> PathBuf {
        self.wal_dir.join("pending.jsonl")
    }

    pub fn access_counts_path(&self) -> PathBuf {
        self.root.join("access_counts.json")
    }

    pub fn outcomes_path(&self) -> PathBuf {
        self.root.join("outcomes.jsonl")
    }

    pub fn legacy_path(&self) -> PathBuf {
        self.root.join("memory_metadata.json")
    }
}
