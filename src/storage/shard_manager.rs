use std::collections::HashMap;
use std::fs;
use std::num::NonZeroUsize;

use lru::LruCache;

use crate::core::error::Result;
use crate::core::types::Record;
use crate::storage::atomic::write_json_atomic;
use crate::storage::layout::StoreLayout;
use crate::storage::shard::{shard_key_for, ShardFile, ShardKey};
use crate::storage::shard_index::ShardIndex;

/// Partitions records into shard files and serves reads through a bounded
/// cache of recently opened shards.
pub struct ShardManager {
    pub layout: StoreLayout,
    pub index: ShardIndex,
    cache: LruCache<ShardKey, Vec<Record>>,
}

impl ShardManager {
    pub fn new(layout: StoreLayout, cache_size: usize) -> Self {
        let index = ShardIndex::load(&layout);
        let cap = NonZeroUsize::new(cache_size.max(1)).unwrap();
        ShardManager {
            layout,
            index,
            cache: LruCache::new(cap),
        }
    }

    /// Group records by shard key. Every record maps to exactly one key.
    pub fn partition(&self, records: &[Record]) -> HashMap<ShardKey, Vec<Record>> {
        let mut groups: HashMap<ShardKey, Vec<Record>> = HashMap::new();
        for record in records {
            groups
                .entry(shard_key_for(record))
                .or_default()
                .push(record.clone());
        }
        groups
    }

    /// Serialize one shard atomically and refresh its index entry.
    pub fn write_shard(&mut self, key: &ShardKey, records: Vec<Record>) -> Result<()> {
        let path = self.layout.shard_path(key);
        let file = ShardFile::new(key, records);
        write_json_atomic(&path, &file)?;

        self.index.add_shard(key.clone(), &file.memories);
        let size = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        self.index.set_size(key, size);

        self.cache.put(key.clone(), file.memories);
        Ok(())
    }

    /// Read one shard. A missing or corrupt shard file is an empty shard,
    /// never an error.
    pub fn read_shard(&mut self, key: &ShardKey) -> Vec<Record> {
        if let Some(records) = self.cache.get(key) {
            return records.clone();
        }

        let path = self.layout.shard_path(key);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(_) => return Vec::new(),
        };
        let file: ShardFile = match serde_json::from_str(&raw) {
            Ok(file) => file,
            Err(e) => {
                log::warn!("treating corrupt shard {} as empty: {}", key, e);
                return Vec::new();
            }
        };

        self.cache.put(key.clone(), file.memories.clone());
        file.memories
    }

    /// Concatenate all shards, newest first, up to a safety cap.
    pub fn load_all(&mut self, limit: usize) -> Vec<Record> {
        let mut keys: Vec<ShardKey> = self.index.shards.keys().cloned().collect();
        keys.sort_by(|a, b| b.cmp(a));

        let mut records = Vec::new();
        let mut truncated = false;
        for key in keys {
            let shard = self.read_shard(&key);
            for record in shard {
                if records.len() >= limit {
                    truncated = true;
                    break;
                }
                records.push(record);
            }
            if truncated {
                break;
            }
        }

        if truncated {
            log::warn!("load_all hit the {}-record safety cap; older shards were not loaded", limit);
        }
        records
    }

    /// Substring search across candidate shards on disk, without going
    /// through the in-memory set. Only the most promising shards are
    /// opened.
    pub fn search_shards(
        &mut self,
        query: &str,
        limit: usize,
        date_range: Option<(&str, &str)>,
        topic: Option<&str>,
    ) -> Vec<Record> {
        const MAX_SHARDS_PER_QUERY: usize = 5;

        let candidates = self.index.find_candidate_shards(query, date_range, topic);
        let query_lower = query.to_lowercase();
        let mut hits = Vec::new();

        for key in candidates.into_iter().take(MAX_SHARDS_PER_QUERY) {
            for record in self.read_shard(&key) {
                if record.content.to_lowercase().contains(&query_lower) {
                    hits.push(record);
                    if hits.len() >= limit {
                        return hits;
                    }
                }
            }
        }
        hits
    }

    pub fn invalidate_cache(&mut self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(dir: &std::path::Path) -> ShardManager {
        let layout = StoreLayout::new(dir.to_path_buf()).unwrap();
        ShardManager::new(layout, 4)
    }

    fn record(content: &str, line: u32, category: &str) -> Record {
        Record::new(content, "notes", line, category)
    }

    #[test]
    fn partition_groups_by_derived_key() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path());

        let records = vec![
            record("Patent filed for memory decay algorithm", 1, "legal"),
            record("Patent filed for search ranking method", 2, "legal"),
            record("Revenue grew this quarter", 3, "finance"),
        ];
        let groups = mgr.partition(&records);
        assert_eq!(groups.len(), 2);
        let legal_key = shard_key_for(&records[0]);
        assert_eq!(groups[&legal_key].len(), 2);
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = manager(dir.path());

        let records = vec![record("Patent filed for memory decay algorithm", 1, "legal")];
        let key = shard_key_for(&records[0]);
        mgr.write_shard(&key, records.clone()).unwrap();

        mgr.invalidate_cache();
        let back = mgr.read_shard(&key);
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].hash, records[0].hash);
        assert!(mgr.index.shards[&key].size_bytes > 0);
    }

    #[test]
    fn missing_shard_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = manager(dir.path());
        assert!(mgr.read_shard(&ShardKey::new("1999-01", "nothing")).is_empty());
    }

    #[test]
    fn corrupt_shard_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = manager(dir.path());

        let key = ShardKey::new("2026-08", "broken");
        fs::write(mgr.layout.shard_path(&key), b"{ not json").unwrap();
        assert!(mgr.read_shard(&key).is_empty());
    }

    #[test]
    fn load_all_respects_the_cap() {
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = manager(dir.path());

        let records: Vec<Record> = (0..5)
            .map(|i| record(&format!("Record number {} with enough text", i), i, "legal"))
            .collect();
        let key = shard_key_for(&records[0]);
        mgr.write_shard(&key, records).unwrap();

        assert_eq!(mgr.load_all(3).len(), 3);
        assert_eq!(mgr.load_all(100).len(), 5);
    }

    #[test]
    fn index_rebuild_matches_written_shards() {
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = manager(dir.path());

        let a = vec![record("Patent filed for memory decay algorithm", 1, "legal")];
        let b = vec![record("Revenue grew this quarter", 2, "finance")];
        mgr.write_shard(&shard_key_for(&a[0]), a).unwrap();
        mgr.write_shard(&shard_key_for(&b[0]), b).unwrap();

        let mut rebuilt = ShardIndex {
            shards: HashMap::new(),
        };
        let scanned = rebuilt.rebuild(&mgr.layout).unwrap();
        assert_eq!(scanned, 2);
        assert_eq!(rebuilt.total_records(), mgr.index.total_records());
    }
}
