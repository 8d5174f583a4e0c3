use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::tokenizer::query_keywords;
use crate::core::error::Result;
use crate::core::types::Record;
use crate::storage::atomic::write_json_atomic;
use crate::storage::layout::StoreLayout;
use crate::storage::shard::{ShardFile, ShardKey};

/// Per-shard summary metadata.
#[derive(Debug, Clone)]
pub struct ShardMeta {
    pub count: usize,
    pub first_entry: DateTime<Utc>,
    pub last_entry: DateTime<Utc>,
    pub topics: BTreeSet<String>,
    pub size_bytes: u64,
}

/// Tracks which records live in which shards.
///
/// The index is a cache over the shard files, never the source of truth:
/// `rebuild` reconstructs it from the shard files alone.
pub struct ShardIndex {
    pub shards: HashMap<ShardKey, ShardMeta>,
}

#[derive(Serialize, Deserialize)]
struct IndexFile {
    version: String,
    updated_at: DateTime<Utc>,
    total_shards: usize,
    shards: Vec<IndexEntry>,
}

#[derive(Serialize, Deserialize)]
struct IndexEntry {
    date_key: String,
    topic_key: String,
    filename: String,
    count: usize,
    first_entry: DateTime<Utc>,
    last_entry: DateTime<Utc>,
    topics: Vec<String>,
    size_bytes: u64,
}

impl ShardIndex {
    /// Load the index file, treating a missing or corrupt file as empty.
    pub fn load(layout: &StoreLayout) -> Self {
        let mut index = ShardIndex {
            shards: HashMap::new(),
        };

        let raw = match fs::read_to_string(layout.index_path()) {
            Ok(raw) => raw,
            Err(_) => return index,
        };
        let file: IndexFile = match serde_json::from_str(&raw) {
            Ok(file) => file,
            Err(e) => {
                log::warn!("shard index unreadable, starting empty: {}", e);
                return index;
            }
        };

        for entry in file.shards {
            let key = ShardKey::new(entry.date_key, entry.topic_key);
            index.shards.insert(
                key,
                ShardMeta {
                    count: entry.count,
                    first_entry: entry.first_entry,
                    last_entry: entry.last_entry,
                    topics: entry.topics.into_iter().collect(),
                    size_bytes: entry.size_bytes,
                },
            );
        }
        index
    }

    pub fn save(&self, layout: &StoreLayout) -> Result<()> {
        let mut entries: Vec<IndexEntry> = self
            .shards
            .iter()
            .map(|(key, meta)| IndexEntry {
                date_key: key.date_key.clone(),
                topic_key: key.topic_key.clone(),
                filename: key.filename(),
                count: meta.count,
                first_entry: meta.first_entry,
                last_entry: meta.last_entry,
                topics: meta.topics.iter().cloned().collect(),
                size_bytes: meta.size_bytes,
            })
            .collect();
        entries.sort_by(|a, b| (&a.date_key, &a.topic_key).cmp(&(&b.date_key, &b.topic_key)));

        let file = IndexFile {
            version: env!("CARGO_PKG_VERSION").to_string(),
            updated_at: Utc::now(),
            total_shards: entries.len(),
            shards: entries,
        };
        write_json_atomic(&layout.index_path(), &file)
    }

    /// Register a shard's summary. Size is filled in after the file lands.
    pub fn add_shard(&mut self, key: ShardKey, records: &[Record]) {
        if records.is_empty() {
            return;
        }

        let mut topics = BTreeSet::new();
        for record in records {
            topics.extend(record.tags.iter().cloned());
            if !record.category.is_empty() {
                topics.insert(record.category.clone());
            }
        }

        self.shards.insert(
            key,
            ShardMeta {
                count: records.len(),
                first_entry: records[0].created,
                last_entry: records[records.len() - 1].created,
                topics,
                size_bytes: 0,
            },
        );
    }

    pub fn set_size(&mut self, key: &ShardKey, size_bytes: u64) {
        if let Some(meta) = self.shards.get_mut(key) {
            meta.size_bytes = size_bytes;
        }
    }

    pub fn remove(&mut self, key: &ShardKey) {
        self.shards.remove(key);
    }

    /// Shards worth opening for a query. A shard is a candidate when its
    /// topic set intersects the query's keywords, when it is a general
    /// shard, or when no keyword narrowing was possible. Newest first.
    pub fn find_candidate_shards(
        &self,
        query: &str,
        date_range: Option<(&str, &str)>,
        topic: Option<&str>,
    ) -> Vec<ShardKey> {
        let keywords = query_keywords(query);
        let mut candidates = Vec::new();

        for (key, meta) in &self.shards {
            if let Some((start, end)) = date_range {
                let start_month = &start[..start.len().min(7)];
                let end_month = &end[..end.len().min(7)];
                if key.date_key.as_str() < start_month || key.date_key.as_str() > end_month {
                    continue;
                }
            }

            if let Some(topic) = topic {
                if !key.topic_key.to_lowercase().contains(&topic.to_lowercase()) {
                    continue;
                }
            }

            let topic_match = meta
                .topics
                .iter()
                .any(|t| keywords.contains(&t.to_lowercase()));
            if topic_match || key.topic_key == "general" || keywords.is_empty() {
                candidates.push(key.clone());
            }
        }

        candidates.sort_by(|a, b| b.cmp(a));
        candidates
    }

    /// Reconstruct the whole index by scanning shard files. Unreadable
    /// files are skipped.
    pub fn rebuild(&mut self, layout: &StoreLayout) -> Result<usize> {
        self.shards.clear();

        let entries = match fs::read_dir(&layout.shards_dir) {
            Ok(entries) => entries,
            Err(_) => return Ok(0),
        };

        let mut scanned = 0;
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }

            let raw = match fs::read_to_string(&path) {
                Ok(raw) => raw,
                Err(_) => continue,
            };
            let shard: ShardFile = match serde_json::from_str(&raw) {
                Ok(shard) => shard,
                Err(e) => {
                    log::warn!("skipping unreadable shard {:?}: {}", path.file_name(), e);
                    continue;
                }
            };

            let key = shard.key();
            self.add_shard(key.clone(), &shard.memories);
            self.set_size(&key, entry.metadata().map(|m| m.len()).unwrap_or(0));
            scanned += 1;
        }
        Ok(scanned)
    }

    pub fn total_records(&self) -> usize {
        self.shards.values().map(|m| m.count).sum()
    }

    pub fn total_size_bytes(&self) -> u64 {
        self.shards.values().map(|m| m.size_bytes).sum()
    }

    /// Record counts grouped by month and by topic.
    pub fn distributions(&self) -> (BTreeMap<String, usize>, BTreeMap<String, usize>) {
        let mut by_date: BTreeMap<String, usize> = BTreeMap::new();
        let mut by_topic: BTreeMap<String, usize> = BTreeMap::new();
        for (key, meta) in &self.shards {
            *by_date.entry(key.date_key.clone()).or_default() += meta.count;
            *by_topic.entry(key.topic_key.clone()).or_default() += meta.count;
        }
        (by_date, by_topic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_with_tags(content: &str, line: u32, category: &str, tags: &[&str]) -> Record {
        let mut r = Record::new(content, "notes", line, category);
        r.tags = tags.iter().map(|t| t.to_string()).collect();
        r
    }

    #[test]
    fn candidates_match_on_topic_overlap() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path().to_path_buf()).unwrap();
        let mut index = ShardIndex::load(&layout);

        let patents = vec![record_with_tags(
            "Patent filed for memory decay algorithm", 1, "legal", &["patent"],
        )];
        let finance = vec![record_with_tags(
            "Revenue grew this quarter", 2, "finance", &["revenue"],
        )];
        index.add_shard(ShardKey::new("2026-08", "legal"), &patents);
        index.add_shard(ShardKey::new("2026-08", "finance"), &finance);

        let candidates = index.find_candidate_shards("patent filing", None, None);
        assert_eq!(candidates, vec![ShardKey::new("2026-08", "legal")]);
    }

    #[test]
    fn general_shards_always_qualify() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path().to_path_buf()).unwrap();
        let mut index = ShardIndex::load(&layout);

        let general = vec![record_with_tags("Completely unrelated content", 1, "general", &[])];
        index.add_shard(ShardKey::new("2026-07", "general"), &general);

        let candidates = index.find_candidate_shards("patent filing", None, None);
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn date_range_filters_by_month_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path().to_path_buf()).unwrap();
        let mut index = ShardIndex::load(&layout);

        let rec = vec![record_with_tags("Old content about patents", 1, "legal", &["patent"])];
        index.add_shard(ShardKey::new("2025-01", "legal"), &rec);
        index.add_shard(ShardKey::new("2026-08", "legal"), &rec);

        let candidates =
            index.find_candidate_shards("patent", Some(("2026-01-01", "2026-12-31")), None);
        assert_eq!(candidates, vec![ShardKey::new("2026-08", "legal")]);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path().to_path_buf()).unwrap();
        let mut index = ShardIndex::load(&layout);

        let rec = vec![record_with_tags("Some legal content about patents", 1, "legal", &["patent"])];
        let key = ShardKey::new("2026-08", "legal");
        index.add_shard(key.clone(), &rec);
        index.set_size(&key, 123);
        index.save(&layout).unwrap();

        let reloaded = ShardIndex::load(&layout);
        assert_eq!(reloaded.shards.len(), 1);
        let meta = &reloaded.shards[&key];
        assert_eq!(meta.count, 1);
        assert_eq!(meta.size_bytes, 123);
        assert!(meta.topics.contains("patent"));
    }
}
