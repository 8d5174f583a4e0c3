use std::collections::{BTreeMap, HashSet};
use std::fs;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::tokenizer::TagExtractor;
use crate::core::config::StoreConfig;
use crate::core::error::Result;
use crate::core::stats::{CompactReport, ForgetReport, ShardStats, StoreStats};
use crate::core::types::{MemoryType, Record};
use crate::scoring::access::AccessTracker;
use crate::scoring::decay::DecayEngine;
use crate::scoring::feedback::{FeedbackLog, Outcome};
use crate::search::cache::ReadCache;
use crate::search::engine::SearchEngine;
use crate::search::results::{SearchOptions, SearchResult};
use crate::storage::atomic::write_json_atomic;
use crate::storage::dir_lock::DirLock;
use crate::storage::layout::StoreLayout;
use crate::storage::shard::ShardKey;
use crate::storage::shard_manager::ShardManager;
use crate::storage::wal::WriteAheadLog;

/// Single-file fallback written by pre-shard versions of the store, still
/// read (and written, when sharding is off) for compatibility.
#[derive(Serialize, Deserialize)]
struct LegacyFile {
    version: String,
    saved_at: DateTime<Utc>,
    count: usize,
    format: String,
    memories: Vec<Record>,
}

/// Composition root. Owns the in-memory record set, the single source of
/// truth between load and flush, and wires sharding, WAL, decay, access
/// tracking, search, and the read cache together.
///
/// Write path: ingest -> WAL append (durable, O(1)) -> periodic flush
/// (shards, O(n)) -> WAL clear. A crash before the clear is recovered by
/// replay on the next open.
pub struct MemoryStore {
    pub config: StoreConfig,
    layout: StoreLayout,
    wal: WriteAheadLog,
    shards: ShardManager,
    engine: SearchEngine,
    decay: DecayEngine,
    access: AccessTracker,
    feedback_log: FeedbackLog,
    cache: ReadCache,
    tags: TagExtractor,
    records: Vec<Record>,
    hashes: HashSet<String>,
}

impl MemoryStore {
    pub fn open(config: StoreConfig) -> Result<Self> {
        let layout = StoreLayout::new(config.root.clone())?;
        let wal = WriteAheadLog::open(&layout, config.wal_flush_threshold, config.wal_max_bytes);
        let shards = ShardManager::new(layout.clone(), config.shard_cache_size);
        let decay = DecayEngine::new(
            config.half_life_days,
            config.archive_threshold,
            config.max_importance,
        );
        let access = AccessTracker::load(&layout);
        let feedback_log = FeedbackLog::new(&layout);
        let cache = ReadCache::new(config.read_cache_entries);
        let tags = TagExtractor::new(&config.tag_terms);

        let mut store = MemoryStore {
            config,
            layout,
            wal,
            shards,
            engine: SearchEngine::new(),
            decay,
            access,
            feedback_log,
            cache,
            tags,
            records: Vec::new(),
            hashes: HashSet::new(),
        };
        store.load()?;
        Ok(store)
    }

    /// Load shards (or the legacy file), then replay pending WAL entries.
    /// Replay is idempotent: hashes already live are skipped.
    fn load(&mut self) -> Result<()> {
        self.records = if self.config.use_sharding {
            self.shards.load_all(self.config.load_limit)
        } else {
            Vec::new()
        };

        if self.records.is_empty() {
            self.records = self.load_legacy();
        }

        self.hashes = self.records.iter().map(|r| r.hash.clone()).collect();

        let mut replayed = 0;
        for record in self.wal.load_pending() {
            if self.hashes.insert(record.hash.clone()) {
                self.records.push(record);
                replayed += 1;
            }
        }
        if replayed > 0 {
            log::debug!("replayed {} WAL entries into the live set", replayed);
        }

        self.engine.build_index(&self.records);
        Ok(())
    }

    fn load_legacy(&self) -> Vec<Record> {
        let raw = match fs::read_to_string(self.layout.legacy_path()) {
            Ok(raw) => raw,
            Err(_) => return Vec::new(),
        };
        match serde_json::from_str::<LegacyFile>(&raw) {
            Ok(file) => file.memories,
            Err(e) => {
                log::warn!("legacy store unreadable, starting empty: {}", e);
                Vec::new()
            }
        }
    }

    // -- ingestion -----------------------------------------------------------

    /// Ingest raw text, one record per useful line. Returns how many new
    /// records were added. Each new record hits the WAL before it counts
    /// as durable; a full WAL triggers an automatic flush.
    pub fn ingest(&mut self, content: &str, source: &str, category: &str) -> Result<usize> {
        self.ingest_inner(content, source, category, MemoryType::Episodic)
    }

    /// Ingest with an explicit record type. Non-default types start with
    /// boosted importance per their profile.
    pub fn ingest_typed(
        &mut self,
        content: &str,
        source: &str,
        category: &str,
        memory_type: MemoryType,
    ) -> Result<usize> {
        self.ingest_inner(content, source, category, memory_type)
    }

    fn ingest_inner(
        &mut self,
        content: &str,
        source: &str,
        category: &str,
        memory_type: MemoryType,
    ) -> Result<usize> {
        let mut added = 0;

        for (i, line) in content.lines().enumerate() {
            let stripped = line.trim();
            if stripped.chars().count() < self.config.min_line_len
                || stripped.starts_with("```")
                || stripped == "---"
            {
                continue;
            }

            let mut record = Record::new(stripped, source, (i + 1) as u32, category);
            if self.hashes.contains(&record.hash) {
                continue;
            }

            record.tags = self.tags.extract(stripped);
            if !memory_type.is_default() {
                let profile = memory_type.profile();
                record.importance =
                    (record.importance * profile.importance_boost).min(self.config.max_importance);
                record.memory_type = memory_type.clone();
            }

            self.wal.append(&record)?;
            self.hashes.insert(record.hash.clone());
            self.records.push(record);
            added += 1;
        }

        if added > 0 {
            self.engine.build_index(&self.records);
            self.cache.invalidate();
        }
        if self.wal.should_flush() {
            self.flush()?;
        }

        Ok(added)
    }

    // -- search --------------------------------------------------------------

    /// Ranked search over the live set. Served from the read cache when the
    /// exact same parameters were asked before; otherwise scored, boosted
    /// by access frequency, truncated, and cached. Returned records are
    /// reinforced.
    pub fn search(&mut self, query: &str, opts: &SearchOptions) -> Vec<SearchResult> {
        let key = opts.cache_key(query);
        if let Some(hit) = self.cache.get(&key) {
            return hit;
        }

        let now = Utc::now();
        let decay_engine = &self.decay;
        let decay_fn = move |record: &Record| decay_engine.score(record, now);
        let decay_ref: Option<&dyn Fn(&Record) -> f64> = if opts.use_decay {
            Some(&decay_fn)
        } else {
            None
        };

        let mut results = self.engine.search(query, &self.records, opts, decay_ref);

        // Final re-ranking pass: frequently retrieved records win ties.
        for result in &mut results {
            let boost = self.access.boost(&result.record.hash);
            result.score *= boost;
        }
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(opts.limit);

        if let Some(top) = results.first().map(|r| r.score) {
            if top > 0.0 {
                for result in &mut results {
                    result.relevance = (result.score / top * 10_000.0).round() / 10_000.0;
                }
            }
        }

        for result in &results {
            let hash = result.record.hash.clone();
            if let Some(live) = self.records.iter_mut().find(|r| r.hash == hash) {
                self.decay.reinforce(live);
            }
            self.access.record_access(&hash);
        }

        self.cache.put(key, results.clone());
        results
    }

    /// Substring search over on-disk shards, narrowed by the shard index.
    /// Bypasses the live set; useful for archival queries.
    pub fn search_archive(
        &mut self,
        query: &str,
        limit: usize,
        date_range: Option<(&str, &str)>,
        topic: Option<&str>,
    ) -> Vec<Record> {
        self.shards.search_shards(query, limit, date_range, topic)
    }

    // -- persistence ---------------------------------------------------------

    /// Persist the full live set, then clear the WAL. Runs under the
    /// cross-process lock; the WAL is only cleared after every shard and
    /// the index have landed.
    pub fn flush(&mut self) -> Result<()> {
        let mut lock = DirLock::with_timeouts(
            self.layout.index_path(),
            self.config.lock_timeout,
            self.config.lock_poll_interval,
            self.config.lock_stale_threshold,
        );
        lock.acquire()?;

        let outcome = self.flush_locked();
        lock.release();
        outcome
    }

    fn flush_locked(&mut self) -> Result<()> {
        if self.config.use_sharding {
            let groups = self.shards.partition(&self.records);

            // Shard keys that no longer hold any record would otherwise
            // resurrect forgotten records on the next load.
            let stale: Vec<ShardKey> = self
                .shards
                .index
                .shards
                .keys()
                .filter(|k| !groups.contains_key(*k))
                .cloned()
                .collect();
            for key in stale {
                let _ = fs::remove_file(self.layout.shard_path(&key));
                self.shards.index.remove(&key);
            }

            for (key, group) in groups {
                self.shards.write_shard(&key, group)?;
            }
            self.shards.index.save(&self.layout)?;
        } else {
            let file = LegacyFile {
                version: env!("CARGO_PKG_VERSION").to_string(),
                saved_at: Utc::now(),
                count: self.records.len(),
                format: "legacy".to_string(),
                memories: self.records.clone(),
            };
            write_json_atomic(&self.layout.legacy_path(), &file)?;
        }

        self.access.save()?;
        self.wal.clear()
    }

    // -- maintenance ---------------------------------------------------------

    /// Drop duplicate hashes and records that have decayed below the
    /// archive threshold. Decay alone never deletes; this is the explicit
    /// operation that does.
    pub fn compact(&mut self) -> CompactReport {
        let original_count = self.records.len();
        let now = Utc::now();

        let mut seen = HashSet::new();
        let decay = &self.decay;
        self.records.retain(|record| {
            seen.insert(record.hash.clone()) && !decay.should_archive(record, now)
        });

        self.hashes = self.records.iter().map(|r| r.hash.clone()).collect();
        self.engine.build_index(&self.records);
        self.shards.invalidate_cache();
        self.cache.invalidate();

        CompactReport {
            original_count,
            final_count: self.records.len(),
            removed_count: original_count - self.records.len(),
        }
    }

    /// Remove every record mentioning a topic (content or tags), stripping
    /// references to the forgotten hashes from surviving records.
    pub fn forget_topic(&mut self, topic: &str) -> ForgetReport {
        let needle = topic.to_lowercase();
        let matches = |r: &Record| {
            r.content.to_lowercase().contains(&needle)
                || r.tags.join(" ").to_lowercase().contains(&needle)
        };
        self.forget_where(matches)
    }

    /// Remove every record created strictly before a `YYYY-MM-DD` date.
    pub fn forget_before(&mut self, date: &str) -> ForgetReport {
        let cutoff = date.to_string();
        self.forget_where(move |r: &Record| r.created.format("%Y-%m-%d").to_string() < cutoff)
    }

    /// Remove a single record by identity hash.
    pub fn purge(&mut self, hash: &str) -> bool {
        let report = self.forget_where(|r: &Record| r.hash == hash);
        report.forgotten > 0
    }

    fn forget_where<F: Fn(&Record) -> bool>(&mut self, predicate: F) -> ForgetReport {
        let original = self.records.len();
        let forgotten_hashes: HashSet<String> = self
            .records
            .iter()
            .filter(|r| predicate(r))
            .map(|r| r.hash.clone())
            .collect();

        self.records.retain(|r| !forgotten_hashes.contains(&r.hash));
        for record in &mut self.records {
            record.related.retain(|h| !forgotten_hashes.contains(h));
        }

        self.hashes = self.records.iter().map(|r| r.hash.clone()).collect();
        self.engine.build_index(&self.records);
        self.cache.invalidate();

        ForgetReport {
            kept: self.records.len(),
            forgotten: original - self.records.len(),
        }
    }

    /// Apply a retrieval outcome ("good" / "bad" / "neutral") to the listed
    /// records. Invalid outcomes are rejected up front.
    pub fn feedback(&mut self, hashes: &[String], outcome: &str) -> Result<usize> {
        let outcome: Outcome = outcome.parse()?;
        let touched = self.feedback_log.apply(
            &mut self.records,
            hashes,
            outcome,
            self.config.max_importance,
        )?;
        self.cache.invalidate();
        Ok(touched)
    }

    // -- introspection -------------------------------------------------------

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn get(&self, hash: &str) -> Option<&Record> {
        self.records.iter().find(|r| r.hash == hash)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn wal_pending_count(&self) -> usize {
        self.wal.pending_count()
    }

    pub fn stats(&self) -> StoreStats {
        let mut categories: BTreeMap<String, usize> = BTreeMap::new();
        for record in &self.records {
            let key = if record.category.is_empty() {
                "uncategorized".to_string()
            } else {
                record.category.clone()
            };
            *categories.entry(key).or_default() += 1;
        }

        let shards = if self.config.use_sharding {
            let (by_date, by_topic) = self.shards.index.distributions();
            Some(ShardStats {
                total_shards: self.shards.index.shards.len(),
                total_records: self.shards.index.total_records(),
                total_size_bytes: self.shards.index.total_size_bytes(),
                by_date,
                by_topic,
            })
        } else {
            None
        };

        StoreStats {
            total_records: self.records.len(),
            categories,
            wal_pending: self.wal.pending_count(),
            cache_hits: self.cache.hits(),
            cache_misses: self.cache.misses(),
            cache_hit_rate: self.cache.hit_rate(),
            shards,
        }
    }
}
