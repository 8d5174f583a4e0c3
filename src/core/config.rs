use std::path::PathBuf;
use std::time::Duration;

/// Store-wide tuning knobs.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub root: PathBuf,

    // Decay
    pub half_life_days: f64,     // base half-life for importance decay
    pub archive_threshold: f64,  // decay score below which compact() drops a record
    pub max_importance: f64,     // upper bound for importance after reinforcement

    // WAL flush triggers
    pub wal_flush_threshold: usize, // pending appends before auto-flush
    pub wal_max_bytes: u64,         // WAL file size that also triggers auto-flush

    // Caches
    pub shard_cache_size: usize,    // shards kept in memory by the shard manager
    pub read_cache_entries: usize,  // cached search result sets

    // Loading
    pub load_limit: usize, // safety cap when concatenating all shards

    // Cross-process lock
    pub lock_timeout: Duration,
    pub lock_poll_interval: Duration,
    pub lock_stale_threshold: Duration,

    // Ingestion
    pub min_line_len: usize,     // lines shorter than this are skipped
    pub tag_terms: Vec<String>,  // terms auto-tagged when present in content
    pub use_sharding: bool,      // false = single legacy file
}

impl StoreConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        StoreConfig {
            root: root.into(),
            ..StoreConfig::default()
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            root: PathBuf::from("./memory"),
            half_life_days: 7.0,
            archive_threshold: 0.15,
            max_importance: 2.0,
            wal_flush_threshold: 50,
            wal_max_bytes: 1_000_000,
            shard_cache_size: 10,
            read_cache_entries: 256,
            load_limit: 10_000,
            lock_timeout: Duration::from_secs(30),
            lock_poll_interval: Duration::from_millis(50),
            lock_stale_threshold: Duration::from_secs(300),
            min_line_len: 15,
            tag_terms: default_tag_terms(),
            use_sharding: true,
        }
    }
}

fn default_tag_terms() -> Vec<String> {
    [
        "web3", "ethereum", "postgresql", "optimization", "cost",
        "revenue", "security", "deployment", "production", "testing",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
