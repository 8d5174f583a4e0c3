use std::collections::BTreeMap;

/// Sharding summary derived from the shard index.
#[derive(Debug, Clone)]
pub struct ShardStats {
    pub total_shards: usize,
    pub total_records: usize,
    pub total_size_bytes: u64,
    pub by_date: BTreeMap<String, usize>,
    pub by_topic: BTreeMap<String, usize>,
}

/// Point-in-time view of the whole store.
#[derive(Debug, Clone)]
pub struct StoreStats {
    pub total_records: usize,
    pub categories: BTreeMap<String, usize>,
    pub wal_pending: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_hit_rate: f64,
    pub shards: Option<ShardStats>,
}

/// Result of a compaction pass.
#[derive(Debug, Clone, Copy)]
pub struct CompactReport {
    pub original_count: usize,
    pub final_count: usize,
    pub removed_count: usize,
}

/// Result of a forget operation.
#[derive(Debug, Clone, Copy)]
pub struct ForgetReport {
    pub kept: usize,
    pub forgotten: usize,
}
