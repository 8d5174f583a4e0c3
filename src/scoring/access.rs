use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use crate::core::error::Result;
use crate::storage::atomic::write_json_atomic;
use crate::storage::layout::StoreLayout;

const BOOST_MIN: f64 = 1.0;
const BOOST_MAX: f64 = 1.5;
const HOT_THRESHOLD: u32 = 10; // accesses before the boost saturates

/// Persists per-record access counts and turns them into a bounded search
/// boost, so frequently consulted records stay near the top of results.
pub struct AccessTracker {
    pub path: PathBuf,
    counts: HashMap<String, u32>,
}

impl AccessTracker {
    /// Load counts from disk; a missing or corrupt file starts empty.
    pub fn load(layout: &StoreLayout) -> Self {
        let path = layout.access_counts_path();
        let counts = fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();

        AccessTracker { path, counts }
    }

    pub fn save(&self) -> Result<()> {
        write_json_atomic(&self.path, &self.counts)
    }

    pub fn record_access(&mut self, hash: &str) {
        *self.counts.entry(hash.to_string()).or_insert(0) += 1;
    }

    pub fn count(&self, hash: &str) -> u32 {
        self.counts.get(hash).copied().unwrap_or(0)
    }

    /// Score multiplier in [1.0, 1.5], linear in access count up to the
    /// saturation point.
    pub fn boost(&self, hash: &str) -> f64 {
        let count = self.count(hash);
        if count == 0 {
            return BOOST_MIN;
        }
        let ratio = (count as f64 / HOT_THRESHOLD as f64).min(1.0);
        BOOST_MIN + ratio * (BOOST_MAX - BOOST_MIN)
    }

    /// Top-N hottest hashes, most accessed first.
    pub fn top(&self, n: usize) -> Vec<(String, u32)> {
        let mut pairs: Vec<(String, u32)> = self
            .counts
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        pairs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        pairs.truncate(n);
        pairs
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}
