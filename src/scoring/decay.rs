use chrono::{DateTime, Utc};

use crate::core::types::Record;

pub const DEFAULT_HALF_LIFE_DAYS: f64 = 7.0;
pub const DEFAULT_ARCHIVE_THRESHOLD: f64 = 0.15;
pub const DEFAULT_REINFORCEMENT_BOOST: f64 = 0.25;
pub const DEFAULT_MAX_SCORE: f64 = 2.0;

/// Ebbinghaus-style importance decay with reinforcement on access.
///
/// The effective half-life is the base half-life scaled by the record
/// type's decay multiplier, so mistakes fade 10x slower than episodic
/// records.
pub struct DecayEngine {
    pub half_life_days: f64,
    pub archive_threshold: f64,
    pub reinforcement_boost: f64,
    pub max_score: f64,
}

impl DecayEngine {
    pub fn new(half_life_days: f64, archive_threshold: f64, max_score: f64) -> Self {
        DecayEngine {
            half_life_days,
            archive_threshold,
            reinforcement_boost: DEFAULT_REINFORCEMENT_BOOST,
            max_score,
        }
    }

    pub fn effective_half_life(&self, record: &Record) -> f64 {
        self.half_life_days * record.memory_type.profile().decay_multiplier
    }

    /// Current strength: exponential decay of importance plus a smaller
    /// access-count term that decays at twice the half-life. Rounded to 4
    /// decimals, capped at `max_score`.
    pub fn score(&self, record: &Record, now: DateTime<Utc>) -> f64 {
        let age_days = ((now - record.created).num_seconds() as f64 / 86_400.0).max(0.001);
        let half_life = self.effective_half_life(record);

        let base = record.importance * (-age_days / half_life).exp2();
        let reinforcement = record.access_count as f64
            * self.reinforcement_boost
            * (-age_days / (half_life * 2.0)).exp2();

        let combined = (base + reinforcement).min(self.max_score);
        (combined * 10_000.0).round() / 10_000.0
    }

    /// Boost a record on retrieval: bump the access count and nudge
    /// importance upward by a diminishing amount.
    pub fn reinforce(&self, record: &mut Record) {
        record.access_count += 1;
        record.last_accessed = Utc::now();
        record.importance = (record.importance
            + 0.1 / (1.0 + record.access_count as f64 * 0.1))
            .min(self.max_score);
    }

    /// True once the combined score has sunk below the archive threshold.
    pub fn should_archive(&self, record: &Record, now: DateTime<Utc>) -> bool {
        self.score(record, now) < self.archive_threshold
    }
}

impl Default for DecayEngine {
    fn default() -> Self {
        DecayEngine::new(
            DEFAULT_HALF_LIFE_DAYS,
            DEFAULT_ARCHIVE_THRESHOLD,
            DEFAULT_MAX_SCORE,
        )
    }
}
