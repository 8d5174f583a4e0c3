use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::types::Record;

/// Shard identity: month bucket x topic bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShardKey {
    pub date_key: String,  // YYYY-MM
    pub topic_key: String,
}

impl ShardKey {
    pub fn new(date_key: impl Into<String>, topic_key: impl Into<String>) -> Self {
        ShardKey {
            date_key: date_key.into(),
            topic_key: topic_key.into(),
        }
    }

    pub fn filename(&self) -> String {
        format!("shard_{}_{}.json", self.date_key, self.topic_key)
    }
}

impl fmt::Display for ShardKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.date_key, self.topic_key)
    }
}

/// Derive the shard a record belongs to. Membership is fixed at write time;
/// re-sharding is an explicit maintenance operation, never implicit.
pub fn shard_key_for(record: &Record) -> ShardKey {
    let date_key = record.date_key();

    let mut topic_key = "general".to_string();
    if !record.category.is_empty() && record.category != "general" {
        topic_key = record.category.to_lowercase();
    } else if let Some(tag) = record
        .tags
        .iter()
        .find(|t| t.chars().count() > 2 && !t.starts_with('@'))
    {
        topic_key = tag.to_lowercase();
    }

    ShardKey::new(date_key, topic_key)
}

/// On-disk shard format: one JSON object holding an ordered run of records.
#[derive(Debug, Serialize, Deserialize)]
pub struct ShardFile {
    pub shard_key: String,
    pub date_key: String,
    pub topic_key: String,
    pub saved_at: DateTime<Utc>,
    pub count: usize,
    pub memories: Vec<Record>,
}

impl ShardFile {
    pub fn new(key: &ShardKey, memories: Vec<Record>) -> Self {
        ShardFile {
            shard_key: key.to_string(),
            date_key: key.date_key.clone(),
            topic_key: key.topic_key.clone(),
            saved_at: Utc::now(),
            count: memories.len(),
            memories,
        }
    }

    pub fn key(&self) -> ShardKey {
        ShardKey::new(self.date_key.clone(), self.topic_key.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_wins_over_tags() {
        let mut r = Record::new("Deployment checklist for the staging cluster", "ops", 1, "Tactical");
        r.tags = vec!["deployment".to_string()];
        let key = shard_key_for(&r);
        assert_eq!(key.topic_key, "tactical");
        assert_eq!(key.date_key, r.date_key());
    }

    #[test]
    fn first_meaningful_tag_used_for_general_category() {
        let mut r = Record::new("Deployment checklist for the staging cluster", "ops", 1, "general");
        r.tags = vec!["@x".to_string(), "ok".to_string(), "deployment".to_string()];
        assert_eq!(shard_key_for(&r).topic_key, "deployment");
    }

    #[test]
    fn untagged_general_record_lands_in_general() {
        let r = Record::new("A plain line with nothing remarkable", "ops", 1, "general");
        let key = shard_key_for(&r);
        assert_eq!(key.topic_key, "general");
        assert_eq!(key.filename(), format!("shard_{}_general.json", key.date_key));
    }
}
