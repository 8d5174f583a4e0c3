use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// How many characters of content participate in the identity hash.
pub const HASH_CONTENT_PREFIX: usize = 100;

/// Hex chars kept from the digest.
pub const HASH_LEN: usize = 12;

/// Maximum tags carried per record.
pub const MAX_TAGS: usize = 10;

/// Per-type decay and recall behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TypeProfile {
    pub decay_multiplier: f64,
    pub importance_boost: f64,
    pub recall_priority: f64,
}

/// Canonical record types plus an escape hatch for caller-defined ones.
///
/// Mistakes decay 10x slower and surface first; preferences and procedures
/// decay 3x slower.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum MemoryType {
    #[default]
    Episodic,
    Fact,
    Preference,
    Procedure,
    Mistake,
    Custom { label: String, profile: TypeProfile },
}

impl MemoryType {
    pub fn profile(&self) -> TypeProfile {
        match self {
            MemoryType::Episodic => TypeProfile {
                decay_multiplier: 1.0,
                importance_boost: 1.0,
                recall_priority: 0.5,
            },
            MemoryType::Fact => TypeProfile {
                decay_multiplier: 1.0,
                importance_boost: 1.2,
                recall_priority: 0.7,
            },
            MemoryType::Preference => TypeProfile {
                decay_multiplier: 3.0,
                importance_boost: 1.2,
                recall_priority: 0.7,
            },
            MemoryType::Procedure => TypeProfile {
                decay_multiplier: 3.0,
                importance_boost: 1.3,
                recall_priority: 0.75,
            },
            MemoryType::Mistake => TypeProfile {
                decay_multiplier: 10.0,
                importance_boost: 2.0,
                recall_priority: 1.0,
            },
            MemoryType::Custom { profile, .. } => *profile,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            MemoryType::Episodic => "episodic",
            MemoryType::Fact => "fact",
            MemoryType::Preference => "preference",
            MemoryType::Procedure => "procedure",
            MemoryType::Mistake => "mistake",
            MemoryType::Custom { label, .. } => label,
        }
    }

    /// Resolve a serialized label back to a type. Unknown labels without an
    /// explicit profile fall back to episodic.
    pub fn from_label(label: &str, profile: Option<TypeProfile>) -> Self {
        match label {
            "episodic" => MemoryType::Episodic,
            "fact" => MemoryType::Fact,
            "preference" => MemoryType::Preference,
            "procedure" => MemoryType::Procedure,
            "mistake" => MemoryType::Mistake,
            other => match profile {
                Some(profile) => MemoryType::Custom {
                    label: other.to_string(),
                    profile,
                },
                None => MemoryType::Episodic,
            },
        }
    }

    pub fn is_default(&self) -> bool {
        *self == MemoryType::Episodic
    }
}

/// The atomic stored unit: immutable identity, mutable scoring state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RecordRepr", into = "RecordRepr")]
pub struct Record {
    pub hash: String,
    pub content: String,
    pub source: String,
    pub line: u32,
    pub category: String,
    pub created: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub access_count: u32,
    pub importance: f64,
    pub confidence: f64,
    pub sentiment: BTreeMap<String, f64>,
    pub tags: Vec<String>,
    pub related: Vec<String>,
    pub memory_type: MemoryType,
}

impl Record {
    pub fn new(content: impl Into<String>, source: impl Into<String>, line: u32,
               category: impl Into<String>) -> Self {
        let content = content.into();
        let source = source.into();
        let now = Utc::now();
        let hash = identity_hash(&source, line, &content);

        Record {
            hash,
            content,
            source,
            line,
            category: category.into(),
            created: now,
            last_accessed: now,
            access_count: 0,
            importance: 1.0,
            confidence: 0.5,
            sentiment: BTreeMap::new(),
            tags: Vec::new(),
            related: Vec::new(),
            memory_type: MemoryType::Episodic,
        }
    }

    /// Month bucket of the creation timestamp, e.g. "2026-08".
    pub fn date_key(&self) -> String {
        self.created.format("%Y-%m").to_string()
    }
}

/// Derive the stable identity hash from source, position, and a content
/// prefix. Two records sharing all three collide and are treated as the
/// same record.
pub fn identity_hash(source: &str, line: u32, content: &str) -> String {
    let prefix: String = content.chars().take(HASH_CONTENT_PREFIX).collect();
    let digest = Sha256::digest(format!("{}:{}:{}", source, line, prefix).as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    hex[..HASH_LEN].to_string()
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

/// Wire representation. Importance and confidence are rounded to 4 decimals;
/// memory_type and type_metadata are emitted only when non-default so common
/// records stay compact.
#[derive(Serialize, Deserialize)]
struct RecordRepr {
    hash: String,
    content: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    line: u32,
    #[serde(default = "default_category")]
    category: String,
    created: DateTime<Utc>,
    #[serde(default)]
    last_accessed: Option<DateTime<Utc>>,
    #[serde(default)]
    access_count: u32,
    #[serde(default = "default_importance")]
    importance: f64,
    #[serde(default = "default_confidence")]
    confidence: f64,
    #[serde(default)]
    sentiment: BTreeMap<String, f64>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    related: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    memory_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    type_metadata: Option<TypeProfile>,
}

fn default_category() -> String {
    "general".to_string()
}

fn default_importance() -> f64 {
    1.0
}

fn default_confidence() -> f64 {
    0.5
}

impl From<Record> for RecordRepr {
    fn from(r: Record) -> Self {
        let (memory_type, type_metadata) = match &r.memory_type {
            MemoryType::Episodic => (None, None),
            MemoryType::Custom { label, profile } => {
                (Some(label.clone()), Some(*profile))
            }
            other => (Some(other.label().to_string()), None),
        };

        RecordRepr {
            hash: r.hash,
            content: r.content,
            source: r.source,
            line: r.line,
            category: r.category,
            created: r.created,
            last_accessed: Some(r.last_accessed),
            access_count: r.access_count,
            importance: round4(r.importance),
            confidence: round4(r.confidence),
            sentiment: r.sentiment,
            tags: r.tags,
            related: r.related,
            memory_type,
            type_metadata,
        }
    }
}

impl From<RecordRepr> for Record {
    fn from(r: RecordRepr) -> Self {
        let memory_type = match r.memory_type {
            Some(label) => MemoryType::from_label(&label, r.type_metadata),
            None => MemoryType::Episodic,
        };

        // The stored hash is authoritative; recompute only when absent so a
        // round-trip can never change identity.
        let hash = if r.hash.is_empty() {
            identity_hash(&r.source, r.line, &r.content)
        } else {
            r.hash
        };

        Record {
            hash,
            content: r.content,
            source: r.source,
            line: r.line,
            category: r.category,
            created: r.created,
            last_accessed: r.last_accessed.unwrap_or(r.created),
            access_count: r.access_count,
            importance: r.importance,
            confidence: r.confidence,
            sentiment: r.sentiment,
            tags: r.tags,
            related: r.related,
            memory_type,
        }
    }
}
