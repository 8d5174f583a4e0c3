use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

use crate::core::types::MAX_TAGS;

/// Common English words excluded from scoring.
const STOPWORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "be", "been", "being",
    "have", "has", "had", "do", "does", "did", "will", "would", "could",
    "should", "may", "might", "shall", "can", "need", "dare", "ought",
    "used", "to", "of", "in", "for", "on", "with", "at", "by", "from",
    "as", "into", "through", "during", "before", "after", "above", "below",
    "between", "out", "off", "over", "under", "again", "further", "then",
    "once", "here", "there", "when", "where", "why", "how", "all", "both",
    "each", "few", "more", "most", "other", "some", "such", "no", "nor",
    "not", "only", "own", "same", "so", "than", "too", "very", "just",
    "don", "now", "and", "but", "or", "if", "while", "that", "this",
    "it", "its", "he", "she", "they", "them", "his", "her", "their",
    "what", "which", "who", "whom", "these", "those", "am", "about",
    "up", "down", "we", "our", "you", "your", "my", "me", "i",
];

fn stopwords() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| STOPWORDS.iter().copied().collect())
}

/// Lowercase word tokens of at least 2 chars, stopwords and bare numbers
/// dropped.
pub fn tokenize(text: &str) -> Vec<String> {
    text.unicode_words()
        .map(|w| w.to_lowercase())
        .filter(|w| w.chars().count() >= 2)
        .filter(|w| !stopwords().contains(w.as_str()))
        .filter(|w| !w.chars().all(|c| c.is_ascii_digit()))
        .collect()
}

/// Word tokens of at least 3 chars, used to narrow candidate shards by
/// topic overlap.
pub fn query_keywords(query: &str) -> HashSet<String> {
    query
        .unicode_words()
        .map(|w| w.to_lowercase())
        .filter(|w| w.chars().count() >= 3)
        .collect()
}

/// Pulls tags out of ingested content: explicit `@tag` markers plus any
/// configured auto-tag terms found in the text.
pub struct TagExtractor {
    explicit: Regex,
    terms: Vec<String>,
}

impl TagExtractor {
    pub fn new(terms: &[String]) -> Self {
        TagExtractor {
            explicit: Regex::new(r"@([A-Za-z][A-Za-z0-9_-]*)").unwrap(),
            terms: terms.iter().map(|t| t.to_lowercase()).collect(),
        }
    }

    pub fn extract(&self, content: &str) -> Vec<String> {
        let content_lower = content.to_lowercase();
        let mut tags: Vec<String> = Vec::new();

        for cap in self.explicit.captures_iter(content) {
            let tag = cap[1].to_string();
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }

        for term in &self.terms {
            if content_lower.contains(term.as_str()) && !tags.contains(term) {
                tags.push(term.clone());
            }
        }

        tags.truncate(MAX_TAGS);
        tags
    }
}
