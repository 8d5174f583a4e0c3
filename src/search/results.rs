use crate::core::types::Record;

/// One ranked hit. Carries a snapshot of the record as it looked when the
/// query ran, plus the raw and normalized scores.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub record: Record,
    pub score: f64,            // raw BM25-style score (boosts applied)
    pub relevance: f64,        // normalized to [0, 1] within the result set
    pub matched_terms: Vec<String>,
}

impl SearchResult {
    pub fn hash(&self) -> &str {
        &self.record.hash
    }

    pub fn content(&self) -> &str {
        &self.record.content
    }

    /// Compact score explanation for diagnostics.
    pub fn explanation(&self) -> String {
        format!(
            "matched: {} | raw={:.3} | relevance={:.2}",
            self.matched_terms.join(", "),
            self.score,
            self.relevance
        )
    }
}

/// Parameters that shape a result set. Everything here participates in the
/// read-cache key.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub limit: usize,
    pub category: Option<String>,
    pub min_score: f64,
    pub use_decay: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        SearchOptions {
            limit: 20,
            category: None,
            min_score: 0.01,
            use_decay: true,
        }
    }
}

impl SearchOptions {
    /// Deterministic cache key: semantically identical calls must collide.
    pub fn cache_key(&self, query: &str) -> String {
        format!(
            "q={}|limit={}|cat={}|min={}|decay={}",
            query.trim().to_lowercase(),
            self.limit,
            self.category.as_deref().unwrap_or("-"),
            self.min_score,
            self.use_decay
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_ignores_query_case_and_padding() {
        let opts = SearchOptions::default();
        assert_eq!(opts.cache_key("  Patent "), opts.cache_key("patent"));
    }

    #[test]
    fn cache_key_separates_different_parameters() {
        let a = SearchOptions::default();
        let mut b = SearchOptions::default();
        b.use_decay = false;
        assert_ne!(a.cache_key("patent"), b.cache_key("patent"));

        let mut c = SearchOptions::default();
        c.category = Some("legal".to_string());
        assert_ne!(a.cache_key("patent"), c.cache_key("patent"));
    }
}
