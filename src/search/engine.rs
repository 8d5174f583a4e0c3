use std::collections::HashMap;

use crate::analysis::tokenizer::tokenize;
use crate::core::types::Record;
use crate::search::results::{SearchOptions, SearchResult};

pub const DEFAULT_K1: f64 = 1.5;
pub const DEFAULT_B: f64 = 0.75;

const PHRASE_MULT: f64 = 1.5;
const TAG_MULT: f64 = 1.2;
const SOURCE_MULT: f64 = 1.1;

/// BM25-style scorer over the live record set.
///
/// There is no inverted index: the corpus is small enough that per-query
/// scoring is linear, and only the term statistics (document frequency,
/// average length) are kept between queries.
pub struct SearchEngine {
    pub k1: f64,
    pub b: f64,
    idf: HashMap<String, f64>,
    doc_count: usize,
    avg_doc_len: f64,
}

impl SearchEngine {
    pub fn new() -> Self {
        SearchEngine {
            k1: DEFAULT_K1,
            b: DEFAULT_B,
            idf: HashMap::new(),
            doc_count: 0,
            avg_doc_len: 0.0,
        }
    }

    /// Recompute document frequencies, smoothed IDF weights, and the
    /// average document length. Must run whenever the corpus changes size.
    pub fn build_index(&mut self, records: &[Record]) {
        self.doc_count = records.len();
        self.idf.clear();

        let mut doc_freqs: HashMap<String, usize> = HashMap::new();
        let mut total_len = 0usize;

        for record in records {
            let tokens = tokenize(&record.content);
            total_len += tokens.len();

            let mut seen: Vec<&String> = Vec::new();
            for token in &tokens {
                if !seen.contains(&token) {
                    seen.push(token);
                    *doc_freqs.entry(token.clone()).or_insert(0) += 1;
                }
            }
        }

        self.avg_doc_len = total_len as f64 / self.doc_count.max(1) as f64;

        let n = self.doc_count as f64;
        for (term, df) in doc_freqs {
            let idf = ((n - df as f64 + 0.5) / (df as f64 + 0.5) + 1.0).ln();
            self.idf.insert(term, idf);
        }
    }

    pub fn doc_count(&self) -> usize {
        self.doc_count
    }

    pub fn vocab_size(&self) -> usize {
        self.idf.len()
    }

    /// Score the query against every candidate record and return the full
    /// ranked set, normalized to [0, 1] against the top score. Truncation
    /// to the caller's limit happens after re-ranking, not here.
    pub fn search(
        &mut self,
        query: &str,
        records: &[Record],
        opts: &SearchOptions,
        decay_fn: Option<&dyn Fn(&Record) -> f64>,
    ) -> Vec<SearchResult> {
        let query_tokens = tokenize(query);
        if query_tokens.is_empty() {
            return Vec::new();
        }

        if self.doc_count != records.len() {
            self.build_index(records);
        }

        let query_lower = query.to_lowercase();
        let mut scored: Vec<(usize, f64, Vec<String>)> = Vec::new();
        let mut max_score = 0.0f64;

        for (i, record) in records.iter().enumerate() {
            if let Some(category) = &opts.category {
                if record.category != *category {
                    continue;
                }
            }

            let (mut score, matched) = self.score_record(record, &query_tokens, &query_lower);
            if score <= 0.0 {
                continue;
            }

            if let Some(decay) = decay_fn {
                // Decay modulates 30-100% of the lexical score.
                score *= 0.3 + 0.7 * decay(record);
            }

            max_score = max_score.max(score);
            scored.push((i, score, matched));
        }

        if max_score <= 0.0 {
            return Vec::new();
        }

        let mut results: Vec<SearchResult> = scored
            .into_iter()
            .filter_map(|(i, score, matched)| {
                let relevance = score / max_score;
                if relevance < opts.min_score {
                    return None;
                }
                Some(SearchResult {
                    record: records[i].clone(),
                    score,
                    relevance: (relevance * 10_000.0).round() / 10_000.0,
                    matched_terms: matched,
                })
            })
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results
    }

    fn score_record(
        &self,
        record: &Record,
        query_tokens: &[String],
        query_lower: &str,
    ) -> (f64, Vec<String>) {
        let content_lower = record.content.to_lowercase();
        let content_tokens = tokenize(&record.content);
        let doc_len = content_tokens.len() as f64;

        let mut tf: HashMap<&str, f64> = HashMap::new();
        for token in &content_tokens {
            *tf.entry(token.as_str()).or_insert(0.0) += 1.0;
        }

        let mut score = 0.0;
        let mut matched: Vec<String> = Vec::new();

        for term in query_tokens {
            let freq = tf.get(term.as_str()).copied().unwrap_or(0.0);
            if freq == 0.0 {
                continue;
            }
            matched.push(term.clone());

            let idf = self.idf.get(term).copied().unwrap_or(1.0);
            let norm = freq * (self.k1 + 1.0)
                / (freq
                    + self.k1
                        * (1.0 - self.b + self.b * doc_len / self.avg_doc_len.max(1.0)));
            score += idf * norm;
        }

        // Exact phrase bonus: the raw query appears verbatim.
        if query_tokens.len() > 1 && content_lower.contains(query_lower) {
            score *= PHRASE_MULT;
        }

        if !record.tags.is_empty() {
            let tag_text = record.tags.join(" ").to_lowercase();
            for term in query_tokens {
                if tag_text.contains(term.as_str()) {
                    score *= TAG_MULT;
                    let tagged = format!("tag:{}", term);
                    if !matched.contains(&tagged) {
                        matched.push(tagged);
                    }
                }
            }
        }

        if !record.source.is_empty() {
            let source_lower = record.source.to_lowercase();
            for term in query_tokens {
                if source_lower.contains(term.as_str()) {
                    score *= SOURCE_MULT;
                }
            }
        }

        (score, matched)
    }
}

impl Default for SearchEngine {
    fn default() -> Self {
        SearchEngine::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<Record> {
        vec![
            Record::new("Patent filed for memory decay algorithm", "notes", 1, "general"),
            Record::new("Revenue grew 12% this quarter", "notes", 2, "general"),
            Record::new("Patent filed for search ranking method", "notes", 3, "general"),
        ]
    }

    #[test]
    fn matching_records_rank_above_non_matching() {
        let mut engine = SearchEngine::new();
        let records = corpus();
        let opts = SearchOptions::default();

        let results = engine.search("patent", &records, &opts, None);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.content().contains("Patent")));
        assert_eq!(results[0].relevance, 1.0);
    }

    #[test]
    fn phrase_match_beats_scattered_terms() {
        let mut engine = SearchEngine::new();
        let records = vec![
            Record::new("memory decay is a core concern of this design", "notes", 1, "general"),
            Record::new("decay happens and memory fades, separately", "notes", 2, "general"),
        ];
        let opts = SearchOptions::default();

        let results = engine.search("memory decay", &records, &opts, None);
        assert_eq!(results[0].record.line, 1);
        assert!(results[0].score > results[1].score);
    }

    #[test]
    fn tag_matches_boost_score() {
        let mut engine = SearchEngine::new();
        let mut records = vec![
            Record::new("Shipped the new deployment pipeline today", "notes", 1, "general"),
            Record::new("Shipped the new deployment pipeline today too", "notes", 2, "general"),
        ];
        records[0].tags = vec!["deployment".to_string()];
        let opts = SearchOptions::default();

        let results = engine.search("deployment", &records, &opts, None);
        assert_eq!(results[0].record.line, 1);
        assert!(results[0].matched_terms.iter().any(|t| t == "tag:deployment"));
    }

    #[test]
    fn category_filter_excludes_other_categories() {
        let mut engine = SearchEngine::new();
        let records = vec![
            Record::new("Patent filed for memory decay algorithm", "notes", 1, "legal"),
            Record::new("Patent strategy discussion notes", "notes", 2, "general"),
        ];
        let mut opts = SearchOptions::default();
        opts.category = Some("legal".to_string());

        let results = engine.search("patent", &records, &opts, None);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].record.category, "legal");
    }

    #[test]
    fn decay_weighting_demotes_faded_records() {
        let mut engine = SearchEngine::new();
        let records = vec![
            Record::new("Patent filed for memory decay algorithm", "notes", 1, "general"),
            Record::new("Patent filed for search ranking method", "notes", 2, "general"),
        ];
        let opts = SearchOptions::default();

        // Pretend the first record has fully faded.
        let decay = |r: &Record| if r.line == 1 { 0.0 } else { 1.0 };
        let results = engine.search("patent", &records, &opts, Some(&decay));
        assert_eq!(results[0].record.line, 2);
    }

    #[test]
    fn empty_query_returns_nothing() {
        let mut engine = SearchEngine::new();
        let records = corpus();
        let opts = SearchOptions::default();
        assert!(engine.search("the of and", &records, &opts, None).is_empty());
    }

    #[test]
    fn index_rebuilds_when_corpus_grows() {
        let mut engine = SearchEngine::new();
        let mut records = corpus();
        let opts = SearchOptions::default();

        engine.search("patent", &records, &opts, None);
        assert_eq!(engine.doc_count(), 3);

        records.push(Record::new("Another patent note appears", "notes", 4, "general"));
        engine.search("patent", &records, &opts, None);
        assert_eq!(engine.doc_count(), 4);
    }
}
