use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::core::error::{Error, Result};
use crate::core::types::Record;
use crate::storage::layout::StoreLayout;

const GOOD_IMPORTANCE_MULT: f64 = 1.2;
const BAD_IMPORTANCE_MULT: f64 = 0.8;

/// Retrieval outcome reported by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Good,
    Bad,
    Neutral,
}

impl FromStr for Outcome {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "good" => Ok(Outcome::Good),
            "bad" => Ok(Outcome::Bad),
            "neutral" => Ok(Outcome::Neutral),
            other => Err(Error::invalid_input(format!(
                "outcome must be good, bad, or neutral (got {:?})",
                other
            ))),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct OutcomeEvent {
    at: String,
    outcome: Outcome,
    hashes: Vec<String>,
}

/// Applies retrieval outcomes back to records and journals each event so
/// feedback survives restarts.
pub struct FeedbackLog {
    pub path: PathBuf,
}

impl FeedbackLog {
    pub fn new(layout: &StoreLayout) -> Self {
        FeedbackLog {
            path: layout.outcomes_path(),
        }
    }

    /// Mutate importance on the listed records and append the event to the
    /// journal. Returns how many records were found and touched.
    pub fn apply(
        &self,
        records: &mut [Record],
        hashes: &[String],
        outcome: Outcome,
        max_importance: f64,
    ) -> Result<usize> {
        let mut touched = 0;
        for record in records.iter_mut() {
            if !hashes.contains(&record.hash) {
                continue;
            }
            match outcome {
                Outcome::Good => {
                    record.importance = (record.importance * GOOD_IMPORTANCE_MULT).min(max_importance);
                }
                Outcome::Bad => {
                    record.importance *= BAD_IMPORTANCE_MULT;
                }
                Outcome::Neutral => {}
            }
            touched += 1;
        }

        let event = OutcomeEvent {
            at: Utc::now().to_rfc3339(),
            outcome,
            hashes: hashes.to_vec(),
        };
        let line = serde_json::to_string(&event)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;

        Ok(touched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_parsing_is_strict() {
        assert_eq!("GOOD".parse::<Outcome>().unwrap(), Outcome::Good);
        assert!("meh".parse::<Outcome>().is_err());
    }

    #[test]
    fn good_boosts_and_bad_penalizes() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path().to_path_buf()).unwrap();
        let log = FeedbackLog::new(&layout);

        let mut records = vec![
            Record::new("The deploy pipeline is fully green", "ops", 1, "general"),
            Record::new("The cache layer needs a rewrite", "ops", 2, "general"),
        ];
        let first = vec![records[0].hash.clone()];
        let second = vec![records[1].hash.clone()];

        let touched = log.apply(&mut records, &first, Outcome::Good, 2.0).unwrap();
        assert_eq!(touched, 1);
        assert!((records[0].importance - 1.2).abs() < 1e-9);

        log.apply(&mut records, &second, Outcome::Bad, 2.0).unwrap();
        assert!((records[1].importance - 0.8).abs() < 1e-9);

        // Journal holds one line per event.
        let raw = std::fs::read_to_string(&log.path).unwrap();
        assert_eq!(raw.lines().count(), 2);
    }

    #[test]
    fn boost_respects_importance_cap() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path().to_path_buf()).unwrap();
        let log = FeedbackLog::new(&layout);

        let mut records = vec![Record::new("Nearly maxed out already", "ops", 1, "general")];
        records[0].importance = 1.9;
        let hashes = vec![records[0].hash.clone()];

        log.apply(&mut records, &hashes, Outcome::Good, 2.0).unwrap();
        assert_eq!(records[0].importance, 2.0);
    }
}
