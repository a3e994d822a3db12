//! Record Model
//!
//! A tracked record with its score history and the derived ranking metric.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// A single scored entry in a record's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreEntry {
    /// Course or subject code (e.g. "MAT101")
    pub code: String,
    /// Human readable course name
    pub name: String,
    /// Score value
    pub score: f64,
}

impl ScoreEntry {
    /// Create a new score entry
    pub fn new(code: impl Into<String>, name: impl Into<String>, score: f64) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            score,
        }
    }
}

/// A record tracked by the entity store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Unique identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Contact email
    #[serde(default)]
    pub email: Option<String>,
    /// Contact phone
    #[serde(default)]
    pub phone: Option<String>,
    /// Ordered score history
    #[serde(default)]
    pub grades: Vec<ScoreEntry>,
}

impl Record {
    /// Create a record with an empty score history
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: None,
            phone: None,
            grades: Vec::new(),
        }
    }

    /// Builder-style email setter
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Builder-style phone setter
    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    /// Builder-style score append
    pub fn with_score(mut self, entry: ScoreEntry) -> Self {
        self.grades.push(entry);
        self
    }

    /// Mean of all score entries, 0.0 when the history is empty
    pub fn metric(&self) -> f64 {
        if self.grades.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.grades.iter().map(|g| g.score).sum();
        sum / self.grades.len() as f64
    }

    /// Metric rounded to two decimals, expressed in hundredths.
    ///
    /// Ranking buckets are keyed by this integer so that ordering and
    /// equality never depend on floating point comparison.
    pub fn ranking_key(&self) -> i64 {
        (self.metric() * 100.0).round() as i64
    }
}

/// Generates sequential, prefixed identifiers (`STU0001`, `STU0002`, ...)
#[derive(Debug)]
pub struct SequenceGenerator {
    prefix: String,
    width: usize,
    next: AtomicU64,
}

impl SequenceGenerator {
    /// Create a generator starting at 1 with 4-digit zero padding
    pub fn new(prefix: impl Into<String>) -> Self {
        Self::with_width(prefix, 4)
    }

    /// Create a generator with a custom padding width
    pub fn with_width(prefix: impl Into<String>, width: usize) -> Self {
        Self {
            prefix: prefix.into(),
            width,
            next: AtomicU64::new(1),
        }
    }

    /// Produce the next identifier
    pub fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}{:0width$}", self.prefix, n, width = self.width)
    }

    /// Number of identifiers issued so far
    pub fn issued(&self) -> u64 {
        self.next.load(Ordering::Relaxed) - 1
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_is_mean_of_scores() {
        let record = Record::new("STU0001", "John Doe")
            .with_score(ScoreEntry::new("MAT101", "Mathematics", 80.0))
            .with_score(ScoreEntry::new("ENG203", "English", 90.0))
            .with_score(ScoreEntry::new("CS105", "Computer Science", 85.0));

        assert_eq!(record.metric(), 85.0);
        assert_eq!(record.ranking_key(), 8500);
    }

    #[test]
    fn test_metric_empty_history() {
        let record = Record::new("STU0002", "Anne O'Neill");
        assert_eq!(record.metric(), 0.0);
        assert_eq!(record.ranking_key(), 0);
    }

    #[test]
    fn test_ranking_key_rounds_to_two_decimals() {
        let record = Record::new("STU0003", "Sam Carter")
            .with_score(ScoreEntry::new("A", "A", 70.0))
            .with_score(ScoreEntry::new("B", "B", 80.0))
            .with_score(ScoreEntry::new("C", "C", 81.0));

        // 77.0 exactly
        assert_eq!(record.ranking_key(), 7700);

        let record = Record::new("STU0004", "Maria Gomez")
            .with_score(ScoreEntry::new("A", "A", 70.0))
            .with_score(ScoreEntry::new("B", "B", 80.0))
            .with_score(ScoreEntry::new("C", "C", 82.0));

        // 77.333.. -> 77.33
        assert_eq!(record.ranking_key(), 7733);
    }

    #[test]
    fn test_sequence_generator() {
        let seq = SequenceGenerator::new("STU");
        assert_eq!(seq.next_id(), "STU0001");
        assert_eq!(seq.next_id(), "STU0002");
        assert_eq!(seq.issued(), 2);

        let wide = SequenceGenerator::with_width("G", 6);
        assert_eq!(wide.next_id(), "G000001");
    }

    #[test]
    fn test_record_serde_roundtrip_defaults() {
        let json = r#"{"id":"STU0009","name":"Emma Wilson"}"#;
        let record: Record = serde_json::from_str(json).unwrap();
        assert_eq!(record.id, "STU0009");
        assert!(record.email.is_none());
        assert!(record.grades.is_empty());
    }
}
