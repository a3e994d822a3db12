//! Demo data
//!
//! Populates a store with a fixed set of sample records so the binary has
//! something to aggregate and report on.

use tracing::info;

use crate::store::{EntityStore, Record, ScoreEntry, SequenceGenerator};

const NAMES: [&str; 15] = [
    "John Doe",
    "Anne O'Neill",
    "Sam Carter",
    "Maria Gomez",
    "Liam Smith",
    "Noah Brown",
    "Olivia Davis",
    "Emma Wilson",
    "Ava Johnson",
    "Sophia Lee",
    "Mason Clark",
    "Lucas Hall",
    "Evelyn Young",
    "Amelia King",
    "Harper Wright",
];

const SUBJECTS: [(&str, &str); 5] = [
    ("MAT101", "Mathematics"),
    ("ENG203", "English"),
    ("CS105", "Computer Science"),
    ("HIST210", "History"),
    ("BIO110", "Biology"),
];

const SCORES_PER_RECORD: usize = 3;

/// Sample record `i` stored under `id`
fn sample_record(i: usize, id: String) -> Record {
    let name = NAMES[i];
    let email: String = name
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase())
        .collect();

    let base = 60 + (i * 3) % 40;
    (0..SCORES_PER_RECORD).fold(
        Record::new(id, name)
            .with_email(format!("{}@demo.edu", email))
            .with_phone(format!("555-100-{:04}", i + 1)),
        |record, g| {
            let (code, subject) = SUBJECTS[(i + g) % SUBJECTS.len()];
            let score = (base as i64 + g as i64 * 5 - (i % 7) as i64).clamp(40, 99);
            record.with_score(ScoreEntry::new(code, subject, score as f64))
        },
    )
}

/// Load the sample records into `store`, returning how many were added
pub fn load_sample_data(store: &EntityStore, ids: &SequenceGenerator) -> usize {
    for i in 0..NAMES.len() {
        store.put(sample_record(i, ids.next_id()));
    }

    info!(records = NAMES.len(), "Demo data loaded");
    NAMES.len()
}

// =============================================================================
// Tests
// =============================================================================
