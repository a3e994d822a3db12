//! Record Search
//!
//! Regex-driven lookups over an [`EntityStore`] snapshot.

use std::sync::Arc;

use regex::{Regex, RegexBuilder};

use super::entity_store::EntityStore;
use super::record::Record;
use crate::error::{Error, Result};

/// Record field a search pattern is matched against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchField {
    Id,
    Name,
    Email,
    Phone,
}

impl SearchField {
    fn value<'a>(&self, record: &'a Record) -> &'a str {
        match self {
            SearchField::Id => &record.id,
            SearchField::Name => &record.name,
            SearchField::Email => record.email.as_deref().unwrap_or(""),
            SearchField::Phone => record.phone.as_deref().unwrap_or(""),
        }
    }
}

impl std::str::FromStr for SearchField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "id" => Ok(SearchField::Id),
            "name" => Ok(SearchField::Name),
            "email" => Ok(SearchField::Email),
            "phone" => Ok(SearchField::Phone),
            other => Err(Error::InvalidConfig(format!(
                "unknown search field: {}",
                other
            ))),
        }
    }
}

/// Search helper bound to a store
pub struct RecordSearch<'a> {
    store: &'a EntityStore,
}

impl<'a> RecordSearch<'a> {
    /// Create a search helper over `store`
    pub fn new(store: &'a EntityStore) -> Self {
        Self { store }
    }

    /// Records whose `field` contains a match for `pattern`
    pub fn search(
        &self,
        pattern: &str,
        field: SearchField,
        case_insensitive: bool,
    ) -> Result<Vec<Arc<Record>>> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(case_insensitive)
            .build()?;

        let mut matches: Vec<Arc<Record>> = self
            .store
            .snapshot_all()
            .into_iter()
            .filter(|r| regex.is_match(field.value(r)))
            .collect();
        matches.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matches)
    }

    /// Records whose email ends with `@domain` (case-insensitive)
    pub fn find_by_email_domain(&self, domain: &str) -> Result<Vec<Arc<Record>>> {
        let pattern = format!("@{}$", regex::escape(domain));
        self.search(&pattern, SearchField::Email, true)
    }

    /// Records whose whole id matches a `*` wildcard pattern
    pub fn find_by_id_pattern(&self, wildcard: &str) -> Result<Vec<Arc<Record>>> {
        let pattern = wildcard
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        self.search(&format!("^{}$", pattern), SearchField::Id, false)
    }
}

/// Split `text` into plain segments and `[matched]` segments
pub fn highlight_matches(text: &str, pattern: &str) -> Result<Vec<String>> {
    let regex = Regex::new(pattern)?;
    let mut parts = Vec::new();
    let mut last = 0;

    for m in regex.find_iter(text) {
        if m.start() > last {
            parts.push(text[last..m.start()].to_string());
        }
        parts.push(format!("[{}]", m.as_str()));
        last = m.end();
    }
    if last < text.len() {
        parts.push(text[last..].to_string());
    }

    Ok(parts)
}

// =============================================================================
// Tests
// =============================================================================
