//! Core domain types: schools, name records, and ordered record sets.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// School
// ---------------------------------------------------------------------------

/// The resolved undergraduate institution for one name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum School {
    /// A non-empty, trimmed school string as reported.
    Known(String),
    /// Resolution did not succeed. Retryable, not an error.
    Unknown,
}

impl School {
    /// Build a school from a raw field. Empty or whitespace-only input is `Unknown`.
    pub fn from_raw(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            Self::Unknown
        } else {
            Self::Known(trimmed.to_string())
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    pub fn as_known(&self) -> Option<&str> {
        match self {
            Self::Known(s) => Some(s),
            Self::Unknown => None,
        }
    }
}

// ---------------------------------------------------------------------------
// NameRecord
// ---------------------------------------------------------------------------

/// One student: the name key and the school it resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameRecord {
    pub name: String,
    pub school: School,
}

impl NameRecord {
    pub fn new(name: impl Into<String>, school: School) -> Self {
        Self {
            name: name.into(),
            school,
        }
    }

    pub fn known(name: impl Into<String>, school: impl Into<String>) -> Self {
        Self::new(name, School::Known(school.into()))
    }

    pub fn unknown(name: impl Into<String>) -> Self {
        Self::new(name, School::Unknown)
    }
}

// ---------------------------------------------------------------------------
// RecordSet
// ---------------------------------------------------------------------------

/// What happened when a record was offered to [`RecordSet::insert`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The name was new and was appended.
    Inserted,
    /// The name existed as `Unknown` and now carries the offered school.
    Upgraded,
    /// The name existed and nothing changed.
    Duplicate,
    /// The name existed with a different known school; the existing one was kept.
    Conflict { kept: String, rejected: String },
}

/// Ordered sequence of records with unique names.
///
/// Insertion order is preserved for stable output; lookups by name go through
/// an index kept in sync with the backing vector.
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    records: Vec<NameRecord>,
    index: HashMap<String, usize>,
}

impl PartialEq for RecordSet {
    fn eq(&self, other: &Self) -> bool {
        self.records == other.records
    }
}

impl Eq for RecordSet {}

impl RecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NameRecord> {
        self.records.iter()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// School recorded for `name`, if the name is present.
    pub fn school(&self, name: &str) -> Option<&School> {
        self.index.get(name).map(|&i| &self.records[i].school)
    }

    /// Offer a record. A name never appears twice: an `Unknown` entry is
    /// upgraded by a known school, otherwise the first known school stays.
    pub fn insert(&mut self, record: NameRecord) -> InsertOutcome {
        let Some(&i) = self.index.get(&record.name) else {
            self.index.insert(record.name.clone(), self.records.len());
            self.records.push(record);
            return InsertOutcome::Inserted;
        };

        let School::Known(offered) = record.school else {
            return InsertOutcome::Duplicate;
        };

        let existing = &mut self.records[i].school;
        if existing.is_unknown() {
            *existing = School::Known(offered);
            return InsertOutcome::Upgraded;
        }

        match existing.as_known() {
            Some(kept) if kept != offered => InsertOutcome::Conflict {
                kept: kept.to_string(),
                rejected: offered,
            },
            _ => InsertOutcome::Duplicate,
        }
    }

    /// Replace the school of an existing name. Returns `false` if absent.
    pub fn set_school(&mut self, name: &str, school: School) -> bool {
        match self.index.get(name) {
            Some(&i) => {
                self.records[i].school = school;
                true
            }
            None => false,
        }
    }

    /// Names whose school is still `Unknown`, in set order.
    pub fn unknown_names(&self) -> Vec<String> {
        self.records
            .iter()
            .filter(|r| r.school.is_unknown())
            .map(|r| r.name.clone())
            .collect()
    }

    pub fn unknown_count(&self) -> usize {
        self.records.iter().filter(|r| r.school.is_unknown()).count()
    }
}

impl FromIterator<NameRecord> for RecordSet {
    fn from_iter<I: IntoIterator<Item = NameRecord>>(iter: I) -> Self {
        let mut set = Self::new();
        for record in iter {
            set.insert(record);
        }
        set
    }
}

impl<'a> IntoIterator for &'a RecordSet {
    type Item = &'a NameRecord;
    type IntoIter = std::slice::Iter<'a, NameRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

// ---------------------------------------------------------------------------
// ReasoningEffort
// ---------------------------------------------------------------------------

/// Reasoning effort requested from the lookup model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Low,
    Medium,
    High,
}

impl ReasoningEffort {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for ReasoningEffort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReasoningEffort {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!(
                "invalid reasoning effort '{other}': expected low, medium, or high"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn school_from_raw_trims_and_detects_empty() {
        assert_eq!(School::from_raw("  MIT "), School::Known("MIT".into()));
        assert_eq!(School::from_raw("   "), School::Unknown);
    }

    #[test]
    fn insert_keeps_names_unique() {
        let mut set = RecordSet::new();
        assert_eq!(set.insert(NameRecord::unknown("Bob")), InsertOutcome::Inserted);
        assert_eq!(
            set.insert(NameRecord::known("Bob", "Yale")),
            InsertOutcome::Upgraded
        );
        assert_eq!(
            set.insert(NameRecord::known("Bob", "Yale")),
            InsertOutcome::Duplicate
        );
        assert_eq!(
            set.insert(NameRecord::known("Bob", "Brown")),
            InsertOutcome::Conflict {
                kept: "Yale".into(),
                rejected: "Brown".into()
            }
        );
        assert_eq!(set.insert(NameRecord::unknown("Bob")), InsertOutcome::Duplicate);
        assert_eq!(set.len(), 1);
        assert_eq!(set.school("Bob"), Some(&School::Known("Yale".into())));
    }

    #[test]
    fn insertion_order_is_preserved() {
        let set: RecordSet = ["Carol", "Alice", "Bob"]
            .into_iter()
            .map(NameRecord::unknown)
            .collect();
        let names: Vec<_> = set.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["Carol", "Alice", "Bob"]);
    }

    #[test]
    fn unknown_names_in_order() {
        let set: RecordSet = vec![
            NameRecord::unknown("A"),
            NameRecord::known("B", "MIT"),
            NameRecord::unknown("C"),
        ]
        .into_iter()
        .collect();
        assert_eq!(set.unknown_names(), ["A", "C"]);
        assert_eq!(set.unknown_count(), 2);
    }

    #[test]
    fn reasoning_effort_parses_case_insensitively() {
        assert_eq!("HIGH".parse::<ReasoningEffort>(), Ok(ReasoningEffort::High));
        assert!("extreme".parse::<ReasoningEffort>().is_err());
        assert_eq!(ReasoningEffort::Medium.to_string(), "medium");
    }
}
