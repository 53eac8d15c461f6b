//! School-name normalization.
//!
//! [`AliasTable`] is an exact, case-sensitive map from spelling variants to
//! canonical names. [`Normalizer`] wraps it with an optional cleanup pass that
//! collapses punctuation and campus suffixes before the table is consulted.
//!
//! Both are idempotent: normalizing a canonical name returns it unchanged.
//! The table constructor rejects alias chains to keep that true.

use std::collections::HashMap;
use std::sync::LazyLock;

use census_lookup::is_placeholder;
use census_shared::{CensusError, Result};
use regex::Regex;

/// Prefixes whose `, Campus` suffix is part of the canonical name.
const KEEP_COMMA_PREFIXES: [&str; 2] = ["University of California,", "University of Maryland,"];

/// Cleanup passes are repeated until the string stops changing. Every pass
/// only removes text, so this bound is never hit in practice.
const MAX_CLEANUP_ROUNDS: usize = 16;

// ---------------------------------------------------------------------------
// AliasTable
// ---------------------------------------------------------------------------

/// Raw variant → canonical school name.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    map: HashMap<String, String>,
}

impl AliasTable {
    /// Build a validated table. Keys and values are trimmed; empty entries,
    /// contradictory duplicates, and chains (`a → b`, `b → c`) are rejected.
    pub fn new<I, K, V>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut map: HashMap<String, String> = HashMap::new();

        for (raw, canonical) in entries {
            let raw = raw.as_ref().trim();
            let canonical = canonical.as_ref().trim();
            if raw.is_empty() || canonical.is_empty() {
                return Err(CensusError::config(format!(
                    "alias entries must be non-empty (got '{raw}' → '{canonical}')"
                )));
            }
            if let Some(existing) = map.get(raw).filter(|e| *e != canonical) {
                return Err(CensusError::config(format!(
                    "alias '{raw}' maps to both '{existing}' and '{canonical}'"
                )));
            }
            map.insert(raw.to_string(), canonical.to_string());
        }

        for canonical in map.values() {
            if let Some(next) = map.get(canonical).filter(|n| *n != canonical) {
                return Err(CensusError::config(format!(
                    "alias chain: canonical name '{canonical}' is itself an alias of '{next}'"
                )));
            }
        }

        Ok(Self { map })
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Canonical form of `raw`: trimmed, then looked up exactly. Absent
    /// names are already canonical.
    pub fn normalize(&self, raw: &str) -> String {
        let key = raw.trim();
        self.map.get(key).map_or(key, String::as_str).to_string()
    }

    fn canonical_names(&self) -> impl Iterator<Item = &str> {
        self.map.values().map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Normalizer
// ---------------------------------------------------------------------------

static LEADING_THE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^the\s+").expect("leading-the regex"));

/// `X and University of Y`: keep X.
static SECOND_INSTITUTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s+and\s+(?:University|College|Institut|School|Polytechnic)")
        .expect("second-institution regex")
});

static BALANCED_PARENS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\([^)]*\)").expect("balanced parens regex"));

static DANGLING_PAREN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\(.*$").expect("dangling paren regex"));

/// Trailing `, Country` / `, City` / `, Campus`.
static TRAILING_PLACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*[A-Z][A-Za-z.\s]+$").expect("trailing place regex"));

/// Alias table plus the optional cleanup pass, as configured for a run.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    table: AliasTable,
    cleanup: bool,
}

impl Normalizer {
    /// With `cleanup` on, every canonical name must survive cleanup
    /// unchanged, otherwise normalization would not be idempotent.
    pub fn new(table: AliasTable, cleanup: bool) -> Result<Self> {
        if cleanup {
            for canonical in table.canonical_names() {
                if is_placeholder(canonical) {
                    return Err(CensusError::config(format!(
                        "canonical name '{canonical}' reads as a missing-school placeholder"
                    )));
                }
                let cleaned = clean_school(canonical);
                if cleaned != canonical {
                    return Err(CensusError::config(format!(
                        "canonical name '{canonical}' is not stable under cleanup (becomes '{cleaned}')"
                    )));
                }
            }
        }
        Ok(Self { table, cleanup })
    }

    /// Exact table lookup only.
    pub fn exact(table: AliasTable) -> Self {
        Self {
            table,
            cleanup: false,
        }
    }

    /// Canonical counting key for a raw school, or `None` when the value
    /// carries no school at all.
    pub fn canonical(&self, raw: &str) -> Option<String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        if !self.cleanup {
            return Some(self.table.normalize(trimmed));
        }

        if is_placeholder(trimmed) {
            return None;
        }
        let cleaned = clean_school(trimmed);
        if cleaned.is_empty() || is_placeholder(&cleaned) {
            return None;
        }
        Some(self.table.normalize(&cleaned))
    }
}

/// Run the cleanup passes to a fixed point.
fn clean_school(raw: &str) -> String {
    let mut current = raw.trim().to_string();
    for _ in 0..MAX_CLEANUP_ROUNDS {
        let next = clean_once(&current);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

fn clean_once(raw: &str) -> String {
    let s = raw.replace(['–', '—'], "-");
    let s = LEADING_THE_RE.replace(&s, "");

    let s = s.split(';').next().unwrap_or_default();
    let s = s.split('&').next().unwrap_or_default();
    let s = match SECOND_INSTITUTION_RE.find(s) {
        Some(m) => &s[..m.start()],
        None => s,
    };

    let s = BALANCED_PARENS_RE.replace_all(s, " ");
    let s = DANGLING_PAREN_RE.replace(&s, "");
    let mut s = s.split_whitespace().collect::<Vec<_>>().join(" ");

    if !KEEP_COMMA_PREFIXES.iter().any(|p| s.starts_with(p)) {
        s = TRAILING_PLACE_RE.replace(&s, "").trim().to_string();
    }

    s
}
