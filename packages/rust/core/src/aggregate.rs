//! Count canonical schools across a record set.

use std::collections::BTreeMap;
use std::io::Write;
use std::str::FromStr;

use census_shared::{RecordSet, School};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::aliases::Normalizer;

// ---------------------------------------------------------------------------
// CountTable
// ---------------------------------------------------------------------------

/// One output row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountRow {
    pub school: String,
    pub count: usize,
}

/// Canonical school → student count, plus how many records had no school.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountTable {
    counts: BTreeMap<String, usize>,
    unresolved: usize,
}

impl CountTable {
    /// Number of distinct schools.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn get(&self, school: &str) -> Option<usize> {
        self.counts.get(school).copied()
    }

    /// Records excluded from the counts.
    pub fn unresolved(&self) -> usize {
        self.unresolved
    }

    /// Records counted under some school.
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// Rows by descending count, ties by ascending school name.
    pub fn rows(&self) -> Vec<CountRow> {
        let mut rows: Vec<CountRow> = self
            .counts
            .iter()
            .map(|(school, &count)| CountRow {
                school: school.clone(),
                count,
            })
            .collect();
        rows.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.school.cmp(&b.school)));
        rows
    }
}

/// Count every record's canonical school. Unknown schools, and schools the
/// normalizer maps to nothing, go into the unresolved tally.
#[instrument(skip_all, fields(records = records.len()))]
pub fn aggregate(records: &RecordSet, normalizer: &Normalizer) -> CountTable {
    let mut table = CountTable::default();

    for record in records {
        let canonical = match &record.school {
            School::Known(raw) => normalizer.canonical(raw),
            School::Unknown => None,
        };

        match canonical {
            Some(school) => *table.counts.entry(school).or_default() += 1,
            None => {
                debug!(name = %record.name, "no school to count");
                table.unresolved += 1;
            }
        }
    }

    info!(
        schools = table.len(),
        counted = table.total(),
        unresolved = table.unresolved,
        "aggregation complete"
    );

    table
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Count table output layouts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CountFormat {
    /// `School<TAB>Count`, one row per line.
    #[default]
    Tsv,
    /// `School | Student Count` with a `- | -` separator row.
    Table,
    /// A JSON document with rows, unresolved and total.
    Json,
}

impl FromStr for CountFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tsv" => Ok(Self::Tsv),
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            other => Err(format!(
                "invalid count format '{other}': expected tsv, table, or json"
            )),
        }
    }
}

#[derive(Serialize)]
struct CountReport {
    rows: Vec<CountRow>,
    unresolved: usize,
    total: usize,
}

/// Write the table in the requested layout.
pub fn write_counts<W: Write>(
    writer: &mut W,
    table: &CountTable,
    format: CountFormat,
) -> std::io::Result<()> {
    match format {
        CountFormat::Tsv => {
            for row in table.rows() {
                writeln!(writer, "{}\t{}", row.school, row.count)?;
            }
        }
        CountFormat::Table => {
            writeln!(writer, "School | Student Count")?;
            writeln!(writer, "- | -")?;
            for row in table.rows() {
                writeln!(writer, "{} | {}", row.school, row.count)?;
            }
        }
        CountFormat::Json => {
            let report = CountReport {
                rows: table.rows(),
                unresolved: table.unresolved,
                total: table.total(),
            };
            serde_json::to_writer_pretty(&mut *writer, &report)?;
            writeln!(writer)?;
        }
    }
    Ok(())
}

/// Render the table to a string.
pub fn render_counts(table: &CountTable, format: CountFormat) -> String {
    let mut buf = Vec::new();
    // Writing into a Vec<u8> cannot fail.
    let _ = write_counts(&mut buf, table, format);
    String::from_utf8_lossy(&buf).into_owned()
}
