//! Line-oriented `Name | School` format.
//!
//! - `Name` alone: lookup input, parses to an unknown school
//! - `Name | School`: processed output
//! - `Name | UNKNOWN` or `Name |`: processed output, unresolved
//! - blank lines are skipped

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use census_shared::{CensusError, InsertOutcome, NameRecord, RecordSet, Result, School};
use tracing::{debug, warn};

/// Literal the reference workflow writes for unresolved schools. Always
/// accepted on read, alongside the configured sentinel.
const LEGACY_UNKNOWN: &str = "unknown";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Delimiter and unknown sentinel, fixed for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFormat {
    pub delimiter: char,
    pub unknown_sentinel: String,
}

impl Default for RecordFormat {
    fn default() -> Self {
        Self {
            delimiter: '|',
            unknown_sentinel: "UNKNOWN".into(),
        }
    }
}

impl RecordFormat {
    pub fn with_sentinel(sentinel: impl Into<String>) -> Self {
        Self {
            unknown_sentinel: sentinel.into(),
            ..Self::default()
        }
    }

    /// Whether a trimmed school field means "unresolved".
    fn is_unknown_marker(&self, field: &str) -> bool {
        field.is_empty()
            || field.eq_ignore_ascii_case(&self.unknown_sentinel)
            || field.eq_ignore_ascii_case(LEGACY_UNKNOWN)
    }

    /// Whether `school` can be written as a known school and read back
    /// unchanged.
    pub fn can_write_school(&self, school: &str) -> bool {
        self.school_problem(school).is_none()
    }

    /// Whether `name` can be written as a record key and read back unchanged.
    pub fn can_write_name(&self, name: &str) -> bool {
        !name.is_empty() && self.field_problem(name).is_none()
    }

    fn school_problem(&self, school: &str) -> Option<&'static str> {
        if self.is_unknown_marker(school) {
            return Some("school reads back as unknown");
        }
        self.field_problem(school)
    }

    /// Why `field` would not survive a write/parse cycle, if it would not.
    fn field_problem(&self, field: &str) -> Option<&'static str> {
        if field.contains(self.delimiter) {
            Some("field contains the delimiter")
        } else if field.contains(['\n', '\r']) {
            Some("field contains a line break")
        } else if field.trim() != field {
            Some("field has surrounding whitespace")
        } else {
            None
        }
    }
}

/// Two lines named the same student with different known schools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    /// 1-based line of the rejected entry.
    pub line: usize,
    pub name: String,
    pub kept: String,
    pub rejected: String,
}

/// Result of parsing one file.
#[derive(Debug, Clone, Default)]
pub struct ParsedRecords {
    pub records: RecordSet,
    /// Repeated names that added nothing.
    pub duplicates: usize,
    /// Repeated names that disagreed; the first occurrence was kept.
    pub conflicts: Vec<Conflict>,
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Parse a names file or processed file into a record set.
///
/// The first malformed line aborts the parse with [`CensusError::Format`].
pub fn parse_records(content: &str, format: &RecordFormat) -> Result<ParsedRecords> {
    let mut collector = Collector::default();
    for (idx, line) in content.lines().enumerate() {
        collector.push(idx + 1, line, format)?;
    }
    Ok(collector.finish())
}

/// Like [`parse_records`], reading lines from any buffered reader.
///
/// Read failures surface as [`CensusError::Io`] with an empty path; callers
/// that know the source re-tag them (see `load_records`).
pub fn read_records<R: BufRead>(reader: R, format: &RecordFormat) -> Result<ParsedRecords> {
    let mut collector = Collector::default();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| CensusError::io(PathBuf::new(), e))?;
        collector.push(idx + 1, &line, format)?;
    }
    Ok(collector.finish())
}

#[derive(Default)]
struct Collector {
    parsed: ParsedRecords,
}

impl Collector {
    fn push(&mut self, line_no: usize, line: &str, format: &RecordFormat) -> Result<()> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(());
        }

        let record = parse_line(trimmed, line_no, format)?;
        let name = record.name.clone();

        match self.parsed.records.insert(record) {
            InsertOutcome::Inserted => {}
            InsertOutcome::Upgraded => {
                debug!(line = line_no, %name, "later line resolved an unknown entry");
            }
            InsertOutcome::Duplicate => self.parsed.duplicates += 1,
            InsertOutcome::Conflict { kept, rejected } => {
                warn!(line = line_no, %name, %kept, %rejected, "conflicting schools, keeping first");
                self.parsed.conflicts.push(Conflict {
                    line: line_no,
                    name,
                    kept,
                    rejected,
                });
            }
        }
        Ok(())
    }

    fn finish(self) -> ParsedRecords {
        debug!(
            records = self.parsed.records.len(),
            duplicates = self.parsed.duplicates,
            conflicts = self.parsed.conflicts.len(),
            "parsed records"
        );
        self.parsed
    }
}

fn parse_line(line: &str, line_no: usize, format: &RecordFormat) -> Result<NameRecord> {
    let fields: Vec<&str> = line.split(format.delimiter).map(str::trim).collect();

    let (name, school) = match fields.as_slice() {
        [name] => (*name, School::Unknown),
        [name, school] if format.is_unknown_marker(school) => (*name, School::Unknown),
        [name, school] => (*name, School::Known((*school).to_string())),
        _ => {
            return Err(CensusError::format(
                line_no,
                line,
                format!(
                    "expected `Name` or `Name {} School`, found {} fields",
                    format.delimiter,
                    fields.len()
                ),
            ));
        }
    };

    if name.is_empty() {
        return Err(CensusError::format(line_no, line, "empty name field"));
    }

    Ok(NameRecord::new(name, school))
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Serialize records one per line in insertion order.
pub fn write_records<W: Write>(
    writer: &mut W,
    records: &RecordSet,
    format: &RecordFormat,
) -> std::io::Result<()> {
    for record in records {
        write_record(writer, record, format)?;
    }
    Ok(())
}

/// Serialize a single record as one line.
///
/// Fails with [`io::ErrorKind::InvalidData`] when the line would not parse
/// back to the same record. Nothing is written in that case.
pub fn write_record<W: Write>(
    writer: &mut W,
    record: &NameRecord,
    format: &RecordFormat,
) -> io::Result<()> {
    let school = match &record.school {
        School::Known(school) => {
            if let Some(problem) = format.school_problem(school) {
                return Err(unwritable(record, problem));
            }
            school.as_str()
        }
        School::Unknown => {
            if format.field_problem(&format.unknown_sentinel).is_some() {
                return Err(unwritable(record, "unknown sentinel is not a single field"));
            }
            format.unknown_sentinel.as_str()
        }
    };
    if record.name.is_empty() {
        return Err(unwritable(record, "empty name"));
    }
    if let Some(problem) = format.field_problem(&record.name) {
        return Err(unwritable(record, problem));
    }

    writeln!(writer, "{} {} {}", record.name, format.delimiter, school)
}

fn unwritable(record: &NameRecord, problem: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("cannot write record for {:?}: {problem}", record.name),
    )
}

/// Render records to a string in the on-disk format.
pub fn format_records(records: &RecordSet, format: &RecordFormat) -> io::Result<String> {
    let mut buf = Vec::new();
    write_records(&mut buf, records, format)?;
    String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt() -> RecordFormat {
        RecordFormat::default()
    }

    #[test]
    fn parses_processed_lines() {
        let input = "Alice | MIT\nBob | UNKNOWN\n\nCarol |   \nDan | unknown\n";
        let parsed = parse_records(input, &fmt()).unwrap();
        let set = &parsed.records;
        assert_eq!(set.len(), 4);
        assert_eq!(set.school("Alice"), Some(&School::Known("MIT".into())));
        assert_eq!(set.school("Bob"), Some(&School::Unknown));
        assert_eq!(set.school("Carol"), Some(&School::Unknown));
        assert_eq!(set.school("Dan"), Some(&School::Unknown));
    }

    #[test]
    fn parses_bare_names_as_unknown() {
        let parsed = parse_records("Alice\n  Bob  \n", &fmt()).unwrap();
        assert_eq!(parsed.records.unknown_names(), ["Alice", "Bob"]);
    }

    #[test]
    fn too_many_fields_is_a_format_error() {
        let err = parse_records("Alice | MIT\nBob | CMU | extra\n", &fmt()).unwrap_err();
        match err {
            CensusError::Format { line, content, .. } => {
                assert_eq!(line, 2);
                assert_eq!(content, "Bob | CMU | extra");
            }
            other => panic!("expected Format, got {other:?}"),
        }
    }

    #[test]
    fn empty_name_is_a_format_error() {
        let err = parse_records(" | MIT", &fmt()).unwrap_err();
        assert!(matches!(err, CensusError::Format { line: 1, .. }));
    }

    #[test]
    fn custom_sentinel_is_written_and_read() {
        let format = RecordFormat::with_sentinel("N/A");
        let set: RecordSet = vec![NameRecord::unknown("Bob")].into_iter().collect();
        let text = format_records(&set, &format).unwrap();
        assert_eq!(text, "Bob | N/A\n");

        let parsed = parse_records(&text, &format).unwrap();
        assert_eq!(parsed.records, set);
    }

    #[test]
    fn write_then_parse_preserves_records() {
        let set: RecordSet = vec![
            NameRecord::known("Zed Zhang", "University of California, Berkeley"),
            NameRecord::unknown("Bob"),
            NameRecord::known("Alice", "MIT"),
        ]
        .into_iter()
        .collect();

        let text = format_records(&set, &fmt()).unwrap();
        assert_eq!(
            text,
            "Zed Zhang | University of California, Berkeley\nBob | UNKNOWN\nAlice | MIT\n"
        );
        assert_eq!(parse_records(&text, &fmt()).unwrap().records, set);
    }

    #[test]
    fn duplicates_and_conflicts_are_reported() {
        let input = "Alice | MIT\nAlice | MIT\nAlice | Stanford\nBob | unknown\nBob | Yale\n";
        let parsed = parse_records(input, &fmt()).unwrap();
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.duplicates, 1);
        assert_eq!(
            parsed.conflicts,
            vec![Conflict {
                line: 3,
                name: "Alice".into(),
                kept: "MIT".into(),
                rejected: "Stanford".into(),
            }]
        );
        assert_eq!(parsed.records.school("Bob"), Some(&School::Known("Yale".into())));
    }

    #[test]
    fn reader_and_text_parse_alike() {
        let input = "Alice | MIT\r\n\r\nBob | UNKNOWN\r\nAlice | Stanford\r\n";
        let from_reader = read_records(std::io::Cursor::new(input), &fmt()).unwrap();
        let from_text = parse_records(input, &fmt()).unwrap();
        assert_eq!(from_reader.records, from_text.records);
        assert_eq!(from_reader.conflicts, from_text.conflicts);
        assert_eq!(from_reader.conflicts[0].line, 4);
    }

    #[test]
    fn reader_reports_format_errors_with_line() {
        let err = read_records("A | B | C\n".as_bytes(), &fmt()).unwrap_err();
        assert!(matches!(err, CensusError::Format { line: 1, .. }));
    }

    fn write_err(record: NameRecord, format: &RecordFormat) -> io::ErrorKind {
        let mut buf = Vec::new();
        let err = write_record(&mut buf, &record, format).unwrap_err();
        assert!(buf.is_empty(), "partial line written for {record:?}");
        err.kind()
    }

    #[test]
    fn records_that_would_not_read_back_are_refused() {
        let format = fmt();
        let cases = [
            NameRecord::known("Bob", "unknown"),
            NameRecord::known("Bob", "Unknown"),
            NameRecord::known("Bob", "UNKNOWN"),
            NameRecord::known("Alice", "Rice University | BS 2019"),
            NameRecord::known("Ann | Lee", "MIT"),
            NameRecord::known(" Carol", "MIT"),
            NameRecord::known("Dan", "Yale\nHarvard"),
            NameRecord::unknown(""),
        ];
        for record in cases {
            assert_eq!(write_err(record, &format), io::ErrorKind::InvalidData);
        }

        let custom = RecordFormat::with_sentinel("N/A");
        assert_eq!(
            write_err(NameRecord::known("Eve", "n/a"), &custom),
            io::ErrorKind::InvalidData
        );
        let bad_sentinel = RecordFormat::with_sentinel("a | b");
        assert_eq!(
            write_err(NameRecord::unknown("Eve"), &bad_sentinel),
            io::ErrorKind::InvalidData
        );
    }

    #[test]
    fn every_written_record_parses_back() {
        let set: RecordSet = vec![
            NameRecord::known("José Núñez", "Universidad de Chile"),
            NameRecord::known("O'Brien", "Trinity College Dublin"),
            NameRecord::known("Li Wei", "Unknown Valley College"),
            NameRecord::unknown("Bob"),
        ]
        .into_iter()
        .collect();
        for record in &set {
            let mut line = Vec::new();
            write_record(&mut line, record, &fmt()).unwrap();
            let text = String::from_utf8(line).unwrap();
            let back = parse_records(&text, &fmt()).unwrap().records;
            assert_eq!(back.iter().collect::<Vec<_>>(), [record]);
        }
        assert_eq!(parse_records(&format_records(&set, &fmt()).unwrap(), &fmt()).unwrap().records, set);
    }

    #[test]
    fn school_writability() {
        let format = fmt();
        assert!(format.can_write_school("Rice University"));
        assert!(!format.can_write_school("unknown"));
        assert!(!format.can_write_school("Rice | BS"));
        assert!(!format.can_write_school(""));
        assert!(format.can_write_name("Alice Smith"));
        assert!(!format.can_write_name("Alice | Smith"));
        assert!(!format.can_write_name("Alice "));
    }
}
