//! Record file format and merging.
//!
//! Processed files hold one `Name | School` line per student. This crate
//! reads and writes them and merges several passes over the same cohort.

mod merge;
mod parser;

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use census_shared::{CensusError, RecordSet, Result};
use tracing::info;

pub use merge::{MergeMode, MergeOptions, MergeOutcome, Precedence, merge};
pub use parser::{
    Conflict, ParsedRecords, RecordFormat, format_records, parse_records, read_records,
    write_record, write_records,
};

/// Read and parse a record file from disk.
pub fn load_records(path: &Path, format: &RecordFormat) -> Result<ParsedRecords> {
    let file = File::open(path).map_err(|e| CensusError::io(path, e))?;
    read_records(BufReader::new(file), format).map_err(|e| match e {
        CensusError::Io { source, .. } => CensusError::io(path, source),
        other => other,
    })
}

/// Write a record set to disk, creating parent directories as needed.
pub fn save_records(path: &Path, records: &RecordSet, format: &RecordFormat) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| CensusError::io(parent, e))?;
    }

    let file = File::create(path).map_err(|e| CensusError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    write_records(&mut writer, records, format)
        .and_then(|()| writer.flush())
        .map_err(|e| CensusError::io(path, e))?;

    info!(path = %path.display(), records = records.len(), "saved records");
    Ok(())
}
