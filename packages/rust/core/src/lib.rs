//! Lookup runs, school normalization, and aggregation for cohort-census.
//!
//! This crate ties the lookup client and the record format together into the
//! end-to-end workflows (`run_lookup`, `retry_unknowns`) and turns merged
//! records into a count table.

pub mod aggregate;
pub mod aliases;
pub mod pipeline;

pub use aggregate::{CountFormat, CountRow, CountTable, aggregate, render_counts, write_counts};
pub use aliases::{AliasTable, Normalizer};
pub use pipeline::{
    LookupRun, LookupRunConfig, LookupSummary, ProgressReporter, RecordSink, RetryOutcome,
    SilentProgress, retry_unknowns, run_lookup,
};
