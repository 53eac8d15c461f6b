//! Batched lookup runs: `names → lookup → records`, and retrying unknowns.
//!
//! Batches run strictly one after another. Each finished batch is written to
//! the sink and flushed before the next starts, so an interrupted run keeps
//! every completed batch on disk.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use census_lookup::{LookupClient, LookupOutcome};
use census_records::{MergeOptions, MergeOutcome, RecordFormat, merge, write_record};
use census_shared::{CensusError, NameRecord, ReasoningEffort, RecordSet, Result, School};
use tracing::{info, instrument, warn};

// ---------------------------------------------------------------------------
// Configuration and results
// ---------------------------------------------------------------------------

/// Settings for one lookup run.
#[derive(Debug, Clone)]
pub struct LookupRunConfig {
    /// Names per lookup call.
    pub batch_size: usize,
    /// Reasoning effort passed to the client.
    pub effort: Option<ReasoningEffort>,
    /// Pause between consecutive batches.
    pub batch_delay: Duration,
    /// Output line format.
    pub format: RecordFormat,
}

impl Default for LookupRunConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            effort: None,
            batch_delay: Duration::ZERO,
            format: RecordFormat::default(),
        }
    }
}

/// Counters for a finished lookup run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupSummary {
    pub requested: usize,
    pub resolved: usize,
    pub unknown: usize,
    /// Names whose lookup failed and were recorded as unknown.
    pub failed: usize,
    pub batches: usize,
}

/// Records produced by a lookup run.
#[derive(Debug, Clone)]
pub struct LookupRun {
    pub records: RecordSet,
    pub summary: LookupSummary,
}

/// A retry pass and the base merged with it.
#[derive(Debug, Clone)]
pub struct RetryOutcome {
    pub retry: LookupRun,
    pub merged: MergeOutcome,
}

// ---------------------------------------------------------------------------
// Progress trait
// ---------------------------------------------------------------------------

/// Progress callback for lookup runs.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called before batch `current` (1-based) of `total` is sent.
    fn batch_started(&self, current: usize, total: usize, size: usize);
    /// Called when the run completes.
    fn done(&self, summary: &LookupSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn batch_started(&self, _current: usize, _total: usize, _size: usize) {}
    fn done(&self, _summary: &LookupSummary) {}
}

// ---------------------------------------------------------------------------
// RecordSink
// ---------------------------------------------------------------------------

/// Destination for records as batches complete.
pub struct RecordSink<W: Write> {
    writer: W,
    path: PathBuf,
}

impl RecordSink<BufWriter<File>> {
    /// Create (truncate) a file sink, creating parent directories.
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| CensusError::io(parent, e))?;
        }
        let file = File::create(path).map_err(|e| CensusError::io(path, e))?;
        Ok(Self::new(BufWriter::new(file), path))
    }
}

impl<W: Write> RecordSink<W> {
    /// Wrap any writer. `path` is only used in error messages.
    pub fn new(writer: W, path: impl Into<PathBuf>) -> Self {
        Self {
            writer,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Append records and flush, so the batch survives an interrupted run.
    fn write_batch(&mut self, records: &[NameRecord], format: &RecordFormat) -> Result<()> {
        records
            .iter()
            .try_for_each(|r| write_record(&mut self.writer, r, format))
            .and_then(|()| self.writer.flush())
            .map_err(|e| CensusError::io(&self.path, e))
    }
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

/// Look up `names` in fixed-size batches and stream the records to `sink`.
///
/// Failed lookups are logged and recorded as unknown; they never abort the
/// run. Only sink I/O errors and invalid arguments are fatal.
#[instrument(skip_all, fields(names = names.len(), batch_size = config.batch_size))]
pub async fn run_lookup<C, W>(
    names: &[String],
    client: &C,
    config: &LookupRunConfig,
    sink: &mut RecordSink<W>,
    progress: &dyn ProgressReporter,
) -> Result<LookupRun>
where
    C: LookupClient,
    W: Write,
{
    if names.is_empty() {
        return Err(CensusError::validation("no names supplied to look up"));
    }
    if config.batch_size == 0 {
        return Err(CensusError::validation("batch size must be at least 1"));
    }
    if let Some(bad) = names.iter().find(|n| !config.format.can_write_name(n)) {
        return Err(CensusError::validation(format!(
            "name {bad:?} cannot be stored as a record key"
        )));
    }

    let total_batches = names.len().div_ceil(config.batch_size);
    let mut records = RecordSet::new();
    let mut summary = LookupSummary {
        requested: names.len(),
        batches: total_batches,
        ..Default::default()
    };

    progress.phase("Looking up schools");
    for (idx, chunk) in names.chunks(config.batch_size).enumerate() {
        if idx > 0 && !config.batch_delay.is_zero() {
            tokio::time::sleep(config.batch_delay).await;
        }

        let current = idx + 1;
        progress.batch_started(current, total_batches, chunk.len());
        info!(batch = current, total = total_batches, size = chunk.len(), "processing batch");

        let mut outcomes: HashMap<String, LookupOutcome> =
            client.lookup(chunk, config.effort).await.into_iter().collect();

        let mut batch = Vec::with_capacity(chunk.len());
        for name in chunk {
            let school = match outcomes.remove(name) {
                Some(LookupOutcome::Resolved(s)) => match School::from_raw(&s) {
                    School::Known(school) if !config.format.can_write_school(&school) => {
                        warn!(%name, %school, "unusable school answer, recording as unknown");
                        School::Unknown
                    }
                    other => other,
                },
                Some(LookupOutcome::Unknown) => School::Unknown,
                Some(LookupOutcome::Failed(error)) => {
                    warn!(%name, %error, "lookup failed, recording as unknown");
                    summary.failed += 1;
                    School::Unknown
                }
                None => {
                    warn!(%name, "client returned no outcome, recording as unknown");
                    School::Unknown
                }
            };
            match school {
                School::Known(_) => summary.resolved += 1,
                School::Unknown => summary.unknown += 1,
            }

            let record = NameRecord::new(name.clone(), school);
            records.insert(record.clone());
            batch.push(record);
        }

        sink.write_batch(&batch, &config.format)?;
    }

    info!(
        resolved = summary.resolved,
        unknown = summary.unknown,
        failed = summary.failed,
        path = %sink.path().display(),
        "lookup run complete"
    );
    progress.done(&summary);

    Ok(LookupRun { records, summary })
}

/// Re-run the lookup for every unknown entry of `base` and merge the answers
/// back in. The retry records (not the merged set) go to `sink`.
#[instrument(skip_all, fields(base = base.len()))]
pub async fn retry_unknowns<C, W>(
    base: &RecordSet,
    client: &C,
    config: &LookupRunConfig,
    sink: &mut RecordSink<W>,
    progress: &dyn ProgressReporter,
) -> Result<RetryOutcome>
where
    C: LookupClient,
    W: Write,
{
    let names = base.unknown_names();
    if names.is_empty() {
        return Err(CensusError::validation(
            "no names marked as unknown were found in the provided records",
        ));
    }
    info!(unknown = names.len(), "retrying unknown names");

    let retry = run_lookup(&names, client, config, sink, progress).await?;

    progress.phase("Merging retry results");
    let merged = merge(base, std::slice::from_ref(&retry.records), &MergeOptions::default())?;
    info!(
        resolved = merged.resolved,
        still_unknown = merged.still_unknown,
        "merged retry results"
    );

    Ok(RetryOutcome { retry, merged })
}
