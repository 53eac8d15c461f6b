//! Merge partial record sets for the same cohort into one.
//!
//! A known base school always wins. Unknown base entries take the first
//! known value offered by the supplements (or the last, with
//! [`Precedence::Last`]). Merging is idempotent.

use census_shared::{CensusError, NameRecord, RecordSet, Result, School};
use tracing::{debug, instrument};

/// How supplement names missing from the base are handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MergeMode {
    /// Append them after the base records, in first-seen order.
    #[default]
    Open,
    /// Fail with [`CensusError::Schema`].
    Strict,
}

/// Which supplement wins when several supply a known school for one name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Precedence {
    /// Earliest supplement in argument order.
    #[default]
    First,
    /// Latest supplement in argument order.
    Last,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MergeOptions {
    pub mode: MergeMode,
    pub precedence: Precedence,
}

/// Merged records plus what the merge changed.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub records: RecordSet,
    /// Base entries that went from unknown to known.
    pub resolved: usize,
    /// Names appended from supplements.
    pub appended: usize,
    /// Entries still unknown after the merge.
    pub still_unknown: usize,
}

/// Merge `supplements` into `base`, applied in slice order.
#[instrument(skip_all, fields(base = base.len(), supplements = supplements.len()))]
pub fn merge(
    base: &RecordSet,
    supplements: &[RecordSet],
    options: &MergeOptions,
) -> Result<MergeOutcome> {
    if options.mode == MergeMode::Strict {
        check_closed(base, supplements)?;
    }

    let mut merged = base.clone();
    let mut appended = 0;

    // New names keep argument order regardless of precedence.
    for supplement in supplements {
        for record in supplement {
            if !merged.contains(&record.name) {
                merged.insert(NameRecord::unknown(record.name.clone()));
                appended += 1;
            }
        }
    }

    let ordered: Vec<&RecordSet> = match options.precedence {
        Precedence::First => supplements.iter().collect(),
        Precedence::Last => supplements.iter().rev().collect(),
    };

    let mut resolved = 0;
    for name in merged.unknown_names() {
        let Some(school) = ordered
            .iter()
            .find_map(|s| s.school(&name).and_then(School::as_known))
        else {
            continue;
        };

        debug!(%name, %school, "resolved from supplement");
        if base.contains(&name) {
            resolved += 1;
        }
        merged.set_school(&name, School::Known(school.to_string()));
    }

    let still_unknown = merged.unknown_count();
    debug!(resolved, appended, still_unknown, "merge complete");

    Ok(MergeOutcome {
        records: merged,
        resolved,
        appended,
        still_unknown,
    })
}

/// Base-closed check: every supplement name must already be in the base.
fn check_closed(base: &RecordSet, supplements: &[RecordSet]) -> Result<()> {
    for (source_index, supplement) in supplements.iter().enumerate() {
        if let Some(record) = supplement.iter().find(|r| !base.contains(&r.name)) {
            return Err(CensusError::Schema {
                name: record.name.clone(),
                source_index,
            });
        }
    }
    Ok(())
}
