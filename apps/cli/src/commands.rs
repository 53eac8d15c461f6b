//! CLI command definitions, routing, and tracing setup.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use census_core::{
    AliasTable, CountFormat, LookupRunConfig, LookupSummary, Normalizer, ProgressReporter,
    RecordSink, aggregate, retry_unknowns, run_lookup, write_counts,
};
use census_lookup::OpenAiClient;
use census_records::{
    MergeMode, MergeOptions, ParsedRecords, Precedence, RecordFormat, load_records, merge,
    save_records,
};
use census_shared::{
    AppConfig, ReasoningEffort, init_config, load_alias_file, load_config, load_config_from,
    validate_api_key,
};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// census: where did this cohort go to undergrad?
#[derive(Parser)]
#[command(
    name = "census",
    version,
    about = "Look up, merge, and count the undergraduate institutions of a cohort.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.census/census.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Which supplement wins when several disagree.
#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
pub(crate) enum PrecedenceArg {
    #[default]
    First,
    Last,
}

impl From<PrecedenceArg> for Precedence {
    fn from(arg: PrecedenceArg) -> Self {
        match arg {
            PrecedenceArg::First => Precedence::First,
            PrecedenceArg::Last => Precedence::Last,
        }
    }
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Look up the school of every name in a names file.
    Lookup {
        /// Names file, one name per line.
        input: PathBuf,

        /// Processed output (defaults to <input>_processed.<ext>).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Names sent per lookup call.
        #[arg(short = 'n', long)]
        batch_size: Option<usize>,

        /// Reasoning effort: low, medium, or high.
        #[arg(short, long)]
        reasoning_effort: Option<ReasoningEffort>,
    },

    /// Retry the names marked unknown in a processed file and merge the answers back.
    RetryUnknowns {
        /// Processed file from an earlier run.
        processed: PathBuf,

        /// Merged output (defaults to <processed>_merged.<ext>).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Raw retry answers (defaults to <processed>_unknown_retry.<ext>).
        #[arg(long)]
        retry_output: Option<PathBuf>,

        /// Names sent per lookup call.
        #[arg(short = 'n', long)]
        batch_size: Option<usize>,

        /// Reasoning effort (defaults to the configured retry effort).
        #[arg(short, long)]
        reasoning_effort: Option<ReasoningEffort>,
    },

    /// Merge processed retry files into a base processed file.
    Merge {
        /// Base processed file.
        base: PathBuf,

        /// Supplement files, applied in order.
        #[arg(long = "with", required = true, num_args = 1..)]
        with: Vec<PathBuf>,

        /// Merged output (defaults to <base>_merged.<ext>).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Fail if a supplement names someone missing from the base.
        #[arg(long)]
        strict: bool,

        /// Which supplement wins when several supply a school.
        #[arg(long, value_enum, default_value_t)]
        precedence: PrecedenceArg,
    },

    /// Count students per canonical school.
    Aggregate {
        /// Processed (usually merged) file.
        processed: PathBuf,

        /// Count table output (defaults to <processed>_counts.<ext>).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format: tsv, table, or json.
        #[arg(short, long)]
        format: Option<CountFormat>,

        /// TOML alias file replacing the configured table.
        #[arg(long)]
        aliases: Option<PathBuf>,

        /// Run the spelling cleanup pass before alias lookup.
        #[arg(long)]
        cleanup: bool,

        /// Print the table instead of writing a file.
        #[arg(long)]
        stdout: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "census=info",
        1 => "census=debug",
        _ => "census=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config = resolve_config(cli.config.as_deref())?;

    match cli.command {
        Command::Lookup {
            input,
            output,
            batch_size,
            reasoning_effort,
        } => cmd_lookup(&config, &input, output, batch_size, reasoning_effort).await,
        Command::RetryUnknowns {
            processed,
            output,
            retry_output,
            batch_size,
            reasoning_effort,
        } => {
            let outputs = RetryOutputs {
                merged: output.unwrap_or_else(|| sibling_path(&processed, "merged")),
                retry: retry_output.unwrap_or_else(|| sibling_path(&processed, "unknown_retry")),
            };
            cmd_retry(&config, &processed, &outputs, batch_size, reasoning_effort).await
        }
        Command::Merge {
            base,
            with,
            output,
            strict,
            precedence,
        } => {
            let options = MergeOptions {
                mode: if strict { MergeMode::Strict } else { MergeMode::Open },
                precedence: precedence.into(),
            };
            cmd_merge(&config, &base, &with, output, &options)
        }
        Command::Aggregate {
            processed,
            output,
            format,
            aliases,
            cleanup,
            stdout,
        } => {
            let output = if stdout {
                None
            } else {
                Some(output.unwrap_or_else(|| sibling_path(&processed, "counts")))
            };
            cmd_aggregate(&config, &processed, output, format, aliases.as_deref(), cleanup)
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(&config),
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    Ok(config)
}

/// `<dir>/<stem>_<suffix>.<ext>` next to `input`.
fn sibling_path(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "census".into());
    let ext = input
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    input.with_file_name(format!("{stem}_{suffix}{ext}"))
}

fn record_format(config: &AppConfig) -> RecordFormat {
    RecordFormat::with_sentinel(config.defaults.unknown_sentinel.clone())
}

fn run_config(
    config: &AppConfig,
    batch_size: Option<usize>,
    effort: Option<ReasoningEffort>,
) -> LookupRunConfig {
    LookupRunConfig {
        batch_size: batch_size.unwrap_or(config.defaults.batch_size),
        effort,
        batch_delay: Duration::from_millis(config.lookup.batch_delay_ms),
        format: record_format(config),
    }
}

fn lookup_client(config: &AppConfig) -> Result<OpenAiClient> {
    let api_key = validate_api_key(config)?;
    Ok(OpenAiClient::new(&config.lookup, api_key)?)
}

/// Load a processed file and surface what the parser had to reconcile.
fn load_reporting(path: &Path, format: &RecordFormat) -> Result<ParsedRecords> {
    let parsed = load_records(path, format)?;
    if parsed.duplicates > 0 {
        warn!(
            path = %path.display(),
            duplicates = parsed.duplicates,
            "skipped duplicate entries by name"
        );
    }
    for conflict in &parsed.conflicts {
        warn!(
            path = %path.display(),
            line = conflict.line,
            name = %conflict.name,
            kept = %conflict.kept,
            rejected = %conflict.rejected,
            "conflicting school entries, kept first occurrence"
        );
    }
    Ok(parsed)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_lookup(
    config: &AppConfig,
    input: &Path,
    output: Option<PathBuf>,
    batch_size: Option<usize>,
    effort: Option<ReasoningEffort>,
) -> Result<()> {
    let client = lookup_client(config)?;
    let format = record_format(config);

    let names: Vec<String> = load_reporting(input, &format)?
        .records
        .iter()
        .map(|r| r.name.clone())
        .collect();

    let output = output.unwrap_or_else(|| sibling_path(input, "processed"));
    let run_config = run_config(config, batch_size, effort.or(config.lookup.reasoning_effort));

    info!(
        input = %input.display(),
        output = %output.display(),
        names = names.len(),
        "starting lookup"
    );

    let mut sink = RecordSink::create(&output)?;
    let reporter = CliProgress::new();
    let run = run_lookup(&names, &client, &run_config, &mut sink, &reporter).await?;

    print_summary("Lookup complete", &run.summary, &output);
    Ok(())
}

struct RetryOutputs {
    merged: PathBuf,
    retry: PathBuf,
}

async fn cmd_retry(
    config: &AppConfig,
    processed: &Path,
    outputs: &RetryOutputs,
    batch_size: Option<usize>,
    effort: Option<ReasoningEffort>,
) -> Result<()> {
    let client = lookup_client(config)?;
    let format = record_format(config);
    let base = load_reporting(processed, &format)?.records;

    let effort = effort.unwrap_or(config.lookup.retry_reasoning_effort);
    let run_config = run_config(config, batch_size, Some(effort));

    let mut sink = RecordSink::create(&outputs.retry)?;
    let reporter = CliProgress::new();
    let outcome = retry_unknowns(&base, &client, &run_config, &mut sink, &reporter).await?;

    save_records(&outputs.merged, &outcome.merged.records, &format)?;

    print_summary("Retry complete", &outcome.retry.summary, &outputs.retry);
    println!("  Merged:   {}", outputs.merged.display());
    println!("  Still unknown: {}", outcome.merged.still_unknown);
    println!();
    Ok(())
}

fn cmd_merge(
    config: &AppConfig,
    base_path: &Path,
    supplement_paths: &[PathBuf],
    output: Option<PathBuf>,
    options: &MergeOptions,
) -> Result<()> {
    let format = record_format(config);
    let base = load_reporting(base_path, &format)?.records;

    let supplements = supplement_paths
        .iter()
        .map(|p| load_reporting(p, &format).map(|parsed| parsed.records))
        .collect::<Result<Vec<_>>>()?;

    let outcome = merge(&base, &supplements, options)?;

    let output = output.unwrap_or_else(|| sibling_path(base_path, "merged"));
    save_records(&output, &outcome.records, &format)?;

    println!();
    println!("  Merged {} file(s) into {}", supplement_paths.len(), output.display());
    println!("  Records:       {}", outcome.records.len());
    println!("  Resolved:      {}", outcome.resolved);
    println!("  Appended:      {}", outcome.appended);
    println!("  Still unknown: {}", outcome.still_unknown);
    println!();
    Ok(())
}

fn cmd_aggregate(
    config: &AppConfig,
    processed: &Path,
    output: Option<PathBuf>,
    format: Option<CountFormat>,
    aliases: Option<&Path>,
    cleanup: bool,
) -> Result<()> {
    let records = load_reporting(processed, &record_format(config))?.records;

    let table = match aliases {
        Some(path) => AliasTable::new(load_alias_file(path)?)?,
        None => AliasTable::new(&config.aliases.table)?,
    };
    let cleanup = cleanup || config.aliases.cleanup;
    if table.is_empty() {
        warn!("alias table is empty, counting schools as written");
    } else {
        info!(aliases = table.len(), cleanup, "alias table loaded");
    }
    let normalizer = Normalizer::new(table, cleanup)?;

    let count_format = match format {
        Some(f) => f,
        None => config
            .defaults
            .count_format
            .parse()
            .map_err(|e: String| eyre!("defaults.count_format: {e}"))?,
    };

    let counts = aggregate(&records, &normalizer);

    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .map_err(|e| eyre!("cannot create {}: {e}", parent.display()))?;
            }
            let file = File::create(&path)
                .map_err(|e| eyre!("cannot create {}: {e}", path.display()))?;
            let mut writer = BufWriter::new(file);
            write_counts(&mut writer, &counts, count_format)
                .and_then(|()| writer.flush())
                .map_err(|e| eyre!("failed to write {}: {e}", path.display()))?;
            println!("Wrote counts for {} schools to {}", counts.len(), path.display());
        }
        None => {
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            write_counts(&mut lock, &counts, count_format)?;
        }
    }

    if counts.unresolved() > 0 {
        eprintln!(
            "Unresolved: {} entr{} with missing/unknown school.",
            counts.unresolved(),
            if counts.unresolved() == 1 { "y" } else { "ies" }
        );
    }
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}

fn print_summary(title: &str, summary: &LookupSummary, output: &Path) {
    println!();
    println!("  {title}!");
    println!("  Names:    {}", summary.requested);
    println!("  Batches:  {}", summary.batches);
    println!("  Resolved: {}", summary.resolved);
    println!("  Unknown:  {}", summary.unknown);
    println!("  Failed:   {}", summary.failed);
    println!("  Path:     {}", output.display());
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn batch_started(&self, current: usize, total: usize, size: usize) {
        self.spinner
            .set_message(format!("Batch [{current}/{total}] with {size} names"));
    }

    fn done(&self, _summary: &LookupSummary) {
        self.spinner.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sibling_paths_keep_directory_and_extension() {
        let input = Path::new("data/stanford.txt");
        assert_eq!(
            sibling_path(input, "processed"),
            PathBuf::from("data/stanford_processed.txt")
        );
        assert_eq!(
            sibling_path(Path::new("names"), "merged"),
            PathBuf::from("names_merged")
        );
    }

    #[test]
    fn merge_requires_supplements() {
        assert!(Cli::try_parse_from(["census", "merge", "base.txt"]).is_err());

        let cli =
            Cli::try_parse_from(["census", "merge", "base.txt", "--with", "a.txt", "b.txt"])
                .unwrap();
        match cli.command {
            Command::Merge { with, strict, .. } => {
                assert_eq!(with, [PathBuf::from("a.txt"), PathBuf::from("b.txt")]);
                assert!(!strict);
            }
            _ => panic!("expected merge"),
        }
    }

    #[test]
    fn lookup_flags_parse() {
        let cli = Cli::try_parse_from([
            "census", "lookup", "names.txt", "-n", "5", "-r", "high", "-o", "out.txt",
        ])
        .unwrap();
        match cli.command {
            Command::Lookup {
                batch_size,
                reasoning_effort,
                output,
                ..
            } => {
                assert_eq!(batch_size, Some(5));
                assert_eq!(reasoning_effort, Some(ReasoningEffort::High));
                assert_eq!(output, Some(PathBuf::from("out.txt")));
            }
            _ => panic!("expected lookup"),
        }
    }

    #[test]
    fn invalid_effort_is_rejected() {
        assert!(Cli::try_parse_from(["census", "lookup", "n.txt", "-r", "max"]).is_err());
    }

    #[test]
    fn run_config_falls_back_to_config_values() {
        let mut config = AppConfig::default();
        config.defaults.batch_size = 7;
        config.defaults.unknown_sentinel = "unknown".into();
        let rc = run_config(&config, None, None);
        assert_eq!(rc.batch_size, 7);
        assert_eq!(rc.format.unknown_sentinel, "unknown");
        assert_eq!(run_config(&config, Some(3), None).batch_size, 3);
    }
}
