//! Application configuration for cohort-census.
//!
//! User config lives at `~/.census/census.toml`.
//! CLI flags override config file values, which override defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{CensusError, Result};
use crate::types::ReasoningEffort;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "census.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".census";

// ---------------------------------------------------------------------------
// Config structs (matching census.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Lookup service settings.
    #[serde(default)]
    pub lookup: LookupConfig,

    /// School alias table and cleanup switch.
    #[serde(default)]
    pub aliases: AliasConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Names sent per lookup call.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Literal written for unresolved schools.
    #[serde(default = "default_unknown_sentinel")]
    pub unknown_sentinel: String,

    /// Count table format: tsv, table, or json.
    #[serde(default = "default_count_format")]
    pub count_format: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            unknown_sentinel: default_unknown_sentinel(),
            count_format: default_count_format(),
        }
    }
}

fn default_batch_size() -> usize {
    10
}
fn default_unknown_sentinel() -> String {
    "UNKNOWN".into()
}
fn default_count_format() -> String {
    "tsv".into()
}

/// `[lookup]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Base URL of the Responses API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model used for lookups.
    #[serde(default = "default_model")]
    pub model: String,

    /// Cohort description inserted into the prompt.
    #[serde(default = "default_cohort")]
    pub cohort: String,

    /// Effort for first-pass lookups. `None` leaves the model default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<ReasoningEffort>,

    /// Effort used when retrying unknowns.
    #[serde(default = "default_retry_effort")]
    pub retry_reasoning_effort: ReasoningEffort,

    /// Also offer the code interpreter tool alongside web search.
    #[serde(default = "default_true")]
    pub code_interpreter: bool,

    /// Per-request timeout. Web-search calls are slow.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Pause between batches to stay under rate limits.
    #[serde(default)]
    pub batch_delay_ms: u64,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            model: default_model(),
            cohort: default_cohort(),
            reasoning_effort: None,
            retry_reasoning_effort: default_retry_effort(),
            code_interpreter: true,
            timeout_secs: default_timeout_secs(),
            batch_delay_ms: 0,
        }
    }
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-5".into()
}
fn default_cohort() -> String {
    "current Stanford CS PhDs".into()
}
fn default_retry_effort() -> ReasoningEffort {
    ReasoningEffort::High
}
fn default_true() -> bool {
    true
}
fn default_timeout_secs() -> u64 {
    600
}

/// `[aliases]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AliasConfig {
    /// Run the spelling cleanup pass before the table lookup.
    #[serde(default)]
    pub cleanup: bool,

    /// Raw variant → canonical name.
    #[serde(default = "default_alias_table")]
    pub table: BTreeMap<String, String>,
}

impl Default for AliasConfig {
    fn default() -> Self {
        Self {
            cleanup: false,
            table: default_alias_table(),
        }
    }
}

/// Common shortcuts seen in lookup answers.
fn default_alias_table() -> BTreeMap<String, String> {
    const MIT: &str = "Massachusetts Institute of Technology";
    const BERKELEY: &str = "University of California, Berkeley";
    const SAN_DIEGO: &str = "University of California, San Diego";
    const BITS: &str = "Birla Institute of Technology and Science";
    const EPFL: &str = "Ecole Polytechnique Federale de Lausanne";

    [
        ("MIT", MIT),
        ("Caltech", "California Institute of Technology"),
        ("CMU", "Carnegie Mellon University"),
        ("Georgia Tech", "Georgia Institute of Technology"),
        ("UW", "University of Washington"),
        ("UChicago", "University of Chicago"),
        ("UC Berkeley", BERKELEY),
        ("UCB", BERKELEY),
        ("University of California Berkeley", BERKELEY),
        ("UCSD", SAN_DIEGO),
        ("UC San Diego", SAN_DIEGO),
        ("University of California San Diego", SAN_DIEGO),
        ("UCLA", "University of California, Los Angeles"),
        ("UC Davis", "University of California, Davis"),
        ("UCI", "University of California, Irvine"),
        ("UCSB", "University of California, Santa Barbara"),
        ("SJTU", "Shanghai Jiao Tong University"),
        ("USTC", "University of Science and Technology of China"),
        ("BITS Pilani", BITS),
        ("BIT Pilani", BITS),
        ("POSTECH", "Pohang University of Science and Technology"),
        ("EPFL", EPFL),
        ("École Polytechnique Fédérale de Lausanne", EPFL),
        ("Harvard College", "Harvard University"),
        (
            "University of Illinois at Urbana-Champaign",
            "University of Illinois Urbana-Champaign",
        ),
        ("University of Sao Paulo", "University of São Paulo"),
    ]
    .into_iter()
    .map(|(raw, canonical)| (raw.to_string(), canonical.to_string()))
    .collect()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.census/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| CensusError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.census/census.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| CensusError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content)
        .map_err(|e| CensusError::config(format!("failed to parse {}: {e}", path.display())))?;
    validate_config(&config)?;
    Ok(config)
}

/// Load a standalone alias file: a TOML table of `"raw" = "canonical"` pairs.
pub fn load_alias_file(path: &Path) -> Result<BTreeMap<String, String>> {
    let content = std::fs::read_to_string(path).map_err(|e| CensusError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| CensusError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| CensusError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| CensusError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| CensusError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Reject values no run could work with.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    if config.defaults.batch_size == 0 {
        return Err(CensusError::config("defaults.batch_size must be at least 1"));
    }
    if config.defaults.unknown_sentinel.trim().is_empty() {
        return Err(CensusError::config("defaults.unknown_sentinel must not be empty"));
    }
    if config.defaults.unknown_sentinel.contains('|') {
        return Err(CensusError::config(
            "defaults.unknown_sentinel must not contain the field delimiter '|'",
        ));
    }
    Url::parse(&config.lookup.base_url).map_err(|e| {
        CensusError::config(format!("invalid lookup.base_url '{}': {e}", config.lookup.base_url))
    })?;
    Ok(())
}

/// Check that the lookup API key env var is set and non-empty, returning it.
pub fn validate_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.lookup.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(CensusError::config(format!(
            "lookup API key not found. Set the {var_name} environment variable."
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("batch_size"));
        assert!(toml_str.contains("OPENAI_API_KEY"));
        assert!(toml_str.contains("Carnegie Mellon University"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.defaults.batch_size, 10);
        assert_eq!(parsed.lookup.retry_reasoning_effort, ReasoningEffort::High);
        assert_eq!(parsed.aliases.table.len(), config.aliases.table.len());
    }

    #[test]
    fn config_with_custom_aliases() {
        let toml_str = r#"
[defaults]
batch_size = 5

[lookup]
cohort = "current CMU PhDs"
reasoning_effort = "low"

[aliases]
cleanup = true

[aliases.table]
"Carnegie Mellon University" = "CMU"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        validate_config(&config).expect("valid");
        assert_eq!(config.defaults.batch_size, 5);
        assert_eq!(config.defaults.unknown_sentinel, "UNKNOWN");
        assert_eq!(config.lookup.reasoning_effort, Some(ReasoningEffort::Low));
        assert!(config.aliases.cleanup);
        assert_eq!(config.aliases.table.len(), 1);
        assert_eq!(config.aliases.table["Carnegie Mellon University"], "CMU");
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let mut config = AppConfig::default();
        config.defaults.batch_size = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn bad_base_url_is_rejected() {
        let mut config = AppConfig::default();
        config.lookup.base_url = "not a url".into();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn api_key_validation() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.lookup.api_key_env = "CENSUS_TEST_NONEXISTENT_KEY_12345".into();
        let result = validate_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }
}
