//! Shared types, error model, and configuration for cohort-census.
//!
//! This crate is the foundation depended on by all other census crates.
//! It provides:
//! - [`CensusError`]: the unified error type
//! - Domain types ([`School`], [`NameRecord`], [`RecordSet`], [`ReasoningEffort`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AliasConfig, AppConfig, DefaultsConfig, LookupConfig, config_dir, config_file_path,
    init_config, load_alias_file, load_config, load_config_from, validate_api_key,
    validate_config,
};
pub use error::{CensusError, Result};
pub use types::{InsertOutcome, NameRecord, ReasoningEffort, RecordSet, School};
