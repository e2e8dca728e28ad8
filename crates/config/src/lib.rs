//! Configuration loading, env substitution, legacy env overrides, and
//! validation.
//!
//! Config files: `aggrechans.toml`, `aggrechans.yaml`, or `aggrechans.json`,
//! searched in `./` then `~/.config/aggrechans/`.
//!
//! Supports `${ENV_VAR}` and `${ENV_VAR:-default}` substitution in the raw
//! file, and the legacy deployment variables (`SLACK_BOT_TOKEN`,
//! `AGGREGATE_CHANNEL_ID`, `DISPATCH_CHANNEL`, ...) on top of it.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{apply_env_overrides, config_dir, find_config_file, load_config, load_or_discover},
    schema::{
        AggrechansConfig, DispatchDocument, RelayConfig, RetryConfig, RuleRecord, ServerConfig,
        SlackConfig, StoreConfig, Transport,
    },
    validate::{Diagnostic, Severity, ValidationResult, validate_config, validate_toml_str},
};
