//! Configuration loading, validation, and env substitution.
//!
//! Config files: `parley.toml`, `parley.yaml`, or `parley.json`
//! Searched in `./` then `~/.config/parley/`.
//!
//! `${ENV_VAR}` and `${ENV_VAR:-fallback}` are expanded before parsing.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{Format, config_dir, discover_and_load, find_or_default_config_path, load_config},
    schema::{
        ChannelConfig, FileStoreConfig, MemoryStoreConfig, ParleyConfig, ServerConfig,
        SessionConfig, SessionDriver, TimerConfig, TimerMode,
    },
    validate::{Diagnostic, Severity, ValidationResult},
};
