//! Configuration module for screw-qc
//!
//! This module handles:
//! - Project-level configuration (screwqc.toml)
//! - Per-check enable flags and check settings
//! - Threshold table overrides
//! - CLI defaults

mod project_config;

pub use project_config::{
    load_project_config, normalize_check_name, CheckConfigOverride, CliDefaults, ProjectConfig,
    CONFIG_FILE_NAME,
};
