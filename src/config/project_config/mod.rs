//! Project-level configuration support
//!
//! Loads per-plan configuration from `screwqc.toml` or `.screwqcrc.json`
//! in the directory holding the plan file.
//!
//! # Configuration Format
//!
//! ```toml
//! # screwqc.toml
//!
//! [checks.barrel-type]
//! enabled = false
//!
//! [settings]
//! osteotomy_extension = 1.5
//! obstacle_warning = 0.5
//! obstacle_minor = 1.0
//!
//! [[thresholds]]
//! brand = "synthes"
//! implant_type = "lefort"
//! min_distance = 4.0
//!
//! [screw_diameters]
//! "matrix-midface-1.5" = 1.5
//!
//! [defaults]
//! format = "html"
//! workers = 4
//! fail_on = "warning"
//! ```

use crate::checks::CheckSettings;
use crate::models::CheckKind;
use crate::thresholds::{ThresholdOverride, ThresholdTable};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

/// Preferred config file name
pub const CONFIG_FILE_NAME: &str = "screwqc.toml";

const JSON_CONFIG_FILE_NAME: &str = ".screwqcrc.json";

/// Project-level configuration loaded from screwqc.toml or .screwqcrc.json
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ProjectConfig {
    /// Per-check configuration overrides
    #[serde(default)]
    pub checks: HashMap<String, CheckConfigOverride>,

    /// Tunable values of the built-in checks
    #[serde(default)]
    pub settings: CheckSettings,

    /// Replacement rows for the built-in threshold table
    #[serde(default)]
    pub thresholds: Vec<ThresholdOverride>,

    /// Extra or replacement screw type diameters (mm)
    #[serde(default)]
    pub screw_diameters: HashMap<String, f64>,

    /// Default CLI flags
    #[serde(default)]
    pub defaults: CliDefaults,
}

/// Configuration override for a specific check
#[derive(Debug, Clone, Deserialize, Default)]
pub struct CheckConfigOverride {
    /// Whether the check runs (default: true)
    #[serde(default)]
    pub enabled: Option<bool>,
}

/// Default CLI flags that can be set in project config
#[derive(Debug, Clone, Deserialize, Default)]
pub struct CliDefaults {
    /// Default output format (text, json, html)
    #[serde(default)]
    pub format: Option<String>,

    /// Default number of workers
    #[serde(default)]
    pub workers: Option<usize>,

    /// Skip checks by default
    #[serde(default)]
    pub skip_checks: Vec<String>,

    /// Fail-on status threshold for CI
    #[serde(default)]
    pub fail_on: Option<String>,

    /// Keep a persistent result cache next to the plan
    #[serde(default)]
    pub cache: Option<bool>,
}

/// Load project configuration from `dir`.
///
/// Searches for configuration files in this order:
/// 1. `screwqc.toml`
/// 2. `.screwqcrc.json`
///
/// Returns default configuration if no config file is found.
pub fn load_project_config(dir: &Path) -> ProjectConfig {
    let toml_path = dir.join(CONFIG_FILE_NAME);
    if toml_path.exists() {
        match load_toml_config(&toml_path) {
            Ok(config) => {
                debug!("Loaded project config from {}", toml_path.display());
                return config;
            }
            Err(e) => {
                warn!("Failed to load {}: {}", toml_path.display(), e);
            }
        }
    }

    let json_path = dir.join(JSON_CONFIG_FILE_NAME);
    if json_path.exists() {
        match load_json_config(&json_path) {
            Ok(config) => {
                debug!("Loaded project config from {}", json_path.display());
                return config;
            }
            Err(e) => {
                warn!("Failed to load {}: {}", json_path.display(), e);
            }
        }
    }

    debug!("No project config found, using defaults");
    ProjectConfig::default()
}

fn load_toml_config(path: &Path) -> anyhow::Result<ProjectConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: ProjectConfig = toml::from_str(&content)?;
    Ok(config)
}

fn load_json_config(path: &Path) -> anyhow::Result<ProjectConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: ProjectConfig = serde_json::from_str(&content)?;
    Ok(config)
}

impl ProjectConfig {
    /// Check if a check is enabled (defaults to true if not specified)
    pub fn is_check_enabled(&self, kind: CheckKind) -> bool {
        let explicit = self
            .checks
            .iter()
            .find(|(name, _)| normalize_check_name(name) == kind.name())
            .and_then(|(_, c)| c.enabled);
        if explicit == Some(false) {
            return false;
        }
        !self
            .defaults
            .skip_checks
            .iter()
            .any(|name| normalize_check_name(name) == kind.name())
    }

    /// Enabled checks, in report column order
    pub fn enabled_checks(&self) -> Vec<CheckKind> {
        CheckKind::ALL
            .iter()
            .copied()
            .filter(|k| self.is_check_enabled(*k))
            .collect()
    }

    /// Configured names that match no known check
    pub fn unknown_checks(&self) -> Vec<String> {
        self.checks
            .keys()
            .chain(self.defaults.skip_checks.iter())
            .filter(|name| normalize_check_name(name).parse::<CheckKind>().is_err())
            .cloned()
            .collect()
    }

    /// Built-in thresholds with this config's overrides applied
    pub fn threshold_table(&self) -> anyhow::Result<ThresholdTable> {
        ThresholdTable::builtin().with_overrides(&self.thresholds, &self.screw_diameters)
    }

    /// Check settings, validated
    pub fn check_settings(&self) -> anyhow::Result<CheckSettings> {
        self.settings.validate()?;
        Ok(self.settings.clone())
    }
}

/// Normalize check name for config lookup
/// Converts various formats to kebab-case for matching
pub fn normalize_check_name(name: &str) -> String {
    // MinMaxDistanceChecker -> min-max-distance
    // barrel_type -> barrel-type

    let mut result = String::new();
    let chars: Vec<char> = name.trim().chars().collect();

    for (i, c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev_is_lower = i > 0 && chars[i - 1].is_lowercase();
            let is_acronym_end = i > 0
                && chars[i - 1].is_uppercase()
                && i + 1 < chars.len()
                && chars[i + 1].is_lowercase();

            if prev_is_lower || is_acronym_end {
                result.push('-');
            }
            result.extend(c.to_lowercase());
        } else if *c == '_' || *c == ' ' {
            result.push('-');
        } else {
            result.push(*c);
        }
    }

    result
        .trim_end_matches("-checker")
        .trim_end_matches("-check")
        .to_string()
}
