//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use anyhow::{ensure, Context};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use tracing::warn;

/// Default text shown to visitors who don't get the feature
pub const DEFAULT_OFF_TEXT: &str =
    "Flag off. User saw the product list sorted alphabetically by default.";

#[derive(Debug, Clone, Deserialize)]
pub struct ExperimentSection {
    /// Flag key looked up in the datafile
    #[serde(default = "default_flag_key")]
    pub flag_key: String,
    /// Variation variable printed for enabled visitors
    #[serde(default = "default_variable")]
    pub variable: String,
    #[serde(default = "default_off_text")]
    pub off_text: String,
}

impl Default for ExperimentSection {
    fn default() -> Self {
        Self { flag_key: default_flag_key(), variable: default_variable(), off_text: default_off_text() }
    }
}

fn default_flag_key() -> String {
    "product_sort".to_string()
}

fn default_variable() -> String {
    "sort_method".to_string()
}

fn default_off_text() -> String {
    DEFAULT_OFF_TEXT.to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatafileSection {
    #[serde(default = "default_datafile_path")]
    pub path: String,
    /// Re-run the batch whenever the datafile changes
    #[serde(default)]
    pub auto_update: bool,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for DatafileSection {
    fn default() -> Self {
        Self {
            path: default_datafile_path(),
            auto_update: false,
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_datafile_path() -> String {
    "datafiles/product_sort.json".to_string()
}

fn default_poll_interval_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulationSection {
    #[serde(default = "default_visitors")]
    pub visitors: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for SimulationSection {
    fn default() -> Self {
        Self { visitors: default_visitors(), seed: default_seed() }
    }
}

fn default_visitors() -> usize {
    50
}

fn default_seed() -> u64 {
    20_240_611
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuditSection {
    #[serde(default)]
    pub enabled: bool,
    /// File path for decision audit (JSONL format)
    #[serde(default = "default_audit_file")]
    pub file: String,
    #[serde(default = "default_audit_buffer_size")]
    pub buffer_size: usize,
}

impl Default for AuditSection {
    fn default() -> Self {
        Self { enabled: false, file: default_audit_file(), buffer_size: default_audit_buffer_size() }
    }
}

fn default_audit_file() -> String {
    "decisions.jsonl".to_string()
}

fn default_audit_buffer_size() -> usize {
    1024
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub experiment: ExperimentSection,
    #[serde(default)]
    pub datafile: DatafileSection,
    #[serde(default)]
    pub simulation: SimulationSection,
    #[serde(default)]
    pub audit: AuditSection,
}

impl TomlConfig {
    /// Reject values the runtime cannot work with (zero-sized channels and timers)
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(!self.experiment.flag_key.trim().is_empty(), "experiment.flag_key must not be empty");
        ensure!(self.datafile.poll_interval_ms > 0, "datafile.poll_interval_ms must be greater than 0");
        ensure!(self.audit.buffer_size > 0, "audit.buffer_size must be greater than 0");
        Ok(())
    }
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    flag_key: String,
    experiment_variable: String,
    off_text: String,
    datafile_path: String,
    auto_update: bool,
    poll_interval_ms: u64,
    visitors: usize,
    seed: u64,
    audit_enabled: bool,
    audit_file: String,
    audit_buffer_size: usize,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        Self {
            flag_key: toml_config.experiment.flag_key,
            experiment_variable: toml_config.experiment.variable,
            off_text: toml_config.experiment.off_text,
            datafile_path: toml_config.datafile.path,
            auto_update: toml_config.datafile.auto_update,
            poll_interval_ms: toml_config.datafile.poll_interval_ms,
            visitors: toml_config.simulation.visitors,
            seed: toml_config.simulation.seed,
            audit_enabled: toml_config.audit.enabled,
            audit_file: toml_config.audit.file,
            audit_buffer_size: toml_config.audit.buffer_size,
            config_file,
        }
    }

    /// Determine config file path from the CLI value or environment
    pub fn resolve_config_path(cli_path: Option<&str>) -> String {
        if let Some(path) = cli_path {
            return path.to_string();
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        toml_config
            .validate()
            .with_context(|| format!("Invalid config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, path.display().to_string()))
    }

    /// Load configuration - falls back to defaults only when the file is missing.
    /// A file that exists but does not parse or validate is an error.
    pub fn load_from_path(path: &str) -> anyhow::Result<Self> {
        if !Path::new(path).exists() {
            warn!(config_file = %path, "config_file_missing_using_defaults");
            return Ok(Self::default());
        }
        Self::from_file(path)
    }

    /// Apply command line overrides
    pub fn with_overrides(mut self, visitors: Option<usize>, seed: Option<u64>, watch: bool) -> Self {
        if let Some(visitors) = visitors {
            self.visitors = visitors;
        }
        if let Some(seed) = seed {
            self.seed = seed;
        }
        self.auto_update |= watch;
        self
    }

    // Getters for all config fields
    pub fn flag_key(&self) -> &str {
        &self.flag_key
    }

    pub fn experiment_variable(&self) -> &str {
        &self.experiment_variable
    }

    pub fn off_text(&self) -> &str {
        &self.off_text
    }

    pub fn datafile_path(&self) -> &str {
        &self.datafile_path
    }

    pub fn auto_update(&self) -> bool {
        self.auto_update
    }

    pub fn poll_interval_ms(&self) -> u64 {
        self.poll_interval_ms
    }

    pub fn visitors(&self) -> usize {
        self.visitors
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn audit_enabled(&self) -> bool {
        self.audit_enabled
    }

    pub fn audit_file(&self) -> &str {
        &self.audit_file
    }

    pub fn audit_buffer_size(&self) -> usize {
        self.audit_buffer_size
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to set the off text
    #[cfg(test)]
    pub fn with_off_text(mut self, off_text: &str) -> Self {
        self.off_text = off_text.to_string();
        self
    }
}
