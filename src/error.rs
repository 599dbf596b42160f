//! Error types for the decision engine
//!
//! Library code returns `SorterError`; the binary wraps it with `anyhow`
//! context at the process boundary.

use thiserror::Error;

/// Result type alias for decision engine operations
pub type Result<T> = std::result::Result<T, SorterError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SorterError {
    /// Visitor identifier rejected by the bucketer
    #[error("invalid visitor id for '{salt}': {reason}")]
    InvalidInput { salt: String, reason: String },

    /// Experiment configuration cannot be used for allocation
    #[error("invalid configuration for flag '{flag}'{}: {reason}", variation_suffix(.variation))]
    Configuration { flag: String, variation: Option<String>, reason: String },

    /// Config source could not supply a snapshot and none was cached
    #[error("config source '{source_name}' unavailable: {reason}")]
    CollaboratorUnavailable { source_name: String, reason: String },
}

fn variation_suffix(variation: &Option<String>) -> String {
    match variation {
        Some(name) => format!(" (variation '{}')", name),
        None => String::new(),
    }
}

impl SorterError {
    pub fn configuration(flag: &str, variation: Option<&str>, reason: impl Into<String>) -> Self {
        Self::Configuration {
            flag: flag.to_string(),
            variation: variation.map(str::to_string),
            reason: reason.into(),
        }
    }

    /// Whether this error means the config itself is unusable
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }
}
