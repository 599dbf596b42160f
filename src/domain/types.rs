//! Shared types for the decision engine

use crate::error::{Result, SorterError};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Size of the bucket space visitors are hashed into
pub const BUCKET_RANGE: u32 = 10_000;

/// Bucket slots per percent of traffic
const BUCKETS_PER_PERCENT: f64 = BUCKET_RANGE as f64 / 100.0;

/// Slack for float error when summing declared percentages
const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

/// Newtype wrapper for visitor IDs to provide type safety
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VisitorId(String);

impl VisitorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for VisitorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn default_feature_enabled() -> bool {
    true
}

/// One arm of an experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variation {
    pub name: String,
    /// Traffic share in percent (0-100, two decimals of precision)
    pub weight: f64,
    /// False for an explicit "off" arm: enrolled, but the feature stays disabled
    #[serde(default = "default_feature_enabled")]
    pub feature_enabled: bool,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

impl Variation {
    pub fn new(name: &str, weight: f64) -> Self {
        Self {
            name: name.to_string(),
            weight,
            feature_enabled: true,
            variables: BTreeMap::new(),
        }
    }

    pub fn with_variable(mut self, name: &str, value: &str) -> Self {
        self.variables.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_feature_disabled(mut self) -> Self {
        self.feature_enabled = false;
        self
    }

    /// Width of this variation's slice of the bucket space
    #[inline]
    pub fn bucket_span(&self) -> u32 {
        (self.weight * BUCKETS_PER_PERCENT).round() as u32
    }
}

/// Static description of one flag/experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Flag key, also used as the bucketing salt
    pub key: String,
    #[serde(default)]
    pub revision: String,
    pub variations: Vec<Variation>,
}

impl ExperimentConfig {
    pub fn new(key: &str) -> Self {
        Self { key: key.to_string(), revision: String::new(), variations: Vec::new() }
    }

    pub fn with_revision(mut self, revision: &str) -> Self {
        self.revision = revision.to_string();
        self
    }

    pub fn with_variation(mut self, variation: Variation) -> Self {
        self.variations.push(variation);
        self
    }

    /// Total allocated share of the bucket space
    pub fn allocated_buckets(&self) -> u32 {
        self.variations.iter().map(Variation::bucket_span).sum()
    }

    /// Check weights and names before any bucketing happens
    pub fn validate(&self) -> Result<()> {
        if self.key.trim().is_empty() {
            return Err(SorterError::configuration(&self.key, None, "flag key is empty"));
        }

        let mut seen = FxHashSet::default();
        let mut declared = 0.0_f64;
        let mut allocated: u64 = 0;

        for variation in &self.variations {
            let name = variation.name.as_str();
            if name.trim().is_empty() {
                return Err(SorterError::configuration(
                    &self.key,
                    Some(name),
                    "variation name is empty",
                ));
            }
            if !seen.insert(name) {
                return Err(SorterError::configuration(
                    &self.key,
                    Some(name),
                    "duplicate variation name",
                ));
            }
            if !variation.weight.is_finite() {
                return Err(SorterError::configuration(
                    &self.key,
                    Some(name),
                    format!("weight {} is not a number", variation.weight),
                ));
            }
            if variation.weight < 0.0 {
                return Err(SorterError::configuration(
                    &self.key,
                    Some(name),
                    format!("negative weight {}", variation.weight),
                ));
            }
            if variation.weight > 100.0 {
                return Err(SorterError::configuration(
                    &self.key,
                    Some(name),
                    format!("weight {} exceeds 100%", variation.weight),
                ));
            }
            declared += variation.weight;
            allocated += u64::from(variation.bucket_span());
        }

        if declared > 100.0 + WEIGHT_SUM_TOLERANCE {
            return Err(SorterError::configuration(
                &self.key,
                None,
                format!("weights sum to {}%", declared),
            ));
        }

        // Rounding to basis points can still push a 100% total over the range
        if allocated > u64::from(BUCKET_RANGE) {
            return Err(SorterError::configuration(
                &self.key,
                None,
                format!("weights sum to {}%", allocated as f64 / BUCKETS_PER_PERCENT),
            ));
        }

        Ok(())
    }
}

/// Resolved outcome for one visitor against one experiment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub enrolled: bool,
    /// Enrolled into a variation that turns the feature on
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variation_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<BTreeMap<String, String>>,
    pub bucket_value: u32,
}

impl Decision {
    pub fn not_enrolled(bucket_value: u32) -> Self {
        Self {
            enrolled: false,
            enabled: false,
            variation_name: None,
            variables: None,
            bucket_value,
        }
    }

    pub fn enrolled(variation: &Variation, bucket_value: u32) -> Self {
        Self {
            enrolled: true,
            enabled: variation.feature_enabled,
            variation_name: Some(variation.name.clone()),
            variables: Some(variation.variables.clone()),
            bucket_value,
        }
    }

    pub fn variable(&self, name: &str) -> Option<&str> {
        self.variables.as_ref()?.get(name).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_weights(weights: &[f64]) -> ExperimentConfig {
        weights.iter().enumerate().fold(ExperimentConfig::new("product_sort"), |cfg, (i, w)| {
            cfg.with_variation(Variation::new(&format!("v{}", i), *w))
        })
    }

    #[test]
    fn test_bucket_span_uses_two_decimals() {
        assert_eq!(Variation::new("a", 50.0).bucket_span(), 5000);
        assert_eq!(Variation::new("a", 33.33).bucket_span(), 3333);
        assert_eq!(Variation::new("a", 0.0).bucket_span(), 0);
    }

    #[test]
    fn test_validate_accepts_full_allocation() {
        assert!(config_with_weights(&[33.33, 33.33, 33.34]).validate().is_ok());
        assert!(config_with_weights(&[]).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_over_allocation() {
        let err = config_with_weights(&[100.0, 50.0]).validate().unwrap_err();
        assert_eq!(err, SorterError::configuration("product_sort", None, "weights sum to 150%"));
    }

    #[test]
    fn test_validate_rejects_sub_basis_point_over_allocation() {
        // Each rounds to 5000 buckets, but the declared total is 100.008%
        let err = config_with_weights(&[50.004, 50.004]).validate().unwrap_err();
        assert!(err.is_configuration());

        // Declared total is exactly 100%, but the rounded spans need 10001 buckets
        let err = config_with_weights(&[33.335, 33.335, 33.33]).validate().unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_validate_rejects_negative_weight() {
        let err = config_with_weights(&[50.0, -5.0]).validate().unwrap_err();
        assert!(matches!(
            err,
            SorterError::Configuration { variation: Some(ref v), .. } if v == "v1"
        ));
    }

    #[test]
    fn test_validate_rejects_nan_and_duplicates() {
        assert!(config_with_weights(&[f64::NAN]).validate().is_err());

        let dup = ExperimentConfig::new("product_sort")
            .with_variation(Variation::new("a", 10.0))
            .with_variation(Variation::new("a", 10.0));
        assert!(dup.validate().unwrap_err().is_configuration());
    }

    #[test]
    fn test_validate_rejects_empty_key() {
        let cfg = ExperimentConfig::new(" ").with_variation(Variation::new("a", 10.0));
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_decision_variable_lookup() {
        let variation = Variation::new("price", 50.0).with_variable("sort_method", "sort_by_price");
        let decision = Decision::enrolled(&variation, 42);
        assert!(decision.enrolled && decision.enabled);
        assert_eq!(decision.variable("sort_method"), Some("sort_by_price"));
        assert_eq!(decision.variable("missing"), None);

        let off = Decision::not_enrolled(9000);
        assert_eq!(off.variable("sort_method"), None);
        assert!(!off.enabled);
    }
}
