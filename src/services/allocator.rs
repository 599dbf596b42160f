//! Traffic allocation - maps a bucket value to a variation
//!
//! Variations own consecutive half-open slices `[lower, upper)` of the bucket
//! space in declaration order. Buckets past the last slice are not enrolled.

use crate::domain::types::{Decision, ExperimentConfig, Variation, VisitorId};
use crate::error::Result;
use crate::services::bucketer;
use tracing::debug;

/// A variation together with the exclusive upper bound of its slice
#[derive(Debug, Clone)]
struct Slice {
    variation: Variation,
    upper: u32,
}

/// Resolver for one validated experiment snapshot
#[derive(Debug, Clone)]
pub struct Allocator {
    flag_key: String,
    revision: String,
    slices: Vec<Slice>,
    allocated: u32,
}

impl Allocator {
    /// Validate the experiment and precompute cumulative bounds
    pub fn new(config: &ExperimentConfig) -> Result<Self> {
        config.validate()?;

        let mut upper = 0u32;
        let mut slices = Vec::with_capacity(config.variations.len());
        for variation in &config.variations {
            let span = variation.bucket_span();
            if span == 0 {
                continue;
            }
            upper += span;
            slices.push(Slice { variation: variation.clone(), upper });
        }

        Ok(Self {
            flag_key: config.key.clone(),
            revision: config.revision.clone(),
            slices,
            allocated: upper,
        })
    }

    pub fn flag_key(&self) -> &str {
        &self.flag_key
    }

    pub fn revision(&self) -> &str {
        &self.revision
    }

    /// Buckets covered by some variation; the rest are not enrolled
    pub fn allocated_buckets(&self) -> u32 {
        self.allocated
    }

    /// Resolve a bucket value into a decision
    pub fn resolve(&self, bucket_value: u32) -> Decision {
        self.slices
            .iter()
            .find(|slice| bucket_value < slice.upper)
            .map(|slice| Decision::enrolled(&slice.variation, bucket_value))
            .unwrap_or_else(|| Decision::not_enrolled(bucket_value))
    }

    /// Bucket a visitor for this flag and resolve the result
    pub fn decide(&self, visitor_id: &VisitorId) -> Result<Decision> {
        let bucket_value = bucketer::bucket(visitor_id, &self.flag_key)?;
        let decision = self.resolve(bucket_value);

        debug!(
            flag = %self.flag_key,
            visitor_id = %visitor_id,
            bucket = %bucket_value,
            variation = ?decision.variation_name,
            enabled = %decision.enabled,
            "visitor_bucketed"
        );

        Ok(decision)
    }
}
