//! Domain models - core experiment types and reports
//!
//! This module contains the canonical data types used throughout the system:
//! - `ExperimentConfig` / `Variation` - one flag and its traffic split
//! - `Decision` - resolved outcome for one visitor
//! - `Datafile` - JSON document the experiment snapshot is read from
//! - `AggregateReport` - tallied batch outcome and console rendering

pub mod datafile;
pub mod report;
pub mod types;

// Re-export commonly used types at module level
pub use datafile::Datafile;
pub use report::{AggregateReport, Experience};
pub use types::{Decision, ExperimentConfig, Variation, VisitorId, BUCKET_RANGE};
