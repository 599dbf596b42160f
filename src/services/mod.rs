//! Services - decision engine and run orchestration
//!
//! This module contains the core business logic services:
//! - `bucketer` - Deterministic visitor hashing into the bucket space
//! - `allocator` - Traffic allocation from buckets to variations
//! - `visitors` - Seeded synthetic visitor generation
//! - `simulation` - Batch runs and report aggregation
//! - `snapshot` - Config sources and the current experiment snapshot

pub mod allocator;
pub mod bucketer;
pub mod simulation;
pub mod snapshot;
pub mod visitors;

// Re-export commonly used types
pub use allocator::Allocator;
pub use simulation::Simulation;
pub use snapshot::{ConfigSource, FileConfigSource, RefreshOutcome, SnapshotEvent, SnapshotStore};
