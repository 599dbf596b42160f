//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `audit_channel` - Typed channel for decision audit records
//! - `audit` - Audit output to file (JSONL format)
//! - `datafile_watcher` - Polls the experiment datafile for changes

pub mod audit;
pub mod audit_channel;
pub mod datafile_watcher;

// Re-export commonly used types
pub use audit::AuditWriter;
pub use audit_channel::{create_audit_channel, AuditRecord, AuditSender};
pub use datafile_watcher::DatafileWatcher;
