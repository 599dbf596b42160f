//! Typed channel for decision audit records
//!
//! Provides a non-blocking way to hand decisions to the audit writer.
//! Uses a bounded mpsc channel to prevent unbounded memory growth.

use crate::domain::types::{Decision, VisitorId};
use crate::services::allocator::Allocator;
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Generate a new run ID (UUIDv7, time-sortable)
pub fn new_run_id() -> String {
    Uuid::now_v7().to_string()
}

/// Get current epoch milliseconds
#[inline]
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// One visitor decision, as written to the audit log
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    /// Run this decision belongs to
    pub run_id: String,
    /// Timestamp (epoch ms)
    pub ts: u64,
    /// Flag key
    pub flag: String,
    /// Datafile revision the decision was made against
    pub revision: String,
    /// Position in the batch (generation order)
    pub index: usize,
    pub visitor_id: String,
    pub bucket: u32,
    pub enrolled: bool,
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variation: Option<String>,
    /// Text the visitor saw
    pub text: String,
}

impl AuditRecord {
    pub fn new(
        run_id: &str,
        allocator: &Allocator,
        index: usize,
        visitor_id: &VisitorId,
        decision: &Decision,
        text: &str,
    ) -> Self {
        Self {
            run_id: run_id.to_string(),
            ts: epoch_ms(),
            flag: allocator.flag_key().to_string(),
            revision: allocator.revision().to_string(),
            index,
            visitor_id: visitor_id.to_string(),
            bucket: decision.bucket_value,
            enrolled: decision.enrolled,
            enabled: decision.enabled,
            variation: decision.variation_name.clone(),
            text: text.to_string(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Sender handle for audit records
///
/// Clone this to share across multiple producers.
/// Non-blocking - if the channel is full, records are dropped.
#[derive(Clone)]
pub struct AuditSender {
    tx: mpsc::Sender<AuditRecord>,
}

impl AuditSender {
    pub fn new(tx: mpsc::Sender<AuditRecord>) -> Self {
        Self { tx }
    }

    /// Offer a decision to the audit writer
    /// Returns false if the record was dropped (channel full or closed)
    pub fn send_decision(&self, record: AuditRecord) -> bool {
        self.tx.try_send(record).is_ok()
    }
}

/// Create a new audit channel pair
///
/// Returns (sender, receiver) where sender can be cloned and shared.
/// Buffer size determines how many records can be queued (at least one).
pub fn create_audit_channel(buffer_size: usize) -> (AuditSender, mpsc::Receiver<AuditRecord>) {
    let (tx, rx) = mpsc::channel(buffer_size.max(1));
    (AuditSender::new(tx), rx)
}
