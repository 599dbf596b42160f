//! Decision audit writer - appends audit records to a JSONL file
//!
//! Drains the audit channel until it closes or shutdown is signalled,
//! writing one JSON object per line.

use crate::io::audit_channel::AuditRecord;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

pub struct AuditWriter {
    file_path: String,
}

impl AuditWriter {
    pub fn new(file_path: &str) -> Self {
        info!(file_path = %file_path, "audit_writer_initialized");
        Self { file_path: file_path.to_string() }
    }

    /// Write a record to the audit file
    /// Returns true if successful, false otherwise
    pub fn write_record(&self, record: &AuditRecord) -> bool {
        match self.append_line(&record.to_json()) {
            Ok(()) => true,
            Err(e) => {
                error!(
                    run_id = %record.run_id,
                    visitor_id = %record.visitor_id,
                    error = %e,
                    "audit_write_failed"
                );
                false
            }
        }
    }

    /// Append a line to the audit file
    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let path = Path::new(&self.file_path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", line)?;
        debug!(file = %self.file_path, bytes = %line.len(), "audit_written");

        Ok(())
    }

    /// Consume records until the channel closes or shutdown is signalled.
    /// Records already queued at shutdown are still written.
    /// Returns the number of records written.
    pub async fn run(
        self,
        mut rx: mpsc::Receiver<AuditRecord>,
        mut shutdown: watch::Receiver<bool>,
    ) -> usize {
        let mut written = 0;

        loop {
            tokio::select! {
                record = rx.recv() => {
                    match record {
                        Some(r) => {
                            if self.write_record(&r) {
                                written += 1;
                            }
                        }
                        None => break, // All senders dropped
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        while let Ok(r) = rx.try_recv() {
                            if self.write_record(&r) {
                                written += 1;
                            }
                        }
                        break;
                    }
                }
            }
        }

        info!(records = %written, "audit_writer_stopped");
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{ExperimentConfig, Variation, VisitorId};
    use crate::io::audit_channel::create_audit_channel;
    use crate::services::allocator::Allocator;
    use std::fs;
    use tempfile::tempdir;

    fn record(index: usize) -> AuditRecord {
        let config = ExperimentConfig::new("product_sort").with_variation(Variation::new("price", 50.0));
        let allocator = Allocator::new(&config).unwrap();
        let decision = allocator.resolve(7000);
        AuditRecord::new("run-7", &allocator, index, &VisitorId::new("123456"), &decision, "alphabetical")
    }

    #[test]
    fn test_write_record_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("audit").join("decisions.jsonl");
        let writer = AuditWriter::new(file_path.to_str().unwrap());

        assert!(writer.write_record(&record(0)));
        assert!(writer.write_record(&record(1)));

        let content = fs::read_to_string(&file_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed["index"], 1);
        assert_eq!(parsed["enrolled"], false);
        assert!(parsed.get("variation").is_none());
    }

    #[tokio::test]
    async fn test_run_drains_until_senders_drop() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("decisions.jsonl");
        let writer = AuditWriter::new(file_path.to_str().unwrap());
        let (sender, rx) = create_audit_channel(16);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        for i in 0..3 {
            assert!(sender.send_decision(record(i)));
        }
        drop(sender);

        let written = writer.run(rx, shutdown_rx).await;
        assert_eq!(written, 3);
        assert_eq!(fs::read_to_string(&file_path).unwrap().lines().count(), 3);
    }

    #[tokio::test]
    async fn test_run_flushes_queue_on_shutdown() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("decisions.jsonl");
        let writer = AuditWriter::new(file_path.to_str().unwrap());
        let (sender, rx) = create_audit_channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(writer.run(rx, shutdown_rx));
        for i in 0..4 {
            assert!(sender.send_decision(record(i)));
        }
        shutdown_tx.send(true).unwrap();

        // Sender is still alive, so only the shutdown signal ends the loop
        assert_eq!(handle.await.unwrap(), 4);
    }
}
