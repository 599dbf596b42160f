//! Datafile polling
//!
//! Polls the datafile on a fixed interval and emits a `SnapshotEvent` when
//! its contents change. An outage is reported once, when it starts; the
//! watcher keeps polling and reports the next change after recovery.

use crate::services::bucketer::murmur3_32;
use crate::services::snapshot::{FileConfigSource, SnapshotEvent};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// Shortest poll period; `tokio::time::interval` rejects zero
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Content fingerprint used for change detection
#[inline]
fn fingerprint(raw: &str) -> u32 {
    murmur3_32(raw.as_bytes(), 0)
}

pub struct DatafileWatcher {
    source: FileConfigSource,
    poll_interval: Duration,
    last_fingerprint: Option<u32>,
    unavailable: bool,
}

impl DatafileWatcher {
    pub fn new(source: FileConfigSource, poll_interval: Duration) -> Self {
        Self {
            source,
            poll_interval: poll_interval.max(MIN_POLL_INTERVAL),
            last_fingerprint: None,
            unavailable: false,
        }
    }

    /// Mark the current contents as already seen so startup doesn't re-emit them
    pub fn prime(&mut self) {
        if let Ok(raw) = self.source.read_raw() {
            self.last_fingerprint = Some(fingerprint(&raw));
        }
    }

    /// Check the datafile once; returns an event if something changed
    pub fn poll(&mut self) -> Option<SnapshotEvent> {
        let raw = match self.source.read_raw() {
            Ok(raw) => raw,
            Err(e) => {
                if self.unavailable {
                    return None;
                }
                self.unavailable = true;
                return Some(SnapshotEvent::Unavailable(e));
            }
        };
        self.unavailable = false;

        let current = fingerprint(&raw);
        if self.last_fingerprint == Some(current) {
            return None;
        }
        self.last_fingerprint = Some(current);

        debug!(path = %self.source.path().display(), fingerprint = %current, "datafile_changed");
        Some(match self.source.parse(&raw) {
            Ok(config) => SnapshotEvent::Updated(config),
            Err(e) => SnapshotEvent::Unavailable(e),
        })
    }

    /// Poll until shutdown or until the receiving side goes away
    pub async fn run(mut self, tx: mpsc::Sender<SnapshotEvent>, mut shutdown: watch::Receiver<bool>) {
        info!(
            path = %self.source.path().display(),
            poll_interval_ms = %self.poll_interval.as_millis(),
            "datafile_watcher_started"
        );

        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Some(event) = self.poll() {
                        if tx.send(event).await.is_err() {
                            break; // Receiver dropped
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("datafile_watcher_stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn datafile(revision: &str, weight: u32) -> String {
        format!(
            r#"{{"revision": "{}", "flags": [{{"key": "product_sort", "variations": [{{"name": "price", "weight": {}}}]}}]}}"#,
            revision, weight
        )
    }

    #[test]
    fn test_poll_reports_changes_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("datafile.json");
        fs::write(&path, datafile("1", 50)).unwrap();

        let mut watcher =
            DatafileWatcher::new(FileConfigSource::new(&path, "product_sort"), Duration::from_millis(10));
        watcher.prime();
        assert!(watcher.poll().is_none());

        fs::write(&path, datafile("2", 70)).unwrap();
        match watcher.poll() {
            Some(SnapshotEvent::Updated(config)) => assert_eq!(config.revision, "2"),
            other => panic!("expected update, got {:?}", other),
        }
        assert!(watcher.poll().is_none());
    }

    #[test]
    fn test_poll_reports_outage_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("datafile.json");
        fs::write(&path, datafile("1", 50)).unwrap();

        let mut watcher =
            DatafileWatcher::new(FileConfigSource::new(&path, "product_sort"), Duration::from_millis(10));
        watcher.prime();

        fs::remove_file(&path).unwrap();
        assert!(matches!(watcher.poll(), Some(SnapshotEvent::Unavailable(_))));
        assert!(watcher.poll().is_none());

        fs::write(&path, datafile("3", 10)).unwrap();
        assert!(matches!(watcher.poll(), Some(SnapshotEvent::Updated(_))));
    }

    #[test]
    fn test_malformed_update_reported_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("datafile.json");
        fs::write(&path, datafile("1", 50)).unwrap();

        let mut watcher =
            DatafileWatcher::new(FileConfigSource::new(&path, "product_sort"), Duration::from_millis(10));
        watcher.prime();

        fs::write(&path, "{ half written").unwrap();
        assert!(matches!(watcher.poll(), Some(SnapshotEvent::Unavailable(_))));
        assert!(watcher.poll().is_none());
    }

    #[tokio::test]
    async fn test_run_emits_update_and_stops_on_shutdown() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("datafile.json");
        fs::write(&path, datafile("1", 50)).unwrap();

        let watcher =
            DatafileWatcher::new(FileConfigSource::new(&path, "product_sort"), Duration::from_millis(5));
        let (tx, mut rx) = mpsc::channel(4);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(watcher.run(tx, shutdown_rx));

        // Not primed, so the first tick reports the existing contents
        match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
            Ok(Some(SnapshotEvent::Updated(config))) => assert_eq!(config.revision, "1"),
            other => panic!("expected update, got {:?}", other),
        }

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_zero_interval_still_polls() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("datafile.json");
        fs::write(&path, datafile("7", 20)).unwrap();

        let watcher = DatafileWatcher::new(FileConfigSource::new(&path, "product_sort"), Duration::ZERO);
        let (tx, mut rx) = mpsc::channel(4);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(watcher.run(tx, shutdown_rx));

        match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
            Ok(Some(SnapshotEvent::Updated(config))) => assert_eq!(config.revision, "7"),
            other => panic!("expected update, got {:?}", other),
        }

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
    }
}
