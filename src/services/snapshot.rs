//! Experiment snapshot management
//!
//! A `ConfigSource` supplies experiment snapshots; the `SnapshotStore` keeps
//! the one in use. Snapshots are replaced whole, and only after they
//! validate. When the source is unavailable the previous snapshot is kept.

use crate::domain::datafile::Datafile;
use crate::domain::types::ExperimentConfig;
use crate::error::{Result, SorterError};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Supplies experiment snapshots on demand
pub trait ConfigSource: Send + Sync {
    /// Human-readable source name for errors and logs
    fn name(&self) -> &str;

    fn fetch(&self) -> Result<ExperimentConfig>;
}

/// Reads one flag out of a JSON datafile on disk
#[derive(Debug, Clone)]
pub struct FileConfigSource {
    path: PathBuf,
    name: String,
    flag_key: String,
}

impl FileConfigSource {
    pub fn new<P: AsRef<Path>>(path: P, flag_key: &str) -> Self {
        let path = path.as_ref().to_path_buf();
        let name = path.display().to_string();
        Self { path, name, flag_key: flag_key.to_string() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw datafile contents
    pub fn read_raw(&self) -> Result<String> {
        fs::read_to_string(&self.path).map_err(|e| SorterError::CollaboratorUnavailable {
            source_name: self.name.clone(),
            reason: e.to_string(),
        })
    }

    /// Parse datafile contents into a snapshot for the configured flag
    pub fn parse(&self, raw: &str) -> Result<ExperimentConfig> {
        let datafile =
            Datafile::from_json(raw).map_err(|e| SorterError::CollaboratorUnavailable {
                source_name: self.name.clone(),
                reason: format!("malformed datafile: {}", e),
            })?;
        datafile.experiment(&self.flag_key)
    }
}

impl ConfigSource for FileConfigSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self) -> Result<ExperimentConfig> {
        let raw = self.read_raw()?;
        self.parse(&raw)
    }
}

/// Notification that the config source produced something new
#[derive(Debug, Clone)]
pub enum SnapshotEvent {
    Updated(ExperimentConfig),
    Unavailable(SorterError),
}

/// Result of offering a snapshot to the store
#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    /// New snapshot validated and installed
    Updated(Arc<ExperimentConfig>),
    /// Source failed; previous snapshot kept
    Retained(Arc<ExperimentConfig>),
}

impl RefreshOutcome {
    pub fn snapshot(&self) -> &Arc<ExperimentConfig> {
        match self {
            RefreshOutcome::Updated(s) | RefreshOutcome::Retained(s) => s,
        }
    }

    pub fn is_updated(&self) -> bool {
        matches!(self, RefreshOutcome::Updated(_))
    }
}

/// Holds the last valid experiment snapshot
#[derive(Debug, Default)]
pub struct SnapshotStore {
    current: Option<Arc<ExperimentConfig>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self { current: None }
    }

    pub fn current(&self) -> Option<Arc<ExperimentConfig>> {
        self.current.clone()
    }

    /// Fetch from the source and install the result
    pub fn refresh(&mut self, source: &dyn ConfigSource) -> Result<RefreshOutcome> {
        match source.fetch() {
            Ok(config) => self.apply(SnapshotEvent::Updated(config)),
            Err(e) => self.apply(SnapshotEvent::Unavailable(e)),
        }
    }

    /// Install an update or fall back to the previous snapshot.
    ///
    /// Invalid snapshots are rejected with a configuration error and leave
    /// the current one in place. Source outages keep the previous snapshot
    /// if there is one.
    pub fn apply(&mut self, event: SnapshotEvent) -> Result<RefreshOutcome> {
        match event {
            SnapshotEvent::Updated(config) => {
                config.validate()?;
                let snapshot = Arc::new(config);
                info!(
                    flag = %snapshot.key,
                    revision = %snapshot.revision,
                    variations = %snapshot.variations.len(),
                    "snapshot_updated"
                );
                self.current = Some(snapshot.clone());
                Ok(RefreshOutcome::Updated(snapshot))
            }
            SnapshotEvent::Unavailable(e) => {
                let previous = match e {
                    SorterError::CollaboratorUnavailable { .. } => self.current.clone(),
                    _ => None,
                };
                let Some(previous) = previous else {
                    return Err(e);
                };
                warn!(
                    error = %e,
                    revision = %previous.revision,
                    "snapshot_source_unavailable_keeping_previous"
                );
                Ok(RefreshOutcome::Retained(previous))
            }
        }
    }
}
