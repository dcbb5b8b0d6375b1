//! Experiment tracking: where runs, their params, scores and rationale
//! documents are persisted.
//!
//! [`TrackingStore`] is the backend contract. [`FileStore`] implements it on
//! a local directory tree; [`RunRecorder`] is the write path used by the
//! runner and guarantees every run it opens gets sealed.

mod file_store;
mod recorder;

pub use file_store::FileStore;
pub use recorder::{
    ActiveRun, DocumentKey, INLINE_RATIONALE_LIMIT, MAX_PARAM_LEN, RationaleMode, RunRecorder,
    truncate_inline,
};

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A named group of runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub experiment_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle state of a run. Anything but `Running` is sealed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Finished,
    Failed,
}

impl RunStatus {
    pub fn is_sealed(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

/// Identity and lifecycle of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInfo {
    pub run_id: String,
    pub run_name: String,
    pub experiment_id: String,
    pub status: RunStatus,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

/// One logged value of a metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

/// A run as read back from the store: params and the latest value of each metric.
#[derive(Debug, Clone, PartialEq)]
pub struct Run {
    pub info: RunInfo,
    pub params: BTreeMap<String, String>,
    pub metrics: BTreeMap<String, f64>,
}

/// A file attached to a run, relative to the run's artifact root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    pub path: String,
    pub size: u64,
}

/// Backend contract for recording and reading runs.
///
/// All writes are appends: params are write-once, metrics keep their
/// history, artifacts are never overwritten. Writes to sealed runs fail
/// with [`crate::EvalError::RunSealed`].
pub trait TrackingStore {
    /// Return the experiment with this name, creating it if needed.
    fn get_or_create_experiment(&self, name: &str) -> Result<Experiment>;

    /// Look up an experiment by name.
    fn get_experiment_by_name(&self, name: &str) -> Result<Option<Experiment>>;

    /// All experiments, ordered by name.
    fn search_experiments(&self) -> Result<Vec<Experiment>>;

    /// Open a new run in `Running` state.
    fn create_run(&self, experiment_id: &str, run_name: &str) -> Result<RunInfo>;

    fn get_run(&self, run_id: &str) -> Result<Run>;

    /// Runs of the given experiments, oldest first.
    fn search_runs(&self, experiment_ids: &[String]) -> Result<Vec<Run>>;

    fn log_param(&self, run_id: &str, key: &str, value: &str) -> Result<()>;

    fn log_metric(&self, run_id: &str, key: &str, value: f64) -> Result<()>;

    /// Copy a local file into the run's artifacts under its file name.
    fn log_artifact(&self, run_id: &str, local_path: &Path) -> Result<()>;

    fn list_artifacts(&self, run_id: &str) -> Result<Vec<ArtifactEntry>>;

    /// Copy the run's artifacts below `dst` and return the directory holding them.
    fn download_artifacts(&self, run_id: &str, dst: &Path) -> Result<PathBuf>;

    /// Seal a running run with a terminal status.
    fn set_terminated(&self, run_id: &str, status: RunStatus) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_sealing() {
        assert!(!RunStatus::Running.is_sealed());
        assert!(RunStatus::Finished.is_sealed());
        assert!(RunStatus::Failed.is_sealed());
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&RunStatus::Finished).unwrap(),
            "\"FINISHED\""
        );
        let status: RunStatus = serde_json::from_str("\"RUNNING\"").unwrap();
        assert_eq!(status, RunStatus::Running);
    }
}
