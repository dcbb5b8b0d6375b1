//! Write path for evaluation runs.

use super::{RunInfo, RunStatus, TrackingStore};
use crate::error::{EvalError, Result};
use crate::eval::criteria::reasoning_key;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::str::FromStr;
use tempfile::TempDir;
use tracing::{debug, warn};

/// Longest value accepted by [`ActiveRun::record_param`], in characters.
pub const MAX_PARAM_LEN: usize = 500;

/// Rationales stored inline are cut to this many characters plus `...`.
pub const INLINE_RATIONALE_LIMIT: usize = 400;

/// Where rationale text goes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RationaleMode {
    /// Always an attached document (full text).
    #[default]
    Document,
    /// Always an inline param, truncated.
    Inline,
    /// Inline when short enough to fit untruncated, document otherwise.
    Auto,
}

impl FromStr for RationaleMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "document" => Ok(RationaleMode::Document),
            "inline" => Ok(RationaleMode::Inline),
            "auto" => Ok(RationaleMode::Auto),
            other => Err(format!(
                "unknown rationale mode '{}' (expected document, inline or auto)",
                other
            )),
        }
    }
}

/// Address of a rationale document: one per criterion and question.
///
/// The file name is the only encoding of the key, so writer and reader both
/// go through [`DocumentKey::file_name`] and [`DocumentKey::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentKey {
    pub criterion: String,
    /// 1-based position of the question in the dataset.
    pub question_index: usize,
}

impl DocumentKey {
    const SUFFIX: &'static str = "_reasoning_";
    const EXTENSION: &'static str = ".txt";

    pub fn new(criterion: impl Into<String>, question_index: usize) -> Self {
        Self {
            criterion: criterion.into(),
            question_index,
        }
    }

    /// `<criterion>_reasoning_<question_index>.txt`
    pub fn file_name(&self) -> String {
        format!(
            "{}{}{}{}",
            self.criterion,
            Self::SUFFIX,
            self.question_index,
            Self::EXTENSION
        )
    }

    /// Inverse of [`DocumentKey::file_name`]; `None` for unrelated files.
    pub fn parse(file_name: &str) -> Option<Self> {
        let stem = file_name.strip_suffix(Self::EXTENSION)?;
        let (criterion, index) = stem.rsplit_once(Self::SUFFIX)?;
        if criterion.is_empty() {
            return None;
        }
        let question_index = index.parse().ok()?;
        Some(Self::new(criterion, question_index))
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name())
    }
}

/// Cut text to [`INLINE_RATIONALE_LIMIT`] characters, marking the cut with `...`.
pub fn truncate_inline(text: &str) -> String {
    if text.chars().count() <= INLINE_RATIONALE_LIMIT {
        text.to_string()
    } else {
        let mut cut: String = text.chars().take(INLINE_RATIONALE_LIMIT).collect();
        cut.push_str("...");
        cut
    }
}

/// Opens runs in a tracking store.
pub struct RunRecorder<'s, S: TrackingStore> {
    store: &'s S,
}

impl<'s, S: TrackingStore> RunRecorder<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    /// Open a new run under `experiment_name`, creating the experiment if needed.
    ///
    /// The returned handle seals the run when it goes out of scope.
    pub fn begin_run(&self, experiment_name: &str, run_name: &str) -> Result<ActiveRun<'s, S>> {
        let experiment = self.store.get_or_create_experiment(experiment_name)?;
        let info = self.store.create_run(&experiment.experiment_id, run_name)?;
        debug!(experiment = %experiment_name, run = %run_name, run_id = %info.run_id, "run started");

        Ok(ActiveRun {
            store: self.store,
            info,
            sealed: false,
        })
    }
}

/// Handle on an open run.
///
/// Every write goes straight to the store, so nothing recorded is lost if
/// processing stops early. [`ActiveRun::finish`] seals the run as
/// `FINISHED`; dropping the handle without finishing seals it as `FAILED`.
pub struct ActiveRun<'s, S: TrackingStore> {
    store: &'s S,
    info: RunInfo,
    sealed: bool,
}

impl<S: TrackingStore> ActiveRun<'_, S> {
    pub fn run_id(&self) -> &str {
        &self.info.run_id
    }

    pub fn run_name(&self) -> &str {
        &self.info.run_name
    }

    /// Record a short immutable value.
    pub fn record_param(&self, key: &str, value: impl fmt::Display) -> Result<()> {
        let value = value.to_string();
        let len = value.chars().count();
        if len > MAX_PARAM_LEN {
            return Err(EvalError::InvalidInput(format!(
                "param '{}' is {} characters; values over {} must be recorded as documents",
                key, len, MAX_PARAM_LEN
            )));
        }
        self.store.log_param(&self.info.run_id, key, &value)
    }

    /// Record one score. Keys follow `<criterion>_score`.
    pub fn record_score(&self, metric_key: &str, value: f64) -> Result<()> {
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            return Err(EvalError::InvalidScore {
                key: metric_key.to_string(),
                value,
            });
        }
        self.store.log_metric(&self.info.run_id, metric_key, value)
    }

    /// Attach free text as a document addressed by `key`.
    ///
    /// The text is staged in a temporary directory that is removed on
    /// return, whether or not the upload succeeds.
    pub fn record_document(&self, key: &DocumentKey, content: &str) -> Result<()> {
        let staging = TempDir::new()
            .map_err(|e| EvalError::Artifact(format!("cannot create staging dir: {}", e)))?;
        let path = staging.path().join(key.file_name());
        fs::write(&path, content)
            .map_err(|e| EvalError::Artifact(format!("cannot stage {}: {}", key, e)))?;

        self.store
            .log_artifact(&self.info.run_id, &path)
            .map_err(|e| match e {
                EvalError::Io { .. } => EvalError::Artifact(e.to_string()),
                other => other,
            })
    }

    /// Store a criterion's rationale according to `mode`.
    pub fn record_rationale(
        &self,
        criterion: &str,
        question_index: usize,
        rationale: &str,
        mode: RationaleMode,
    ) -> Result<()> {
        let inline = match mode {
            RationaleMode::Document => false,
            RationaleMode::Inline => true,
            RationaleMode::Auto => rationale.chars().count() <= INLINE_RATIONALE_LIMIT,
        };

        if inline {
            self.record_param(&reasoning_key(criterion), truncate_inline(rationale))
        } else {
            self.record_document(&DocumentKey::new(criterion, question_index), rationale)
        }
    }

    /// Seal the run as completed.
    pub fn finish(mut self) -> Result<()> {
        self.seal(RunStatus::Finished)
    }

    /// Seal the run as failed.
    pub fn fail(mut self) -> Result<()> {
        self.seal(RunStatus::Failed)
    }

    fn seal(&mut self, status: RunStatus) -> Result<()> {
        self.sealed = true;
        self.store.set_terminated(&self.info.run_id, status)?;
        debug!(run = %self.info.run_name, ?status, "run sealed");
        Ok(())
    }
}

impl<S: TrackingStore> Drop for ActiveRun<'_, S> {
    fn drop(&mut self) {
        if self.sealed {
            return;
        }
        warn!(run = %self.info.run_name, run_id = %self.info.run_id, "run ended without finish, sealing as FAILED");
        if let Err(e) = self.seal(RunStatus::Failed) {
            warn!(run_id = %self.info.run_id, error = %e, "could not seal run");
        }
    }
}
