//! Scripted stand-ins for the judge and the answer generator.

use crate::error::{EvalError, Result};
use crate::eval::Judge;
use crate::generator::AnswerGenerator;
use crate::tracking::{
    ArtifactEntry, Experiment, FileStore, Run, RunInfo, RunStatus, TrackingStore,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Judge that replies from a script, matching on prompt substrings.
#[derive(Clone)]
pub struct ScriptedJudge {
    default_reply: String,
    replies: Vec<(String, String)>,
    failures: Vec<String>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedJudge {
    pub fn new(default_reply: &str) -> Self {
        Self {
            default_reply: default_reply.to_string(),
            replies: Vec::new(),
            failures: Vec::new(),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Reply with `reply` when the prompt contains `needle`.
    pub fn reply_when(mut self, needle: &str, reply: &str) -> Self {
        self.replies.push((needle.to_string(), reply.to_string()));
        self
    }

    /// Fail the call when the prompt contains `needle`.
    pub fn fail_when(mut self, needle: &str) -> Self {
        self.failures.push(needle.to_string());
        self
    }

    /// Every prompt received so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl Judge for ScriptedJudge {
    async fn grade(&self, _system: &str, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());

        if self.failures.iter().any(|n| prompt.contains(n.as_str())) {
            return Err(EvalError::LlmApi("scripted failure".to_string()));
        }

        Ok(self
            .replies
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| self.default_reply.clone()))
    }
}

/// Generator with fixed answers per question; unknown questions fail.
#[derive(Clone, Default)]
pub struct ScriptedGenerator {
    answers: HashMap<String, String>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(mut self, question: &str, answer: &str) -> Self {
        self.answers.insert(question.to_string(), answer.to_string());
        self
    }
}

impl AnswerGenerator for ScriptedGenerator {
    async fn generate(&self, question: &str) -> Result<String> {
        self.answers
            .get(question)
            .cloned()
            .ok_or_else(|| EvalError::Generation(format!("no scripted answer for '{}'", question)))
    }
}

/// File store whose artifact uploads fail for chosen file names.
///
/// Remembers every local path handed to `log_artifact`.
pub struct ArtifactFailingStore {
    inner: FileStore,
    failing: Vec<String>,
    uploaded: Mutex<Vec<PathBuf>>,
}

impl ArtifactFailingStore {
    pub fn new(inner: FileStore) -> Self {
        Self {
            inner,
            failing: Vec::new(),
            uploaded: Mutex::new(Vec::new()),
        }
    }

    /// Fail uploads whose file name contains `needle`.
    pub fn fail_when(mut self, needle: &str) -> Self {
        self.failing.push(needle.to_string());
        self
    }

    /// Local paths passed to `log_artifact`, in call order.
    pub fn uploaded(&self) -> Vec<PathBuf> {
        self.uploaded.lock().unwrap().clone()
    }
}

impl TrackingStore for ArtifactFailingStore {
    fn get_or_create_experiment(&self, name: &str) -> Result<Experiment> {
        self.inner.get_or_create_experiment(name)
    }

    fn get_experiment_by_name(&self, name: &str) -> Result<Option<Experiment>> {
        self.inner.get_experiment_by_name(name)
    }

    fn search_experiments(&self) -> Result<Vec<Experiment>> {
        self.inner.search_experiments()
    }

    fn create_run(&self, experiment_id: &str, run_name: &str) -> Result<RunInfo> {
        self.inner.create_run(experiment_id, run_name)
    }

    fn get_run(&self, run_id: &str) -> Result<Run> {
        self.inner.get_run(run_id)
    }

    fn search_runs(&self, experiment_ids: &[String]) -> Result<Vec<Run>> {
        self.inner.search_runs(experiment_ids)
    }

    fn log_param(&self, run_id: &str, key: &str, value: &str) -> Result<()> {
        self.inner.log_param(run_id, key, value)
    }

    fn log_metric(&self, run_id: &str, key: &str, value: f64) -> Result<()> {
        self.inner.log_metric(run_id, key, value)
    }

    fn log_artifact(&self, run_id: &str, local_path: &Path) -> Result<()> {
        self.uploaded.lock().unwrap().push(local_path.to_path_buf());

        let name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if self.failing.iter().any(|n| name.contains(n.as_str())) {
            return Err(EvalError::io(
                local_path,
                std::io::Error::other("scripted upload failure"),
            ));
        }
        self.inner.log_artifact(run_id, local_path)
    }

    fn list_artifacts(&self, run_id: &str) -> Result<Vec<ArtifactEntry>> {
        self.inner.list_artifacts(run_id)
    }

    fn download_artifacts(&self, run_id: &str, dst: &Path) -> Result<PathBuf> {
        self.inner.download_artifacts(run_id, dst)
    }

    fn set_terminated(&self, run_id: &str, status: RunStatus) -> Result<()> {
        self.inner.set_terminated(run_id, status)
    }
}
