//! Reading recorded runs back from the tracking store.

use crate::config::EXPERIMENT_PREFIX;
use crate::error::{EvalError, Result};
use crate::eval::criteria::{reasoning_key, score_key};
use crate::tracking::{DocumentKey, Experiment, Run, RunStatus, TrackingStore};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Parameters a run was produced under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Configuration {
    pub prompt_version: String,
    pub chunk_size: i64,
    pub chunk_overlap: i64,
}

/// One recorded evaluation of a question, reconstructed from the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationRun {
    pub run_id: String,
    pub run_name: String,
    pub experiment_name: String,
    pub question: String,
    pub configuration: Configuration,
    pub status: RunStatus,
    /// Metric name (without `_score`) to score.
    pub scores: BTreeMap<String, f64>,
    /// Metric name to rationale, when one could be found.
    pub rationales: BTreeMap<String, String>,
}

/// Experiments written by this harness (`eval_*`), ordered by name.
pub fn list_experiments<S: TrackingStore>(store: &S) -> Result<Vec<Experiment>> {
    Ok(store
        .search_experiments()?
        .into_iter()
        .filter(|e| e.name.starts_with(EXPERIMENT_PREFIX))
        .collect())
}

/// Load every run of an experiment.
///
/// Rationales are resolved per metric, for every metric in `metrics` and
/// every metric the run scored:
/// 1. an inline `<metric>_reasoning` param,
/// 2. otherwise an attached `<metric>_reasoning_<n>.txt` document (lowest `n`),
/// 3. otherwise absent.
pub fn load_experiment<S: TrackingStore>(
    store: &S,
    name: &str,
    metrics: &[&str],
) -> Result<Vec<EvaluationRun>> {
    let experiment = store
        .get_experiment_by_name(name)?
        .ok_or_else(|| EvalError::ExperimentNotFound(name.to_string()))?;

    let runs = store.search_runs(&[experiment.experiment_id.clone()])?;
    debug!(experiment = %name, runs = runs.len(), "loaded runs");

    let downloads = TempDir::new()
        .map_err(|e| EvalError::Artifact(format!("cannot create download dir: {}", e)))?;

    Ok(runs
        .into_iter()
        .map(|run| reconstruct(store, name, run, metrics, downloads.path()))
        .collect())
}

fn reconstruct<S: TrackingStore>(
    store: &S,
    experiment_name: &str,
    run: Run,
    metrics: &[&str],
    download_root: &Path,
) -> EvaluationRun {
    let scores: BTreeMap<String, f64> = run
        .metrics
        .iter()
        .filter_map(|(key, value)| {
            key.strip_suffix("_score")
                .map(|metric| (metric.to_string(), *value))
        })
        .collect();

    let wanted: BTreeSet<String> = metrics
        .iter()
        .map(|m| m.to_string())
        .chain(scores.keys().cloned())
        .collect();

    let mut rationales = BTreeMap::new();
    let mut documents: Option<BTreeMap<String, PathBuf>> = None;

    for metric in &wanted {
        if let Some(text) = inline_rationale(&run.params, metric) {
            rationales.insert(metric.clone(), text);
            continue;
        }

        let docs = documents
            .get_or_insert_with(|| rationale_documents(store, &run.info.run_id, download_root));
        if let Some(path) = docs.get(metric) {
            match fs::read_to_string(path) {
                Ok(text) => {
                    rationales.insert(metric.clone(), text);
                }
                Err(e) => {
                    warn!(run_id = %run.info.run_id, metric = %metric, error = %e, "could not read rationale document");
                }
            }
        }
    }

    let param = |key: &str| run.params.get(key).cloned().unwrap_or_default();
    let int_param = |key: &str| {
        run.params
            .get(key)
            .and_then(|v| v.trim().parse::<i64>().ok())
            .unwrap_or(0)
    };

    EvaluationRun {
        run_id: run.info.run_id.clone(),
        run_name: run.info.run_name.clone(),
        experiment_name: experiment_name.to_string(),
        question: param("question"),
        configuration: Configuration {
            prompt_version: param("prompt_version"),
            chunk_size: int_param("chunk_size"),
            chunk_overlap: int_param("chunk_overlap"),
        },
        status: run.info.status,
        scores,
        rationales,
    }
}

/// Inline rationale param; also accepts the older `<metric>_score_reasoning` key.
fn inline_rationale(params: &BTreeMap<String, String>, metric: &str) -> Option<String> {
    [reasoning_key(metric), reasoning_key(&score_key(metric))]
        .iter()
        .filter_map(|key| params.get(key))
        .find(|text| !text.is_empty())
        .cloned()
}

/// Download a run's documents and index them by metric.
///
/// Failures are logged and yield no documents: rationales are optional.
fn rationale_documents<S: TrackingStore>(
    store: &S,
    run_id: &str,
    download_root: &Path,
) -> BTreeMap<String, PathBuf> {
    let mut found: BTreeMap<String, (usize, PathBuf)> = BTreeMap::new();

    match store.list_artifacts(run_id) {
        Ok(listed) if listed.is_empty() => return BTreeMap::new(),
        Ok(_) => {}
        Err(e) => {
            warn!(run_id = %run_id, error = %e, "could not list artifacts");
            return BTreeMap::new();
        }
    }

    let dir = match store.download_artifacts(run_id, download_root) {
        Ok(dir) => dir,
        Err(e) => {
            warn!(run_id = %run_id, error = %e, "could not download artifacts");
            return BTreeMap::new();
        }
    };

    for entry in WalkDir::new(&dir).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(key) = entry.file_name().to_str().and_then(DocumentKey::parse) else {
            continue;
        };
        let keep = found
            .get(&key.criterion)
            .is_none_or(|(index, _)| key.question_index < *index);
        if keep {
            found.insert(
                key.criterion.clone(),
                (key.question_index, entry.path().to_path_buf()),
            );
        }
    }

    found
        .into_iter()
        .map(|(metric, (_, path))| (metric, path))
        .collect()
}
