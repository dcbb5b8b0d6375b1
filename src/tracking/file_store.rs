//! Directory-backed tracking store.
//!
//! Layout:
//! ```text
//! <root>/<experiment_id>/meta.json
//! <root>/<experiment_id>/<run_id>/meta.json
//! <root>/<experiment_id>/<run_id>/params.json
//! <root>/<experiment_id>/<run_id>/metrics.json
//! <root>/<experiment_id>/<run_id>/artifacts/...
//! ```
//! JSON files are replaced atomically (write to `.tmp`, then rename).

use super::{ArtifactEntry, Experiment, MetricPoint, Run, RunInfo, RunStatus, TrackingStore};
use crate::error::{EvalError, Result};
use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

const META_FILE: &str = "meta.json";
const PARAMS_FILE: &str = "params.json";
const METRICS_FILE: &str = "metrics.json";
const ARTIFACTS_DIR: &str = "artifacts";

type MetricHistory = BTreeMap<String, Vec<MetricPoint>>;

/// Tracking store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) a store at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let unavailable = |reason: String| EvalError::StoreUnavailable {
            path: root.clone(),
            reason,
        };

        if root.exists() && !root.is_dir() {
            return Err(unavailable("path exists and is not a directory".to_string()));
        }
        fs::create_dir_all(&root).map_err(|e| unavailable(e.to_string()))?;

        Ok(Self { root })
    }

    /// Open an existing store without creating it (read paths).
    pub fn open_existing(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(EvalError::StoreUnavailable {
                path: root,
                reason: "no tracking directory here; run an evaluation first".to_string(),
            });
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn experiment_dirs(&self) -> Result<Vec<PathBuf>> {
        let entries = fs::read_dir(&self.root).map_err(|e| EvalError::io(&self.root, e))?;
        let mut dirs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| EvalError::io(&self.root, e))?;
            let path = entry.path();
            if path.is_dir() && path.join(META_FILE).is_file() {
                dirs.push(path);
            }
        }
        Ok(dirs)
    }

    fn run_dir(&self, run_id: &str) -> Result<PathBuf> {
        for exp_dir in self.experiment_dirs()? {
            let candidate = exp_dir.join(run_id);
            if candidate.join(META_FILE).is_file() {
                return Ok(candidate);
            }
        }
        Err(EvalError::RunNotFound(run_id.to_string()))
    }

    /// Run directory of a run that still accepts writes.
    fn open_run_dir(&self, run_id: &str) -> Result<PathBuf> {
        let dir = self.run_dir(run_id)?;
        let info: RunInfo = read_json(&dir.join(META_FILE))?;
        if info.status.is_sealed() {
            return Err(EvalError::RunSealed(run_id.to_string()));
        }
        Ok(dir)
    }

    fn load_run(&self, run_dir: &Path) -> Result<Run> {
        let info: RunInfo = read_json(&run_dir.join(META_FILE))?;
        let params: BTreeMap<String, String> = read_json_or_default(&run_dir.join(PARAMS_FILE))?;
        let history: MetricHistory = read_json_or_default(&run_dir.join(METRICS_FILE))?;

        let metrics = history
            .into_iter()
            .filter_map(|(key, points)| points.last().map(|p| (key, p.value)))
            .collect();

        Ok(Run {
            info,
            params,
            metrics,
        })
    }
}

impl TrackingStore for FileStore {
    fn get_or_create_experiment(&self, name: &str) -> Result<Experiment> {
        if let Some(existing) = self.get_experiment_by_name(name)? {
            return Ok(existing);
        }

        let experiment = Experiment {
            experiment_id: uuid::Uuid::new_v4().simple().to_string(),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        let dir = self.root.join(&experiment.experiment_id);
        fs::create_dir_all(&dir).map_err(|e| EvalError::io(&dir, e))?;
        write_json(&dir.join(META_FILE), &experiment)?;

        debug!(experiment = %name, id = %experiment.experiment_id, "created experiment");
        Ok(experiment)
    }

    fn get_experiment_by_name(&self, name: &str) -> Result<Option<Experiment>> {
        Ok(self
            .search_experiments()?
            .into_iter()
            .find(|e| e.name == name))
    }

    fn search_experiments(&self) -> Result<Vec<Experiment>> {
        let mut experiments = self
            .experiment_dirs()?
            .iter()
            .map(|dir| read_json::<Experiment>(&dir.join(META_FILE)))
            .collect::<Result<Vec<_>>>()?;
        experiments.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(experiments)
    }

    fn create_run(&self, experiment_id: &str, run_name: &str) -> Result<RunInfo> {
        let exp_dir = self.root.join(experiment_id);
        if !exp_dir.join(META_FILE).is_file() {
            return Err(EvalError::ExperimentNotFound(experiment_id.to_string()));
        }

        let info = RunInfo {
            run_id: uuid::Uuid::new_v4().simple().to_string(),
            run_name: run_name.to_string(),
            experiment_id: experiment_id.to_string(),
            status: RunStatus::Running,
            start_time: Utc::now(),
            end_time: None,
        };

        let run_dir = exp_dir.join(&info.run_id);
        let artifacts = run_dir.join(ARTIFACTS_DIR);
        fs::create_dir_all(&artifacts).map_err(|e| EvalError::io(&artifacts, e))?;
        write_json(&run_dir.join(META_FILE), &info)?;

        Ok(info)
    }

    fn get_run(&self, run_id: &str) -> Result<Run> {
        let dir = self.run_dir(run_id)?;
        self.load_run(&dir)
    }

    fn search_runs(&self, experiment_ids: &[String]) -> Result<Vec<Run>> {
        let mut runs = Vec::new();

        for experiment_id in experiment_ids {
            let exp_dir = self.root.join(experiment_id);
            if !exp_dir.join(META_FILE).is_file() {
                return Err(EvalError::ExperimentNotFound(experiment_id.clone()));
            }

            let entries = fs::read_dir(&exp_dir).map_err(|e| EvalError::io(&exp_dir, e))?;
            for entry in entries {
                let entry = entry.map_err(|e| EvalError::io(&exp_dir, e))?;
                let path = entry.path();
                if path.is_dir() && path.join(META_FILE).is_file() {
                    runs.push(self.load_run(&path)?);
                }
            }
        }

        runs.sort_by(|a, b| {
            a.info
                .start_time
                .cmp(&b.info.start_time)
                .then_with(|| a.info.run_name.cmp(&b.info.run_name))
        });
        Ok(runs)
    }

    fn log_param(&self, run_id: &str, key: &str, value: &str) -> Result<()> {
        let dir = self.open_run_dir(run_id)?;
        let path = dir.join(PARAMS_FILE);
        let mut params: BTreeMap<String, String> = read_json_or_default(&path)?;

        match params.get(key) {
            Some(existing) if existing == value => return Ok(()),
            Some(existing) => {
                return Err(EvalError::ParamConflict {
                    run_id: run_id.to_string(),
                    key: key.to_string(),
                    existing: existing.clone(),
                });
            }
            None => {}
        }

        params.insert(key.to_string(), value.to_string());
        write_json(&path, &params)
    }

    fn log_metric(&self, run_id: &str, key: &str, value: f64) -> Result<()> {
        let dir = self.open_run_dir(run_id)?;
        let path = dir.join(METRICS_FILE);
        let mut history: MetricHistory = read_json_or_default(&path)?;

        history.entry(key.to_string()).or_default().push(MetricPoint {
            value,
            timestamp: Utc::now(),
        });
        write_json(&path, &history)
    }

    fn log_artifact(&self, run_id: &str, local_path: &Path) -> Result<()> {
        let dir = self.open_run_dir(run_id)?;
        let file_name = local_path.file_name().ok_or_else(|| {
            EvalError::Artifact(format!("'{}' has no file name", local_path.display()))
        })?;

        let target = dir.join(ARTIFACTS_DIR).join(file_name);
        if target.exists() {
            return Err(EvalError::Artifact(format!(
                "artifact '{}' already exists on run {}",
                file_name.to_string_lossy(),
                run_id
            )));
        }

        fs::copy(local_path, &target).map_err(|e| EvalError::io(local_path, e))?;
        Ok(())
    }

    fn list_artifacts(&self, run_id: &str) -> Result<Vec<ArtifactEntry>> {
        let artifacts = self.run_dir(run_id)?.join(ARTIFACTS_DIR);
        if !artifacts.is_dir() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for entry in WalkDir::new(&artifacts).min_depth(1) {
            let entry = entry.map_err(|e| EvalError::Artifact(e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&artifacts)
                .map_err(|e| EvalError::Artifact(e.to_string()))?;
            let size = entry
                .metadata()
                .map_err(|e| EvalError::Artifact(e.to_string()))?
                .len();
            entries.push(ArtifactEntry {
                path: relative.to_string_lossy().replace('\\', "/"),
                size,
            });
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    fn download_artifacts(&self, run_id: &str, dst: &Path) -> Result<PathBuf> {
        let source = self.run_dir(run_id)?.join(ARTIFACTS_DIR);
        let target = dst.join(run_id);
        fs::create_dir_all(&target).map_err(|e| EvalError::io(&target, e))?;

        for entry in self.list_artifacts(run_id)? {
            let to = target.join(&entry.path);
            if let Some(parent) = to.parent() {
                fs::create_dir_all(parent).map_err(|e| EvalError::io(parent, e))?;
            }
            let from = source.join(&entry.path);
            fs::copy(&from, &to).map_err(|e| EvalError::io(&from, e))?;
        }

        Ok(target)
    }

    fn set_terminated(&self, run_id: &str, status: RunStatus) -> Result<()> {
        let dir = self.run_dir(run_id)?;
        let path = dir.join(META_FILE);
        let mut info: RunInfo = read_json(&path)?;

        if info.status.is_sealed() {
            return Err(EvalError::RunSealed(run_id.to_string()));
        }

        info.status = status;
        info.end_time = Some(Utc::now());
        write_json(&path, &info)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path).map_err(|e| EvalError::io(path, e))?;
    serde_json::from_str(&content).map_err(|e| {
        EvalError::Serialization(format!("{}: {}", path.display(), e))
    })
}

fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if path.exists() {
        read_json(path)
    } else {
        Ok(T::default())
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value)
        .map_err(|e| EvalError::Serialization(e.to_string()))?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, content).map_err(|e| EvalError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| EvalError::io(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, FileStore) {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path().join("mlruns")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_experiment_get_or_create_is_stable() {
        let (_dir, store) = store();
        let first = store.get_or_create_experiment("eval_v1").unwrap();
        let second = store.get_or_create_experiment("eval_v1").unwrap();
        assert_eq!(first.experiment_id, second.experiment_id);

        store.get_or_create_experiment("eval_v2").unwrap();
        let names: Vec<_> = store
            .search_experiments()
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["eval_v1", "eval_v2"]);
    }

    #[test]
    fn test_run_params_and_metrics() {
        let (_dir, store) = store();
        let exp = store.get_or_create_experiment("eval_v1").unwrap();
        let run = store.create_run(&exp.experiment_id, "eval_q1").unwrap();
        assert_eq!(run.status, RunStatus::Running);

        store.log_param(&run.run_id, "question", "Q1").unwrap();
        store.log_param(&run.run_id, "question", "Q1").unwrap();
        assert!(matches!(
            store.log_param(&run.run_id, "question", "Q2"),
            Err(EvalError::ParamConflict { .. })
        ));

        store.log_metric(&run.run_id, "correctness_score", 0.0).unwrap();
        store.log_metric(&run.run_id, "correctness_score", 1.0).unwrap();

        let loaded = store.get_run(&run.run_id).unwrap();
        assert_eq!(loaded.params["question"], "Q1");
        assert_eq!(loaded.metrics["correctness_score"], 1.0);
    }

    #[test]
    fn test_sealed_run_rejects_writes() {
        let (dir, store) = store();
        let exp = store.get_or_create_experiment("eval_v1").unwrap();
        let run = store.create_run(&exp.experiment_id, "eval_q1").unwrap();
        store.set_terminated(&run.run_id, RunStatus::Finished).unwrap();

        assert!(matches!(
            store.log_metric(&run.run_id, "qa_score", 1.0),
            Err(EvalError::RunSealed(_))
        ));
        assert!(matches!(
            store.log_param(&run.run_id, "question", "Q1"),
            Err(EvalError::RunSealed(_))
        ));
        assert!(matches!(
            store.set_terminated(&run.run_id, RunStatus::Failed),
            Err(EvalError::RunSealed(_))
        ));

        let local = dir.path().join("note.txt");
        fs::write(&local, "late").unwrap();
        assert!(matches!(
            store.log_artifact(&run.run_id, &local),
            Err(EvalError::RunSealed(_))
        ));

        let info = store.get_run(&run.run_id).unwrap().info;
        assert_eq!(info.status, RunStatus::Finished);
        assert!(info.end_time.is_some());
    }

    #[test]
    fn test_artifacts_are_append_only() {
        let (dir, store) = store();
        let exp = store.get_or_create_experiment("eval_v1").unwrap();
        let run = store.create_run(&exp.experiment_id, "eval_q1").unwrap();

        let local = dir.path().join("correctness_reasoning_1.txt");
        fs::write(&local, "matches reference").unwrap();
        store.log_artifact(&run.run_id, &local).unwrap();
        assert!(matches!(
            store.log_artifact(&run.run_id, &local),
            Err(EvalError::Artifact(_))
        ));

        let listed = store.list_artifacts(&run.run_id).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].path, "correctness_reasoning_1.txt");
        assert_eq!(listed[0].size, "matches reference".len() as u64);

        let download_root = TempDir::new().unwrap();
        let downloaded = store
            .download_artifacts(&run.run_id, download_root.path())
            .unwrap();
        let content = fs::read_to_string(downloaded.join("correctness_reasoning_1.txt")).unwrap();
        assert_eq!(content, "matches reference");
    }

    #[test]
    fn test_search_runs_oldest_first() {
        let (_dir, store) = store();
        let exp = store.get_or_create_experiment("eval_v1").unwrap();
        for name in ["eval_q1", "eval_q2", "eval_q3"] {
            store.create_run(&exp.experiment_id, name).unwrap();
        }

        let runs = store.search_runs(&[exp.experiment_id.clone()]).unwrap();
        let names: Vec<_> = runs.iter().map(|r| r.info.run_name.as_str()).collect();
        assert_eq!(names, vec!["eval_q1", "eval_q2", "eval_q3"]);
    }

    #[test]
    fn test_unknown_ids() {
        let (_dir, store) = store();
        assert!(matches!(
            store.get_run("missing"),
            Err(EvalError::RunNotFound(_))
        ));
        assert!(matches!(
            store.create_run("missing", "eval_q1"),
            Err(EvalError::ExperimentNotFound(_))
        ));
        assert!(matches!(
            store.search_runs(&["missing".to_string()]),
            Err(EvalError::ExperimentNotFound(_))
        ));
    }

    #[test]
    fn test_open_rejects_file_root() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("not_a_dir");
        fs::write(&file, "x").unwrap();
        assert!(matches!(
            FileStore::open(&file),
            Err(EvalError::StoreUnavailable { .. })
        ));
        assert!(matches!(
            FileStore::open_existing(dir.path().join("absent")),
            Err(EvalError::StoreUnavailable { .. })
        ));
    }
}
