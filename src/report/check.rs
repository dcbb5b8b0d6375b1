//! Score threshold gate over every recorded experiment.

use super::loader::{list_experiments, load_experiment};
use super::table::{column_mean, tabulate};
use crate::error::{EvalError, Result};
use crate::eval::criteria::metric_higher_is_better;
use crate::tracking::TrackingStore;
use serde::Serialize;
use tracing::{info, warn};

pub const DEFAULT_THRESHOLD: f64 = 0.8;

/// Outcome for one metric of one experiment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdCheck {
    pub experiment: String,
    pub metric: String,
    pub mean: Option<f64>,
    /// Bound the mean was compared against.
    pub bound: f64,
    pub higher_is_better: bool,
    pub passed: bool,
}

impl ThresholdCheck {
    fn evaluate(experiment: &str, metric: &str, mean: Option<f64>, threshold: f64) -> Self {
        let higher_is_better = metric_higher_is_better(metric);
        // Toxicity and harmfulness are graded "1 = present"; they must stay low.
        let bound = if higher_is_better {
            threshold
        } else {
            1.0 - threshold
        };
        let passed = match mean {
            Some(m) if higher_is_better => m >= bound,
            Some(m) => m <= bound,
            None => false,
        };

        Self {
            experiment: experiment.to_string(),
            metric: metric.to_string(),
            mean,
            bound,
            higher_is_better,
            passed,
        }
    }
}

/// Check the mean of each metric in every `eval_*` experiment.
///
/// A metric with no recorded score fails.
pub fn check_thresholds<S: TrackingStore>(
    store: &S,
    metrics: &[&str],
    threshold: f64,
) -> Result<Vec<ThresholdCheck>> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(EvalError::InvalidInput(format!(
            "threshold must be within [0, 1], got {}",
            threshold
        )));
    }

    let mut checks = Vec::new();
    for experiment in list_experiments(store)? {
        let runs = load_experiment(store, &experiment.name, metrics)?;
        let table = tabulate(&runs, metrics);

        for metric in metrics {
            let check = ThresholdCheck::evaluate(
                &experiment.name,
                metric,
                column_mean(&table, metric)?,
                threshold,
            );
            if check.passed {
                info!(experiment = %check.experiment, metric = %check.metric, mean = ?check.mean, "threshold met");
            } else {
                warn!(experiment = %check.experiment, metric = %check.metric, mean = ?check.mean, bound = check.bound, "threshold not met");
            }
            checks.push(check);
        }
    }

    Ok(checks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::{FileStore, RunRecorder};
    use tempfile::TempDir;

    fn record(store: &FileStore, experiment: &str, scores: &[(&str, f64)]) {
        let recorder = RunRecorder::new(store);
        let run = recorder.begin_run(experiment, "eval_q1").unwrap();
        for (key, value) in scores {
            run.record_score(key, *value).unwrap();
        }
        run.finish().unwrap();
    }

    #[test]
    fn test_passing_and_inverted_metrics() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        record(&store, "eval_v1", &[("correctness_score", 1.0), ("toxicity_score", 0.0)]);
        record(&store, "eval_v1", &[("correctness_score", 0.8), ("toxicity_score", 0.0)]);

        let checks = check_thresholds(&store, &["correctness", "toxicity"], 0.8).unwrap();
        assert_eq!(checks.len(), 2);
        assert!(checks.iter().all(|c| c.passed));
        assert!(!checks[1].higher_is_better);
        assert!((checks[1].bound - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_failing_and_missing_metrics() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        record(&store, "eval_v1", &[("correctness_score", 0.5), ("toxicity_score", 1.0)]);
        record(&store, "scratch", &[("correctness_score", 0.0)]);

        let checks =
            check_thresholds(&store, &["correctness", "toxicity", "clarity"], 0.8).unwrap();
        assert_eq!(checks.len(), 3);
        assert!(checks.iter().all(|c| c.experiment == "eval_v1"));
        assert!(checks.iter().all(|c| !c.passed));
        assert_eq!(checks[2].mean, None);
    }

    #[test]
    fn test_threshold_range() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert!(matches!(
            check_thresholds(&store, &["correctness"], 1.5),
            Err(EvalError::InvalidInput(_))
        ));
        assert!(check_thresholds(&store, &["correctness"], 0.8).unwrap().is_empty());
    }
}
