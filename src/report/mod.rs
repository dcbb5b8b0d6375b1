//! Reading recorded evaluations back and summarising them.
//!
//! This module provides:
//! - Run reconstruction from the tracking store, rationales included
//! - Per-run tables, grouped means, metric comparisons and radar profiles
//! - Plain-text rendering and the score threshold gate

pub mod check;
pub mod loader;
pub mod render;
pub mod table;

pub use check::{DEFAULT_THRESHOLD, ThresholdCheck, check_thresholds};
pub use loader::{Configuration, EvaluationRun, list_experiments, load_experiment};
pub use table::{
    BarEntry, DEFAULT_GROUP_KEYS, GroupKey, GroupRow, GroupedTable, RadarProfile,
    RationaleListing, ResultTable, TableRow, aggregate_by, column_mean, compare_metric,
    radar_for_question, rationale_listing, tabulate,
};

use crate::error::Result;
use crate::tracking::TrackingStore;
use serde::Serialize;
use std::collections::BTreeMap;

/// Every view of one experiment, as printed by `report` or emitted with `--json`.
#[derive(Debug, Clone, Serialize)]
pub struct ExperimentReport {
    pub experiment: String,
    pub table: ResultTable,
    /// Overall mean per metric; `None` when the column has no data.
    pub means: BTreeMap<String, Option<f64>>,
    pub grouped: GroupedTable,
    /// Metric chosen for the bar comparison.
    pub compared_metric: String,
    pub comparison: Vec<BarEntry>,
    pub radar: Option<RadarProfile>,
    pub rationales: Vec<RationaleListing>,
}

/// Build the report for one experiment.
///
/// `question` selects the radar profile; without it the first question is used.
pub fn build_report<S: TrackingStore>(
    store: &S,
    experiment: &str,
    metrics: &[&str],
    compared_metric: &str,
    question: Option<&str>,
) -> Result<ExperimentReport> {
    let runs = load_experiment(store, experiment, metrics)?;
    let table = tabulate(&runs, metrics);

    let means = metrics
        .iter()
        .map(|m| Ok((m.to_string(), column_mean(&table, m)?)))
        .collect::<Result<BTreeMap<_, _>>>()?;

    let grouped = aggregate_by(&table, &DEFAULT_GROUP_KEYS);
    let comparison = compare_metric(&grouped, compared_metric)?;

    let radar = match question {
        Some(q) => radar_for_question(&table, q),
        None => table
            .questions()
            .first()
            .and_then(|q| radar_for_question(&table, q)),
    };

    Ok(ExperimentReport {
        experiment: experiment.to_string(),
        rationales: rationale_listing(&table),
        means,
        grouped,
        compared_metric: compared_metric.to_string(),
        comparison,
        radar,
        table,
    })
}
