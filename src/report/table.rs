//! Tabular views over loaded runs: per-run table, grouped means,
//! per-metric comparison, per-question radar profile.

use super::loader::EvaluationRun;
use crate::error::{EvalError, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Separator between key values in a group label.
pub const LABEL_SEPARATOR: &str = " | ";

/// One row per run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    pub run_id: String,
    pub run_name: String,
    pub question: String,
    pub prompt_version: String,
    pub chunk_size: i64,
    pub chunk_overlap: i64,
    /// Aligned with [`ResultTable::metrics`]; `None` when not recorded.
    pub scores: Vec<Option<f64>>,
    /// Aligned with [`ResultTable::metrics`].
    pub rationales: Vec<Option<String>>,
}

/// Runs as rows, one score column per metric.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultTable {
    pub metrics: Vec<String>,
    pub rows: Vec<TableRow>,
}

impl ResultTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn metric_index(&self, metric: &str) -> Result<usize> {
        self.metrics
            .iter()
            .position(|m| m == metric)
            .ok_or_else(|| EvalError::UnknownMetric(metric.to_string()))
    }

    /// Distinct questions in first-seen order.
    pub fn questions(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for row in &self.rows {
            if !seen.contains(&row.question.as_str()) {
                seen.push(row.question.as_str());
            }
        }
        seen
    }
}

/// Build the per-run table for the given metric columns.
pub fn tabulate(runs: &[EvaluationRun], metrics: &[&str]) -> ResultTable {
    let rows = runs
        .iter()
        .map(|run| TableRow {
            run_id: run.run_id.clone(),
            run_name: run.run_name.clone(),
            question: run.question.clone(),
            prompt_version: run.configuration.prompt_version.clone(),
            chunk_size: run.configuration.chunk_size,
            chunk_overlap: run.configuration.chunk_overlap,
            scores: metrics.iter().map(|m| run.scores.get(*m).copied()).collect(),
            rationales: metrics
                .iter()
                .map(|m| run.rationales.get(*m).cloned())
                .collect(),
        })
        .collect();

    ResultTable {
        metrics: metrics.iter().map(|m| m.to_string()).collect(),
        rows,
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 { None } else { Some(sum / n as f64) }
}

/// Mean of a score column over the runs that recorded it.
///
/// `Ok(None)` means the column has no data at all; callers report it as
/// such rather than as a zero.
pub fn column_mean(table: &ResultTable, metric: &str) -> Result<Option<f64>> {
    let idx = table.metric_index(metric)?;
    Ok(mean(table.rows.iter().filter_map(|r| r.scores[idx])))
}

/// Configuration field used for grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKey {
    PromptVersion,
    ChunkSize,
    ChunkOverlap,
}

/// Grouping used by the reports: `(prompt_version, chunk_size)`.
pub const DEFAULT_GROUP_KEYS: [GroupKey; 2] = [GroupKey::PromptVersion, GroupKey::ChunkSize];

impl GroupKey {
    pub fn name(&self) -> &'static str {
        match self {
            GroupKey::PromptVersion => "prompt_version",
            GroupKey::ChunkSize => "chunk_size",
            GroupKey::ChunkOverlap => "chunk_overlap",
        }
    }

    fn value(&self, row: &TableRow) -> KeyValue {
        match self {
            GroupKey::PromptVersion => KeyValue::Text(row.prompt_version.clone()),
            GroupKey::ChunkSize => KeyValue::Int(row.chunk_size),
            GroupKey::ChunkOverlap => KeyValue::Int(row.chunk_overlap),
        }
    }
}

impl FromStr for GroupKey {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "prompt_version" => Ok(GroupKey::PromptVersion),
            "chunk_size" => Ok(GroupKey::ChunkSize),
            "chunk_overlap" => Ok(GroupKey::ChunkOverlap),
            other => Err(EvalError::InvalidInput(format!(
                "unknown group key '{}' (expected prompt_version, chunk_size or chunk_overlap)",
                other
            ))),
        }
    }
}

/// Group key value; numeric keys sort numerically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum KeyValue {
    Int(i64),
    Text(String),
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Int(v) => write!(f, "{}", v),
            KeyValue::Text(v) => f.write_str(v),
        }
    }
}

/// Means of one configuration group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupRow {
    /// Key values in [`GroupedTable::keys`] order.
    pub key_values: Vec<String>,
    /// Key values joined with [`LABEL_SEPARATOR`].
    pub config: String,
    pub run_count: usize,
    /// Aligned with [`GroupedTable::metrics`]; `None` when no run in the group recorded it.
    pub means: Vec<Option<f64>>,
}

/// Per-configuration means.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupedTable {
    pub keys: Vec<GroupKey>,
    pub metrics: Vec<String>,
    pub groups: Vec<GroupRow>,
}

/// Mean of every score column per group of `keys`, groups ordered by key values.
pub fn aggregate_by(table: &ResultTable, keys: &[GroupKey]) -> GroupedTable {
    let mut buckets: BTreeMap<Vec<KeyValue>, Vec<&TableRow>> = BTreeMap::new();
    for row in &table.rows {
        let key: Vec<KeyValue> = keys.iter().map(|k| k.value(row)).collect();
        buckets.entry(key).or_default().push(row);
    }

    let groups = buckets
        .into_iter()
        .map(|(key, rows)| {
            let key_values: Vec<String> = key.iter().map(|v| v.to_string()).collect();
            let means = (0..table.metrics.len())
                .map(|idx| mean(rows.iter().filter_map(|r| r.scores[idx])))
                .collect();
            GroupRow {
                config: key_values.join(LABEL_SEPARATOR),
                key_values,
                run_count: rows.len(),
                means,
            }
        })
        .collect();

    GroupedTable {
        keys: keys.to_vec(),
        metrics: table.metrics.clone(),
        groups,
    }
}

/// One bar of a metric comparison.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BarEntry {
    pub config: String,
    pub value: Option<f64>,
}

/// Select one metric's group means for a bar-chart comparison.
pub fn compare_metric(grouped: &GroupedTable, metric: &str) -> Result<Vec<BarEntry>> {
    let idx = grouped
        .metrics
        .iter()
        .position(|m| m == metric)
        .ok_or_else(|| EvalError::UnknownMetric(metric.to_string()))?;

    Ok(grouped
        .groups
        .iter()
        .map(|g| BarEntry {
            config: g.config.clone(),
            value: g.means[idx],
        })
        .collect())
}

/// Scores of one question across all metrics, ready for a radar plot.
///
/// Unrecorded scores are plotted as `0.0` and flagged in `missing`. That
/// zero is a drawing convenience, not a measured score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RadarProfile {
    pub question: String,
    pub run_id: String,
    pub labels: Vec<String>,
    pub values: Vec<f64>,
    pub missing: Vec<bool>,
}

/// Radar profile for the first run whose question matches exactly.
pub fn radar_for_question(table: &ResultTable, question: &str) -> Option<RadarProfile> {
    let row = table.rows.iter().find(|r| r.question == question)?;

    Some(RadarProfile {
        question: row.question.clone(),
        run_id: row.run_id.clone(),
        labels: table.metrics.clone(),
        values: row.scores.iter().map(|s| s.unwrap_or(0.0)).collect(),
        missing: row.scores.iter().map(Option::is_none).collect(),
    })
}

/// Rationales recorded for one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RationaleListing {
    pub question: String,
    pub run_name: String,
    /// `(metric, rationale)` pairs in metric order; absent ones are skipped.
    pub entries: Vec<(String, String)>,
}

/// Present rationales, run by run.
pub fn rationale_listing(table: &ResultTable) -> Vec<RationaleListing> {
    table
        .rows
        .iter()
        .map(|row| RationaleListing {
            question: row.question.clone(),
            run_name: row.run_name.clone(),
            entries: table
                .metrics
                .iter()
                .zip(&row.rationales)
                .filter_map(|(metric, text)| text.as_ref().map(|t| (metric.clone(), t.clone())))
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::loader::Configuration;
    use crate::tracking::RunStatus;

    fn run(
        id: &str,
        question: &str,
        prompt_version: &str,
        chunk_size: i64,
        scores: &[(&str, f64)],
    ) -> EvaluationRun {
        EvaluationRun {
            run_id: id.to_string(),
            run_name: format!("eval_{}", id),
            experiment_name: format!("eval_{}", prompt_version),
            question: question.to_string(),
            configuration: Configuration {
                prompt_version: prompt_version.to_string(),
                chunk_size,
                chunk_overlap: 50,
            },
            status: RunStatus::Finished,
            scores: scores.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            rationales: BTreeMap::new(),
        }
    }

    const METRICS: [&str; 2] = ["correctness", "clarity"];

    #[test]
    fn test_tabulate_columns() {
        let runs = vec![run("a", "Q1", "v1", 512, &[("correctness", 1.0)])];
        let table = tabulate(&runs, &METRICS);

        assert_eq!(table.metrics, vec!["correctness", "clarity"]);
        assert_eq!(table.rows[0].scores, vec![Some(1.0), None]);
        assert_eq!(table.rows[0].rationales, vec![None, None]);
    }

    #[test]
    fn test_column_mean_no_data() {
        let runs = vec![
            run("a", "Q1", "v1", 512, &[("correctness", 1.0)]),
            run("b", "Q2", "v1", 512, &[("correctness", 0.0)]),
        ];
        let table = tabulate(&runs, &METRICS);

        assert_eq!(column_mean(&table, "correctness").unwrap(), Some(0.5));
        assert_eq!(column_mean(&table, "clarity").unwrap(), None);
        assert!(matches!(
            column_mean(&table, "politeness"),
            Err(EvalError::UnknownMetric(_))
        ));

        let empty = tabulate(&[], &METRICS);
        assert_eq!(column_mean(&empty, "correctness").unwrap(), None);
    }

    #[test]
    fn test_aggregate_by_configuration() {
        let runs = vec![
            run("a", "Q1", "v1", 512, &[("correctness", 1.0)]),
            run("b", "Q2", "v1", 512, &[("correctness", 0.0)]),
            run("c", "Q1", "v2", 256, &[("correctness", 1.0)]),
        ];
        let table = tabulate(&runs, &METRICS);
        let grouped = aggregate_by(&table, &DEFAULT_GROUP_KEYS);

        assert_eq!(grouped.groups.len(), 2);
        assert_eq!(grouped.groups[0].config, "v1 | 512");
        assert_eq!(grouped.groups[0].run_count, 2);
        assert_eq!(grouped.groups[0].means, vec![Some(0.5), None]);
        assert_eq!(grouped.groups[1].config, "v2 | 256");
        assert_eq!(grouped.groups[1].means, vec![Some(1.0), None]);
    }

    #[test]
    fn test_aggregate_is_idempotent() {
        let runs = vec![
            run("a", "Q1", "v1", 512, &[("correctness", 0.3), ("clarity", 1.0)]),
            run("b", "Q2", "v1", 1024, &[("correctness", 0.9)]),
            run("c", "Q3", "v1", 512, &[("clarity", 0.0)]),
        ];
        let table = tabulate(&runs, &METRICS);
        let first = aggregate_by(&table, &DEFAULT_GROUP_KEYS);
        let second = aggregate_by(&table, &DEFAULT_GROUP_KEYS);
        assert_eq!(first, second);
    }

    #[test]
    fn test_numeric_keys_sort_numerically() {
        let runs = vec![
            run("a", "Q1", "v1", 1024, &[]),
            run("b", "Q1", "v1", 256, &[]),
        ];
        let table = tabulate(&runs, &METRICS);
        let grouped = aggregate_by(&table, &[GroupKey::ChunkSize]);
        let labels: Vec<_> = grouped.groups.iter().map(|g| g.config.as_str()).collect();
        assert_eq!(labels, vec!["256", "1024"]);
    }

    #[test]
    fn test_compare_metric() {
        let runs = vec![
            run("a", "Q1", "v1", 512, &[("correctness", 1.0)]),
            run("b", "Q1", "v2", 256, &[("correctness", 0.0)]),
        ];
        let grouped = aggregate_by(&tabulate(&runs, &METRICS), &DEFAULT_GROUP_KEYS);

        let bars = compare_metric(&grouped, "correctness").unwrap();
        assert_eq!(
            bars,
            vec![
                BarEntry {
                    config: "v1 | 512".to_string(),
                    value: Some(1.0)
                },
                BarEntry {
                    config: "v2 | 256".to_string(),
                    value: Some(0.0)
                },
            ]
        );
        assert!(matches!(
            compare_metric(&grouped, "politeness"),
            Err(EvalError::UnknownMetric(_))
        ));
    }

    #[test]
    fn test_radar_marks_missing() {
        let runs = vec![
            run("a", "Q1", "v1", 512, &[("clarity", 0.7)]),
            run("b", "Q1", "v2", 512, &[("correctness", 1.0)]),
        ];
        let table = tabulate(&runs, &METRICS);

        let radar = radar_for_question(&table, "Q1").unwrap();
        assert_eq!(radar.run_id, "a");
        assert_eq!(radar.labels, vec!["correctness", "clarity"]);
        assert_eq!(radar.values, vec![0.0, 0.7]);
        assert_eq!(radar.missing, vec![true, false]);

        assert!(radar_for_question(&table, "q1").is_none());
    }

    #[test]
    fn test_rationale_listing_skips_absent() {
        let mut with_reason = run("a", "Q1", "v1", 512, &[("correctness", 1.0)]);
        with_reason
            .rationales
            .insert("correctness".to_string(), "matches reference".to_string());
        let runs = vec![with_reason, run("b", "Q2", "v1", 512, &[])];
        let table = tabulate(&runs, &METRICS);

        let listing = rationale_listing(&table);
        assert_eq!(
            listing[0].entries,
            vec![("correctness".to_string(), "matches reference".to_string())]
        );
        assert!(listing[1].entries.is_empty());
        assert_eq!(table.questions(), vec!["Q1", "Q2"]);
    }

    #[test]
    fn test_group_key_from_str() {
        assert_eq!("chunk_size".parse::<GroupKey>().unwrap(), GroupKey::ChunkSize);
        assert!("temperature".parse::<GroupKey>().is_err());
    }
}
