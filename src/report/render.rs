//! Plain-text rendering of report views.

use super::table::{BarEntry, GroupedTable, RadarProfile, RationaleListing, ResultTable};
use std::fmt::Write;

const BAR_WIDTH: usize = 40;
const QUESTION_WIDTH: usize = 48;
const NO_DATA: &str = "no data";

fn cell(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.3}", v),
        None => "-".to_string(),
    }
}

fn clip(text: &str, width: usize) -> String {
    let single_line = text.replace('\n', " ");
    if single_line.chars().count() <= width {
        single_line
    } else {
        let kept: String = single_line.chars().take(width.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// One line per run with its configuration and scores.
pub fn render_runs(table: &ResultTable) -> String {
    let mut out = String::new();
    let _ = write!(
        out,
        "{:<14} {:<w$} {:<8} {:>6} {:>7}",
        "run",
        "question",
        "prompt",
        "chunk",
        "overlap",
        w = QUESTION_WIDTH
    );
    for metric in &table.metrics {
        let _ = write!(out, " {:>12}", metric);
    }
    out.push('\n');

    for row in &table.rows {
        let _ = write!(
            out,
            "{:<14} {:<w$} {:<8} {:>6} {:>7}",
            clip(&row.run_name, 14),
            clip(&row.question, QUESTION_WIDTH),
            row.prompt_version,
            row.chunk_size,
            row.chunk_overlap,
            w = QUESTION_WIDTH
        );
        for score in &row.scores {
            let _ = write!(out, " {:>12}", cell(*score));
        }
        out.push('\n');
    }
    out
}

/// Mean scores per configuration group.
pub fn render_grouped(grouped: &GroupedTable) -> String {
    let mut out = String::new();
    let header: Vec<&str> = grouped.keys.iter().map(|k| k.name()).collect();
    let _ = write!(out, "{:<28} {:>5}", header.join(" | "), "runs");
    for metric in &grouped.metrics {
        let _ = write!(out, " {:>12}", metric);
    }
    out.push('\n');

    for group in &grouped.groups {
        let _ = write!(out, "{:<28} {:>5}", group.config, group.run_count);
        for value in &group.means {
            let _ = write!(out, " {:>12}", cell(*value));
        }
        out.push('\n');
    }
    out
}

/// Horizontal bar chart of one metric across configurations.
pub fn render_bars(metric: &str, bars: &[BarEntry]) -> String {
    let mut out = format!("{} by configuration\n", metric);
    let width = bars.iter().map(|b| b.config.len()).max().unwrap_or(0);

    for bar in bars {
        match bar.value {
            Some(v) => {
                let filled = (v.clamp(0.0, 1.0) * BAR_WIDTH as f64).round() as usize;
                let _ = writeln!(
                    out,
                    "  {:<w$}  {:<b$} {:.3}",
                    bar.config,
                    "#".repeat(filled),
                    v,
                    w = width,
                    b = BAR_WIDTH
                );
            }
            None => {
                let _ = writeln!(
                    out,
                    "  {:<w$}  {:<b$} {}",
                    bar.config,
                    "",
                    NO_DATA,
                    w = width,
                    b = BAR_WIDTH
                );
            }
        }
    }
    out
}

/// Per-metric profile of one question. Missing scores show as `0.000*`.
pub fn render_radar(profile: &RadarProfile) -> String {
    let mut out = format!("Question: {}\nRun: {}\n", profile.question, profile.run_id);
    let width = profile.labels.iter().map(|l| l.len()).max().unwrap_or(0);

    for ((label, value), missing) in profile
        .labels
        .iter()
        .zip(&profile.values)
        .zip(&profile.missing)
    {
        let filled = (value.clamp(0.0, 1.0) * BAR_WIDTH as f64).round() as usize;
        let marker = if *missing { "*" } else { "" };
        let _ = writeln!(
            out,
            "  {:<w$}  {:<b$} {:.3}{}",
            label,
            "#".repeat(filled),
            value,
            marker,
            w = width,
            b = BAR_WIDTH
        );
    }

    if profile.missing.iter().any(|m| *m) {
        out.push_str("  * not recorded, drawn as 0\n");
    }
    out
}

/// Rationales grouped by run.
pub fn render_rationales(listing: &[RationaleListing]) -> String {
    let mut out = String::new();
    for item in listing {
        let _ = writeln!(out, "[{}] {}", item.run_name, item.question);
        if item.entries.is_empty() {
            out.push_str("  (no rationales recorded)\n");
            continue;
        }
        for (metric, text) in &item.entries {
            let _ = writeln!(out, "  {}: {}", metric, text.trim_end());
        }
    }
    out
}

/// `0.812` or `no data`.
pub fn format_mean(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.3}", v))
        .unwrap_or_else(|| NO_DATA.to_string())
}
