//! Batch runner: generate, score and record every dataset question.

use super::criteria::{QA_METRIC, score_key};
use super::dataset::{Dataset, QaPair};
use super::evaluator::Evaluator;
use super::judge::Judge;
use crate::config::EvalSettings;
use crate::error::Result;
use crate::generator::AnswerGenerator;
use crate::tracking::{RationaleMode, RunRecorder, TrackingStore, truncate_inline};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Configuration for a batch.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Experiment every run is recorded under.
    pub experiment_name: String,
    pub prompt_version: String,
    pub chunk_size: u32,
    pub chunk_overlap: u32,
    /// Where rationales go.
    pub rationale_mode: RationaleMode,
    /// Also grade answers against the reference and record `qa_score`.
    pub score_qa: bool,
    /// Abort the batch on the first generation failure instead of skipping the question.
    pub fail_fast: bool,
    /// Maximum items to evaluate (for quick runs).
    pub max_items: Option<usize>,
}

impl RunnerConfig {
    pub fn from_settings(settings: &EvalSettings) -> Self {
        Self {
            experiment_name: settings.experiment_name(),
            prompt_version: settings.prompt_version.clone(),
            chunk_size: settings.chunk_size,
            chunk_overlap: settings.chunk_overlap,
            rationale_mode: settings.rationale_mode,
            score_qa: true,
            fail_fast: false,
            max_items: None,
        }
    }
}

/// What happened to one question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionReport {
    /// 1-based position in the dataset.
    pub index: usize,
    pub run_id: String,
    pub run_name: String,
    pub question: String,
    /// Recorded scores by metric name.
    pub scores: BTreeMap<String, f64>,
    /// Set when the generator failed and nothing was scored.
    pub generation_error: Option<String>,
    /// Criteria skipped because the evaluator rejected the input.
    pub skipped_criteria: Vec<String>,
    /// Rationales that could not be stored.
    pub rationale_failures: usize,
}

/// Aggregated batch results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub experiment_name: String,
    pub total_items: usize,
    pub scored_items: usize,
    pub failed_items: usize,
    /// Mean of each metric over the questions that recorded it.
    pub mean_scores: BTreeMap<String, f64>,
    pub questions: Vec<QuestionReport>,
    pub total_time_secs: f64,
}

impl BatchSummary {
    fn new(experiment_name: &str) -> Self {
        Self {
            experiment_name: experiment_name.to_string(),
            total_items: 0,
            scored_items: 0,
            failed_items: 0,
            mean_scores: BTreeMap::new(),
            questions: Vec::new(),
            total_time_secs: 0.0,
        }
    }

    /// Recompute counts and means from the per-question reports.
    pub fn calculate_summary(&mut self) {
        self.total_items = self.questions.len();
        self.failed_items = self
            .questions
            .iter()
            .filter(|q| q.generation_error.is_some())
            .count();
        self.scored_items = self.total_items - self.failed_items;

        let mut sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();
        for question in &self.questions {
            for (metric, score) in &question.scores {
                let entry = sums.entry(metric.clone()).or_insert((0.0, 0));
                entry.0 += score;
                entry.1 += 1;
            }
        }
        self.mean_scores = sums
            .into_iter()
            .map(|(metric, (sum, n))| (metric, sum / n as f64))
            .collect();
    }

    /// Print summary to stdout.
    pub fn print_summary(&self) {
        println!("\n========== Evaluation Results ==========");
        println!("Experiment: {}", self.experiment_name);
        println!("Questions:  {}", self.total_items);
        println!("Scored:     {}", self.scored_items);
        println!("Failed:     {}", self.failed_items);
        println!("----------------------------------------");
        if self.mean_scores.is_empty() {
            println!("No scores recorded.");
        }
        for (metric, mean) in &self.mean_scores {
            println!("{:<14} {:.2}", score_key(metric), mean);
        }
        println!("----------------------------------------");
        for q in &self.questions {
            match &q.generation_error {
                Some(err) => println!("[{}] {} -> FAILED: {}", q.index, q.question, err),
                None => println!("[{}] {} -> {} scores", q.index, q.question, q.scores.len()),
            }
        }
        println!("----------------------------------------");
        println!("Total time: {:.1}s", self.total_time_secs);
        println!("========================================\n");
    }
}

/// Runs a dataset through the generator and evaluator, recording each question as a run.
pub struct EvalRunner<'s, S: TrackingStore, G, J> {
    recorder: RunRecorder<'s, S>,
    generator: G,
    evaluator: Evaluator<J>,
    config: RunnerConfig,
}

impl<'s, S, G, J> EvalRunner<'s, S, G, J>
where
    S: TrackingStore,
    G: AnswerGenerator,
    J: Judge,
{
    pub fn new(store: &'s S, generator: G, evaluator: Evaluator<J>, config: RunnerConfig) -> Self {
        Self {
            recorder: RunRecorder::new(store),
            generator,
            evaluator,
            config,
        }
    }

    /// Evaluate every item in order. One question is fully processed before the next starts.
    pub async fn run(&self, dataset: &Dataset) -> Result<BatchSummary> {
        let start_time = Instant::now();
        let mut summary = BatchSummary::new(&self.config.experiment_name);

        let limit = self.config.max_items.unwrap_or(dataset.len());
        let items: Vec<&QaPair> = dataset.items.iter().take(limit).collect();

        info!(
            experiment = %self.config.experiment_name,
            questions = items.len(),
            criteria = self.evaluator.criteria().len(),
            "starting evaluation batch"
        );
        for criterion in self.evaluator.criteria() {
            debug!(criterion = %criterion.name, rule = criterion.scoring_rule(), "scoring rule");
        }

        for (i, item) in items.iter().enumerate() {
            let index = i + 1;
            info!(question_index = index, total = items.len(), question = %item.question, "evaluating");
            let report = self.process_item(index, item).await?;
            summary.questions.push(report);
        }

        summary.total_time_secs = start_time.elapsed().as_secs_f64();
        summary.calculate_summary();
        Ok(summary)
    }

    /// Process one question inside its own run.
    async fn process_item(&self, index: usize, item: &QaPair) -> Result<QuestionReport> {
        let run = self
            .recorder
            .begin_run(&self.config.experiment_name, &format!("eval_q{}", index))?;

        let mut report = QuestionReport {
            index,
            run_id: run.run_id().to_string(),
            run_name: run.run_name().to_string(),
            question: item.question.clone(),
            scores: BTreeMap::new(),
            generation_error: None,
            skipped_criteria: Vec::new(),
            rationale_failures: 0,
        };

        run.record_param("question", truncate_inline(&item.question))?;
        run.record_param("prompt_version", &self.config.prompt_version)?;
        run.record_param("chunk_size", self.config.chunk_size)?;
        run.record_param("chunk_overlap", self.config.chunk_overlap)?;

        let answer = match self.generator.generate(&item.question).await {
            Ok(answer) => answer,
            Err(e) => {
                error!(question_index = index, question = %item.question, error = %e, "answer generation failed");
                run.fail()?;
                if self.config.fail_fast {
                    return Err(e);
                }
                report.generation_error = Some(e.to_string());
                return Ok(report);
            }
        };
        debug!(question_index = index, answer = %answer, "generated answer");

        for criterion in self.evaluator.criteria() {
            let evaluation = match self
                .evaluator
                .evaluate(&item.question, &answer, &item.answer, criterion)
                .await
            {
                Ok(evaluation) => evaluation,
                Err(e) => {
                    warn!(question_index = index, criterion = %criterion.name, error = %e, "criterion skipped");
                    report.skipped_criteria.push(criterion.name.clone());
                    continue;
                }
            };

            run.record_score(&criterion.score_key(), evaluation.score)?;
            report.scores.insert(criterion.name.clone(), evaluation.score);

            if let Err(e) = run.record_rationale(
                &criterion.name,
                index,
                &evaluation.rationale,
                self.config.rationale_mode,
            ) {
                warn!(question_index = index, criterion = %criterion.name, error = %e, "rationale not stored");
                report.rationale_failures += 1;
            }
        }

        if self.config.score_qa {
            match self
                .evaluator
                .evaluate_qa(&item.question, &answer, &item.answer)
                .await
            {
                Ok(evaluation) => {
                    run.record_score(&score_key(QA_METRIC), evaluation.score)?;
                    report.scores.insert(QA_METRIC.to_string(), evaluation.score);
                    if let Err(e) = run.record_rationale(
                        QA_METRIC,
                        index,
                        &evaluation.rationale,
                        self.config.rationale_mode,
                    ) {
                        warn!(question_index = index, criterion = QA_METRIC, error = %e, "rationale not stored");
                        report.rationale_failures += 1;
                    }
                }
                Err(e) => {
                    warn!(question_index = index, criterion = QA_METRIC, error = %e, "QA grade skipped");
                    report.skipped_criteria.push(QA_METRIC.to_string());
                }
            }
        }

        run.finish()?;
        Ok(report)
    }
}
