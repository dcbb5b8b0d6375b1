//! Evaluation: datasets, criteria, the LLM judge and the batch runner.
//!
//! This module provides:
//! - Question/answer dataset loading
//! - Named criteria and their metric keys
//! - Judge reply parsing and score normalization
//! - The criterion evaluator service and the batch runner

pub mod criteria;
pub mod dataset;
pub mod evaluator;
pub mod judge;
pub mod runner;

pub use criteria::{Criterion, KNOWN_METRICS, QA_METRIC, default_criteria, resolve_criteria};
pub use dataset::{Dataset, QaPair, create_sample_dataset};
pub use evaluator::Evaluator;
pub use judge::{Evaluation, Judge, JudgeResult, parse_judge_response, parse_qa_grade};
pub use runner::{BatchSummary, EvalRunner, QuestionReport, RunnerConfig};
