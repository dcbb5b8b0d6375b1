//! RAG Eval Harness - LLM-as-judge evaluation for retrieval-augmented chatbots.
//!
//! Every question of a reference dataset is answered by the chatbot under
//! test, scored on a set of named criteria by a judge model, and recorded as
//! one run in a file-backed tracking store. Recorded experiments can then be
//! tabulated, grouped by configuration and compared.
//!
//! # Quick Start
//!
//! ```no_run
//! use rag_eval_harness::{
//!     config::Config,
//!     eval::{Dataset, EvalRunner, Evaluator, RunnerConfig, resolve_criteria},
//!     generator::Generator,
//!     llm::LlmClient,
//!     tracking::FileStore,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     config.validate()?;
//!
//!     let store = FileStore::open(&config.tracking.root)?;
//!     let dataset = Dataset::load_json(&config.eval.dataset_path)?;
//!
//!     let evaluator = Evaluator::new(
//!         LlmClient::new(config.llm.clone()),
//!         resolve_criteria(&config.eval.criteria)?,
//!     );
//!     let runner = EvalRunner::new(
//!         &store,
//!         Generator::from_config(&config),
//!         evaluator,
//!         RunnerConfig::from_settings(&config.eval),
//!     );
//!
//!     let summary = runner.run(&dataset).await?;
//!     summary.print_summary();
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Dataset**: question/reference-answer pairs loaded from JSON
//! - **Generator**: the chatbot under test (chain endpoint or bare LLM)
//! - **Evaluator**: per-criterion LLM judge with fail-soft score parsing
//! - **RunRecorder**: one run per question with params, scores and rationale documents
//! - **report**: tables, grouped means, comparisons and the threshold gate

pub mod config;
pub mod error;
pub mod eval;
pub mod generator;
pub mod llm;
pub mod report;
pub mod tracking;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types
pub use config::Config;
pub use error::{EvalError, Result};
pub use eval::{Dataset, EvalRunner, Evaluator, RunnerConfig};
pub use generator::{AnswerGenerator, Generator};
pub use llm::LlmClient;
pub use report::{ExperimentReport, build_report};
pub use tracking::{FileStore, RunRecorder, TrackingStore};
