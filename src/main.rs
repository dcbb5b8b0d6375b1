//! RAG Eval Harness CLI
//!
//! Scores a chatbot against a reference dataset with an LLM judge and reports
//! on the recorded runs.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rag_eval_harness::{
    EvalError,
    config::Config,
    eval::{
        Dataset, EvalRunner, Evaluator, KNOWN_METRICS, RunnerConfig, create_sample_dataset,
        resolve_criteria,
    },
    generator::Generator,
    llm::LlmClient,
    report::{
        DEFAULT_THRESHOLD, ExperimentReport, build_report, check_thresholds, list_experiments,
        render,
    },
    tracking::{FileStore, TrackingStore},
};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// RAG Eval Harness - LLM-as-judge evaluation for retrieval-augmented chatbots
#[derive(Parser)]
#[command(name = "rag-eval")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate, score and record every dataset question
    Run {
        /// Path to the dataset JSON file (defaults to EVAL_DATASET)
        #[arg(short, long)]
        dataset: Option<PathBuf>,

        /// Use the built-in sample dataset
        #[arg(long, conflicts_with = "dataset")]
        sample: bool,

        /// Maximum number of questions to evaluate
        #[arg(long)]
        max_items: Option<usize>,

        /// Abort the batch on the first generation failure
        #[arg(long)]
        fail_fast: bool,

        /// Skip the reference-graded QA score
        #[arg(long)]
        no_qa: bool,

        /// Save the batch summary to a JSON file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Report on recorded experiments
    Report {
        /// Experiment name (all eval_* experiments when omitted)
        experiment: Option<String>,

        /// Metric to compare across configurations
        #[arg(short, long, default_value = "correctness")]
        metric: String,

        /// Question to profile across all metrics
        #[arg(short, long)]
        question: Option<String>,

        /// Output as JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Fail when any criterion mean misses the threshold
    Check {
        /// Minimum mean score (maximum 1 - T for toxicity and harmfulness)
        #[arg(short, long, default_value_t = DEFAULT_THRESHOLD)]
        threshold: f64,
    },

    /// List recorded experiments
    Experiments,

    /// Test LLM connection
    Test,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run {
            dataset,
            sample,
            max_items,
            fail_fast,
            no_qa,
            output,
        } => cmd_run(dataset, sample, max_items, fail_fast, no_qa, output).await,
        Commands::Report {
            experiment,
            metric,
            question,
            json,
        } => cmd_report(experiment, metric, question, json),
        Commands::Check { threshold } => cmd_check(threshold),
        Commands::Experiments => cmd_experiments(),
        Commands::Test => cmd_test().await,
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(filter);

    tracing_subscriber::registry().with(stderr_layer).init();
}

async fn cmd_run(
    dataset_path: Option<PathBuf>,
    sample: bool,
    max_items: Option<usize>,
    fail_fast: bool,
    no_qa: bool,
    output: Option<PathBuf>,
) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    let criteria = resolve_criteria(&config.eval.criteria).context("Invalid criteria selection")?;

    // Dataset problems are fatal before any run starts.
    let dataset = if sample {
        create_sample_dataset()
    } else {
        let path = dataset_path.unwrap_or_else(|| config.eval.dataset_path.clone());
        Dataset::load_json(&path).context("Failed to load dataset")?
    };

    let store = FileStore::open(&config.tracking.root).context("Tracking store unavailable")?;
    let generator = Generator::from_config(&config);

    println!("Dataset:     {} ({} questions)", dataset.name, dataset.len());
    println!("Generator:   {}", generator.describe());
    println!("Judge model: {}", config.llm.model);
    println!(
        "Criteria:    {}",
        criteria
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("Tracking:    {}", store.root().display());

    let runner_config = RunnerConfig {
        score_qa: !no_qa,
        fail_fast,
        max_items,
        ..RunnerConfig::from_settings(&config.eval)
    };

    let evaluator = Evaluator::new(LlmClient::new(config.llm.clone()), criteria);
    let runner = EvalRunner::new(&store, generator, evaluator, runner_config);

    let summary = runner.run(&dataset).await.context("Evaluation aborted")?;
    summary.print_summary();

    if let Some(output_path) = output {
        let json = serde_json::to_string_pretty(&summary)?;
        std::fs::write(&output_path, json)
            .with_context(|| format!("Failed to write {}", output_path.display()))?;
        println!("Summary saved to {}", output_path.display());
    }

    Ok(())
}

/// Open the store for reading; a missing store is reported, not an error.
fn open_store_for_reading(config: &Config, quiet: bool) -> Option<FileStore> {
    match FileStore::open_existing(&config.tracking.root) {
        Ok(store) => Some(store),
        Err(e) => {
            warn!(error = %e, "no experiments found");
            if !quiet {
                println!("No experiments found in {}", config.tracking.root.display());
            }
            None
        }
    }
}

fn cmd_report(
    experiment: Option<String>,
    metric: String,
    question: Option<String>,
    json: bool,
) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    let Some(store) = open_store_for_reading(&config, json) else {
        if json {
            println!("[]");
        }
        return Ok(());
    };

    let names = match experiment {
        Some(name) => vec![name],
        None => list_experiments(&store)?
            .into_iter()
            .map(|e| e.name)
            .collect(),
    };

    if names.is_empty() {
        warn!("no experiments found");
    }

    let (reports, notices) = gather_reports(&store, &names, &metric, question.as_deref())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    if names.is_empty() {
        println!("No experiments found.");
    }
    for notice in &notices {
        println!("{}", notice);
    }
    for report in &reports {
        print_report(report, question.as_deref());
    }

    Ok(())
}

/// Build a report per experiment name. Names that yield nothing produce a
/// notice for plain-text output instead.
fn gather_reports(
    store: &FileStore,
    names: &[String],
    metric: &str,
    question: Option<&str>,
) -> Result<(Vec<ExperimentReport>, Vec<String>)> {
    let mut reports = Vec::new();
    let mut notices = Vec::new();
    for name in names {
        let report = match build_report(store, name, &KNOWN_METRICS, metric, question) {
            Ok(report) => report,
            Err(EvalError::ExperimentNotFound(_)) => {
                warn!(experiment = %name, "no experiments found");
                notices.push(format!("No experiment named {}.", name));
                continue;
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to build report for {}", name));
            }
        };
        if report.table.is_empty() {
            warn!(experiment = %name, "no runs found");
            notices.push(format!("No runs found in {}.", name));
            continue;
        }
        reports.push(report);
    }
    Ok((reports, notices))
}

fn print_report(report: &ExperimentReport, question: Option<&str>) {
    println!("\n========== {} ==========", report.experiment);
    println!("{}", render::render_runs(&report.table));

    println!("Overall means:");
    for metric in &report.table.metrics {
        let mean = report.means.get(metric).copied().flatten();
        println!("  {:<12} {}", metric, render::format_mean(mean));
    }

    println!("\nMeans by configuration:");
    println!("{}", render::render_grouped(&report.grouped));

    println!(
        "{}",
        render::render_bars(&report.compared_metric, &report.comparison)
    );

    match &report.radar {
        Some(profile) => println!("{}", render::render_radar(profile)),
        None => {
            if let Some(q) = question {
                println!("No run found for question: {}\n", q);
            }
        }
    }

    println!("Rationales:");
    println!("{}", render::render_rationales(&report.rationales));
}

fn cmd_check(threshold: f64) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    let Some(store) = open_store_for_reading(&config, false) else {
        std::process::exit(1);
    };

    let criteria = resolve_criteria(&config.eval.criteria).context("Invalid criteria selection")?;
    let metrics: Vec<&str> = criteria.iter().map(|c| c.name.as_str()).collect();

    let checks = check_thresholds(&store, &metrics, threshold)?;
    if checks.is_empty() {
        println!("No experiments found.");
        std::process::exit(1);
    }

    let mut failures = 0;
    for check in &checks {
        let op = if check.higher_is_better { ">=" } else { "<=" };
        let status = if check.passed { "PASS" } else { "FAIL" };
        println!(
            "[{}] {:<16} {:<12} {} {} {:.2}",
            status,
            check.experiment,
            check.metric,
            render::format_mean(check.mean),
            op,
            check.bound
        );
        if !check.passed {
            failures += 1;
        }
    }

    if failures > 0 {
        eprintln!("\n{} of {} checks failed", failures, checks.len());
        std::process::exit(1);
    }

    println!("\nAll {} checks passed", checks.len());
    Ok(())
}

fn cmd_experiments() -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    let Some(store) = open_store_for_reading(&config, false) else {
        return Ok(());
    };

    let experiments = list_experiments(&store)?;
    if experiments.is_empty() {
        println!("No experiments found.");
        return Ok(());
    }

    println!("{:<24} {:<34} {:>5}  created", "name", "id", "runs");
    for experiment in experiments {
        let runs = store.search_runs(&[experiment.experiment_id.clone()])?;
        println!(
            "{:<24} {:<34} {:>5}  {}",
            experiment.name,
            experiment.experiment_id,
            runs.len(),
            experiment.created_at.format("%Y-%m-%d %H:%M")
        );
    }
    info!(root = %store.root().display(), "listed experiments");

    Ok(())
}

async fn cmd_test() -> Result<()> {
    println!("Testing LLM connection...\n");

    let config = Config::load().context("Failed to load configuration")?;

    println!("Configuration:");
    println!("  API Base:  {}", config.llm.api_base);
    println!("  Model:     {}", config.llm.model);
    println!(
        "  API Key:   {}...",
        config.llm.api_key.chars().take(8).collect::<String>()
    );
    println!();

    if let Err(e) = config.validate() {
        println!("Configuration error: {}", e);
        return Ok(());
    }

    let client = LlmClient::new(config.llm);

    println!("Sending test request...");
    match client.test_connection().await {
        Ok(()) => {
            println!("Connection successful!");
        }
        Err(e) => {
            println!("Connection failed: {}", e);
        }
    }

    Ok(())
}
