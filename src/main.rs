use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

mod cli;

use cli::{Cli, Commands};
use critiq::artifact::{self, Artifact, ExtensionClasses};
use critiq::backend::{BackendRegistry, ConnectSpec, ModelHandle};
use critiq::config::PipelineConfig;
use critiq::index::{IndexConfig, RagIndex};
use critiq::orchestrator::CritiqueOrchestrator;
use critiq::prompt::PromptLimits;
use critiq::report;
use critiq::runner::{BatchRunner, BatchRunnerConfig, CancelToken};

fn setup_logging() -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("critiq")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("critiq.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

/// Connect every subject model plus the judge through the registry.
fn connect_models(
    config: &PipelineConfig,
    subjects_override: &[String],
    judge_override: Option<&str>,
) -> Result<(Vec<ModelHandle>, ModelHandle)> {
    let registry = BackendRegistry::with_defaults();
    let endpoint = &config.models.endpoint;
    let timeout = config.models.timeout();

    let subject_names: Vec<String> = if subjects_override.is_empty() {
        config.models.subjects.clone()
    } else {
        subjects_override.to_vec()
    };

    let mut subjects = Vec::with_capacity(subject_names.len());
    for name in &subject_names {
        let handle = registry
            .connect(&ConnectSpec::new(name, endpoint, timeout))
            .context(format!("Failed to connect subject model {}", name))?;
        subjects.push(handle);
    }

    let judge_name = judge_override.unwrap_or(&config.models.judge);
    let judge = registry
        .connect(&ConnectSpec::new(judge_name, endpoint, timeout))
        .context(format!("Failed to connect judge model {}", judge_name))?;

    Ok((subjects, judge))
}

/// Open the index; failure here aborts the run.
async fn open_index(config: &PipelineConfig) -> Result<Arc<RagIndex>> {
    let index = RagIndex::open(IndexConfig::from_pipeline(config))
        .await
        .context("Failed to build or load the guideline index")?;
    Ok(Arc::new(index))
}

/// Cancellation token flipped by Ctrl-C.
fn cancel_on_ctrl_c() -> CancelToken {
    let cancel = CancelToken::new();
    let handle = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("{}", "Cancelling at the next step boundary...".yellow());
            handle.cancel();
        }
    });
    cancel
}

async fn run_batch(
    config: &PipelineConfig,
    artifacts: Vec<Artifact>,
    subjects_override: &[String],
    judge_override: Option<&str>,
    workers_override: Option<usize>,
) -> Result<()> {
    let (subjects, judge) = connect_models(config, subjects_override, judge_override)?;
    let index = open_index(config).await?;

    let limits = PromptLimits {
        budget_chars: config.review.prompt_budget_chars,
        snippet_chars: config.review.snippet_cap_chars,
    };
    let orchestrator = Arc::new(CritiqueOrchestrator::with_limits(index, limits));

    let runner = BatchRunner::with_config(
        orchestrator,
        BatchRunnerConfig {
            workers: workers_override.unwrap_or(config.concurrency.workers),
        },
    );

    let cancel = cancel_on_ctrl_c();
    let collection = runner.run(&artifacts, &subjects, &judge, &cancel).await;

    println!("{}", report::format_summary(&collection));

    for (model, artifact, answer) in report::refined_answers(&collection) {
        println!("{} {}", model.green().bold(), artifact.cyan());
        println!("{}\n", answer);
    }

    report::write_jsonl(&config.report.path, &collection)
        .context("Failed to write report")?;
    println!(
        "{} {}",
        "Report written to".green(),
        config.report.path.display()
    );

    Ok(())
}

async fn handle_index_command(config: &PipelineConfig, corpus: Option<PathBuf>) -> Result<()> {
    let mut config = config.clone();
    if let Some(corpus) = corpus {
        config.corpus.root = corpus;
    }

    info!("Building or loading index from {}", config.corpus.root.display());
    println!(
        "{} {}",
        "Indexing corpus at".cyan(),
        config.corpus.root.display()
    );

    open_index(&config).await?;
    println!("{}", "Index ready".green());
    Ok(())
}

async fn handle_ask_command(
    config: &PipelineConfig,
    question: String,
    models: &[String],
    judge: Option<&str>,
) -> Result<()> {
    info!("Asking question across subject models");
    println!("{} {}", "Question:".green(), question);

    let artifacts = vec![Artifact::question(question)];
    run_batch(config, artifacts, models, judge, None).await
}

async fn handle_review_command(
    config: &PipelineConfig,
    root: Option<PathBuf>,
    models: &[String],
    judge: Option<&str>,
    workers: Option<usize>,
) -> Result<()> {
    let root = root.unwrap_or_else(|| config.review.artifact_root.clone());
    let classes = ExtensionClasses::new(
        config.review.source_exts.clone(),
        config.review.doc_exts.clone(),
    );

    let artifacts = artifact::discover(&root, &classes, config.review.recursive)
        .context(format!("Failed to discover artifacts under {}", root.display()))?;

    info!("Reviewing {} files under {}", artifacts.len(), root.display());
    println!(
        "{} {} files under {}",
        "Reviewing".cyan(),
        artifacts.len(),
        root.display()
    );

    run_batch(config, artifacts, models, judge, workers).await
}

async fn run_application(cli: &Cli, config: &PipelineConfig) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Index { corpus } => handle_index_command(config, corpus.clone()).await,
        Commands::Ask {
            question,
            models,
            judge,
        } => handle_ask_command(config, question.clone(), models, judge.as_deref()).await,
        Commands::Review {
            root,
            models,
            judge,
            workers,
        } => {
            handle_review_command(config, root.clone(), models, judge.as_deref(), *workers).await
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Setup logging first
    setup_logging().context("Failed to setup logging")?;

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = PipelineConfig::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}
