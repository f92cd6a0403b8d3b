use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use repo_summary::config::Settings;
use repo_summary::services::checkpoint::JsonFileCheckpointer;
use repo_summary::services::github::{GithubClient, GithubClientConfig};
use repo_summary::SummaryWorkflow;
use repo_summary_core::CircuitBreaker;
use repo_summary_llm::{HttpModelClient, ModelClientConfig};

/// Summarize a GitHub repository with a text model.
#[derive(Parser)]
#[command(name = "repo-summary", version)]
struct Cli {
    /// Repository URL, e.g. https://github.com/owner/repo
    repo_url: String,

    /// Batch selection strategy: budgeted or planned
    #[arg(long)]
    strategy: Option<String>,

    /// Decide step mode: model or heuristic
    #[arg(long)]
    decider: Option<String>,

    /// Override the iteration ceiling
    #[arg(long)]
    max_iterations: Option<u32>,

    /// Append an audit trail to this JSONL file
    #[arg(long)]
    audit_log: Option<PathBuf>,

    /// Append exhausted requests to this JSONL file
    #[arg(long)]
    dead_letter: Option<PathBuf>,

    /// Save a checkpoint after every iteration into this directory
    #[arg(long)]
    checkpoint_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("repo_summary=info")),
        )
        .init();

    let cli = Cli::parse();
    let mut settings = Settings::from_env();
    if let Some(strategy) = &cli.strategy {
        settings.selection_strategy = strategy
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))?;
    }
    if let Some(decider) = &cli.decider {
        settings.decider_mode = decider.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    }
    if let Some(max_iterations) = cli.max_iterations {
        settings.max_iterations = max_iterations;
    }
    if cli.audit_log.is_some() {
        settings.audit_log_path = cli.audit_log;
    }
    if cli.dead_letter.is_some() {
        settings.dlq_path = cli.dead_letter;
    }
    if cli.checkpoint_dir.is_some() {
        settings.checkpoint_dir = cli.checkpoint_dir;
    }

    let retry = settings.retry_policy();
    let github_breaker = Arc::new(CircuitBreaker::new(
        "github",
        settings.breaker_failure_threshold,
        settings.breaker_cooldown(),
    ));
    let model_breaker = Arc::new(CircuitBreaker::new(
        "model",
        settings.breaker_failure_threshold,
        settings.breaker_cooldown(),
    ));

    let github = GithubClient::new(
        GithubClientConfig {
            token: settings.github_token.clone(),
            timeout: settings.github_timeout(),
            concurrency: settings.fetch_concurrency,
            ..GithubClientConfig::default()
        },
        github_breaker,
        retry.clone(),
    )
    .context("building GitHub client")?;

    let model = HttpModelClient::new(
        ModelClientConfig {
            api_key: settings.llm_api_key.clone(),
            base_url: settings.llm_base_url.clone(),
            model: settings.llm_model.clone(),
            max_tokens: settings.llm_max_tokens,
            timeout: settings.llm_timeout(),
            ..ModelClientConfig::default()
        },
        model_breaker,
        retry,
    )
    .context("building model client")?;

    let mut workflow = SummaryWorkflow::new(settings.clone(), Arc::new(github), Arc::new(model));
    if let Some(dir) = &settings.checkpoint_dir {
        workflow = workflow.with_checkpointer(Arc::new(JsonFileCheckpointer::new(dir)));
    }

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling run");
            interrupt.cancel();
        }
    });

    let outcome = workflow
        .run(&cli.repo_url, cancel)
        .await
        .context("summarization run failed")?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
