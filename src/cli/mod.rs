//! Command-line interface for livepub.
//!
//! Provides commands for starting runs, checking their status, running the
//! local worker, inspecting run journals, and rendering and publishing the
//! materialized output.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::adapters::{GitPublisher, QuartoRenderer};
use crate::config::{self, QueueBackend, ResolvedConfig};
use crate::core::{
    AdmissionGate, RunJournal, RunOrchestrator, RunService, StatusAggregator, Worker,
};
use crate::domain::RunStatus;
use crate::queue::{FlowerTaskQueue, JsonlTaskQueue, TaskQueue};

/// livepub - Orchestrates live-publication runs on remote infrastructure
#[derive(Parser, Debug)]
#[command(name = "livepub")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Admit a new run (refused while another run is active)
    Start,

    /// Check the status of a run
    Status {
        /// Task ID
        task_id: String,
    },

    /// List known tasks
    Tasks {
        /// Maximum number of tasks to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Revoke a task that has not finished (local queue only)
    Revoke {
        /// Task ID
        task_id: String,
    },

    /// Execute admitted runs from the local queue
    Worker {
        /// Process at most one task, then exit
        #[arg(long)]
        once: bool,

        /// Seconds between queue polls
        #[arg(long, default_value = "5")]
        poll_seconds: u64,
    },

    /// Show the stage journal of a run
    History {
        /// Task ID
        task_id: String,
    },

    /// Render the current output version with Quarto
    Render,

    /// Publish the rendered output to the publication repository
    Publish,

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let cfg = config::config()?;

        match self.command {
            Commands::Start => start(cfg).await,
            Commands::Status { task_id } => show_status(cfg, &task_id).await,
            Commands::Tasks { limit } => list_tasks(cfg, limit).await,
            Commands::Revoke { task_id } => revoke(cfg, &task_id).await,
            Commands::Worker { once, poll_seconds } => {
                run_worker(cfg, once, Duration::from_secs(poll_seconds)).await
            }
            Commands::History { task_id } => show_history(cfg, &task_id).await,
            Commands::Render => render(cfg).await,
            Commands::Publish => publish(cfg).await,
            Commands::Config => show_config(cfg),
        }
    }
}

/// Open the configured queue backend
async fn open_queue(cfg: &ResolvedConfig) -> Result<Arc<dyn TaskQueue>> {
    let queue: Arc<dyn TaskQueue> = match cfg.queue.backend {
        QueueBackend::Local => Arc::new(JsonlTaskQueue::open(cfg.queue_dir()).await?),
        QueueBackend::Flower => Arc::new(FlowerTaskQueue::new(&cfg.queue.flower_url)),
    };
    Ok(queue)
}

/// Open the local queue, for commands only it supports
async fn open_local_queue(cfg: &ResolvedConfig, command: &str) -> Result<JsonlTaskQueue> {
    if cfg.queue.backend != QueueBackend::Local {
        anyhow::bail!("'{}' requires the local queue backend", command);
    }
    Ok(JsonlTaskQueue::open(cfg.queue_dir()).await?)
}

fn print_json(value: &impl Serialize) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize response")?;
    println!("{}", json);
    Ok(())
}

async fn service(cfg: &ResolvedConfig) -> Result<RunService> {
    let queue = open_queue(cfg).await?;
    Ok(RunService::new(
        AdmissionGate::from_config(cfg, queue.clone()),
        StatusAggregator::new(queue),
    ))
}

/// Admit a new run
async fn start(cfg: &ResolvedConfig) -> Result<()> {
    let response = service(cfg).await?.admit_run().await?;
    print_json(&response)?;

    if !response.admitted {
        std::process::exit(1);
    }
    Ok(())
}

/// Show the status of a run
async fn show_status(cfg: &ResolvedConfig, task_id: &str) -> Result<()> {
    match service(cfg).await?.get_run_status(task_id).await? {
        Some(status) => print_json(&status),
        None => anyhow::bail!("Task not found: {}", task_id),
    }
}

/// List known tasks, most recent first
async fn list_tasks(cfg: &ResolvedConfig, limit: usize) -> Result<()> {
    let queue = open_queue(cfg).await?;
    let mut tasks: Vec<_> = queue.list_tasks().await?.into_values().collect();

    if tasks.is_empty() {
        println!("No tasks found");
        return Ok(());
    }

    tasks.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
    let now = chrono::Utc::now();

    println!("{:<38} {:<10} {:<20} {:<15}", "TASK ID", "STATE", "STARTED", "ELAPSED");
    println!("{}", "-".repeat(85));

    for task in tasks.iter().take(limit) {
        let status = RunStatus::compute(task, now);
        println!(
            "{:<38} {:<10} {:<20} {:<15}",
            task.id, task.state, status.start_time, status.elapsed_formatted
        );
    }

    Ok(())
}

/// Revoke an unfinished task
async fn revoke(cfg: &ResolvedConfig, task_id: &str) -> Result<()> {
    let queue = open_local_queue(cfg, "revoke").await?;
    queue
        .revoke(task_id)
        .await
        .with_context(|| format!("Failed to revoke task {}", task_id))?;

    eprintln!("[Task {} revoked]", task_id);
    Ok(())
}

/// Run the local worker
async fn run_worker(cfg: &ResolvedConfig, once: bool, poll_interval: Duration) -> Result<()> {
    let queue = Arc::new(open_local_queue(cfg, "worker").await?);
    let orchestrator = Arc::new(RunOrchestrator::from_config(cfg)?);
    let worker = Worker::new(queue, orchestrator);

    if !once {
        return worker.run(poll_interval).await;
    }

    match worker.run_once().await? {
        Some(processed) if processed.succeeded => {
            eprintln!("[Run {} completed successfully]", processed.task_id);
        }
        Some(processed) => {
            eprintln!("[Run {} failed]", processed.task_id);
            std::process::exit(1);
        }
        None => eprintln!("[No pending tasks]"),
    }
    Ok(())
}

/// Show the stage journal of a run
async fn show_history(cfg: &ResolvedConfig, task_id: &str) -> Result<()> {
    let journal = RunJournal::existing(&cfg.runs_dir(), task_id);
    let events = journal.replay().await?;

    if events.is_empty() {
        println!("No journal for task {}", task_id);
        return Ok(());
    }

    println!("{:<26} {:<18} {:>10}  {}", "TIME", "STAGE", "MS", "SUMMARY");
    println!("{}", "-".repeat(80));

    for event in events {
        let duration = event
            .duration_ms
            .map(|ms| ms.to_string())
            .unwrap_or_default();
        println!(
            "{:<26} {:<18} {:>10}  {}",
            event.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            event.stage,
            duration,
            event.summary
        );
        if let Some(error) = event.error {
            println!("{:>58}error: {}", "", error);
        }
    }

    Ok(())
}

/// Render the current version
async fn render(cfg: &ResolvedConfig) -> Result<()> {
    let renderer = QuartoRenderer::from_settings(&cfg.render);
    let rendered = renderer.render(&cfg.version_dir()).await?;

    println!("{}", rendered.display());
    Ok(())
}

/// Publish the rendered version
async fn publish(cfg: &ResolvedConfig) -> Result<()> {
    let publisher = GitPublisher::from_settings(&cfg.publish)?;
    let render_file = QuartoRenderer::from_settings(&cfg.render).output_path(&cfg.version_dir());
    let outcome = publisher.publish(&render_file).await?;

    print_json(&serde_json::json!({ "status": outcome }))
}

/// Show resolved configuration
fn show_config(cfg: &ResolvedConfig) -> Result<()> {
    println!("livepub configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home (engine state): {}", cfg.home.display());
    println!("  Queue:               {}", cfg.queue_dir().display());
    println!("  Runs:                {}", cfg.runs_dir().display());
    println!("  Templates:           {}", cfg.templates.display());
    println!("  Output:              {}", cfg.output.display());
    println!("  Current version:     {}", cfg.version_dir().display());
    println!("  Working crate:       {}", cfg.working_crate.display());
    println!("  Sub-crates:          {}", cfg.flow.subcrate_path.display());
    println!();
    println!("Flow:");
    println!("  Run label: {}", cfg.flow.run_label);
    println!("  Run tags:  {}", cfg.flow.run_tags.join(", "));
    if cfg.driver.is_empty() {
        println!("  Driver:    (not configured)");
    } else {
        println!("  Driver:    {}", cfg.driver.join(" "));
    }
    match &cfg.orchestration_node {
        Some(node) => println!("  Node:      {}", node),
        None => println!("  Node:      (local transfer endpoint)"),
    }
    for (name, endpoint) in &cfg.flow.endpoints {
        println!("  Endpoint {}: {}", name, endpoint);
    }
    println!();
    println!("Queue:");
    println!("  Backend:   {:?}", cfg.queue.backend);
    if cfg.queue.backend == QueueBackend::Flower {
        println!("  Flower:    {}", cfg.queue.flower_url);
    }
    println!("  Task name: {}", cfg.queue.task_name);
    println!();
    println!("Render: {} -> {}", cfg.render.quarto, cfg.render.render_file);
    match &cfg.publish.repo {
        Some(repo) => println!("Publish: {}", repo.display()),
        None => println!("Publish: (no repository configured)"),
    }

    Ok(())
}
