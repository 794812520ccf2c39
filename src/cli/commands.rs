//! Subcommand definitions and handlers (§4.1 Command Interface realized as
//! `clap` subcommands over the `Orchestrator` facade).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use indicatif::{ProgressBar, ProgressStyle};

use crate::application::Orchestrator;
use crate::cli::output;
use crate::domain::models::run::{OutputLayout, RoutingStrategy};
use crate::services::store::{Pagination, TaskFilter};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Read a storyboard JSON file and register it with the Store.
    LoadStoryboard {
        /// Path to the storyboard JSON file.
        path: PathBuf,
    },
    /// Submit a run over an already-loaded storyboard.
    SubmitRun {
        storyboard_id: String,
        model_id: String,
        /// `default` | `failover` | `weighted` | `manual` | `cost` | `latency` | `quota`.
        #[arg(long, default_value = "default")]
        routing_strategy: String,
        #[arg(long, default_value_t = 1)]
        gen_count: u32,
        /// Range spec, e.g. `"all"` or `"1-3,5"`.
        #[arg(long, default_value = "all")]
        range: String,
        #[arg(long, default_value_t = 5)]
        concurrency: u32,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        force: bool,
        /// `centralized` | `in_place` | `custom`.
        #[arg(long, default_value = "in_place")]
        output_layout: String,
        /// Required for `centralized`/`custom` output layouts.
        #[arg(long)]
        output_path: Option<PathBuf>,
        /// Return as soon as the Run is persisted instead of blocking until
        /// every task terminates. `submit_run` itself always returns
        /// immediately (§4.1); this only controls whether the CLI process
        /// waits around to observe the outcome.
        #[arg(long)]
        no_wait: bool,
    },
    /// Reset a terminal task to `queued` and re-dispatch it.
    RetryTask { task_id: String },
    /// Show one run's aggregate status.
    GetRun { run_id: String },
    /// List a run's tasks.
    ListTasks {
        run_id: String,
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Show one task's detail.
    GetTask { task_id: String },
    /// List the Provider catalog.
    ListProviders,
    /// List the Model catalog.
    ListModels,
    /// Enable or disable a Provider.
    SetProviderEnabled { provider_id: String, enabled: bool },
}

fn parse_routing_strategy(raw: &str) -> Result<RoutingStrategy> {
    Ok(match raw {
        "default" => RoutingStrategy::Default,
        "failover" => RoutingStrategy::Failover,
        "weighted" => RoutingStrategy::Weighted,
        "manual" => RoutingStrategy::Manual,
        "cost" => RoutingStrategy::Cost,
        "latency" => RoutingStrategy::Latency,
        "quota" => RoutingStrategy::Quota,
        other => bail!("unknown routing strategy '{other}'"),
    })
}

fn parse_output_layout(raw: &str, output_path: Option<PathBuf>) -> Result<OutputLayout> {
    Ok(match raw {
        "centralized" => OutputLayout::Centralized { output_root: output_path.context("centralized output layout requires --output-path")? },
        "in_place" => OutputLayout::InPlace,
        "custom" => OutputLayout::Custom { path: output_path.context("custom output layout requires --output-path")? },
        other => bail!("unknown output layout '{other}'"),
    })
}

fn parse_task_status(raw: &str) -> Result<crate::domain::models::task::TaskStatus> {
    use crate::domain::models::task::TaskStatus;
    Ok(match raw {
        "queued" => TaskStatus::Queued,
        "running" => TaskStatus::Running,
        "completed" => TaskStatus::Completed,
        "failed" => TaskStatus::Failed,
        "download_failed" => TaskStatus::DownloadFailed,
        other => bail!("unknown task status '{other}'"),
    })
}

/// Dispatch one parsed subcommand against the Orchestrator, printing
/// human-readable tables or JSON (per `json_output`) to stdout.
///
/// # Errors
/// Returns any error surfaced by the Orchestrator or by argument parsing.
pub async fn dispatch(orchestrator: &Arc<Orchestrator>, command: Commands, json_output: bool) -> Result<()> {
    match command {
        Commands::LoadStoryboard { path } => {
            let storyboard = orchestrator.load_storyboard(&path).await?;
            print_json_or(json_output, &storyboard, || format!("loaded storyboard {} ({} segments)", storyboard.id, storyboard.segments.len()));
        }
        Commands::SubmitRun { storyboard_id, model_id, routing_strategy, gen_count, range, concurrency, dry_run, force, output_layout, output_path, no_wait } => {
            let strategy = parse_routing_strategy(&routing_strategy)?;
            let layout = parse_output_layout(&output_layout, output_path)?;
            let run = orchestrator.submit_run(&storyboard_id, &model_id, strategy, gen_count, &range, concurrency, dry_run, force, layout).await?;
            let run = if no_wait { run } else { wait_for_terminal(orchestrator, &run.id).await? };
            print_json_or(json_output, &run, || output::format_run(&run));
        }
        Commands::RetryTask { task_id } => {
            let task = orchestrator.retry_task(&task_id).await?;
            print_json_or(json_output, &task, || format!("task {} requeued", task.id));
        }
        Commands::GetRun { run_id } => {
            let run = orchestrator.get_run(&run_id).await?;
            print_json_or(json_output, &run, || output::format_run(&run));
        }
        Commands::ListTasks { run_id, status, offset, limit } => {
            let filter = TaskFilter { status: status.map(|s| parse_task_status(&s)).transpose()? };
            let tasks = orchestrator.list_tasks(&run_id, filter, Pagination { offset, limit }).await?;
            print_json_or(json_output, &tasks, || output::format_tasks(&tasks));
        }
        Commands::GetTask { task_id } => {
            let task = orchestrator.get_task(&task_id).await?;
            print_json_or(json_output, &task, || output::format_tasks(std::slice::from_ref(&task)));
        }
        Commands::ListProviders => {
            let providers = orchestrator.list_providers().await;
            print_json_or(json_output, &providers, || output::format_providers(&providers));
        }
        Commands::ListModels => {
            let models = orchestrator.list_models().await;
            print_json_or(json_output, &models, || output::format_models(&models));
        }
        Commands::SetProviderEnabled { provider_id, enabled } => {
            let provider = orchestrator.set_provider_enabled(&provider_id, enabled).await?;
            print_json_or(json_output, &provider, || output::format_providers(std::slice::from_ref(&provider)));
        }
    }
    Ok(())
}

/// Poll the Store until `run_id`'s Run reaches a terminal status. The CLI
/// has nothing else keeping the process alive for a detached run dispatch
/// (§4.8 implementation note), so this is what lets `submit_run` behave
/// like a synchronous command from the operator's chair. Progress renders
/// to stderr, so it never pollutes `--json` stdout.
async fn wait_for_terminal(orchestrator: &Arc<Orchestrator>, run_id: &str) -> Result<crate::domain::models::run::Run> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] run {msg}").expect("valid spinner template").tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
    spinner.enable_steady_tick(std::time::Duration::from_millis(100));

    loop {
        let run = orchestrator.get_run(run_id).await?;
        spinner.set_message(format!("{run_id}: {}/{} complete, {} failed, {} download-failed", run.completed, run.total_tasks, run.failed, run.download_failed));
        if run.status.is_terminal() {
            spinner.finish_with_message(format!("{run_id}: {:?}", run.status));
            return Ok(run);
        }
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    }
}

fn print_json_or<T: serde::Serialize>(json_output: bool, value: &T, human: impl FnOnce() -> String) {
    if json_output {
        match serde_json::to_string_pretty(value) {
            Ok(rendered) => println!("{rendered}"),
            Err(e) => eprintln!("failed to serialize output: {e}"),
        }
    } else {
        println!("{}", human());
    }
}
