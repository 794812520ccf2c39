//! `vidforge` CLI entry point.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use vidforge::application::Orchestrator;
use vidforge::cli::{commands, Cli};
use vidforge::config::ConfigLoader;
use vidforge::logging;
use vidforge::services::{error_classifier::ErrorClassifier, governor::Governor, run_manager::RunManager, store::Store, task_worker::TaskWorker};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::load().context("failed to load configuration")?;
    let _logger_guard = logging::init(&config).context("failed to initialize logging")?;

    let mut http_builder = reqwest::Client::builder().timeout(Duration::from_secs(config.api_request_timeout_seconds));
    if let Some(proxy) = config.https_proxy.as_deref().or(config.http_proxy.as_deref()) {
        http_builder = http_builder.proxy(reqwest::Proxy::all(proxy).context("invalid proxy URL")?);
    }
    let http = http_builder.build().context("failed to build HTTP client")?;

    let store = Store::new();
    let governor = Governor::new(config.governor_config());
    let classifier = Arc::new(config.classifier());

    let capabilities = store.list_providers().await.into_iter().map(|p| (p.id, p.capabilities)).collect();
    let providers = Arc::new(vidforge::adapters::providers::ProviderRegistry::from_wire_configs(http, &capabilities, &config.provider_wire_configs()));

    let worker = TaskWorker::new(Arc::clone(&store), governor, classifier, providers, config.worker_config());
    let run_manager = RunManager::new(Arc::clone(&store), worker);
    let orchestrator = Orchestrator::new(store, run_manager);

    tokio::select! {
        result = commands::dispatch(&orchestrator, cli.command, cli.json) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("received shutdown signal, letting in-flight tasks drain");
            Ok(())
        }
    }
}
