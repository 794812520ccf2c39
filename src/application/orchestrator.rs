//! Orchestrator: the facade realizing the Command Interface (§4.1) as plain
//! async methods, shared by the CLI subcommands and (if ever grown a network
//! listener) a control-plane handler.
//!
//! A thin object holding the long-lived `Store`/`RunManager` and translating
//! external commands into Store reads and `RunManager` calls, never touching
//! Store internals directly.

use std::sync::Arc;

use thiserror::Error;

use crate::application::storyboard_loader::{load_storyboard_file, StoryboardLoadError};
use crate::domain::errors::DomainError;
use crate::domain::models::run::{OutputLayout, Run, RoutingStrategy};
use crate::domain::models::{Model, Provider, Storyboard, Task};
use crate::services::run_manager::{RunManager, RunManagerError};
use crate::services::store::{Pagination, Store, TaskFilter};

/// Errors surfaced at the Command Interface boundary (§4.1, §7). The CLI
/// maps this into the `{code, message}` shape it prints; nothing past this
/// point is pattern-matched further.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    RunManager(#[from] RunManagerError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    StoryboardLoad(#[from] StoryboardLoadError),
}

/// The command-facing surface of the run-execution engine.
pub struct Orchestrator {
    store: Arc<Store>,
    run_manager: Arc<RunManager>,
}

impl Orchestrator {
    #[must_use]
    pub fn new(store: Arc<Store>, run_manager: Arc<RunManager>) -> Arc<Self> {
        Arc::new(Self { store, run_manager })
    }

    /// Read a storyboard file from disk, validate it, and register it with
    /// the Store so it can be referenced by `submit_run` (§1, §3).
    ///
    /// # Errors
    /// Returns [`OrchestratorError::StoryboardLoad`] on an I/O, parse, or
    /// validation failure.
    pub async fn load_storyboard(&self, path: impl AsRef<std::path::Path>) -> Result<Storyboard, OrchestratorError> {
        let storyboard = load_storyboard_file(path)?;
        self.store.insert_storyboard(storyboard.clone()).await;
        Ok(storyboard)
    }

    /// `submit_run` (§4.1): materialize Tasks, dispatch a bounded worker
    /// pool, and return the persisted `Run` immediately.
    ///
    /// # Errors
    /// See [`RunManager::submit_run`].
    #[allow(clippy::too_many_arguments)]
    pub async fn submit_run(
        &self,
        storyboard_id: &str,
        model_id: &str,
        routing_strategy: RoutingStrategy,
        gen_count: u32,
        segment_range: &str,
        concurrency: u32,
        dry_run: bool,
        force: bool,
        output_layout: OutputLayout,
    ) -> Result<Run, OrchestratorError> {
        let run = self
            .run_manager
            .submit_run(storyboard_id, model_id, routing_strategy, gen_count, segment_range, concurrency, dry_run, force, output_layout)
            .await?;
        Ok(run)
    }

    /// `retry_task` (§4.1).
    ///
    /// # Errors
    /// See [`RunManager::retry_task`].
    pub async fn retry_task(&self, task_id: &str) -> Result<Task, OrchestratorError> {
        Ok(self.run_manager.retry_task(task_id).await?)
    }

    /// # Errors
    /// Returns [`OrchestratorError::Domain`] if no run with `run_id` exists.
    pub async fn get_run(&self, run_id: &str) -> Result<Run, OrchestratorError> {
        Ok(self.store.get_run(run_id).await?)
    }

    /// # Errors
    /// Returns [`OrchestratorError::Domain`] if no task with `task_id` exists.
    pub async fn get_task(&self, task_id: &str) -> Result<Task, OrchestratorError> {
        Ok(self.store.get_task(task_id).await?)
    }

    /// # Errors
    /// Returns [`OrchestratorError::Domain`] if no run with `run_id` exists.
    pub async fn list_tasks(&self, run_id: &str, filter: TaskFilter, page: Pagination) -> Result<Vec<Task>, OrchestratorError> {
        Ok(self.store.list_tasks(run_id, filter, page).await?)
    }

    pub async fn list_providers(&self) -> Vec<Provider> {
        self.store.list_providers().await
    }

    pub async fn list_models(&self) -> Vec<Model> {
        self.store.list_models().await
    }

    /// # Errors
    /// Returns [`OrchestratorError::Domain`] if no provider with `provider_id` exists.
    pub async fn set_provider_enabled(&self, provider_id: &str, enabled: bool) -> Result<Provider, OrchestratorError> {
        Ok(self.store.set_provider_enabled(provider_id, enabled).await?)
    }
}
