//! State Store: the single in-memory repository owning every Run, Task,
//! Storyboard, Provider, and Model record (§4.2).
//!
//! Every mutation passes through one `tokio::sync::Mutex` guarding a plain
//! `HashMap`-backed `StoreInner`, and every read returns a `Clone`d snapshot
//! so callers never alias the Store's internal state.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::provider::{seed_models, seed_providers};
use crate::domain::models::{Model, Provider, Run, RunStatus, Storyboard, Task, TaskStatus};

struct StoreInner {
    storyboards: HashMap<String, Storyboard>,
    runs: HashMap<String, Run>,
    tasks: HashMap<String, Task>,
    providers: HashMap<String, Provider>,
    models: HashMap<String, Model>,
}

/// Thread-safe repository keyed by string ids. All reads and writes
/// serialize through one mutex; command rate is low enough that this
/// favors simplicity over throughput (§4.2).
pub struct Store {
    inner: Mutex<StoreInner>,
}

/// Optional filter applied by [`Store::list_tasks`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
}

/// Offset/limit pagination, mirroring the control plane's pagination
/// contract (§4.1) even though this crate has no HTTP surface.
#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    pub offset: usize,
    pub limit: usize,
}

impl Default for Pagination {
    fn default() -> Self {
        Self { offset: 0, limit: 50 }
    }
}

impl Store {
    /// Construct a fresh Store, seeded with the built-in Provider/Model
    /// catalog (§4.2) so a new process is immediately usable.
    #[must_use]
    pub fn new() -> Arc<Self> {
        let providers = seed_providers().into_iter().map(|p| (p.id.clone(), p)).collect();
        let models = seed_models().into_iter().map(|m| (m.id.clone(), m)).collect();
        Arc::new(Self {
            inner: Mutex::new(StoreInner {
                storyboards: HashMap::new(),
                runs: HashMap::new(),
                tasks: HashMap::new(),
                providers,
                models,
            }),
        })
    }

    pub async fn insert_storyboard(&self, storyboard: Storyboard) {
        let mut inner = self.inner.lock().await;
        inner.storyboards.insert(storyboard.id.clone(), storyboard);
    }

    /// # Errors
    /// Returns `DomainError::NotFound` if no storyboard with `id` exists.
    pub async fn get_storyboard(&self, id: &str) -> DomainResult<Storyboard> {
        let inner = self.inner.lock().await;
        inner.storyboards.get(id).cloned().ok_or_else(|| not_found("Storyboard", id))
    }

    #[must_use]
    pub async fn list_providers(&self) -> Vec<Provider> {
        self.inner.lock().await.providers.values().cloned().collect()
    }

    pub async fn get_provider(&self, id: &str) -> Option<Provider> {
        self.inner.lock().await.providers.get(id).cloned()
    }

    /// # Errors
    /// Returns `DomainError::NotFound` if no provider with `id` exists.
    pub async fn set_provider_enabled(&self, id: &str, enabled: bool) -> DomainResult<Provider> {
        let mut inner = self.inner.lock().await;
        let provider = inner.providers.get_mut(id).ok_or_else(|| not_found("Provider", id))?;
        provider.enabled = enabled;
        Ok(provider.clone())
    }

    #[must_use]
    pub async fn list_models(&self) -> Vec<Model> {
        self.inner.lock().await.models.values().cloned().collect()
    }

    pub async fn get_model(&self, id: &str) -> Option<Model> {
        self.inner.lock().await.models.get(id).cloned()
    }

    /// Atomically register a freshly materialized Run and its Tasks (§4.8).
    pub async fn create_run_with_tasks(&self, run: Run, tasks: Vec<Task>) -> Run {
        let mut inner = self.inner.lock().await;
        for task in tasks {
            inner.tasks.insert(task.id.clone(), task);
        }
        inner.runs.insert(run.id.clone(), run.clone());
        run
    }

    /// # Errors
    /// Returns `DomainError::NotFound` if no run with `id` exists.
    pub async fn get_run(&self, id: &str) -> DomainResult<Run> {
        let inner = self.inner.lock().await;
        inner.runs.get(id).cloned().ok_or_else(|| not_found("Run", id))
    }

    /// # Errors
    /// Returns `DomainError::NotFound` if no task with `id` exists.
    pub async fn get_task(&self, id: &str) -> DomainResult<Task> {
        let inner = self.inner.lock().await;
        inner.tasks.get(id).cloned().ok_or_else(|| not_found("Task", id))
    }

    /// List the tasks belonging to `run_id`, in the Run's stored task order.
    ///
    /// # Errors
    /// Returns `DomainError::NotFound` if no run with `run_id` exists.
    pub async fn list_tasks(&self, run_id: &str, filter: TaskFilter, page: Pagination) -> DomainResult<Vec<Task>> {
        let inner = self.inner.lock().await;
        let run = inner.runs.get(run_id).ok_or_else(|| not_found("Run", run_id))?;
        let matching: Vec<Task> = run
            .task_ids
            .iter()
            .filter_map(|id| inner.tasks.get(id))
            .filter(|t| filter.status.is_none_or(|s| t.status == s))
            .cloned()
            .collect();
        Ok(matching.into_iter().skip(page.offset).take(page.limit).collect())
    }

    /// Apply an in-place mutation to a Task under the Store's single lock,
    /// returning the mutated snapshot.
    ///
    /// # Errors
    /// Returns `DomainError::NotFound` if no task with `id` exists.
    pub async fn update_task<F>(&self, id: &str, f: F) -> DomainResult<Task>
    where
        F: FnOnce(&mut Task),
    {
        let mut inner = self.inner.lock().await;
        let task = inner.tasks.get_mut(id).ok_or_else(|| not_found("Task", id))?;
        f(task);
        Ok(task.clone())
    }

    /// Apply an in-place mutation to a Run under the Store's single lock,
    /// returning the mutated snapshot.
    ///
    /// # Errors
    /// Returns `DomainError::NotFound` if no run with `id` exists.
    pub async fn update_run<F>(&self, id: &str, f: F) -> DomainResult<Run>
    where
        F: FnOnce(&mut Run),
    {
        let mut inner = self.inner.lock().await;
        let run = inner.runs.get_mut(id).ok_or_else(|| not_found("Run", id))?;
        f(run);
        Ok(run.clone())
    }

    /// Record that one Task belonging to `run_id` has terminated with
    /// `status`, the single permitted way (alongside `recount_run`) to move
    /// a Run's aggregate counters (§4.2 contract).
    ///
    /// # Errors
    /// Returns `DomainError::NotFound` if no run with `run_id` exists, or
    /// `DomainError::ValidationFailed` if `status` is not terminal.
    pub async fn increment_run_counts(&self, run_id: &str, status: TaskStatus) -> DomainResult<Run> {
        let mut inner = self.inner.lock().await;
        let run = inner.runs.get_mut(run_id).ok_or_else(|| not_found("Run", run_id))?;
        match status {
            TaskStatus::Completed => run.completed += 1,
            TaskStatus::Failed => run.failed += 1,
            TaskStatus::DownloadFailed => run.download_failed += 1,
            TaskStatus::Queued | TaskStatus::Running => {
                return Err(DomainError::ValidationFailed(format!("increment_run_counts called with non-terminal status {status}")));
            }
        }
        if run.all_tasks_terminal() {
            run.finalize();
        } else {
            run.status = RunStatus::Running;
        }
        Ok(run.clone())
    }

    /// Idempotently re-derive a Run's aggregate counters from its Tasks'
    /// current statuses. Used by the `retry_task` path to reconcile after a
    /// single task re-enters the worker path (§4.2, §4.8).
    ///
    /// # Errors
    /// Returns `DomainError::NotFound` if no run with `run_id` exists.
    pub async fn recount_run(&self, run_id: &str) -> DomainResult<Run> {
        let mut inner = self.inner.lock().await;
        let task_ids = inner.runs.get(run_id).ok_or_else(|| not_found("Run", run_id))?.task_ids.clone();

        let (mut completed, mut failed, mut download_failed) = (0, 0, 0);
        for id in &task_ids {
            if let Some(task) = inner.tasks.get(id) {
                match task.status {
                    TaskStatus::Completed => completed += 1,
                    TaskStatus::Failed => failed += 1,
                    TaskStatus::DownloadFailed => download_failed += 1,
                    TaskStatus::Queued | TaskStatus::Running => {}
                }
            }
        }

        let run = inner.runs.get_mut(run_id).expect("checked above");
        run.completed = completed;
        run.failed = failed;
        run.download_failed = download_failed;
        if run.all_tasks_terminal() {
            run.finalize();
        } else {
            run.status = RunStatus::Running;
        }
        Ok(run.clone())
    }

    /// Reset a terminal Task back to `queued`, clearing error fields, for
    /// the `retry_task` command (§4.1).
    ///
    /// # Errors
    /// Returns `DomainError::NotFound` if no task with `id` exists.
    pub async fn reset_task_for_retry(&self, id: &str) -> DomainResult<Task> {
        self.update_task(id, Task::reset_for_retry).await
    }

    /// Stamp a Run with the provider/provider-model pair shared by every
    /// non-empty candidate list, for observability (§4.5 rationale).
    ///
    /// # Errors
    /// Returns `DomainError::NotFound` if no run with `run_id` exists.
    pub async fn stamp_run_provider(&self, run_id: &str, provider_id: Option<String>, provider_model_id: Option<String>) -> DomainResult<()> {
        self.update_run(run_id, |run| {
            run.provider_id = provider_id;
            run.provider_model_id = provider_model_id;
        })
        .await?;
        Ok(())
    }
}

fn not_found(entity: &'static str, id: &str) -> DomainError {
    DomainError::NotFound { entity, id: id.to_string() }
}
