//! Run Manager: materializes Tasks from a Storyboard selection, pre-computes
//! candidate lists, and dispatches a bounded per-run worker pool (§4.8).
//!
//! One long-lived object holding `Arc`s to the shared Store and worker, a
//! `submit`-style entrypoint that materializes work and spawns a detached
//! `tokio::spawn` dispatcher, and a `futures::stream::buffer_unordered`
//! bounded pool rather than a hand-rolled thread pool.

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use thiserror::Error;

use crate::domain::errors::DomainError;
use crate::domain::models::run::{OutputLayout, Run, RunConfig, RunStatus, RoutingStrategy};
use crate::domain::models::storyboard::parse_range;
use crate::domain::models::{Segment, Task};
use crate::services::provider_router::{select_candidates, Candidate, RouteConstraints, RouterError};
use crate::services::layout::output_dir_for_segment;
use crate::services::store::Store;
use crate::services::task_worker::{TaskContext, TaskWorker};

/// Errors raised while validating or dispatching a run, surfaced to the
/// Command Interface boundary (§4.1, §7).
#[derive(Debug, Error)]
pub enum RunManagerError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Router(#[from] RouterError),
}

/// One Task's generation plan, computed before the Run is persisted so the
/// uniform-provider stamp (§4.5 rationale) can be derived up front.
struct PlannedTask {
    task: Task,
    segment: Segment,
    candidates: Vec<Candidate>,
}

/// Spawns per-run worker pools over a shared [`TaskWorker`] and [`Store`]
/// (§4.8). One `RunManager` is constructed once at process startup and
/// shared via `Arc` with the CLI/Orchestrator facade.
pub struct RunManager {
    store: Arc<Store>,
    worker: Arc<TaskWorker>,
}

impl RunManager {
    #[must_use]
    pub fn new(store: Arc<Store>, worker: Arc<TaskWorker>) -> Arc<Self> {
        Arc::new(Self { store, worker })
    }

    /// Materialize Tasks for `storyboard_id × segment_range × [1..gen_count]`,
    /// pre-compute routing candidates, persist the Run, and dispatch a
    /// detached worker pool. Returns immediately once the Run is persisted
    /// (§4.1 `submit_run` effect).
    ///
    /// # Errors
    /// Returns `RunManagerError::Domain` if the config is out of range, the
    /// storyboard/model is unknown, or the segment range selects nothing;
    /// `RunManagerError::Router` if the model is disabled.
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
    ) -> Result<Run, RunManagerError> {
        let config = RunConfig { model_id: model_id.to_string(), routing_strategy, gen_count, concurrency, dry_run, force, output_layout };
        config.validate()?;

        let storyboard = self.store.get_storyboard(storyboard_id).await?;
        let model = self.store.get_model(model_id).await.ok_or_else(|| DomainError::NotFound { entity: "Model", id: model_id.to_string() })?;
        let providers = self.store.list_providers().await;

        let universe: Vec<i64> = storyboard.segments.iter().map(|s| s.segment_index).collect();
        let selected = parse_range(segment_range, &universe)?;

        let mut plan = Vec::new();
        for index in selected {
            let segment = storyboard.segment_by_index(index).expect("index drawn from storyboard's own universe").clone();
            let output_dir = output_dir_for_segment(&config.output_layout, &storyboard.id, &storyboard.source_path, index);
            let constraints = RouteConstraints {
                required_durations: vec![segment.duration_seconds],
                required_resolutions: vec![segment.resolution.as_str().to_string()],
                requires_pro: segment.is_pro,
                requires_image_to_video: segment.requires_image_to_video(),
            };
            let candidates = select_candidates(&model, &providers, &constraints, routing_strategy)?;

            for version in 1..=gen_count {
                let task = Task::new(String::new(), format!("{}:{index}", storyboard.id), index, version, output_dir.clone());
                plan.push(PlannedTask { task, segment: segment.clone(), candidates: candidates.clone() });
            }
        }

        let stamp = uniform_head(plan.iter().map(|p| p.candidates.as_slice()));

        let tasks: Vec<Task> = plan.iter().map(|p| p.task.clone()).collect();
        let task_ids: Vec<String> = tasks.iter().map(|t| t.id.clone()).collect();
        let run = Run::new(storyboard_id, config.clone(), task_ids);
        let run_id = run.id.clone();

        let tasks: Vec<Task> = tasks.into_iter().map(|mut t| { t.run_id.clone_from(&run_id); t }).collect();
        let plan: Vec<PlannedTask> = plan.into_iter().zip(tasks.iter()).map(|(p, t)| PlannedTask { task: t.clone(), ..p }).collect();

        let run = self.store.create_run_with_tasks(run, tasks).await;
        if let Some((provider_id, provider_model_id)) = stamp {
            let _ = self.store.stamp_run_provider(&run.id, Some(provider_id), Some(provider_model_id)).await;
        }

        let source_file = storyboard.source_path.to_string_lossy().into_owned();
        let contexts: Vec<TaskContext> = plan
            .into_iter()
            .map(|p| TaskContext {
                task: p.task,
                segment: p.segment,
                candidates: p.candidates,
                routing_strategy,
                dry_run,
                force,
                source_file: source_file.clone(),
                is_retry: false,
            })
            .collect();

        let worker = Arc::clone(&self.worker);
        let pool_size = concurrency as usize;
        tokio::spawn(async move {
            tracing::info!(run_id = %run_id, task_count = contexts.len(), concurrency = pool_size, "dispatching run");
            dispatch(worker, contexts, pool_size).await;
        });

        Ok(run)
    }

    /// Reset `task_id` to `queued`, re-derive its candidate list, and
    /// dispatch it alone through the worker path; the owning Run moves back
    /// to `running` immediately and its aggregate counts are recomputed by
    /// `recount_run` when the task next terminates (§4.1, §4.8).
    ///
    /// # Errors
    /// Returns `RunManagerError::Domain` if the task, its run, storyboard,
    /// segment, or model cannot be found; `RunManagerError::Router` if the
    /// model is disabled.
    pub async fn retry_task(&self, task_id: &str) -> Result<Task, RunManagerError> {
        let task = self.store.get_task(task_id).await?;
        let run = self.store.get_run(&task.run_id).await?;
        let storyboard = self.store.get_storyboard(&run.storyboard_id).await?;
        let segment = storyboard
            .segment_by_index(task.segment_index)
            .cloned()
            .ok_or_else(|| DomainError::NotFound { entity: "Segment", id: task.segment_index.to_string() })?;
        let model = self.store.get_model(&run.config.model_id).await.ok_or_else(|| DomainError::NotFound { entity: "Model", id: run.config.model_id.clone() })?;
        let providers = self.store.list_providers().await;

        let constraints = RouteConstraints {
            required_durations: vec![segment.duration_seconds],
            required_resolutions: vec![segment.resolution.as_str().to_string()],
            requires_pro: segment.is_pro,
            requires_image_to_video: segment.requires_image_to_video(),
        };
        let candidates = select_candidates(&model, &providers, &constraints, run.config.routing_strategy)?;

        let task = self.store.reset_task_for_retry(task_id).await?;
        self.store.update_run(&run.id, |r| r.status = RunStatus::Running).await?;

        let ctx = TaskContext {
            task: task.clone(),
            segment,
            candidates,
            routing_strategy: run.config.routing_strategy,
            dry_run: run.config.dry_run,
            force: run.config.force,
            source_file: storyboard.source_path.to_string_lossy().into_owned(),
            is_retry: true,
        };

        let worker = Arc::clone(&self.worker);
        let run_id = run.id.clone();
        let retried_task_id = task.id.clone();
        tokio::spawn(async move {
            tracing::info!(run_id = %run_id, task_id = %retried_task_id, "retrying task");
            let handle = tokio::spawn(async move { worker.execute(ctx).await });
            if let Err(join_err) = handle.await {
                tracing::error!(run_id = %run_id, task_id = %retried_task_id, error = %join_err, "retried worker task panicked; recording failed terminal status");
                worker.recover_from_panic(&retried_task_id, &run_id, true).await;
            }
        });

        Ok(task)
    }
}

/// Bounded per-run pool over `futures::stream::buffer_unordered` (§4.8
/// implementation note): wall-clock is the slowest chain, not the sum, and
/// no more than `pool_size` provider calls are in flight for this run at
/// once (independent of the process-wide Governor ceiling).
///
/// Each task's `execute` future runs inside its own `tokio::spawn`, so a
/// `panic!` unwinding through one task is caught at the `JoinHandle` and
/// converted to a `failed` terminal status (§7) instead of taking down the
/// rest of the run's pool.
async fn dispatch(worker: Arc<TaskWorker>, contexts: Vec<TaskContext>, pool_size: usize) {
    let pool_size = pool_size.max(1);
    stream::iter(contexts)
        .map(|ctx| {
            let worker = Arc::clone(&worker);
            let task_id = ctx.task.id.clone();
            let run_id = ctx.task.run_id.clone();
            let is_retry = ctx.is_retry;
            async move {
                let handle = tokio::spawn(async move { worker.execute(ctx).await });
                if let Err(join_err) = handle.await {
                    tracing::error!(task_id = %task_id, run_id = %run_id, error = %join_err, "worker task panicked; recording failed terminal status");
                    worker.recover_from_panic(&task_id, &run_id, is_retry).await;
                }
            }
        })
        .buffer_unordered(pool_size)
        .collect::<Vec<()>>()
        .await;
}

/// If every non-empty candidate list in `lists` shares the same head
/// `(provider_id, provider_model_id)`, return it for the Run's observability
/// stamp (§4.5 rationale); `None` if the lists disagree or are all empty.
fn uniform_head<'a>(lists: impl Iterator<Item = &'a [Candidate]>) -> Option<(String, String)> {
    let mut heads = lists.filter_map(<[Candidate]>::first);
    let first = heads.next()?;
    let (provider_id, provider_model_id) = (first.provider_id.clone(), first.provider_model_id.clone());
    if heads.all(|c| c.provider_id == provider_id && c.provider_model_id == provider_model_id) {
        Some((provider_id, provider_model_id))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::providers::{MockProvider, ProviderRegistry};
    use crate::domain::models::provider::ProviderCapabilities;
    use crate::domain::models::storyboard::{Resolution, Storyboard};
    use crate::domain::models::{OutputLayout, TaskStatus};
    use crate::services::error_classifier::ErrorClassifier;
    use crate::services::governor::{Governor, GovernorConfig};
    use std::time::Duration;

    fn fast_worker_config() -> crate::services::task_worker::WorkerConfig {
        crate::services::task_worker::WorkerConfig {
            poll_initial_wait: Duration::from_millis(1),
            poll_interval: Duration::from_millis(1),
            max_poll_time: Duration::from_millis(500),
            submit_attempts_per_candidate: 2,
        }
    }

    fn storyboard(tmp_dir: &std::path::Path) -> Storyboard {
        let segment = Segment {
            segment_index: 1,
            prompt_text: "a cat".to_string(),
            image_url: None,
            duration_seconds: 10,
            resolution: Resolution::Horizontal,
            is_pro: false,
            director_intent: None,
            asset: None,
        };
        Storyboard::new("sb", tmp_dir.join("sb.json"), vec![segment]).unwrap()
    }

    async fn harness(tmp_dir: &std::path::Path) -> (Arc<Store>, Arc<RunManager>, String) {
        let store = Store::new();
        let sb = storyboard(tmp_dir);
        let sb_id = sb.id.clone();
        store.insert_storyboard(sb).await;

        let caps = ProviderCapabilities { supports_image_to_video: true, supported_durations: vec![10], supported_resolutions: vec!["horizontal".to_string()], supports_pro: false };
        let provider = Arc::new(MockProvider::new("sora_hk".to_string(), caps));
        let mut clients = HashMap::new();
        clients.insert("sora_hk".to_string(), provider as Arc<dyn crate::domain::ports::ProviderClient>);
        let registry = Arc::new(ProviderRegistry::new(clients));

        let governor = Governor::new(GovernorConfig::default());
        let classifier = Arc::new(ErrorClassifier::default());
        let worker = TaskWorker::new(Arc::clone(&store), governor, classifier, registry, fast_worker_config());
        let manager = RunManager::new(Arc::clone(&store), worker);
        (store, manager, sb_id)
    }

    #[tokio::test]
    async fn submit_run_dispatches_and_completes() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, manager, sb_id) = harness(tmp.path()).await;

        let run = manager
            .submit_run(&sb_id, "standard", RoutingStrategy::Default, 1, "all", 1, false, false, OutputLayout::InPlace)
            .await
            .unwrap();
        assert_eq!(run.total_tasks, 1);
        assert_eq!(run.status, RunStatus::Queued);

        let mut attempts = 0;
        loop {
            let reloaded = store.get_run(&run.id).await.unwrap();
            if reloaded.status.is_terminal() || attempts > 200 {
                assert_eq!(reloaded.status, RunStatus::Completed, "run should finish successfully");
                break;
            }
            attempts += 1;
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn submit_run_rejects_unknown_model() {
        let tmp = tempfile::tempdir().unwrap();
        let (_store, manager, sb_id) = harness(tmp.path()).await;
        let err = manager.submit_run(&sb_id, "nonexistent", RoutingStrategy::Default, 1, "all", 1, false, false, OutputLayout::InPlace).await.unwrap_err();
        assert!(matches!(err, RunManagerError::Domain(DomainError::NotFound { entity: "Model", .. })));
    }

    #[tokio::test]
    async fn submit_run_rejects_empty_range_selection() {
        let tmp = tempfile::tempdir().unwrap();
        let (_store, manager, sb_id) = harness(tmp.path()).await;
        let err = manager.submit_run(&sb_id, "standard", RoutingStrategy::Default, 1, "99", 1, false, false, OutputLayout::InPlace).await.unwrap_err();
        assert!(matches!(err, RunManagerError::Domain(DomainError::ValidationFailed(_))));
    }

    #[tokio::test]
    async fn retry_task_requeues_and_completes() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, manager, sb_id) = harness(tmp.path()).await;

        let run = manager.submit_run(&sb_id, "standard", RoutingStrategy::Default, 1, "all", 1, false, false, OutputLayout::InPlace).await.unwrap();
        let task_id = run.task_ids[0].clone();

        let mut attempts = 0;
        loop {
            let reloaded = store.get_task(&task_id).await.unwrap();
            if reloaded.status.is_terminal() || attempts > 200 {
                break;
            }
            attempts += 1;
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        store
            .update_task(&task_id, |t| {
                let _ = t.transition_to(TaskStatus::Running);
                let _ = t.transition_to(TaskStatus::Failed);
                t.error_code = Some("timeout".to_string());
            })
            .await
            .unwrap();
        store.recount_run(&run.id).await.unwrap();

        let retried = manager.retry_task(&task_id).await.unwrap();
        assert_eq!(retried.status, TaskStatus::Queued);

        let run_after = store.get_run(&run.id).await.unwrap();
        assert_eq!(run_after.status, RunStatus::Running);

        let mut attempts = 0;
        loop {
            let reloaded = store.get_run(&run.id).await.unwrap();
            if reloaded.status.is_terminal() || attempts > 200 {
                assert_eq!(reloaded.status, RunStatus::Completed);
                break;
            }
            attempts += 1;
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[test]
    fn uniform_head_requires_matching_first_candidate() {
        let a = vec![Candidate { provider_id: "p1".to_string(), provider_model_id: "m1".to_string() }];
        let b = vec![Candidate { provider_id: "p1".to_string(), provider_model_id: "m1".to_string() }];
        assert_eq!(uniform_head([a.as_slice(), b.as_slice()].into_iter()), Some(("p1".to_string(), "m1".to_string())));

        let c = vec![Candidate { provider_id: "p2".to_string(), provider_model_id: "m2".to_string() }];
        assert_eq!(uniform_head([a.as_slice(), c.as_slice()].into_iter()), None);

        let empty: Vec<Candidate> = vec![];
        assert_eq!(uniform_head([empty.as_slice()].into_iter()), None);
    }
}
