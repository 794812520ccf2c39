//! Task Worker: the per-job create -> poll -> download -> persist state
//! machine (§4.6).
//!
//! One explicit `TaskStatus` state machine, bounded submission attempts,
//! and a single classification point shared between the create and poll
//! error paths.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::time::sleep;

use crate::domain::models::run::RoutingStrategy;
use crate::domain::models::storyboard::Segment;
use crate::domain::models::{Task, TaskStatus};
use crate::domain::ports::{ProviderTaskState, ProviderTaskStatus};
use crate::services::error_classifier::{Classification, ErrorClassifier, ErrorKind};
use crate::services::governor::Governor;
use crate::services::layout::{artifact_base_name, find_existing_artifact};
use crate::services::metadata::{write_metadata_atomic, TaskMetadata};
use crate::services::prompt_assembly::build_full_prompt;
use crate::services::provider_router::Candidate;
use crate::services::store::Store;

use crate::adapters::providers::ProviderRegistry;

/// Tunables governing the submit/poll loop (§6).
#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    pub poll_initial_wait: Duration,
    pub poll_interval: Duration,
    pub max_poll_time: Duration,
    pub submit_attempts_per_candidate: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_initial_wait: Duration::from_secs(20),
            poll_interval: Duration::from_secs(10),
            max_poll_time: Duration::from_secs(2_100),
            submit_attempts_per_candidate: 3,
        }
    }
}

/// Everything the worker needs to drive one Task to a terminal status.
/// Built by the Run Manager for a fresh submission or a retry (§4.8).
pub struct TaskContext {
    pub task: Task,
    pub segment: Segment,
    pub candidates: Vec<Candidate>,
    pub routing_strategy: RoutingStrategy,
    pub dry_run: bool,
    pub force: bool,
    pub source_file: String,
    /// Retried tasks reconcile the Run's counters with `recount_run` instead
    /// of `increment_run_counts`, which only tolerates one call per task
    /// (§4.2, §4.8).
    pub is_retry: bool,
}

pub struct TaskWorker {
    store: Arc<Store>,
    governor: Arc<Governor>,
    classifier: Arc<ErrorClassifier>,
    providers: Arc<ProviderRegistry>,
    config: WorkerConfig,
}

impl TaskWorker {
    #[must_use]
    pub fn new(store: Arc<Store>, governor: Arc<Governor>, classifier: Arc<ErrorClassifier>, providers: Arc<ProviderRegistry>, config: WorkerConfig) -> Arc<Self> {
        Arc::new(Self { store, governor, classifier, providers, config })
    }

    /// Drive `ctx.task` through the state machine to a terminal status,
    /// writing metadata and persisting the Run's aggregate counters along
    /// the way. Always returns the final persisted Task.
    pub async fn execute(&self, ctx: TaskContext) -> Task {
        let TaskContext { mut task, segment, candidates, routing_strategy, dry_run, force, source_file, is_retry } = ctx;

        let _permit = self.governor.acquire().await;
        tracing::debug!(task_id = %task.id, run_id = %task.run_id, "acquired governor permit");

        let full_prompt = build_full_prompt(&segment);
        task = self
            .store
            .update_task(&task.id, |t| {
                let _ = t.transition_to(TaskStatus::Running);
                t.full_prompt = Some(full_prompt.clone());
            })
            .await
            .unwrap_or(task);

        let base_name = artifact_base_name(task.segment_index, task.version_index, chrono::Utc::now(), &task.id);
        let video_path = task.output_dir.join(format!("{base_name}.mp4"));
        let json_path = task.output_dir.join(format!("{base_name}.json"));

        if !force {
            if let Some(existing) = find_existing_artifact(&task.output_dir, task.segment_index, task.version_index) {
                return self.finish_skip(task, &full_prompt, &source_file, existing, is_retry).await;
            }
        }

        if dry_run {
            return self.finish_dry_run(task, is_retry).await;
        }

        if candidates.is_empty() {
            let classification = Classification { kind: ErrorKind::NoProvider, retryable: false };
            return self.finish_failed(task, &full_prompt, &source_file, &json_path, "no eligible provider for this task", classification, is_retry).await;
        }

        let mut candidates = candidates.into_iter().peekable();
        let mut last_classification = Classification { kind: ErrorKind::UnknownError, retryable: false };
        let mut last_message = String::new();

        'candidates: while let Some(candidate) = candidates.next() {
            let Some(client) = self.providers.get(&candidate.provider_id) else {
                last_message = format!("no registered client for provider '{}'", candidate.provider_id);
                last_classification = Classification { kind: ErrorKind::NoProvider, retryable: false };
                continue;
            };

            task = self
                .store
                .update_task(&task.id, |t| {
                    t.provider_id = Some(candidate.provider_id.clone());
                    t.provider_model_id = Some(candidate.provider_model_id.clone());
                })
                .await
                .unwrap_or(task);

            let mut provider_task_id: Option<String> = None;
            for attempt in 1..=self.config.submit_attempts_per_candidate {
                sleep(jitter(0.5, 3.0)).await;

                match client
                    .create_task(&full_prompt, segment.duration_seconds, segment.resolution.as_str(), segment.is_pro, segment.image_url.as_deref())
                    .await
                {
                    Ok(id) => {
                        self.governor.report_success();
                        tracing::info!(task_id = %task.id, run_id = %task.run_id, provider_id = %candidate.provider_id, attempt, "submitted generation job");
                        provider_task_id = Some(id);
                        break;
                    }
                    Err(e) => {
                        self.governor.report_error();
                        let classification = self.classifier.classify(&e.message());
                        tracing::warn!(task_id = %task.id, provider_id = %candidate.provider_id, attempt, error = %e.message(), retryable = classification.retryable, "create_task failed");
                        last_message = e.message();
                        last_classification = classification;
                        if classification.retryable && attempt < self.config.submit_attempts_per_candidate {
                            sleep(jitter(2.0, 5.0)).await;
                            continue;
                        }
                        break;
                    }
                }
            }

            let Some(provider_task_id) = provider_task_id else {
                if should_switch_candidate(routing_strategy, last_classification, candidates.peek().is_some()) {
                    continue 'candidates;
                }
                return self.finish_failed(task, &full_prompt, &source_file, &json_path, &last_message, last_classification, is_retry).await;
            };

            sleep(self.config.poll_initial_wait).await;
            let started = Instant::now();

            loop {
                if started.elapsed() > self.config.max_poll_time {
                    last_classification = Classification { kind: ErrorKind::Timeout, retryable: true };
                    last_message = "polling exceeded max_poll_time".to_string();
                    break;
                }

                match client.get_task(&provider_task_id).await {
                    Ok(status) => match status.state {
                        ProviderTaskState::Running => {
                            sleep(self.config.poll_interval).await;
                            continue;
                        }
                        ProviderTaskState::Completed => {
                            if let Some(video_url) = status.video_url.clone() {
                                return self
                                    .finish_completed(task, &full_prompt, &source_file, &video_path, &json_path, &video_url, status, client.as_ref(), &provider_task_id, is_retry)
                                    .await;
                            }
                            let classification = Classification { kind: ErrorKind::UnknownError, retryable: false };
                            return self.finish_failed(task, &full_prompt, &source_file, &json_path, "missing video_url", classification, is_retry).await;
                        }
                        ProviderTaskState::Failed => {
                            let message = status.error_msg.clone().unwrap_or_else(|| "provider reported failure".to_string());
                            last_classification = self.classifier.classify(&message);
                            last_message = message;
                            break;
                        }
                    },
                    Err(e) => {
                        tracing::debug!(task_id = %task.id, provider_id = %candidate.provider_id, error = %e.message(), "poll transport error, retrying");
                        sleep(self.config.poll_interval).await;
                        continue;
                    }
                }
            }

            if should_switch_candidate(routing_strategy, last_classification, candidates.peek().is_some()) {
                tracing::info!(task_id = %task.id, provider_id = %candidate.provider_id, "candidate switch after retryable failure");
                continue 'candidates;
            }
            return self.finish_failed(task, &full_prompt, &source_file, &json_path, &last_message, last_classification, is_retry).await;
        }

        self.finish_failed(task, &full_prompt, &source_file, &json_path, &last_message, last_classification, is_retry).await
    }

    async fn finish_skip(&self, task: Task, full_prompt: &str, source_file: &str, existing: PathBuf, is_retry: bool) -> Task {
        let json_path = existing.with_extension("json");
        let metadata = TaskMetadata {
            full_prompt: full_prompt.to_string(),
            local_task_id: task.id.clone(),
            source_file: source_file.to_string(),
            segment_index: task.segment_index,
            version_index: task.version_index,
            local_status: "completed",
            error_msg: None,
            error_code: None,
            retryable: None,
            download_status: Some("skipped".to_string()),
            provider: serde_json::json!({"skipped": true}),
        };
        if let Err(e) = write_metadata_atomic(&json_path, &metadata) {
            tracing::warn!(task_id = %task.id, error = %e, "failed to write skip metadata");
        }

        let updated = self
            .store
            .update_task(&task.id, |t| {
                let _ = t.transition_to(TaskStatus::Completed);
                t.video_path = Some(existing.clone());
                t.metadata_path = Some(json_path.clone());
            })
            .await
            .unwrap_or(task);

        self.commit_terminal(&updated.run_id, TaskStatus::Completed, is_retry).await;
        updated
    }

    async fn finish_dry_run(&self, task: Task, is_retry: bool) -> Task {
        let updated = self
            .store
            .update_task(&task.id, |t| {
                let _ = t.transition_to(TaskStatus::Completed);
            })
            .await
            .unwrap_or(task);

        self.commit_terminal(&updated.run_id, TaskStatus::Completed, is_retry).await;
        updated
    }

    #[allow(clippy::too_many_arguments)]
    async fn finish_completed(
        &self,
        task: Task,
        full_prompt: &str,
        source_file: &str,
        video_path: &PathBuf,
        json_path: &PathBuf,
        video_url: &str,
        status: ProviderTaskStatus,
        client: &(dyn crate::domain::ports::ProviderClient + '_),
        provider_task_id: &str,
        is_retry: bool,
    ) -> Task {
        if let Some(parent) = video_path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::error!(task_id = %task.id, error = %e, "failed to create output directory");
            }
        }

        let download_result = client.download_video(provider_task_id, Some(video_url), video_path).await;

        match download_result {
            Ok(true) => {
                let metadata = TaskMetadata {
                    full_prompt: full_prompt.to_string(),
                    local_task_id: task.id.clone(),
                    source_file: source_file.to_string(),
                    segment_index: task.segment_index,
                    version_index: task.version_index,
                    local_status: "completed",
                    error_msg: None,
                    error_code: None,
                    retryable: None,
                    download_status: Some("ok".to_string()),
                    provider: status.raw.clone(),
                };
                if let Err(e) = write_metadata_atomic(json_path, &metadata) {
                    tracing::error!(task_id = %task.id, error = %e, "failed to write completed metadata");
                }

                let updated = self
                    .store
                    .update_task(&task.id, |t| {
                        let _ = t.transition_to(TaskStatus::Completed);
                        t.video_path = Some(video_path.clone());
                        t.metadata_path = Some(json_path.clone());
                        t.video_url = Some(video_url.to_string());
                    })
                    .await
                    .unwrap_or(task);

                self.commit_terminal(&updated.run_id, TaskStatus::Completed, is_retry).await;
                updated
            }
            Ok(false) | Err(_) => {
                let metadata = TaskMetadata {
                    full_prompt: full_prompt.to_string(),
                    local_task_id: task.id.clone(),
                    source_file: source_file.to_string(),
                    segment_index: task.segment_index,
                    version_index: task.version_index,
                    local_status: "download_failed",
                    error_msg: Some("download failed".to_string()),
                    error_code: Some(ErrorKind::DownloadFailed.as_str().to_string()),
                    retryable: Some(false),
                    download_status: Some("failed".to_string()),
                    provider: status.raw.clone(),
                };
                if let Err(e) = write_metadata_atomic(json_path, &metadata) {
                    tracing::error!(task_id = %task.id, error = %e, "failed to write download_failed metadata");
                }

                let updated = self
                    .store
                    .update_task(&task.id, |t| {
                        let _ = t.transition_to(TaskStatus::DownloadFailed);
                        t.metadata_path = Some(json_path.clone());
                        t.video_url = Some(video_url.to_string());
                        t.error_msg = Some("download failed".to_string());
                        t.error_code = Some(ErrorKind::DownloadFailed.as_str().to_string());
                        t.retryable = Some(false);
                    })
                    .await
                    .unwrap_or(task);

                self.commit_terminal(&updated.run_id, TaskStatus::DownloadFailed, is_retry).await;
                updated
            }
        }
    }

    async fn finish_failed(&self, task: Task, full_prompt: &str, source_file: &str, json_path: &PathBuf, message: &str, classification: Classification, is_retry: bool) -> Task {
        let metadata = TaskMetadata {
            full_prompt: full_prompt.to_string(),
            local_task_id: task.id.clone(),
            source_file: source_file.to_string(),
            segment_index: task.segment_index,
            version_index: task.version_index,
            local_status: "failed",
            error_msg: Some(message.to_string()),
            error_code: Some(classification.kind.as_str().to_string()),
            retryable: Some(classification.retryable),
            download_status: None,
            provider: serde_json::Value::Null,
        };
        if let Some(parent) = json_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(e) = write_metadata_atomic(json_path, &metadata) {
            tracing::error!(task_id = %task.id, error = %e, "failed to write failed metadata");
        }

        let updated = self
            .store
            .update_task(&task.id, |t| {
                let _ = t.transition_to(TaskStatus::Failed);
                t.metadata_path = Some(json_path.clone());
                t.error_msg = Some(message.to_string());
                t.error_code = Some(classification.kind.as_str().to_string());
                t.retryable = Some(classification.retryable);
            })
            .await
            .unwrap_or(task);

        self.commit_terminal(&updated.run_id, TaskStatus::Failed, is_retry).await;
        updated
    }

    async fn commit_terminal(&self, run_id: &str, status: TaskStatus, is_retry: bool) {
        let result = if is_retry { self.store.recount_run(run_id).await } else { self.store.increment_run_counts(run_id, status).await };
        if let Err(e) = result {
            tracing::error!(run_id = %run_id, error = %e, "failed to persist run aggregate counters");
        }
    }

    /// Recovery path for a worker future that panicked before reaching a
    /// terminal status (§7 "Cross-process"): marks the task `failed` with a
    /// generic message, reports the failure to the Governor, and reconciles
    /// the Run's counters the same way any other terminal write would.
    ///
    /// A no-op if the task had already reached a terminal status before the
    /// panic unwound (avoids double-counting against the Run).
    pub async fn recover_from_panic(&self, task_id: &str, run_id: &str, is_retry: bool) {
        self.governor.report_error();
        let Ok(updated) = self
            .store
            .update_task(task_id, |t| {
                if t.transition_to(TaskStatus::Failed).is_ok() {
                    t.error_msg = Some("worker task panicked before reaching a terminal status".to_string());
                    t.error_code = Some(ErrorKind::UnknownError.as_str().to_string());
                    t.retryable = Some(false);
                }
            })
            .await
        else {
            tracing::error!(task_id = %task_id, run_id = %run_id, "panic recovery could not locate task");
            return;
        };

        if updated.status != TaskStatus::Failed {
            // Already terminal (or the panic happened post-transition);
            // counters were already committed by whichever path got there first.
            return;
        }
        self.commit_terminal(run_id, TaskStatus::Failed, is_retry).await;
    }
}

/// Candidate switch is only permitted under `failover`, never after a
/// `download_failed` classification, only for retryable failures, and only
/// when another candidate remains (§4.6 step 5).
fn should_switch_candidate(routing_strategy: RoutingStrategy, classification: Classification, another_remains: bool) -> bool {
    routing_strategy.effective() == RoutingStrategy::Failover && classification.kind != ErrorKind::DownloadFailed && classification.retryable && another_remains
}

fn jitter(min_secs: f64, max_secs: f64) -> Duration {
    let secs = rand::thread_rng().gen_range(min_secs..max_secs);
    Duration::from_secs_f64(secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::providers::MockProvider;
    use crate::domain::models::provider::ProviderCapabilities;
    use crate::domain::models::storyboard::Resolution;

    fn segment() -> Segment {
        Segment {
            segment_index: 1,
            prompt_text: "a cat".to_string(),
            image_url: None,
            duration_seconds: 10,
            resolution: Resolution::Horizontal,
            is_pro: false,
            director_intent: None,
            asset: None,
        }
    }

    fn capabilities() -> ProviderCapabilities {
        ProviderCapabilities { supports_image_to_video: true, supported_durations: vec![10], supported_resolutions: vec!["horizontal".to_string()], supports_pro: false }
    }

    fn fast_config() -> WorkerConfig {
        WorkerConfig { poll_initial_wait: Duration::from_millis(1), poll_interval: Duration::from_millis(1), max_poll_time: Duration::from_millis(200), submit_attempts_per_candidate: 3 }
    }

    async fn harness(outcome: crate::adapters::providers::mock::MockOutcome) -> (Arc<Store>, Task) {
        let store = Store::new();
        let task = Task::new("run-1", "1", 1, 1, std::path::PathBuf::from("/tmp/vidforge-worker-test"));
        let run = crate::domain::models::Run::new(
            "sb-1",
            crate::domain::models::RunConfig {
                model_id: "standard".to_string(),
                routing_strategy: RoutingStrategy::Default,
                gen_count: 1,
                concurrency: 1,
                dry_run: false,
                force: false,
                output_layout: crate::domain::models::OutputLayout::InPlace,
            },
            vec![task.id.clone()],
        );
        store.create_run_with_tasks(run, vec![task.clone()]).await;

        let provider = MockProvider::new("p1".to_string(), capabilities());
        let provider_task_id = provider.create_task("x", 10, "horizontal", false, None).await.unwrap();
        provider.script(provider_task_id, outcome);

        let governor = Governor::new(crate::services::governor::GovernorConfig::default());
        let classifier = Arc::new(ErrorClassifier::default());
        let mut clients = std::collections::HashMap::new();
        clients.insert("p1".to_string(), Arc::new(provider) as Arc<dyn crate::domain::ports::ProviderClient>);
        let providers = Arc::new(ProviderRegistry::new(clients));
        let worker = TaskWorker::new(Arc::clone(&store), governor, classifier, providers, fast_config());

        let ctx = TaskContext {
            task: task.clone(),
            segment: segment(),
            candidates: vec![Candidate { provider_id: "p1".to_string(), provider_model_id: "pm1".to_string() }],
            routing_strategy: RoutingStrategy::Default,
            dry_run: false,
            force: false,
            source_file: "sb.json".to_string(),
            is_retry: false,
        };

        let finished = worker.execute(ctx).await;
        (store, finished)
    }

    #[tokio::test]
    async fn completed_outcome_persists_video_and_metadata() {
        let (store, finished) = harness(crate::adapters::providers::mock::MockOutcome::Completed { video_url: "https://mock.invalid/v.mp4".to_string() }).await;
        assert_eq!(finished.status, TaskStatus::Completed);
        assert!(finished.video_path.is_some());
        assert!(finished.metadata_path.is_some());
        let run = store.get_run(&finished.run_id).await.unwrap();
        assert_eq!(run.completed, 1);
        let _ = std::fs::remove_dir_all("/tmp/vidforge-worker-test");
    }

    #[tokio::test]
    async fn failed_outcome_classifies_and_marks_run_failed() {
        let (store, finished) = harness(crate::adapters::providers::mock::MockOutcome::Failed { message: "content policy violation".to_string() }).await;
        assert_eq!(finished.status, TaskStatus::Failed);
        assert_eq!(finished.error_code.as_deref(), Some("content_policy"));
        assert_eq!(finished.retryable, Some(false));
        let run = store.get_run(&finished.run_id).await.unwrap();
        assert_eq!(run.failed, 1);
    }
}
