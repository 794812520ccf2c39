//! In-memory `ProviderClient` used by tests and `dry_run` (§4.4).

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use crate::domain::models::ProviderCapabilities;
use crate::domain::ports::{ProviderClient, ProviderError, ProviderTaskState, ProviderTaskStatus};

/// Scripted outcome for one provider task id, set via
/// [`MockProvider::script`] before a test drives the worker.
#[derive(Debug, Clone)]
pub enum MockOutcome {
    Completed { video_url: String },
    Failed { message: String },
    /// Stay `running` until polled `remaining_polls` more times, then apply `then`.
    RunningThen { remaining_polls: u32, then: Box<MockOutcome> },
}

struct MockState {
    next_id: u64,
    scripted: HashMap<String, MockOutcome>,
    create_failures: Vec<ProviderError>,
    poll_counts: HashMap<String, u32>,
}

/// A provider client with no wire I/O: `create_task` always succeeds unless
/// a scripted failure is queued, `get_task` replays the scripted outcome,
/// `download_video` writes a fixed-size placeholder file.
pub struct MockProvider {
    id: String,
    capabilities: ProviderCapabilities,
    state: Mutex<MockState>,
}

impl MockProvider {
    #[must_use]
    pub fn new(id: String, capabilities: ProviderCapabilities) -> Self {
        Self { id, capabilities, state: Mutex::new(MockState { next_id: 0, scripted: HashMap::new(), create_failures: Vec::new(), poll_counts: HashMap::new() }) }
    }

    /// Queue `outcome` for the next `get_task` call(s) on a given provider
    /// task id (tests call `create_task` first to learn the id).
    pub fn script(&self, provider_task_id: impl Into<String>, outcome: MockOutcome) {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner).scripted.insert(provider_task_id.into(), outcome);
    }

    /// Queue a `create_task` failure to be returned on the next call(s), in
    /// FIFO order, before falling back to success.
    pub fn queue_create_failure(&self, error: ProviderError) {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner).create_failures.push(error);
    }
}

#[async_trait]
impl ProviderClient for MockProvider {
    fn provider_id(&self) -> &str {
        &self.id
    }

    async fn create_task(&self, _prompt: &str, duration: u32, resolution: &str, is_pro: bool, _image_url: Option<&str>) -> Result<String, ProviderError> {
        if !self.capabilities.supported_durations.contains(&duration) || !self.capabilities.supported_resolutions.iter().any(|r| r == resolution) || (is_pro && !self.capabilities.supports_pro) {
            return Err(ProviderError::UnsupportedCapability(format!("duration={duration} resolution={resolution} is_pro={is_pro}")));
        }

        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if !state.create_failures.is_empty() {
            return Err(state.create_failures.remove(0));
        }
        state.next_id += 1;
        Ok(format!("mock-{}-{}", self.id, state.next_id))
    }

    async fn get_task(&self, provider_task_id: &str) -> Result<ProviderTaskStatus, ProviderError> {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let count = *state.poll_counts.entry(provider_task_id.to_string()).and_modify(|c| *c += 1).or_insert(1);

        let Some(outcome) = state.scripted.get(provider_task_id).cloned() else {
            return Ok(ProviderTaskStatus { state: ProviderTaskState::Completed, progress: 100, video_url: Some(format!("https://mock.invalid/{provider_task_id}.mp4")), error_msg: None, raw: json!({"mock": true}) });
        };
        drop(state);

        resolve_outcome(outcome, count)
    }

    async fn download_video(&self, _provider_task_id: &str, _video_url: Option<&str>, dest_path: &Path) -> Result<bool, ProviderError> {
        let tmp_path = dest_path.with_extension("mp4.tmp");
        std::fs::write(&tmp_path, b"mock-video-bytes").map_err(|e| ProviderError::Transport(e.to_string()))?;
        std::fs::rename(&tmp_path, dest_path).map_err(|e| ProviderError::Transport(e.to_string()))?;
        Ok(true)
    }
}

fn resolve_outcome(outcome: MockOutcome, poll_count: u32) -> Result<ProviderTaskStatus, ProviderError> {
    match outcome {
        MockOutcome::Completed { video_url } => Ok(ProviderTaskStatus { state: ProviderTaskState::Completed, progress: 100, video_url: Some(video_url), error_msg: None, raw: json!({"mock": true}) }),
        MockOutcome::Failed { message } => Ok(ProviderTaskStatus { state: ProviderTaskState::Failed, progress: 0, video_url: None, error_msg: Some(message), raw: json!({"mock": true}) }),
        MockOutcome::RunningThen { remaining_polls, then } => {
            if poll_count > remaining_polls {
                resolve_outcome(*then, poll_count)
            } else {
                Ok(ProviderTaskStatus { state: ProviderTaskState::Running, progress: 50, video_url: None, error_msg: None, raw: json!({"mock": true}) })
            }
        }
    }
}

/// A unique provider task id without a backing `MockProvider` instance, for
/// tests that only need an opaque identifier.
#[must_use]
pub fn fresh_task_id() -> String {
    Uuid::new_v4().to_string()
}
