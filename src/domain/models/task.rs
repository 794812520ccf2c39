//! Task: one generation attempt for one (segment, version_index) pair.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};

/// Lifecycle status of a single generation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Running,
    Completed,
    Failed,
    DownloadFailed,
}

impl TaskStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::DownloadFailed => "download_failed",
        }
    }

    /// Terminal statuses are the only ones that may appear on a Run's
    /// aggregate counters and the only ones that require a metadata file.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::DownloadFailed)
    }

    /// Statuses reachable from `self` in one step. `retry_task` is the one
    /// operation that bypasses this table (it resets a terminal task back to
    /// `Queued` directly, clearing error fields as it goes).
    #[must_use]
    pub const fn valid_transitions(self) -> &'static [Self] {
        match self {
            Self::Queued => &[Self::Running],
            Self::Running => &[Self::Completed, Self::Failed, Self::DownloadFailed],
            Self::Completed | Self::Failed | Self::DownloadFailed => &[],
        }
    }

    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        self.valid_transitions().contains(&next)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One generation attempt for one (segment, version).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub run_id: String,
    pub segment_id: String,
    pub segment_index: i64,
    pub version_index: u32,
    pub output_dir: std::path::PathBuf,
    pub status: TaskStatus,
    pub provider_id: Option<String>,
    pub provider_model_id: Option<String>,
    pub video_path: Option<std::path::PathBuf>,
    pub metadata_path: Option<std::path::PathBuf>,
    pub video_url: Option<String>,
    pub full_prompt: Option<String>,
    pub error_msg: Option<String>,
    pub error_code: Option<String>,
    pub retryable: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    #[must_use]
    pub fn new(run_id: impl Into<String>, segment_id: impl Into<String>, segment_index: i64, version_index: u32, output_dir: std::path::PathBuf) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            run_id: run_id.into(),
            segment_id: segment_id.into(),
            segment_index,
            version_index,
            output_dir,
            status: TaskStatus::Queued,
            provider_id: None,
            provider_model_id: None,
            video_path: None,
            metadata_path: None,
            video_url: None,
            full_prompt: None,
            error_msg: None,
            error_code: None,
            retryable: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Validate and apply a state transition through the state machine.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidTransition` if `next` is not reachable
    /// from the current status.
    pub fn transition_to(&mut self, next: TaskStatus) -> DomainResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidTransition {
                entity: "Task",
                id: self.id.clone(),
                from: self.status.as_str().to_string(),
                to: next.as_str().to_string(),
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Reset a terminal task back to `queued`, clearing error fields.
    /// This is the one operation that bypasses `valid_transitions`: it is
    /// only invoked from the explicit `retry_task` command and is logged
    /// at `warn` by the caller since it deliberately skips the normal
    /// forward-only path.
    pub fn reset_for_retry(&mut self) {
        self.status = TaskStatus::Queued;
        self.error_msg = None;
        self.error_code = None;
        self.retryable = None;
        self.video_url = None;
        self.updated_at = Utc::now();
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_task() -> Task {
        Task::new("run-1", "seg-1", 1, 1, std::path::PathBuf::from("/tmp/out"))
    }

    #[test]
    fn new_task_starts_queued() {
        let task = new_task();
        assert_eq!(task.status, TaskStatus::Queued);
        assert!(!task.is_terminal());
    }

    #[test]
    fn queued_to_running_is_valid() {
        let mut task = new_task();
        assert!(task.transition_to(TaskStatus::Running).is_ok());
        assert_eq!(task.status, TaskStatus::Running);
    }

    #[test]
    fn queued_to_completed_is_invalid() {
        let mut task = new_task();
        let err = task.transition_to(TaskStatus::Completed).unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { .. }));
        assert_eq!(task.status, TaskStatus::Queued);
    }

    #[test]
    fn running_to_each_terminal_is_valid() {
        for terminal in [TaskStatus::Completed, TaskStatus::Failed, TaskStatus::DownloadFailed] {
            let mut task = new_task();
            task.transition_to(TaskStatus::Running).unwrap();
            assert!(task.transition_to(terminal).is_ok());
            assert!(task.is_terminal());
        }
    }

    #[test]
    fn terminal_statuses_accept_no_further_transitions() {
        for terminal in [TaskStatus::Completed, TaskStatus::Failed, TaskStatus::DownloadFailed] {
            let mut task = new_task();
            task.transition_to(TaskStatus::Running).unwrap();
            task.transition_to(terminal).unwrap();
            assert!(task.transition_to(TaskStatus::Running).is_err());
        }
    }

    #[test]
    fn reset_for_retry_clears_error_fields_and_requeues() {
        let mut task = new_task();
        task.transition_to(TaskStatus::Running).unwrap();
        task.transition_to(TaskStatus::Failed).unwrap();
        task.error_msg = Some("boom".to_string());
        task.error_code = Some("server_error".to_string());
        task.retryable = Some(true);

        task.reset_for_retry();

        assert_eq!(task.status, TaskStatus::Queued);
        assert!(task.error_msg.is_none());
        assert!(task.error_code.is_none());
        assert!(task.retryable.is_none());
    }
}
