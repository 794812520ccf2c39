//! Run: a batch execution over a segment selection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};

/// Lifecycle status of a Run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    Running,
    Completed,
    Failed,
    DownloadFailed,
}

impl RunStatus {
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

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::DownloadFailed)
    }
}

/// Provider-selection algorithm requested for a run. Only the first three
/// variants change candidate ordering (§4.5); the rest degrade to `Default`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingStrategy {
    Default,
    Failover,
    Weighted,
    Manual,
    Cost,
    Latency,
    Quota,
}

impl RoutingStrategy {
    /// Routing strategies that do not change candidate ordering behave
    /// exactly as `Default` (§4.5 step 4).
    #[must_use]
    pub const fn effective(self) -> Self {
        match self {
            Self::Default | Self::Failover | Self::Weighted => self,
            Self::Manual | Self::Cost | Self::Latency | Self::Quota => Self::Default,
        }
    }
}

/// Where generated artifacts are written (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OutputLayout {
    Centralized { output_root: std::path::PathBuf },
    InPlace,
    Custom { path: std::path::PathBuf },
}

/// Immutable snapshot of the parameters a Run was submitted with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub model_id: String,
    pub routing_strategy: RoutingStrategy,
    pub gen_count: u32,
    pub concurrency: u32,
    pub dry_run: bool,
    pub force: bool,
    pub output_layout: OutputLayout,
}

impl RunConfig {
    /// Enforce the bounds from §4.1.
    ///
    /// # Errors
    /// Returns `DomainError::ValidationFailed` if `gen_count` or
    /// `concurrency` fall outside their allowed ranges, or if a `Custom`
    /// output layout was requested without a path.
    pub fn validate(&self) -> DomainResult<()> {
        if !(1..=10).contains(&self.gen_count) {
            return Err(DomainError::ValidationFailed(format!("gen_count must be 1..=10, got {}", self.gen_count)));
        }
        if !(1..=50).contains(&self.concurrency) {
            return Err(DomainError::ValidationFailed(format!("concurrency must be 1..=50, got {}", self.concurrency)));
        }
        if let OutputLayout::Custom { path } = &self.output_layout {
            if path.as_os_str().is_empty() {
                return Err(DomainError::ValidationFailed("custom output layout requires a path".to_string()));
            }
        }
        Ok(())
    }
}

/// A batch execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub storyboard_id: String,
    pub status: RunStatus,
    pub total_tasks: u32,
    pub completed: u32,
    pub failed: u32,
    pub download_failed: u32,
    pub created_at: DateTime<Utc>,
    pub config: RunConfig,
    pub provider_id: Option<String>,
    pub provider_model_id: Option<String>,
    pub task_ids: Vec<String>,
}

impl Run {
    #[must_use]
    pub fn new(storyboard_id: impl Into<String>, config: RunConfig, task_ids: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            storyboard_id: storyboard_id.into(),
            status: RunStatus::Queued,
            total_tasks: u32::try_from(task_ids.len()).unwrap_or(u32::MAX),
            completed: 0,
            failed: 0,
            download_failed: 0,
            created_at: Utc::now(),
            config,
            provider_id: None,
            provider_model_id: None,
            task_ids,
        }
    }

    /// Invariant (§3, §8-1): `completed + failed + download_failed <=
    /// total_tasks`, with equality iff the run is terminal.
    #[must_use]
    pub fn terminal_count(&self) -> u32 {
        self.completed + self.failed + self.download_failed
    }

    #[must_use]
    pub fn all_tasks_terminal(&self) -> bool {
        self.terminal_count() >= self.total_tasks
    }

    /// Finalize status once every child task has terminated (§4.8).
    pub fn finalize(&mut self) {
        self.status = if self.failed == 0 && self.download_failed == 0 {
            RunStatus::Completed
        } else {
            RunStatus::Failed
        };
    }
}
