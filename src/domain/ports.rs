//! Ports: the trait boundary between the core and external collaborators.
//!
//! One async trait hides wire differences between vendors behind a uniform
//! capability set (§4.4).

use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use thiserror::Error;

/// Normalized status of a provider-side generation job (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderTaskState {
    Running,
    Completed,
    Failed,
}

/// Result of polling a provider task, normalized across vendors.
#[derive(Debug, Clone)]
pub struct ProviderTaskStatus {
    pub state: ProviderTaskState,
    pub progress: u8,
    pub video_url: Option<String>,
    pub error_msg: Option<String>,
    /// The provider's raw response, preserved for the metadata file (§6).
    pub raw: Value,
}

/// Errors a provider client can raise. The `message` carried by each variant
/// is what flows into the Error Classifier (§4.7); the variant itself is a
/// coarse transport/validation split that provider implementations use
/// before ever reaching the classifier (e.g. to reject an unsupported
/// duration locally, without a wire round-trip).
#[derive(Debug, Error, Clone)]
pub enum ProviderError {
    #[error("{0}")]
    Rejected(String),
    #[error("{0}")]
    Transport(String),
    #[error("unsupported duration/resolution combination for this provider: {0}")]
    UnsupportedCapability(String),
}

impl ProviderError {
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }
}

/// Uniform `create / poll / download` interface over heterogeneous vendors
/// (§4.4). Every concrete provider (`SoraHkProvider`, `OpenAiProvider`,
/// `AiHubMixProvider`, `MockProvider`) implements this trait; callers hold
/// `Arc<dyn ProviderClient>` and never see the vendor-specific wire format.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Stable identifier used for routing and logging (matches the
    /// `Provider.id` record in the Store).
    fn provider_id(&self) -> &str;

    /// Submit a generation job. Fails locally (without a wire call) if the
    /// requested duration/resolution is outside this provider's advertised
    /// capabilities.
    async fn create_task(
        &self,
        prompt: &str,
        duration: u32,
        resolution: &str,
        is_pro: bool,
        image_url: Option<&str>,
    ) -> Result<String, ProviderError>;

    /// Poll a submitted job for its current normalized status.
    async fn get_task(&self, provider_task_id: &str) -> Result<ProviderTaskStatus, ProviderError>;

    /// Stream the finished artifact to `dest_path` atomically: write to a
    /// `.tmp` sibling, then rename on success (§6, §9).
    async fn download_video(&self, provider_task_id: &str, video_url: Option<&str>, dest_path: &Path) -> Result<bool, ProviderError>;
}
