//! AiHubMix provider client: JSON body, `x-api-key` auth (§4.4).

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::sora_hk::download_to_path;
use super::{validate_capabilities, ProviderWireConfig};
use crate::domain::models::ProviderCapabilities;
use crate::domain::ports::{ProviderClient, ProviderError, ProviderTaskState, ProviderTaskStatus};

pub struct AiHubMixProvider {
    http: reqwest::Client,
    wire: ProviderWireConfig,
    capabilities: ProviderCapabilities,
}

impl AiHubMixProvider {
    #[must_use]
    pub fn new(http: reqwest::Client, wire: ProviderWireConfig, capabilities: ProviderCapabilities) -> Self {
        Self { http, wire, capabilities }
    }
}

#[derive(Debug, Serialize)]
struct CreateRequest<'a> {
    prompt: &'a str,
    duration_seconds: u32,
    resolution: &'a str,
    pro_mode: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reference_image: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    task_id: String,
}

#[derive(Debug, Deserialize, Clone)]
struct StatusResponse {
    task_status: String,
    #[serde(default)]
    percent: u8,
    #[serde(default)]
    result_url: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

fn normalize_task_status(status: &str) -> ProviderTaskState {
    match status {
        "done" => ProviderTaskState::Completed,
        "error" => ProviderTaskState::Failed,
        _ => ProviderTaskState::Running,
    }
}

#[async_trait]
impl ProviderClient for AiHubMixProvider {
    fn provider_id(&self) -> &str {
        "aihubmix"
    }

    async fn create_task(&self, prompt: &str, duration: u32, resolution: &str, is_pro: bool, image_url: Option<&str>) -> Result<String, ProviderError> {
        validate_capabilities(&self.capabilities, duration, resolution, is_pro, image_url)?;

        let body = CreateRequest { prompt, duration_seconds: duration, resolution, pro_mode: is_pro, reference_image: image_url };

        let response = self
            .http
            .post(format!("{}/video/generate", self.wire.base_url))
            .header("x-api-key", &self.wire.api_key)
            .timeout(self.wire.request_timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Rejected(format!("aihubmix create_task {status}: {text}")));
        }

        let parsed: CreateResponse = response.json().await.map_err(|e| ProviderError::Transport(e.to_string()))?;
        Ok(parsed.task_id)
    }

    async fn get_task(&self, provider_task_id: &str) -> Result<ProviderTaskStatus, ProviderError> {
        let response = self
            .http
            .get(format!("{}/video/generate/{provider_task_id}", self.wire.base_url))
            .header("x-api-key", &self.wire.api_key)
            .timeout(self.wire.request_timeout)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Transport(format!("aihubmix get_task {status}: {text}")));
        }

        let parsed: StatusResponse = response.json().await.map_err(|e| ProviderError::Transport(e.to_string()))?;
        let raw = serde_json::to_value(&parsed).unwrap_or_default();
        Ok(ProviderTaskStatus { state: normalize_task_status(&parsed.task_status), progress: parsed.percent, video_url: parsed.result_url, error_msg: parsed.message, raw })
    }

    async fn download_video(&self, _provider_task_id: &str, video_url: Option<&str>, dest_path: &Path) -> Result<bool, ProviderError> {
        let Some(url) = video_url else {
            return Ok(false);
        };
        download_to_path(&self.http, url, dest_path, self.wire.download_timeout).await
    }
}
