//! OpenAI-style provider client: JSON body, bearer-token auth (§4.4).

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::sora_hk::download_to_path;
use super::{validate_capabilities, ProviderWireConfig};
use crate::domain::models::ProviderCapabilities;
use crate::domain::ports::{ProviderClient, ProviderError, ProviderTaskState, ProviderTaskStatus};

pub struct OpenAiProvider {
    http: reqwest::Client,
    wire: ProviderWireConfig,
    capabilities: ProviderCapabilities,
}

impl OpenAiProvider {
    #[must_use]
    pub fn new(http: reqwest::Client, wire: ProviderWireConfig, capabilities: ProviderCapabilities) -> Self {
        Self { http, wire, capabilities }
    }
}

#[derive(Debug, Serialize)]
struct CreateRequest<'a> {
    prompt: &'a str,
    seconds: u32,
    size: &'a str,
    hd: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    input_reference: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    id: String,
}

#[derive(Debug, Deserialize, Clone)]
struct StatusResponse {
    status: String,
    #[serde(default)]
    progress: u8,
    #[serde(default)]
    video_url: Option<String>,
    #[serde(default)]
    failure_reason: Option<String>,
}

fn normalize_status(status: &str) -> ProviderTaskState {
    match status {
        "completed" => ProviderTaskState::Completed,
        "failed" | "cancelled" => ProviderTaskState::Failed,
        _ => ProviderTaskState::Running,
    }
}

#[async_trait]
impl ProviderClient for OpenAiProvider {
    fn provider_id(&self) -> &str {
        "openai"
    }

    async fn create_task(&self, prompt: &str, duration: u32, resolution: &str, is_pro: bool, image_url: Option<&str>) -> Result<String, ProviderError> {
        validate_capabilities(&self.capabilities, duration, resolution, is_pro, image_url)?;

        let body = CreateRequest { prompt, seconds: duration, size: resolution, hd: is_pro, input_reference: image_url };

        let response = self
            .http
            .post(format!("{}/v1/videos", self.wire.base_url))
            .bearer_auth(&self.wire.api_key)
            .timeout(self.wire.request_timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Rejected(format!("openai create_task {status}: {text}")));
        }

        let parsed: CreateResponse = response.json().await.map_err(|e| ProviderError::Transport(e.to_string()))?;
        Ok(parsed.id)
    }

    async fn get_task(&self, provider_task_id: &str) -> Result<ProviderTaskStatus, ProviderError> {
        let response = self
            .http
            .get(format!("{}/v1/videos/{provider_task_id}", self.wire.base_url))
            .bearer_auth(&self.wire.api_key)
            .timeout(self.wire.request_timeout)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Transport(format!("openai get_task {status}: {text}")));
        }

        let parsed: StatusResponse = response.json().await.map_err(|e| ProviderError::Transport(e.to_string()))?;
        let raw = serde_json::to_value(&parsed).unwrap_or_default();
        Ok(ProviderTaskStatus { state: normalize_status(&parsed.status), progress: parsed.progress, video_url: parsed.video_url, error_msg: parsed.failure_reason, raw })
    }

    async fn download_video(&self, _provider_task_id: &str, video_url: Option<&str>, dest_path: &Path) -> Result<bool, ProviderError> {
        let Some(url) = video_url else {
            return Ok(false);
        };
        download_to_path(&self.http, url, dest_path, self.wire.download_timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_vendor_statuses() {
        assert!(matches!(normalize_status("in_progress"), ProviderTaskState::Running));
        assert!(matches!(normalize_status("completed"), ProviderTaskState::Completed));
        assert!(matches!(normalize_status("failed"), ProviderTaskState::Failed));
        assert!(matches!(normalize_status("cancelled"), ProviderTaskState::Failed));
    }
}
