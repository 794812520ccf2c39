//! Sora.hk provider client: JSON request/response, API-key bearer auth (§4.4).

use std::path::Path;

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use super::{validate_capabilities, ProviderWireConfig};
use crate::domain::models::ProviderCapabilities;
use crate::domain::ports::{ProviderClient, ProviderError, ProviderTaskState, ProviderTaskStatus};

pub struct SoraHkProvider {
    http: reqwest::Client,
    wire: ProviderWireConfig,
    capabilities: ProviderCapabilities,
}

impl SoraHkProvider {
    #[must_use]
    pub fn new(http: reqwest::Client, wire: ProviderWireConfig, capabilities: ProviderCapabilities) -> Self {
        Self { http, wire, capabilities }
    }
}

#[derive(Debug, Serialize)]
struct CreateRequest<'a> {
    prompt: &'a str,
    duration: u32,
    resolution: &'a str,
    is_pro: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_url: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    task_id: String,
}

#[derive(Debug, Deserialize, Clone)]
struct StatusResponse {
    state: String,
    #[serde(default)]
    progress: u8,
    #[serde(default)]
    video_url: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

fn normalize_state(state: &str) -> ProviderTaskState {
    match state {
        "succeeded" | "success" | "completed" => ProviderTaskState::Completed,
        "failed" | "error" => ProviderTaskState::Failed,
        _ => ProviderTaskState::Running,
    }
}

#[async_trait]
impl ProviderClient for SoraHkProvider {
    fn provider_id(&self) -> &str {
        "sora_hk"
    }

    async fn create_task(&self, prompt: &str, duration: u32, resolution: &str, is_pro: bool, image_url: Option<&str>) -> Result<String, ProviderError> {
        validate_capabilities(&self.capabilities, duration, resolution, is_pro, image_url)?;

        let body = CreateRequest { prompt, duration, resolution, is_pro, image_url };

        let response = self
            .http
            .post(format!("{}/api/v1/video/tasks", self.wire.base_url))
            .bearer_auth(&self.wire.api_key)
            .timeout(self.wire.request_timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Rejected(format!("sora_hk create_task {status}: {body}")));
        }

        let parsed: CreateResponse = response.json().await.map_err(|e| ProviderError::Transport(e.to_string()))?;
        Ok(parsed.task_id)
    }

    async fn get_task(&self, provider_task_id: &str) -> Result<ProviderTaskStatus, ProviderError> {
        let response = self
            .http
            .get(format!("{}/api/v1/video/tasks/{provider_task_id}", self.wire.base_url))
            .bearer_auth(&self.wire.api_key)
            .timeout(self.wire.request_timeout)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Transport(format!("sora_hk get_task {status}: {body}")));
        }

        let parsed: StatusResponse = response.json().await.map_err(|e| ProviderError::Transport(e.to_string()))?;
        let raw = serde_json::to_value(&parsed).unwrap_or_default();
        Ok(ProviderTaskStatus { state: normalize_state(&parsed.state), progress: parsed.progress, video_url: parsed.video_url, error_msg: parsed.error, raw })
    }

    async fn download_video(&self, _provider_task_id: &str, video_url: Option<&str>, dest_path: &Path) -> Result<bool, ProviderError> {
        let Some(url) = video_url else {
            return Ok(false);
        };
        download_to_path(&self.http, url, dest_path, self.wire.download_timeout).await
    }
}

/// Stream `url` into `dest_path` atomically, shared by every reqwest-backed
/// provider (§4.4, §9).
pub(super) async fn download_to_path(http: &reqwest::Client, url: &str, dest_path: &Path, timeout: std::time::Duration) -> Result<bool, ProviderError> {
    let tmp_path = dest_path.with_extension("mp4.tmp");
    let response = http.get(url).timeout(timeout).send().await.map_err(|e| ProviderError::Transport(e.to_string()))?;
    if !response.status().is_success() {
        return Ok(false);
    }

    let mut file = tokio::fs::File::create(&tmp_path).await.map_err(|e| ProviderError::Transport(e.to_string()))?;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(c) => c,
            Err(e) => {
                drop(file);
                let _ = tokio::fs::remove_file(&tmp_path).await;
                return Err(ProviderError::Transport(e.to_string()));
            }
        };
        if file.write_all(&chunk).await.is_err() {
            drop(file);
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Ok(false);
        }
    }
    drop(file);

    match tokio::fs::rename(&tmp_path, dest_path).await {
        Ok(()) => Ok(true),
        Err(_) => {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_unknown_vendor_status_to_running() {
        assert!(matches!(normalize_state("queued"), ProviderTaskState::Running));
        assert!(matches!(normalize_state("processing"), ProviderTaskState::Running));
        assert!(matches!(normalize_state("something_new"), ProviderTaskState::Running));
    }

    #[test]
    fn normalizes_success_and_failure_states() {
        assert!(matches!(normalize_state("succeeded"), ProviderTaskState::Completed));
        assert!(matches!(normalize_state("failed"), ProviderTaskState::Failed));
    }

    fn wire(base_url: String) -> ProviderWireConfig {
        ProviderWireConfig { base_url, api_key: "test-key".to_string(), request_timeout: std::time::Duration::from_secs(5), download_timeout: std::time::Duration::from_secs(5) }
    }

    fn capabilities() -> ProviderCapabilities {
        ProviderCapabilities { supports_image_to_video: true, supported_durations: vec![10], supported_resolutions: vec!["horizontal".to_string()], supports_pro: false }
    }

    #[tokio::test]
    async fn create_task_posts_json_and_returns_provider_task_id() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/video/tasks")
            .match_header("authorization", "Bearer test-key")
            .match_header("content-type", "application/json")
            .match_body(mockito::Matcher::Json(serde_json::json!({"prompt": "a cat", "duration": 10, "resolution": "horizontal", "is_pro": false})))
            .with_status(200)
            .with_body(r#"{"task_id":"sora-abc123"}"#)
            .create_async()
            .await;

        let provider = SoraHkProvider::new(reqwest::Client::new(), wire(server.url()), capabilities());
        let id = provider.create_task("a cat", 10, "horizontal", false, None).await.unwrap();

        assert_eq!(id, "sora-abc123");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn create_task_includes_image_url_when_present() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/video/tasks")
            .match_body(mockito::Matcher::Json(serde_json::json!({"prompt": "a cat", "duration": 10, "resolution": "horizontal", "is_pro": false, "image_url": "https://example/ref.png"})))
            .with_status(200)
            .with_body(r#"{"task_id":"sora-abc456"}"#)
            .create_async()
            .await;

        let provider = SoraHkProvider::new(reqwest::Client::new(), wire(server.url()), capabilities());
        let id = provider.create_task("a cat", 10, "horizontal", false, Some("https://example/ref.png")).await.unwrap();

        assert_eq!(id, "sora-abc456");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn create_task_surfaces_vendor_rejection_body() {
        let mut server = mockito::Server::new_async().await;
        server.mock("POST", "/api/v1/video/tasks").with_status(429).with_body("rate limit exceeded").create_async().await;

        let provider = SoraHkProvider::new(reqwest::Client::new(), wire(server.url()), capabilities());
        let err = provider.create_task("a cat", 10, "horizontal", false, None).await.unwrap_err();

        assert!(err.message().contains("429"));
        assert!(err.message().contains("rate limit exceeded"));
    }

    #[tokio::test]
    async fn create_task_rejects_unsupported_duration_without_a_wire_call() {
        let server = mockito::Server::new_async().await;
        let provider = SoraHkProvider::new(reqwest::Client::new(), wire(server.url()), capabilities());
        let err = provider.create_task("a cat", 25, "horizontal", false, None).await.unwrap_err();
        assert!(matches!(err, ProviderError::UnsupportedCapability(_)));
    }

    #[tokio::test]
    async fn get_task_normalizes_completed_status_and_preserves_raw() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/video/tasks/sora-abc123")
            .with_status(200)
            .with_body(r#"{"state":"succeeded","progress":100,"video_url":"https://cdn.example/v.mp4"}"#)
            .create_async()
            .await;

        let provider = SoraHkProvider::new(reqwest::Client::new(), wire(server.url()), capabilities());
        let status = provider.get_task("sora-abc123").await.unwrap();

        assert!(matches!(status.state, ProviderTaskState::Completed));
        assert_eq!(status.video_url.as_deref(), Some("https://cdn.example/v.mp4"));
        assert_eq!(status.raw["progress"], 100);
    }

    #[tokio::test]
    async fn download_video_streams_to_tmp_then_renames_atomically() {
        let mut server = mockito::Server::new_async().await;
        server.mock("GET", "/video.mp4").with_status(200).with_body(b"binary-video-bytes".to_vec()).create_async().await;

        let provider = SoraHkProvider::new(reqwest::Client::new(), wire(server.url()), capabilities());
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("out.mp4");

        let ok = provider.download_video("sora-abc123", Some(&format!("{}/video.mp4", server.url())), &dest).await.unwrap();

        assert!(ok);
        assert!(dest.exists());
        assert!(!dest.with_extension("mp4.tmp").exists());
        assert_eq!(std::fs::read(&dest).unwrap(), b"binary-video-bytes");
    }

    #[tokio::test]
    async fn download_video_leaves_no_tmp_file_on_transport_failure() {
        let mut server = mockito::Server::new_async().await;
        server.mock("GET", "/missing.mp4").with_status(404).create_async().await;

        let provider = SoraHkProvider::new(reqwest::Client::new(), wire(server.url()), capabilities());
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("out.mp4");

        let ok = provider.download_video("sora-abc123", Some(&format!("{}/missing.mp4", server.url())), &dest).await.unwrap();

        assert!(!ok);
        assert!(!dest.exists());
        assert!(!dest.with_extension("mp4.tmp").exists());
    }
}
