//! Concrete `ProviderClient` implementations and the registry that looks
//! them up by id (§4.4, §9 "dynamic provider dispatch").

mod aihubmix;
mod mock;
mod openai;
mod sora_hk;

pub use aihubmix::AiHubMixProvider;
pub use mock::{fresh_task_id, MockOutcome, MockProvider};
pub use openai::OpenAiProvider;
pub use sora_hk::SoraHkProvider;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::models::ProviderCapabilities;
use crate::domain::ports::{ProviderClient, ProviderError};

/// Shared local-validation gate every concrete provider runs before any wire
/// call (§4.4: "each provider must enforce vendor-specific validation").
pub(crate) fn validate_capabilities(caps: &ProviderCapabilities, duration: u32, resolution: &str, is_pro: bool, image_url: Option<&str>) -> Result<(), ProviderError> {
    if !caps.supported_durations.contains(&duration) {
        return Err(ProviderError::UnsupportedCapability(format!("duration {duration} unsupported")));
    }
    if !caps.supported_resolutions.iter().any(|r| r == resolution) {
        return Err(ProviderError::UnsupportedCapability(format!("resolution {resolution} unsupported")));
    }
    if is_pro && !caps.supports_pro {
        return Err(ProviderError::UnsupportedCapability("pro generation unsupported".to_string()));
    }
    if image_url.is_some() && !caps.supports_image_to_video {
        return Err(ProviderError::UnsupportedCapability("image-to-video unsupported".to_string()));
    }
    Ok(())
}

/// Per-provider wire settings sourced from configuration (§6): base URL,
/// API key, the timeout for create/poll calls, and the (longer) timeout for
/// the streaming download request.
#[derive(Debug, Clone)]
pub struct ProviderWireConfig {
    pub base_url: String,
    pub api_key: String,
    pub request_timeout: Duration,
    pub download_timeout: Duration,
}

/// Factory lookup by provider id (§9). Built once at startup from
/// configuration and shared via `Arc` into the Run Manager and every
/// spawned Task Worker.
pub struct ProviderRegistry {
    clients: HashMap<String, Arc<dyn ProviderClient>>,
}

impl ProviderRegistry {
    #[must_use]
    pub fn new(clients: HashMap<String, Arc<dyn ProviderClient>>) -> Self {
        Self { clients }
    }

    /// Build the registry from the built-in Provider catalog (§4.2), wiring
    /// each enabled provider to its concrete client when an API key is
    /// configured and falling back to `MockProvider` otherwise (so a fresh
    /// process with no credentials still exercises `dry_run` and tests).
    #[must_use]
    pub fn from_wire_configs(http: reqwest::Client, capabilities: &HashMap<String, ProviderCapabilities>, wire: &HashMap<String, ProviderWireConfig>) -> Self {
        let mut clients: HashMap<String, Arc<dyn ProviderClient>> = HashMap::new();

        for (provider_id, caps) in capabilities {
            let client: Arc<dyn ProviderClient> = match wire.get(provider_id) {
                Some(cfg) if !cfg.api_key.is_empty() => match provider_id.as_str() {
                    "sora_hk" => Arc::new(SoraHkProvider::new(http.clone(), cfg.clone(), caps.clone())),
                    "openai" => Arc::new(OpenAiProvider::new(http.clone(), cfg.clone(), caps.clone())),
                    "aihubmix" => Arc::new(AiHubMixProvider::new(http.clone(), cfg.clone(), caps.clone())),
                    _ => Arc::new(MockProvider::new(provider_id.clone(), caps.clone())),
                },
                _ => Arc::new(MockProvider::new(provider_id.clone(), caps.clone())),
            };
            clients.insert(provider_id.clone(), client);
        }

        Self { clients }
    }

    #[must_use]
    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn ProviderClient>> {
        self.clients.get(provider_id).cloned()
    }
}
