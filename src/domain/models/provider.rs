//! Provider and Model descriptors owned by the State Store (§3).

use serde::{Deserialize, Serialize};

/// Capability tuple advertised by a Provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCapabilities {
    pub supports_image_to_video: bool,
    pub supported_durations: Vec<u32>,
    pub supported_resolutions: Vec<String>,
    pub supports_pro: bool,
}

/// Descriptor of an external generation vendor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    pub id: String,
    pub display_name: String,
    pub enabled: bool,
    /// Lower sorts first.
    pub priority: u32,
    /// Positive integer replication weight for `weighted` routing.
    pub weight: u32,
    pub capabilities: ProviderCapabilities,
}

impl Provider {
    #[must_use]
    pub fn supports(&self, durations: &[u32], resolutions: &[String], requires_pro: bool, requires_image: bool) -> bool {
        if requires_pro && !self.capabilities.supports_pro {
            return false;
        }
        if requires_image && !self.capabilities.supports_image_to_video {
            return false;
        }
        durations.iter().all(|d| self.capabilities.supported_durations.contains(d))
            && resolutions.iter().all(|r| self.capabilities.supported_resolutions.contains(r))
    }
}

/// Logical generation tier mapping to provider-specific model identifiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    pub display_name: String,
    pub description: String,
    pub enabled: bool,
    /// `(provider_id, ordered list of provider-specific model ids)`, in the
    /// order the model was seeded/configured. A plain `Vec` rather than a
    /// sorted map: §4.5 step 3 breaks priority ties by input order, so
    /// iteration order here must match insertion order, not a key sort
    /// (§9 open question (a)).
    pub provider_map: Vec<(String, Vec<String>)>,
}

impl Model {
    /// Provider-specific model ids configured for `provider_id`, in the
    /// order they were inserted.
    #[must_use]
    pub fn provider_model_ids(&self, provider_id: &str) -> Option<&[String]> {
        self.provider_map.iter().find(|(id, _)| id == provider_id).map(|(_, ids)| ids.as_slice())
    }
}

/// Built-in catalog seeded at Store construction (mirrors the reference
/// system's default provider/model fixtures, §4.2).
#[must_use]
pub fn seed_providers() -> Vec<Provider> {
    vec![
        Provider {
            id: "sora_hk".to_string(),
            display_name: "Sora.hk".to_string(),
            enabled: true,
            priority: 10,
            weight: 1,
            capabilities: ProviderCapabilities {
                supports_image_to_video: true,
                supported_durations: vec![10, 15, 25],
                supported_resolutions: vec!["horizontal".to_string(), "vertical".to_string()],
                supports_pro: true,
            },
        },
        Provider {
            id: "openai".to_string(),
            display_name: "OpenAI".to_string(),
            enabled: false,
            priority: 20,
            weight: 1,
            capabilities: ProviderCapabilities {
                supports_image_to_video: true,
                supported_durations: vec![4, 8, 12],
                supported_resolutions: vec!["horizontal".to_string(), "vertical".to_string()],
                supports_pro: true,
            },
        },
        Provider {
            id: "aihubmix".to_string(),
            display_name: "AI Hub Mix".to_string(),
            enabled: false,
            priority: 30,
            weight: 1,
            capabilities: ProviderCapabilities {
                supports_image_to_video: true,
                supported_durations: vec![4, 8, 12],
                supported_resolutions: vec!["horizontal".to_string(), "vertical".to_string()],
                supports_pro: true,
            },
        },
    ]
}

#[must_use]
pub fn seed_models() -> Vec<Model> {
    vec![
        Model {
            id: "standard".to_string(),
            display_name: "Standard".to_string(),
            description: "Logical model for standard generation".to_string(),
            enabled: true,
            provider_map: vec![
                ("sora_hk".to_string(), vec!["sora2".to_string()]),
                ("openai".to_string(), vec!["sora-2".to_string()]),
                ("aihubmix".to_string(), vec!["sora-2".to_string(), "web-sora-2".to_string()]),
            ],
        },
        Model {
            id: "pro".to_string(),
            display_name: "Pro".to_string(),
            description: "Logical model for pro generation".to_string(),
            enabled: true,
            provider_map: vec![
                ("sora_hk".to_string(), vec!["sora2-pro".to_string()]),
                ("openai".to_string(), vec!["sora-2-pro".to_string()]),
                ("aihubmix".to_string(), vec!["sora-2-pro".to_string(), "web-sora-2-pro".to_string()]),
            ],
        },
    ]
}
