use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, TenantlineError};

/// Top-level configuration for the Tenantline service.
///
/// Loaded from `tenantline.toml` by default. Every section is optional and
/// falls back to its defaults when absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TenantlineConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub dialogue: DialogueConfig,
    #[serde(default)]
    pub collaborators: CollaboratorConfig,
}

impl TenantlineConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: TenantlineConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| TenantlineError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// HTTP port for the call API.
    pub port: u16,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            port: 7480,
        }
    }
}

/// Property registry and address matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// JSON file holding the property list. No feed means an empty registry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feed_path: Option<String>,
    /// Seconds between background refreshes. 0 disables refresh.
    pub refresh_secs: u64,
    /// Minimum street-name similarity (0.0 - 1.0) for a nearest-match candidate.
    pub street_similarity_threshold: f64,
    /// Known transcription mistakes, spoken form to canonical form.
    pub corrections: BTreeMap<String, String>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            feed_path: None,
            refresh_secs: 300,
            street_similarity_threshold: 0.8,
            corrections: default_corrections(),
        }
    }
}

fn default_corrections() -> BTreeMap<String, String> {
    [
        ("port rich", "port richmond"),
        ("port richman", "port richmond"),
        ("poor richmond", "port richmond"),
        ("richman", "richmond"),
        ("target", "targee"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Dialogue policy knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DialogueConfig {
    /// Transcription confidence below this is treated as recognition noise.
    pub min_confidence: f32,
    /// Consecutive noisy turns answered with a repeat request before best-effort processing.
    pub max_noise_reprompts: u32,
    /// Identical prompts in a row before the reply switches to restating known facts.
    pub loop_guard_turns: u32,
    /// Letter-by-letter spelling rounds offered for an address that cannot be found.
    pub spelling_rounds: u32,
    /// Maximum address suggestions carried on an ambiguous resolution.
    pub max_suggestions: usize,
    /// Phone refusals accepted before the phone slot is marked absent.
    pub max_phone_refusals: u32,
    /// Notification channel for emergency issues.
    pub emergency_channel: String,
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.3,
            max_noise_reprompts: 1,
            loop_guard_turns: 2,
            spelling_rounds: 1,
            max_suggestions: 3,
            max_phone_refusals: 2,
            emergency_channel: "on-call".to_string(),
        }
    }
}

/// External collaborator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollaboratorConfig {
    /// Ticket creation is abandoned (and flagged for follow-up) after this many seconds.
    pub ticket_timeout_secs: u64,
    /// Prefix for locally issued ticket numbers.
    pub ticket_prefix: String,
}

impl Default for CollaboratorConfig {
    fn default() -> Self {
        Self {
            ticket_timeout_secs: 10,
            ticket_prefix: "SV".to_string(),
        }
    }
}
