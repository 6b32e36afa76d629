use crate::error::{EngineError, Result};
use graph_client::{ClientOptions, PagingOptions, DEFAULT_BASE_URL};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// PagingConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagingConfig {
    /// Pause between consecutive page requests, in milliseconds.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    /// Consecutive failures tolerated on one cursor. Unset retries forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(default = "default_ids_page_size")]
    pub ids_page_size: u32,
    #[serde(default = "default_list_page_size")]
    pub list_page_size: u32,
    #[serde(default = "default_search_page_size")]
    pub search_page_size: u32,
}

fn default_delay_ms() -> u64 {
    200
}

fn default_ids_page_size() -> u32 {
    5000
}

fn default_list_page_size() -> u32 {
    200
}

fn default_search_page_size() -> u32 {
    20
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_delay_ms(),
            max_retries: None,
            ids_page_size: default_ids_page_size(),
            list_page_size: default_list_page_size(),
            search_page_size: default_search_page_size(),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Imported blocklists stop growing at this many unique ids.
    #[serde(default = "default_max_user_limit")]
    pub max_user_limit: usize,
    /// How long a rate-limited session waits before retrying on its own.
    #[serde(default = "default_rate_limit_backoff_secs")]
    pub rate_limit_backoff_secs: u64,
    /// Unconfirmed sessions older than this are removed by
    /// `CleanupMode::NotConfirmed`.
    #[serde(default = "default_confirm_timeout_secs")]
    pub confirm_timeout_secs: u64,
    /// Block/unblock actions allowed per window.
    #[serde(default = "default_quota_max")]
    pub quota_max: u32,
}

fn default_max_user_limit() -> usize {
    100_000
}

fn default_rate_limit_backoff_secs() -> u64 {
    15 * 60
}

fn default_confirm_timeout_secs() -> u64 {
    10 * 60
}

fn default_quota_max() -> u32 {
    500
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_user_limit: default_max_user_limit(),
            rate_limit_backoff_secs: default_rate_limit_backoff_secs(),
            confirm_timeout_secs: default_confirm_timeout_secs(),
            quota_max: default_quota_max(),
        }
    }
}

// ---------------------------------------------------------------------------
// ApiConfig / ActorProfile
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub bearer_token: String,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            bearer_token: String::new(),
        }
    }
}

/// Cookie material for one logged-in identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorProfile {
    pub name: String,
    pub csrf_token: String,
    pub auth_token: String,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub paging: PagingConfig,
    #[serde(default)]
    pub session: SessionConfig,
    /// Profile used as the primary actor; defaults to the first profile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<String>,
    /// Every identity available for fallback reads, in fallback order.
    #[serde(default)]
    pub actors: Vec<ActorProfile>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(path, data.as_bytes())
    }

    /// The primary profile: the one named by `primary`, else the first.
    pub fn primary_profile(&self) -> Result<&ActorProfile> {
        match &self.primary {
            Some(name) => self
                .actors
                .iter()
                .find(|a| &a.name == name)
                .ok_or_else(|| EngineError::Validation(format!("unknown primary actor '{name}'"))),
            None => self
                .actors
                .first()
                .ok_or_else(|| EngineError::Validation("no actors configured".into())),
        }
    }

    pub fn paging_options(&self) -> PagingOptions {
        PagingOptions {
            delay: Duration::from_millis(self.paging.delay_ms),
            max_retries: self.paging.max_retries,
        }
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            base_url: self.api.base_url.clone(),
            ids_page_size: self.paging.ids_page_size,
            list_page_size: self.paging.list_page_size,
            search_page_size: self.paging.search_page_size,
        }
    }

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.api.bearer_token.trim().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "api.bearer_token is empty".into(),
            });
        }

        if self.actors.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "no actors configured".into(),
            });
        }

        let mut seen = HashSet::new();
        for actor in &self.actors {
            if !seen.insert(actor.name.as_str()) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("actor '{}' is listed more than once", actor.name),
                });
            }
            if actor.csrf_token.trim().is_empty() || actor.auth_token.trim().is_empty() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("actor '{}' is missing csrf_token or auth_token", actor.name),
                });
            }
        }

        if let Some(primary) = &self.primary {
            if !self.actors.iter().any(|a| &a.name == primary) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("primary actor '{primary}' is not among the actors"),
                });
            }
        }

        if self.paging.delay_ms < 100 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "paging.delay_ms={} is likely to trip per-endpoint rate limits",
                    self.paging.delay_ms
                ),
            });
        }

        if self.session.quota_max == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "session.quota_max is 0: every block and unblock will pause".into(),
            });
        }

        warnings
    }
}
