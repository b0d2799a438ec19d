use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment variable consulted when no bearer token is configured.
pub const TOKEN_ENV_VAR: &str = "SPATIAL_INDEX_TOKEN";

/// Settings for the extraction collaborator and the pending-request tracker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Endpoint that accepts `ExtractionRequest`s and answers 202
    pub url: String,

    /// Bearer token sent with every request
    #[serde(default, skip_serializing)]
    pub bearer_token: Option<String>,

    /// How often pending requests are checked for timeouts (seconds)
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Age after which a pending request is considered lost (seconds)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Optional file that unknown cell-type names are appended to
    #[serde(default)]
    pub unknown_names_file: Option<PathBuf>,
}

fn default_sweep_interval_secs() -> u64 {
    5 * 60
}

fn default_timeout_secs() -> u64 {
    2 * 60 * 60
}

impl ExtractionConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            bearer_token: None,
            sweep_interval_secs: default_sweep_interval_secs(),
            timeout_secs: default_timeout_secs(),
            unknown_names_file: None,
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Fill `bearer_token` from [`TOKEN_ENV_VAR`] when the file left it out.
    pub fn with_env_token(mut self) -> Self {
        if self.bearer_token.is_none() {
            self.bearer_token = std::env::var(TOKEN_ENV_VAR)
                .ok()
                .filter(|t| !t.trim().is_empty());
        }
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        let parsed = url::Url::parse(&self.url)
            .map_err(|e| format!("Invalid extraction url {}: {e}", self.url))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(format!(
                "Extraction url must be http(s), got {}",
                parsed.scheme()
            ));
        }
        if self.sweep_interval_secs == 0 {
            return Err("sweep_interval_secs must be > 0".to_string());
        }
        if self.timeout_secs == 0 {
            return Err("timeout_secs must be > 0".to_string());
        }
        Ok(())
    }
}
