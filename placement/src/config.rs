use serde::{Deserialize, Serialize};
use spatial_protocol::CCF_BASE_IRI;

/// Where the placement service lives and how frame IRIs are formed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementConfig {
    /// Endpoint receiving `{target_iri, rui_location}` POSTs
    pub url: String,

    /// Prefix joined with a reference-frame code to form the target IRI
    #[serde(default = "default_base_iri")]
    pub base_iri: String,

    /// Optional request timeout in seconds. Unset, a call waits as long as
    /// the connection stays open.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_base_iri() -> String {
    CCF_BASE_IRI.to_string()
}

impl PlacementConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            base_iri: default_base_iri(),
            timeout_secs: None,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        let url = url::Url::parse(&self.url)
            .map_err(|err| format!("Invalid placement url {:?}: {err}", self.url))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(format!("Placement url must be http(s): {}", self.url));
        }
        if self.base_iri.is_empty() {
            return Err("Placement base_iri must not be empty".to_string());
        }
        if self.timeout_secs == Some(0) {
            return Err("Placement timeout_secs must be > 0".to_string());
        }
        Ok(())
    }
}
