use serde::{Deserialize, Serialize};

/// Configuration for reindex runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReindexConfig {
    /// Maximum samples processed concurrently
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

fn default_max_concurrent() -> usize {
    num_cpus::get()
}

impl Default for ReindexConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
        }
    }
}

impl ReindexConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent == 0 {
            return Err("Max concurrent must be > 0".to_string());
        }

        Ok(())
    }
}
