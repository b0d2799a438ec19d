use serde::{Deserialize, Serialize};

/// Connection and filter settings for the provenance graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Bolt URI, e.g. `neo4j://localhost:7687`
    pub uri: String,

    pub username: String,

    #[serde(default)]
    pub password: String,

    /// Dataset `data_types` values that count as cell-type analyses
    #[serde(default = "default_dataset_types")]
    pub dataset_types: Vec<String>,

    /// Dataset statuses that are considered
    #[serde(default = "default_statuses")]
    pub statuses: Vec<String>,
}

fn default_dataset_types() -> Vec<String> {
    [
        "salmon_rnaseq_snareseq",
        "salmon_sn_rnaseq_10x",
        "salmon_rnaseq_slideseq",
    ]
    .map(String::from)
    .to_vec()
}

fn default_statuses() -> Vec<String> {
    ["QA", "Published"].map(String::from).to_vec()
}

impl GraphConfig {
    pub fn new(
        uri: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            uri: uri.into(),
            username: username.into(),
            password: password.into(),
            dataset_types: default_dataset_types(),
            statuses: default_statuses(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.uri.is_empty() {
            return Err("Graph uri must not be empty".to_string());
        }
        if self.username.is_empty() {
            return Err("Graph username must not be empty".to_string());
        }
        if self.dataset_types.is_empty() {
            return Err("At least one dataset type is required".to_string());
        }
        if self.statuses.is_empty() {
            return Err("At least one dataset status is required".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config: GraphConfig =
            serde_json::from_str(r#"{"uri": "neo4j://localhost:7687", "username": "neo4j"}"#)
                .unwrap();
        assert_eq!(config.statuses, vec!["QA", "Published"]);
        assert_eq!(config.dataset_types.len(), 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let mut config = GraphConfig::new("neo4j://localhost:7687", "neo4j", "secret");
        config.statuses.clear();
        assert!(config.validate().is_err());
        assert!(GraphConfig::new("", "neo4j", "").validate().is_err());
    }
}
