use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use spatial_extraction::ExtractionConfig;
use spatial_graph::GraphConfig;
use spatial_placement::PlacementConfig;
use spatial_reindexer::ReindexConfig;
use spatial_store::StoreConfig;

pub const DEFAULT_CONFIG_FILE: &str = "spatial-index.toml";

/// Contents of `spatial-index.toml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialIndexConfig {
    pub graph: GraphConfig,
    pub store: StoreConfig,
    pub placement: PlacementConfig,
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub reindex: ReindexConfig,
}

impl SpatialIndexConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("Invalid config {}", path.display()))
    }

    /// Parse and validate. A missing `extraction.bearer_token` is taken from
    /// the environment.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut config: SpatialIndexConfig = toml::from_str(raw)?;
        config.extraction = config.extraction.with_env_token();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.graph.validate().map_err(|e| anyhow!("[graph] {e}"))?;
        self.store.validate().map_err(|e| anyhow!("[store] {e}"))?;
        self.placement
            .validate()
            .map_err(|e| anyhow!("[placement] {e}"))?;
        self.extraction
            .validate()
            .map_err(|e| anyhow!("[extraction] {e}"))?;
        self.reindex
            .validate()
            .map_err(|e| anyhow!("[reindex] {e}"))?;
        Ok(())
    }
}
