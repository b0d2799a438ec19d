//! Read side of the provenance graph: samples that carry an rui_location,
//! with their organ and donor, and the analysis datasets derived from them.

mod config;
mod error;
mod neo4j;
mod row;

use async_trait::async_trait;
use spatial_protocol::DatasetIndex;

pub use config::GraphConfig;
pub use error::GraphError;
pub use error::Result;
pub use neo4j::Neo4jGraphSource;
pub use row::DatasetRow;
pub use row::GraphRow;
pub use row::RowError;
pub use row::SampleBatch;
pub use row::collect_datasets;
pub use row::process_rows;

/// Query contract the reconciler relies on.
#[async_trait]
pub trait GraphSource: Send + Sync {
    /// Every sample with a non-empty rui_location, optionally restricted to
    /// one organ code.
    async fn sample_records(&self, organ_code: Option<&str>) -> Result<SampleBatch>;

    /// Records for one sample uuid. Normally exactly one.
    async fn sample_record(&self, sample_uuid: &str) -> Result<SampleBatch>;

    /// sample_uuid -> {dataset_uuid: timestamp}, restricted to the
    /// configured analysis dataset types and statuses.
    async fn sample_datasets(&self, sample_uuid: Option<&str>) -> Result<DatasetIndex>;
}
