//! # Spatial Store
//!
//! Persists the placed projection of each sample, one row per
//! (sample, reference frame), and answers proximity queries against it.
//!
//! Two implementations share the [`SpatialStore`] trait:
//!
//! - [`PgSpatialStore`]: PostgreSQL + PostGIS. Solids are built server-side
//!   with the same transform pipeline and compared with `ST_3DDWithin`.
//! - [`MemorySpatialStore`]: in-process, used by tests and dry runs. Solids
//!   are evaluated with `spatial-geometry` so radius semantics match.
//!
//! ## Example
//!
//! ```no_run
//! use spatial_geometry::Point3;
//! use spatial_protocol::ReferenceFrame;
//! use spatial_store::{PgSpatialStore, SpatialStore, StoreConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = PgSpatialStore::connect(&StoreConfig::new("postgres://localhost/spatial")).await?;
//!     store.migrate().await?;
//!
//!     let hits = store
//!         .find_within_radius(&ReferenceFrame::MaleBody, 50.0, Point3::new(70.0, 800.0, 60.0))
//!         .await?;
//!     println!("{} samples nearby", hits.len());
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod record;
mod schema;
mod store_memory;
mod store_pg;

use std::collections::BTreeMap;
use std::collections::HashMap;

use async_trait::async_trait;
use spatial_geometry::PlacedSolid;
use spatial_geometry::Point3;
use spatial_protocol::DatasetDigest;
use spatial_protocol::DatasetIndex;
use spatial_protocol::ReferenceFrame;
use spatial_protocol::RuiLocation;
use spatial_protocol::SampleRecord;

pub use config::{StoreConfig, TableName};
pub use error::{Result, StoreError};
pub use record::SpatialRecord;
pub use schema::schema_statements;
pub use store_memory::MemorySpatialStore;
pub use store_pg::PgSpatialStore;

/// Persistence for placed samples, their dataset digests and their
/// cell-type counts.
#[async_trait]
pub trait SpatialStore: Send + Sync {
    /// Insert or replace the record keyed by (sample uuid, frame). Returns
    /// the row's surrogate id, which is stable across repeated upserts.
    async fn upsert(&self, frame: &ReferenceFrame, record: &SampleRecord) -> Result<i64>;

    /// HuBMAP ids of samples in `frame` whose solid lies within `radius` of
    /// `origin`, sorted.
    async fn find_within_radius(
        &self,
        frame: &ReferenceFrame,
        radius: f64,
        origin: Point3,
    ) -> Result<Vec<String>>;

    /// As [`SpatialStore::find_within_radius`], keeping only samples with a
    /// count for `cell_type`.
    async fn find_within_radius_by_annotation(
        &self,
        frame: &ReferenceFrame,
        radius: f64,
        origin: Point3,
        cell_type: &str,
    ) -> Result<Vec<String>>;

    /// The persisted rui_location of a sample in `frame`.
    ///
    /// Zero rows is [`StoreError::NotFound`]. More than one row is logged
    /// and the first is returned.
    async fn location_of(&self, hubmap_id: &str, frame: &ReferenceFrame) -> Result<RuiLocation>;

    /// sample_uuid -> last_modified_timestamp of everything indexed.
    async fn sample_timestamps(&self) -> Result<HashMap<String, i64>>;

    /// sample_uuid -> {dataset_uuid: timestamp} of everything recorded.
    async fn sample_datasets(&self) -> Result<DatasetIndex>;

    /// Upsert dataset digests and make them the sample's full set of
    /// linked datasets. Links to datasets not listed are removed.
    async fn record_sample_datasets(
        &self,
        sample_uuid: &str,
        datasets: &[DatasetDigest],
    ) -> Result<()>;

    /// Replace every cell-type count of a sample. Names missing from the
    /// annotation table are skipped and returned.
    async fn replace_cell_type_counts(
        &self,
        sample_uuid: &str,
        counts: &BTreeMap<String, u64>,
    ) -> Result<Vec<String>>;

    /// Search around the placed centroid of an already indexed sample.
    async fn find_within_radius_of_sample(
        &self,
        frame: &ReferenceFrame,
        radius: f64,
        hubmap_id: &str,
    ) -> Result<Vec<String>> {
        let location = self.location_of(hubmap_id, frame).await?;
        let origin = PlacedSolid::from_location(&location)?.centroid();
        self.find_within_radius(frame, radius, origin).await
    }
}

pub(crate) fn check_radius(radius: f64) -> Result<()> {
    if radius.is_finite() && radius >= 0.0 {
        Ok(())
    } else {
        Err(StoreError::InvalidQuery(format!(
            "radius must be a non-negative finite number, got {radius}"
        )))
    }
}
