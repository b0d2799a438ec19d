use std::sync::Arc;

use spatial_protocol::ReferenceFrame;
use spatial_protocol::RuiLocation;
use spatial_protocol::SampleRecord;
use tracing::debug;

use crate::client::PlacementService;
use crate::config::PlacementConfig;
use crate::error::Result;
use crate::legacy::correct_location;

/// Moves a sample's rui_location into another reference frame.
#[derive(Clone)]
pub struct PlacementResolver {
    service: Arc<dyn PlacementService>,
    base_iri: String,
}

impl PlacementResolver {
    pub fn new(service: Arc<dyn PlacementService>, config: &PlacementConfig) -> Self {
        Self {
            service,
            base_iri: config.base_iri.clone(),
        }
    }

    pub fn target_iri(&self, frame: &ReferenceFrame) -> String {
        format!("{}{}", self.base_iri, frame.code())
    }

    /// Correct legacy targets, ask the placement service for the sample's
    /// placement in `frame`, and return the rui_location carrying it.
    ///
    /// A [`crate::PlacementError::Rejected`] only concerns this frame;
    /// callers skip it and carry on.
    pub async fn resolve(
        &self,
        frame: &ReferenceFrame,
        record: &SampleRecord,
    ) -> Result<RuiLocation> {
        let location = correct_location(&record.sample.rui_location, record.donor.sex);
        let target_iri = self.target_iri(frame);
        debug!(
            "placing sample {} into {target_iri}",
            record.sample.uuid
        );
        let placement = self.service.place(&target_iri, &location).await?;
        Ok(location.with_placement(placement))
    }
}
