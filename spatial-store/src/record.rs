use serde::{Deserialize, Serialize};
use spatial_protocol::{Donor, Organ, ReferenceFrame, Sample, SampleRecord};

/// A sample as persisted in one reference frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpatialRecord {
    /// Surrogate id, stable across upserts of the same (sample, frame)
    pub id: i64,

    pub reference_frame: ReferenceFrame,

    pub organ: Organ,

    pub donor: Donor,

    /// Sample fields, with the rui_location placed in `reference_frame`
    pub sample: Sample,
}

impl SpatialRecord {
    pub fn new(id: i64, reference_frame: ReferenceFrame, record: &SampleRecord) -> Self {
        Self {
            id,
            reference_frame,
            organ: record.organ.clone(),
            donor: record.donor.clone(),
            sample: record.sample.clone(),
        }
    }

    pub fn sample_uuid(&self) -> &str {
        &self.sample.uuid
    }
}
