use std::collections::BTreeMap;
use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;

/// Analysis dataset attached to a sample, reduced to what change detection
/// needs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetDigest {
    pub dataset_uuid: String,
    pub last_modified_timestamp: i64,
}

/// dataset_uuid -> last_modified_timestamp for one sample.
pub type DatasetTimestamps = BTreeMap<String, i64>;

/// sample_uuid -> its dataset timestamps.
pub type DatasetIndex = HashMap<String, DatasetTimestamps>;

pub fn digests_of(timestamps: &DatasetTimestamps) -> Vec<DatasetDigest> {
    timestamps
        .iter()
        .map(|(uuid, ts)| DatasetDigest {
            dataset_uuid: uuid.clone(),
            last_modified_timestamp: *ts,
        })
        .collect()
}
