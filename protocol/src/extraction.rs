use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

/// Body of the "begin extraction" request sent to the ingest worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionRequest {
    pub sample_uuid: String,
    pub dataset_uuids: Vec<String>,
}

/// Message the ingest worker posts back once cell-type counts are ready.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionCallback {
    pub sample_uuid: String,
    #[serde(default)]
    pub cell_type_counts: BTreeMap<String, u64>,
}
