use serde::Deserialize;
use serde_json::Value;
use spatial_protocol::DatasetIndex;
use spatial_protocol::Donor;
use spatial_protocol::Organ;
use spatial_protocol::RuiLocation;
use spatial_protocol::RuiLocationError;
use spatial_protocol::Sample;
use spatial_protocol::SampleRecord;
use spatial_protocol::Sex;
use thiserror::Error;
use tracing::debug;
use tracing::info;

/// Donor metadata sections that may carry the Sex concept.
const DONOR_DATA_KEYS: [&str; 2] = ["organ_donor_data", "living_donor_data"];

/// One row of the sample query, exactly as returned by the graph.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GraphRow {
    pub sample_uuid: Option<String>,
    pub sample_hubmap_id: Option<String>,
    pub sample_rui_location: Option<String>,
    pub sample_category: Option<String>,
    pub sample_last_modified_timestamp: Option<i64>,
    pub donor_uuid: Option<String>,
    pub donor_metadata: Option<String>,
    pub organ_uuid: Option<String>,
    pub organ_code: Option<String>,
}

/// One row of the dataset query.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DatasetRow {
    pub sample_uuid: Option<String>,
    pub dataset_uuid: Option<String>,
    pub dataset_last_modified_timestamp: Option<i64>,
}

#[derive(Error, Debug)]
pub enum RowError {
    #[error("missing column {0}")]
    Missing(&'static str),

    #[error("unreadable donor metadata: {0}")]
    DonorMetadata(String),

    #[error(transparent)]
    RuiLocation(#[from] RuiLocationError),
}

/// Records that parsed, plus the counters logged per query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleBatch {
    pub records: Vec<SampleRecord>,
    pub rows: usize,
    pub bad_parse: usize,
}

fn required(value: Option<String>, column: &'static str) -> Result<String, RowError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(RowError::Missing(column)),
    }
}

/// Donor sex from the donor's metadata JSON. A document without a Sex
/// concept yields `Sex::Unknown`; a document that is not JSON is an error.
pub fn donor_sex(metadata: &str) -> Result<Sex, RowError> {
    let doc: Value =
        serde_json::from_str(metadata).map_err(|e| RowError::DonorMetadata(e.to_string()))?;

    let entries = DONOR_DATA_KEYS
        .iter()
        .filter_map(|key| doc.get(key).and_then(Value::as_array))
        .flatten();
    for entry in entries {
        if entry.get("grouping_concept_preferred_term").and_then(Value::as_str) == Some("Sex") {
            let term = entry
                .get("preferred_term")
                .and_then(Value::as_str)
                .unwrap_or_default();
            return Ok(Sex::from_term(term));
        }
    }
    Ok(Sex::Unknown)
}

impl GraphRow {
    pub fn into_record(self) -> Result<SampleRecord, RowError> {
        let metadata = self
            .donor_metadata
            .ok_or(RowError::Missing("donor_metadata"))?;
        let sex = donor_sex(&metadata)?;
        let rui_location = RuiLocation::parse(&required(
            self.sample_rui_location,
            "sample_rui_location",
        )?)?;

        Ok(SampleRecord {
            sample: Sample {
                uuid: required(self.sample_uuid, "sample_uuid")?,
                hubmap_id: required(self.sample_hubmap_id, "sample_hubmap_id")?,
                category: self.sample_category,
                last_modified_timestamp: self.sample_last_modified_timestamp.unwrap_or_default(),
                rui_location,
            },
            organ: Organ {
                uuid: required(self.organ_uuid, "organ_uuid")?,
                code: required(self.organ_code, "organ_code")?,
            },
            donor: Donor {
                uuid: required(self.donor_uuid, "donor_uuid")?,
                sex,
            },
        })
    }
}

/// Turn raw rows into records. Rows that fail to parse are counted and
/// dropped; the totals are logged once for the query.
pub fn process_rows(rows: impl IntoIterator<Item = GraphRow>) -> SampleBatch {
    let mut batch = SampleBatch::default();
    for row in rows {
        batch.rows += 1;
        let hubmap_id = row.sample_hubmap_id.clone().unwrap_or_default();
        match row.into_record() {
            Ok(record) => batch.records.push(record),
            Err(err) => {
                debug!("Skipping sample {hubmap_id}: {err}");
                batch.bad_parse += 1;
            }
        }
    }
    info!("results: {}; parse errors: {}", batch.rows, batch.bad_parse);
    batch
}

/// Group dataset rows by sample. Datasets without a modification
/// timestamp cannot take part in change detection and are left out.
pub fn collect_datasets(rows: impl IntoIterator<Item = DatasetRow>) -> DatasetIndex {
    let mut index = DatasetIndex::new();
    for row in rows {
        let (Some(sample_uuid), Some(dataset_uuid)) = (row.sample_uuid, row.dataset_uuid) else {
            continue;
        };
        let Some(ts) = row.dataset_last_modified_timestamp else {
            debug!("Dataset {dataset_uuid} of sample {sample_uuid} has no last_modified_timestamp");
            continue;
        };
        index
            .entry(sample_uuid)
            .or_default()
            .insert(dataset_uuid, ts);
    }
    index
}
