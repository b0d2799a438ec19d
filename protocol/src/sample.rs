use serde::Deserialize;
use serde::Serialize;
use strum_macros::AsRefStr;
use strum_macros::Display;
use strum_macros::EnumString;

use crate::rui_location::RuiLocation;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Sex {
    Male,
    Female,
    #[default]
    Unknown,
}

impl Sex {
    /// Map a free-text donor metadata term onto the closed set.
    pub fn from_term(term: &str) -> Self {
        term.trim().parse().unwrap_or(Sex::Unknown)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub uuid: String,
    pub hubmap_id: String,
    pub category: Option<String>,
    pub last_modified_timestamp: i64,
    pub rui_location: RuiLocation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organ {
    pub uuid: String,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Donor {
    pub uuid: String,
    pub sex: Sex,
}

/// A sample together with the organ it was taken from and its donor, as
/// returned by the graph source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    pub sample: Sample,
    pub organ: Organ,
    pub donor: Donor,
}

impl SampleRecord {
    /// Same record, with the rui_location replaced wholesale.
    pub fn with_rui_location(&self, rui_location: RuiLocation) -> Self {
        let mut record = self.clone();
        record.sample.rui_location = rui_location;
        record
    }
}
