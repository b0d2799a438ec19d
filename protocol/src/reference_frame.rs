use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::sample::Sex;

/// Namespace the CCF ontology uses for reference organs and bodies.
pub const CCF_BASE_IRI: &str = "http://purl.org/ccf/latest/ccf.owl#";

const MALE_BODY: &str = "VHMale";
const FEMALE_BODY: &str = "VHFemale";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReferenceFrameError {
    #[error("reference frame identifier must not be empty")]
    Empty,

    #[error("reference frame identifier contains whitespace: {0:?}")]
    Whitespace(String),
}

/// A coordinate system a sample can be placed in: one of the two whole-body
/// frames, or the sample's own organ.
///
/// Persisted and compared by its short identifier (`VHMale`, `VHFemale`, or
/// the organ code); the full IRI is only needed when talking to the placement
/// collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ReferenceFrame {
    MaleBody,
    FemaleBody,
    Organ(String),
}

impl ReferenceFrame {
    pub fn organ(code: impl Into<String>) -> Self {
        ReferenceFrame::Organ(code.into())
    }

    /// Whole-body frame for a donor. Donors of unknown sex have none.
    pub fn whole_body(sex: Sex) -> Option<Self> {
        match sex {
            Sex::Male => Some(ReferenceFrame::MaleBody),
            Sex::Female => Some(ReferenceFrame::FemaleBody),
            Sex::Unknown => None,
        }
    }

    pub fn code(&self) -> &str {
        match self {
            ReferenceFrame::MaleBody => MALE_BODY,
            ReferenceFrame::FemaleBody => FEMALE_BODY,
            ReferenceFrame::Organ(code) => code,
        }
    }

    pub fn iri(&self) -> String {
        format!("{CCF_BASE_IRI}{}", self.code())
    }

    pub fn is_whole_body(&self) -> bool {
        matches!(self, ReferenceFrame::MaleBody | ReferenceFrame::FemaleBody)
    }
}

impl fmt::Display for ReferenceFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for ReferenceFrame {
    type Err = ReferenceFrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.strip_prefix(CCF_BASE_IRI).unwrap_or(s);
        if code.is_empty() {
            return Err(ReferenceFrameError::Empty);
        }
        if code.chars().any(char::is_whitespace) {
            return Err(ReferenceFrameError::Whitespace(code.to_string()));
        }
        Ok(match code {
            MALE_BODY => ReferenceFrame::MaleBody,
            FEMALE_BODY => ReferenceFrame::FemaleBody,
            other => ReferenceFrame::Organ(other.to_string()),
        })
    }
}

impl TryFrom<String> for ReferenceFrame {
    type Error = ReferenceFrameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ReferenceFrame> for String {
    fn from(frame: ReferenceFrame) -> Self {
        frame.code().to_string()
    }
}
