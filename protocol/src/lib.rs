//! Shared data model for the spatial index.
//!
//! Samples and their placement metadata originate in the graph store; the
//! types here describe them as they travel between the graph source, the
//! spatial store, and the external placement and extraction collaborators.

mod dataset;
mod extraction;
mod reference_frame;
mod rui_location;
mod sample;

pub use dataset::DatasetDigest;
pub use dataset::DatasetIndex;
pub use dataset::DatasetTimestamps;
pub use dataset::digests_of;
pub use extraction::ExtractionCallback;
pub use extraction::ExtractionRequest;
pub use reference_frame::CCF_BASE_IRI;
pub use reference_frame::ReferenceFrame;
pub use reference_frame::ReferenceFrameError;
pub use rui_location::Placement;
pub use rui_location::RuiLocation;
pub use rui_location::RuiLocationError;
pub use sample::Donor;
pub use sample::Organ;
pub use sample::Sample;
pub use sample::SampleRecord;
pub use sample::Sex;
