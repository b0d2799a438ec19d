//! Asynchronous cell-type count extraction.
//!
//! Requests are fire-and-forget: the collaborator answers `202 Accepted` and
//! later posts an [`ExtractionCallback`](spatial_protocol::ExtractionCallback)
//! back. [`ExtractionTracker`] remembers what is outstanding so lost
//! requests show up in the logs once they exceed the timeout.

mod client;
mod config;
mod coordinator;
mod error;
mod tracker;

pub use client::{ExtractionService, HttpExtractionClient};
pub use config::{ExtractionConfig, TOKEN_ENV_VAR};
pub use coordinator::{CompletionReport, ExtractionCoordinator};
pub use error::{ExtractionError, Result};
pub use tracker::{ExtractionTracker, PendingExtraction};
