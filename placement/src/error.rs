use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlacementError {
    /// The placement service answered with anything but 200.
    #[error("placement rejected for {target_iri}: HTTP {status}: {body}")]
    Rejected {
        status: u16,
        target_iri: String,
        body: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid placement config: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PlacementError>;
