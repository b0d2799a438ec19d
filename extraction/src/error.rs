use spatial_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("extraction request for sample {sample_uuid} rejected with status {status}: {body}")]
    Rejected {
        sample_uuid: String,
        status: u16,
        body: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid extraction config: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ExtractionError>;
