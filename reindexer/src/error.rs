use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReindexError {
    #[error("Graph error: {0}")]
    Graph(#[from] spatial_graph::GraphError),

    #[error("Store error: {0}")]
    Store(#[from] spatial_store::StoreError),

    #[error("Placement error: {0}")]
    Placement(#[from] spatial_placement::PlacementError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] spatial_extraction::ExtractionError),

    #[error("Sample not found in graph: {0}")]
    SampleNotFound(String),

    #[error("Graph returned {count} records for sample {sample_uuid}")]
    AmbiguousSample { sample_uuid: String, count: usize },

    #[error("Reindex task failed: {0}")]
    Task(String),

    #[error("Invalid reindex config: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ReindexError>;
