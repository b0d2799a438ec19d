use thiserror::Error;

/// Errors that can occur during spatial store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// No persisted row where exactly one was expected
    #[error("No rui_location for sample {hubmap_id} in reference frame {reference_frame}")]
    NotFound {
        hubmap_id: String,
        reference_frame: String,
    },

    /// Invalid query parameters
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Invalid store configuration
    #[error("Invalid store config: {0}")]
    Config(String),

    /// Solid could not be built from the rui_location
    #[error("Geometry error: {0}")]
    Geometry(#[from] spatial_geometry::GeometryError),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
