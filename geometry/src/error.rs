use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("{axis} dimension must be a non-negative finite number, got {value}")]
    InvalidDimension { axis: char, value: f64 },

    #[error("placement {field} is not a finite number")]
    NonFinitePlacement { field: &'static str },
}

pub type Result<T> = std::result::Result<T, GeometryError>;
