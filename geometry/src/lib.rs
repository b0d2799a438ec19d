//! Sample solids and the affine placement applied to them.
//!
//! A sample's bounding box becomes a closed, outward-wound cuboid centred on
//! the origin. Its placement is a fixed pipeline (rotate X, rotate Y,
//! rotate Z, scale, translate) that can be rendered as a PostGIS expression
//! or evaluated in process.

mod error;
mod point;
mod solid;
mod transform;

pub use error::GeometryError;
pub use error::Result;
pub use point::Point3;
pub use solid::Solid;
pub use transform::PlacedSolid;
pub use transform::TransformPipeline;
pub use transform::TransformStep;
