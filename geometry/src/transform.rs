use spatial_protocol::Placement;
use spatial_protocol::RuiLocation;

use crate::error::GeometryError;
use crate::error::Result;
use crate::point::Point3;
use crate::solid::Solid;

/// One stage of the placement pipeline. Angles are taken as radians,
/// exactly as stored in the placement; unit metadata is not applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransformStep {
    RotateX(f64),
    RotateY(f64),
    RotateZ(f64),
    Scale(Point3),
    Translate(Point3),
}

impl TransformStep {
    pub fn apply(self, p: Point3) -> Point3 {
        match self {
            TransformStep::RotateX(angle) => {
                let (sin, cos) = angle.sin_cos();
                Point3::new(p.x, p.y * cos - p.z * sin, p.y * sin + p.z * cos)
            }
            TransformStep::RotateY(angle) => {
                let (sin, cos) = angle.sin_cos();
                Point3::new(p.x * cos + p.z * sin, p.y, -p.x * sin + p.z * cos)
            }
            TransformStep::RotateZ(angle) => {
                let (sin, cos) = angle.sin_cos();
                Point3::new(p.x * cos - p.y * sin, p.x * sin + p.y * cos, p.z)
            }
            TransformStep::Scale(s) => Point3::new(p.x * s.x, p.y * s.y, p.z * s.z),
            TransformStep::Translate(t) => p + t,
        }
    }
}

/// Rotate about X, then Y, then Z, then scale per axis, then translate.
///
/// The order is fixed; a non-uniform scale or a non-trivial rotation lands
/// samples somewhere else if it is changed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformPipeline {
    rotation: Point3,
    scaling: Point3,
    translation: Point3,
}

impl TransformPipeline {
    pub fn identity() -> Self {
        Self {
            rotation: Point3::ORIGIN,
            scaling: Point3::new(1.0, 1.0, 1.0),
            translation: Point3::ORIGIN,
        }
    }

    pub fn from_placement(placement: &Placement) -> Result<Self> {
        let checked = |field: &'static str, values: [f64; 3]| {
            if values.into_iter().all(f64::is_finite) {
                Ok(Point3::from(values))
            } else {
                Err(GeometryError::NonFinitePlacement { field })
            }
        };
        Ok(Self {
            rotation: checked("rotation", placement.rotation())?,
            scaling: checked("scaling", placement.scaling())?,
            translation: checked("translation", placement.translation())?,
        })
    }

    pub fn steps(&self) -> [TransformStep; 5] {
        [
            TransformStep::RotateX(self.rotation.x),
            TransformStep::RotateY(self.rotation.y),
            TransformStep::RotateZ(self.rotation.z),
            TransformStep::Scale(self.scaling),
            TransformStep::Translate(self.translation),
        ]
    }

    pub fn apply(&self, p: Point3) -> Point3 {
        self.steps().into_iter().fold(p, |acc, step| step.apply(acc))
    }

    /// Where the origin of the base solid ends up.
    pub fn origin(&self) -> Point3 {
        self.apply(Point3::ORIGIN)
    }

    /// The same pipeline as nested PostGIS calls around `geometry`, with
    /// numbered placeholders starting at `$first_param`. Bind
    /// [`Self::bind_values`] in order.
    pub fn postgis_expression(&self, geometry: &str, first_param: usize) -> String {
        let p = |offset: usize| format!("${}::float8", first_param + offset);
        format!(
            "ST_Translate(ST_Scale(ST_RotateZ(ST_RotateY(ST_RotateX({geometry}, {}), {}), {}), {}, {}, {}), {}, {}, {})",
            p(0),
            p(1),
            p(2),
            p(3),
            p(4),
            p(5),
            p(6),
            p(7),
            p(8),
        )
    }

    pub fn bind_values(&self) -> [f64; 9] {
        [
            self.rotation.x,
            self.rotation.y,
            self.rotation.z,
            self.scaling.x,
            self.scaling.y,
            self.scaling.z,
            self.translation.x,
            self.translation.y,
            self.translation.z,
        ]
    }
}

/// Base cuboid of a sample together with the pipeline that places it.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedSolid {
    pub base: Solid,
    pub pipeline: TransformPipeline,
}

impl PlacedSolid {
    pub fn from_location(location: &RuiLocation) -> Result<Self> {
        let (x, y, z) = location.dimensions();
        Ok(Self {
            base: Solid::cuboid(x, y, z)?,
            pipeline: TransformPipeline::from_placement(&location.placement)?,
        })
    }

    /// The solid in reference-frame coordinates.
    pub fn world(&self) -> Solid {
        self.base.map_vertices(|p| self.pipeline.apply(p))
    }

    pub fn centroid(&self) -> Point3 {
        self.pipeline.origin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::f64::consts::FRAC_PI_2;

    fn close(a: Point3, b: Point3) -> bool {
        a.distance(b) < 1e-9
    }

    fn location(json: serde_json::Value) -> RuiLocation {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn rotation_happens_before_scaling() {
        let pipeline = TransformPipeline {
            rotation: Point3::new(0.0, 0.0, FRAC_PI_2),
            scaling: Point3::new(2.0, 1.0, 1.0),
            translation: Point3::new(10.0, 0.0, 0.0),
        };
        // (1,0,0) rotates onto +y, where the x-scale has no effect.
        assert!(close(
            pipeline.apply(Point3::new(1.0, 0.0, 0.0)),
            Point3::new(10.0, 1.0, 0.0)
        ));
    }

    #[test]
    fn rotations_compose_x_then_y_then_z() {
        let pipeline = TransformPipeline {
            rotation: Point3::new(FRAC_PI_2, FRAC_PI_2, 0.0),
            ..TransformPipeline::identity()
        };
        // +y -> +z about X, then +z -> +x about Y.
        assert!(close(
            pipeline.apply(Point3::new(0.0, 1.0, 0.0)),
            Point3::new(1.0, 0.0, 0.0)
        ));
    }

    #[test]
    fn volume_ignores_rotation_and_translation() {
        let placed = PlacedSolid::from_location(&location(serde_json::json!({
            "x_dimension": 10, "y_dimension": 12, "z_dimension": 3,
            "placement": {
                "target": "http://purl.org/ccf/latest/ccf.owl#VHMale",
                "x_rotation": 0.3, "y_rotation": 1.1, "z_rotation": -2.0,
                "x_scaling": 2, "y_scaling": 1, "z_scaling": 0.25,
                "x_translation": 100, "y_translation": -40, "z_translation": 7
            }
        })))
        .unwrap();

        let world = placed.world();
        assert!(world.is_closed());
        assert_eq!(world.volume().round(), 180.0);
        assert!(close(placed.centroid(), Point3::new(100.0, -40.0, 7.0)));
    }

    #[test]
    fn postgis_expression_matches_bind_order() {
        let pipeline = TransformPipeline::identity();
        assert_eq!(
            pipeline.postgis_expression("ST_GeomFromText($1)", 2),
            "ST_Translate(ST_Scale(ST_RotateZ(ST_RotateY(ST_RotateX(ST_GeomFromText($1), $2::float8), $3::float8), $4::float8), $5::float8, $6::float8, $7::float8), $8::float8, $9::float8, $10::float8)"
        );
        assert_eq!(
            pipeline.bind_values(),
            [0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0]
        );
    }

    #[test]
    fn non_finite_placement_is_rejected() {
        let mut loc = location(serde_json::json!({
            "x_dimension": 1, "y_dimension": 1, "z_dimension": 1,
            "placement": { "target": "#LK" }
        }));
        loc.placement.y_scaling = f64::INFINITY;
        assert_eq!(
            PlacedSolid::from_location(&loc),
            Err(GeometryError::NonFinitePlacement { field: "scaling" })
        );
    }
}
