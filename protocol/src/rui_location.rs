use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

const SPATIAL_ENTITY: &str = "SpatialEntity";
const SPATIAL_PLACEMENT: &str = "SpatialPlacement";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuiLocationError {
    #[error("malformed rui_location: {0}")]
    Malformed(String),

    #[error("rui_location @type must be SpatialEntity, got {0:?}")]
    EntityType(String),

    #[error("placement @type must be SpatialPlacement, got {0:?}")]
    PlacementType(String),

    #[error("{axis}_dimension must be a non-negative finite number, got {value}")]
    Dimension { axis: char, value: f64 },

    #[error("placement target must not be empty")]
    EmptyTarget,
}

/// Bounding-box dimensions of a sample plus its placement in a reference
/// frame.
///
/// Fields this crate does not interpret (`@context`, `@id`, `creator`,
/// `ccf_annotations`, ...) are carried in `extra` so a location can be
/// written back exactly as it was received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuiLocation {
    #[serde(rename = "@type", default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    pub x_dimension: f64,
    pub y_dimension: f64,
    pub z_dimension: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension_units: Option<String>,
    pub placement: Placement,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Affine placement of a sample: rotation about X, Y, Z, then per-axis
/// scaling, then translation.
///
/// Units and `rotation_order` are kept for round-tripping but are not
/// applied by the geometry builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    #[serde(rename = "@type", default, skip_serializing_if = "Option::is_none")]
    pub placement_type: Option<String>,
    pub target: String,
    #[serde(default)]
    pub x_rotation: f64,
    #[serde(default)]
    pub y_rotation: f64,
    #[serde(default)]
    pub z_rotation: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation_order: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation_units: Option<String>,
    #[serde(default = "unit_scale")]
    pub x_scaling: f64,
    #[serde(default = "unit_scale")]
    pub y_scaling: f64,
    #[serde(default = "unit_scale")]
    pub z_scaling: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scaling_units: Option<String>,
    #[serde(default)]
    pub x_translation: f64,
    #[serde(default)]
    pub y_translation: f64,
    #[serde(default)]
    pub z_translation: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation_units: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn unit_scale() -> f64 {
    1.0
}

impl RuiLocation {
    /// Parse the serialized form stored on graph nodes and check its shape.
    pub fn parse(raw: &str) -> Result<Self, RuiLocationError> {
        let location: RuiLocation = serde_json::from_str(raw)
            .map_err(|err| RuiLocationError::Malformed(err.to_string()))?;
        location.validate()?;
        Ok(location)
    }

    pub fn validate(&self) -> Result<(), RuiLocationError> {
        if let Some(kind) = &self.entity_type
            && kind != SPATIAL_ENTITY
        {
            return Err(RuiLocationError::EntityType(kind.clone()));
        }
        for (axis, value) in [
            ('x', self.x_dimension),
            ('y', self.y_dimension),
            ('z', self.z_dimension),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(RuiLocationError::Dimension { axis, value });
            }
        }
        self.placement.validate()
    }

    pub fn dimensions(&self) -> (f64, f64, f64) {
        (self.x_dimension, self.y_dimension, self.z_dimension)
    }

    /// The same location with its placement swapped out wholesale.
    pub fn with_placement(&self, placement: Placement) -> Self {
        RuiLocation {
            placement,
            ..self.clone()
        }
    }
}

impl Placement {
    pub fn validate(&self) -> Result<(), RuiLocationError> {
        if let Some(kind) = &self.placement_type
            && kind != SPATIAL_PLACEMENT
        {
            return Err(RuiLocationError::PlacementType(kind.clone()));
        }
        if self.target.trim().is_empty() {
            return Err(RuiLocationError::EmptyTarget);
        }
        Ok(())
    }

    /// Identifier after the IRI fragment marker, or the whole target when
    /// there is none.
    pub fn target_code(&self) -> &str {
        self.target
            .rsplit_once('#')
            .map_or(self.target.as_str(), |(_, code)| code)
    }

    pub fn rotation(&self) -> [f64; 3] {
        [self.x_rotation, self.y_rotation, self.z_rotation]
    }

    pub fn scaling(&self) -> [f64; 3] {
        [self.x_scaling, self.y_scaling, self.z_scaling]
    }

    pub fn translation(&self) -> [f64; 3] {
        [self.x_translation, self.y_translation, self.z_translation]
    }
}
