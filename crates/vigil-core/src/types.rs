use serde::{Deserialize, Serialize};

/// A single face-mesh landmark in normalized image coordinates.
///
/// `x` and `y` are fractions of the image width and height; `z` is the
/// model's relative depth (same scale as `x`, smaller is closer to the camera).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Landmarks for one detected face, indexed by the 468-point face-mesh numbering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandmarkSet {
    points: Vec<Landmark>,
}

impl LandmarkSet {
    pub fn new(points: Vec<Landmark>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Landmark> {
        self.points.get(index)
    }

    pub fn points(&self) -> &[Landmark] {
        &self.points
    }
}

/// A face embedding vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Identifier of the model that produced the vector, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    pub fn with_model_version(mut self, version: impl Into<String>) -> Self {
        self.model_version = Some(version.into());
        self
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }
}

/// Head pose in degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PoseAngles {
    /// Vertical tilt; positive looks up.
    pub pitch: f64,
    /// Horizontal turn; negative turns left.
    pub yaw: f64,
    /// In-plane tilt; positive tilts left.
    pub roll: f64,
}

/// Eye and mouth aspect ratios for one face.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceRatios {
    pub left_ear: f64,
    pub right_ear: f64,
    pub mar: f64,
}

impl FaceRatios {
    pub fn average_ear(&self) -> f64 {
        (self.left_ear + self.right_ear) / 2.0
    }
}

/// Derived state of one frame in a liveness burst.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameObservation {
    /// Position of the frame in the caller's input sequence.
    pub index: usize,
    /// Mean of the left and right eye aspect ratios; 0.0 for invalid frames.
    pub average_ear: f64,
    /// False when no usable face was found in the frame.
    pub valid: bool,
}

impl FrameObservation {
    pub fn valid(index: usize, average_ear: f64) -> Self {
        Self {
            index,
            average_ear,
            valid: true,
        }
    }

    pub fn invalid(index: usize) -> Self {
        Self {
            index,
            average_ear: 0.0,
            valid: false,
        }
    }
}
