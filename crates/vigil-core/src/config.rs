use serde::{Deserialize, Serialize};

/// Numeric cut-offs used by the action verifier, liveness aggregator and identity matcher.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// |yaw| beyond which TURN_LEFT / TURN_RIGHT pass (degrees).
    pub turn_yaw: f64,
    /// |pitch| beyond which LOOK_UP / LOOK_DOWN pass (degrees).
    pub look_pitch: f64,
    /// |roll| beyond which TILT_LEFT / TILT_RIGHT pass (degrees).
    pub tilt_roll: f64,
    /// Mouth aspect ratio above which OPEN_MOUTH passes.
    pub open_mouth_mar: f64,
    /// Eye aspect ratio below which an eye counts as closed for BLINK.
    pub blink_ear: f64,
    /// Minimum max−min average EAR across a burst; below this the face is static.
    pub min_ear_diff: f64,
    /// Minimum peak average EAR across a burst; below this the eyes never opened.
    pub min_open_ear: f64,
    /// Cosine distance below which two embeddings are the same identity.
    pub max_identity_distance: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            turn_yaw: 20.0,
            look_pitch: 10.0,
            tilt_roll: 15.0,
            open_mouth_mar: 0.30,
            blink_ear: 0.18,
            min_ear_diff: 0.02,
            min_open_ear: 0.15,
            max_identity_distance: 0.45,
        }
    }
}

/// How a liveness request without a reference embedding is judged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingReference {
    /// Identity is not required: the final verdict is liveness alone.
    #[default]
    NotApplicable,
    /// Identity counts as failed, so the overall verification fails.
    Fail,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub thresholds: Thresholds,
    pub missing_reference: MissingReference,
}
