//! Active liveness detection via blink dynamics across a burst of frames.
//!
//! A printed photograph or a frozen replay produces the same eye aspect ratio
//! in every frame. A live subject asked to blink shows a clear swing between
//! closed-eye and open-eye frames. This module compares the extreme average
//! EAR values of a burst and also picks the most open-eyed frame, which is the
//! most reliable input for embedding extraction.
//!
//! # Threat Coverage
//!
//! - **Blocks:** Printed photographs, static screens, frozen video frames.
//! - **Does not block:** Video replay of a blinking subject, 3D masks.

use serde::{Deserialize, Serialize};

use crate::config::Thresholds;
use crate::types::FrameObservation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LivenessVerdict {
    /// Multi-frame burst with enough EAR variation and open eyes.
    Live,
    /// Only one frame was supplied; accepted without a dynamics check.
    SingleFrame,
    /// EAR barely changed across the burst.
    StaticFace,
    /// The eyes never opened wide enough.
    EyesNotOpen,
    /// No frame contained a usable face.
    NoFace,
}

/// Result of a blink-dynamics liveness check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LivenessResult {
    /// Whether the burst passed the liveness check (true = likely live).
    pub is_live: bool,
    pub verdict: LivenessVerdict,
    pub message: String,
    pub min_ear: f64,
    pub max_ear: f64,
    /// `max_ear - min_ear`.
    pub ear_diff: f64,
    /// Input index of the valid frame with the highest average EAR.
    pub best_frame: Option<usize>,
    pub frames_total: usize,
    pub frames_valid: usize,
}

/// Judge a burst of frame observations.
///
/// Invalid observations and non-finite EARs are excluded. With a single
/// supplied frame the check passes as long as that frame has a face, which
/// keeps single-shot registration flows working. Ties in EAR are broken by input order, so the
/// result does not depend on the order frames finished processing.
pub fn aggregate(observations: &[FrameObservation], thresholds: &Thresholds) -> LivenessResult {
    let frames_total = observations.len();

    let mut valid: Vec<&FrameObservation> = observations
        .iter()
        .filter(|o| o.valid && o.average_ear.is_finite())
        .collect();
    valid.sort_by_key(|o| o.index);
    valid.sort_by(|a, b| a.average_ear.total_cmp(&b.average_ear));

    let (Some(min_frame), Some(max_frame)) = (valid.first(), valid.last()) else {
        return LivenessResult {
            is_live: false,
            verdict: LivenessVerdict::NoFace,
            message: "No face detected in any frame".to_string(),
            min_ear: 0.0,
            max_ear: 0.0,
            ear_diff: 0.0,
            best_frame: None,
            frames_total,
            frames_valid: 0,
        };
    };

    let min_ear = min_frame.average_ear;
    let max_ear = max_frame.average_ear;
    let ear_diff = max_ear - min_ear;

    let (verdict, message) = if frames_total <= 1 {
        (LivenessVerdict::SingleFrame, "OK".to_string())
    } else if ear_diff < thresholds.min_ear_diff {
        (
            LivenessVerdict::StaticFace,
            format!("Static Face (Diff: {ear_diff:.3})"),
        )
    } else if max_ear < thresholds.min_open_ear {
        (
            LivenessVerdict::EyesNotOpen,
            format!("Eyes not open (Max: {max_ear:.3})"),
        )
    } else {
        (LivenessVerdict::Live, "OK".to_string())
    };

    tracing::debug!(
        min_ear,
        max_ear,
        ear_diff,
        frames_total,
        frames_valid = valid.len(),
        ?verdict,
        "liveness: burst analysed"
    );

    LivenessResult {
        is_live: matches!(verdict, LivenessVerdict::Live | LivenessVerdict::SingleFrame),
        verdict,
        message,
        min_ear,
        max_ear,
        ear_diff,
        best_frame: Some(max_frame.index),
        frames_total,
        frames_valid: valid.len(),
    }
}
