//! Request-level orchestration: action checks, burst liveness and identity.
//!
//! A [`Verifier`] owns shared handles to the two collaborators and the
//! pipeline configuration. Each call is independent. Per-frame failures in a
//! liveness burst are absorbed into diagnostics; only malformed input and
//! single-image failures surface as [`VerifyError`].

use std::sync::Arc;

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::action::{ActionDescriptor, SubActionResult};
use crate::collaborator::{CollaboratorError, EmbeddingExtractor, LandmarkDetector};
use crate::config::{MissingReference, PipelineConfig};
use crate::geometry::{FaceGeometry, GeometryError};
use crate::identity::{validate_embedding, CosineMatcher, Matcher};
use crate::liveness::{self, LivenessVerdict};
use crate::types::{Embedding, FrameObservation};

pub const MSG_MATCH_FOUND: &str = "Match Found";
pub const MSG_EXTRACTION_FAILED: &str = "Face extraction failed";
pub const MSG_SKIPPED: &str = "Skipped";
pub const MSG_MATCH_ERROR: &str = "Error during matching";

/// One burst frame as received: the decoded image, or why it could not be decoded.
pub type BurstFrame = Result<DynamicImage, String>;

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("no face detected")]
    NoFaceDetected,
    #[error("landmark detection failed: {0}")]
    Detection(CollaboratorError),
    #[error("embedding extraction failed: {0}")]
    Extraction(CollaboratorError),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

/// Features measured for a single-frame action check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDiagnostics {
    pub pitch: Option<f64>,
    pub yaw: Option<f64>,
    pub roll: Option<f64>,
    pub left_ear: f64,
    pub right_ear: f64,
    pub mar: f64,
    /// Set when head pose could not be estimated for this frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pose_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionReport {
    pub success: bool,
    /// Normalized descriptor as evaluated.
    pub action: String,
    pub diagnostics: ActionDiagnostics,
    pub sub_actions: Vec<SubActionResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityStatus {
    Matched,
    Mismatch,
    ExtractionFailed,
    MatchError,
    /// No reference was supplied, or no frame had a face.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Messages {
    pub liveness: String,
    pub identity: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameError {
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub ear_diff: f64,
    /// Cosine distance to the reference; 1.0 when no comparison ran.
    pub distance: f64,
    pub min_ear: f64,
    pub max_ear: f64,
    pub frames_total: usize,
    pub frames_valid: usize,
    pub best_frame: Option<usize>,
    pub liveness_verdict: LivenessVerdict,
    #[serde(default)]
    pub frame_errors: Vec<FrameError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub success: bool,
    pub liveness: bool,
    pub identity: bool,
    pub identity_status: IdentityStatus,
    pub messages: Messages,
    pub diagnostics: Diagnostics,
}

struct IdentityOutcome {
    passed: bool,
    status: IdentityStatus,
    message: String,
    distance: f64,
}

impl IdentityOutcome {
    fn not_run(passed: bool) -> Self {
        Self {
            passed,
            status: IdentityStatus::Skipped,
            message: MSG_SKIPPED.to_string(),
            distance: 1.0,
        }
    }

    fn failed(status: IdentityStatus, message: &str) -> Self {
        Self {
            passed: false,
            status,
            message: message.to_string(),
            distance: 1.0,
        }
    }
}

/// The decision pipeline bound to its collaborators.
pub struct Verifier {
    detector: Arc<dyn LandmarkDetector>,
    extractor: Arc<dyn EmbeddingExtractor>,
    matcher: Arc<dyn Matcher>,
    config: PipelineConfig,
}

impl Verifier {
    pub fn new(
        detector: Arc<dyn LandmarkDetector>,
        extractor: Arc<dyn EmbeddingExtractor>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            detector,
            extractor,
            matcher: Arc::new(CosineMatcher),
            config,
        }
    }

    pub fn with_matcher(mut self, matcher: Arc<dyn Matcher>) -> Self {
        self.matcher = matcher;
        self
    }

    /// Check whether the face in `image` performs the composite `action`.
    ///
    /// Fails with [`VerifyError::NoFaceDetected`] when the detector finds no
    /// face. A pose estimation failure does not error: pose-dependent
    /// sub-actions report `PoseUnavailable` and the check fails.
    pub fn verify_action(&self, image: &DynamicImage, action: &str) -> Result<ActionReport, VerifyError> {
        let descriptor = ActionDescriptor::parse(action);

        let landmarks = self
            .detector
            .detect(image)
            .map_err(VerifyError::Detection)?
            .ok_or(VerifyError::NoFaceDetected)?;
        let geometry = FaceGeometry::new(&landmarks, image.width(), image.height())?;
        let ratios = geometry.ratios()?;

        let (pose, pose_error) = match geometry.head_pose() {
            Ok(pose) => (Some(pose), None),
            Err(e) => {
                tracing::warn!(error = %e, "action: head pose unavailable");
                (None, Some(e.to_string()))
            }
        };

        let outcome = descriptor.evaluate(pose.as_ref(), &ratios, &self.config.thresholds);

        tracing::info!(
            action = %descriptor,
            success = outcome.success,
            pitch = pose.map(|p| p.pitch),
            yaw = pose.map(|p| p.yaw),
            roll = pose.map(|p| p.roll),
            left_ear = ratios.left_ear,
            right_ear = ratios.right_ear,
            mar = ratios.mar,
            "action check complete"
        );

        Ok(ActionReport {
            success: outcome.success,
            action: descriptor.to_string(),
            diagnostics: ActionDiagnostics {
                pitch: pose.map(|p| p.pitch),
                yaw: pose.map(|p| p.yaw),
                roll: pose.map(|p| p.roll),
                left_ear: ratios.left_ear,
                right_ear: ratios.right_ear,
                mar: ratios.mar,
                pose_error,
            },
            sub_actions: outcome.sub_actions,
        })
    }

    /// Judge liveness over a burst and, when a reference is given, match
    /// identity on the most open-eyed frame.
    ///
    /// Frames that failed to decode still count towards the burst size and
    /// are reported in `frame_errors`.
    pub fn verify_liveness(
        &self,
        frames: &[BurstFrame],
        reference: Option<&Embedding>,
    ) -> Result<VerificationResult, VerifyError> {
        if frames.is_empty() {
            return Err(VerifyError::InvalidInput("no images supplied".into()));
        }
        if let Some(reference) = reference {
            validate_embedding(reference)
                .map_err(|e| VerifyError::InvalidInput(format!("reference embedding: {e}")))?;
        }

        let mut frame_errors = Vec::new();
        let observations: Vec<FrameObservation> = frames
            .iter()
            .enumerate()
            .map(|(index, frame)| {
                let observed = match frame {
                    Ok(image) => self.observe(image),
                    Err(reason) => Err(reason.clone()),
                };
                match observed {
                    Ok(average_ear) => {
                        tracing::debug!(frame = index, average_ear, "frame observed");
                        FrameObservation::valid(index, average_ear)
                    }
                    Err(reason) => {
                        tracing::debug!(frame = index, %reason, "frame rejected");
                        frame_errors.push(FrameError { index, reason });
                        FrameObservation::invalid(index)
                    }
                }
            })
            .collect();

        let liveness = liveness::aggregate(&observations, &self.config.thresholds);

        let identity = match liveness.best_frame {
            // Terminal: nothing to match against, and both checks fail.
            None => IdentityOutcome::not_run(false),
            Some(best) => match (reference, &frames[best]) {
                (None, _) => IdentityOutcome::not_run(
                    self.config.missing_reference == MissingReference::NotApplicable,
                ),
                (Some(reference), Ok(image)) => {
                    self.match_identity(image, reference, best, &mut frame_errors)
                }
                // The best frame is always a decoded one.
                (Some(_), Err(_)) => {
                    IdentityOutcome::failed(IdentityStatus::ExtractionFailed, MSG_EXTRACTION_FAILED)
                }
            },
        };

        let success = liveness.is_live && identity.passed;

        tracing::info!(
            success,
            liveness = liveness.is_live,
            identity = identity.passed,
            ear_diff = liveness.ear_diff,
            distance = identity.distance,
            frames_total = liveness.frames_total,
            frames_valid = liveness.frames_valid,
            "liveness verification complete"
        );

        Ok(VerificationResult {
            success,
            liveness: liveness.is_live,
            identity: identity.passed,
            identity_status: identity.status,
            messages: Messages {
                liveness: liveness.message,
                identity: identity.message,
            },
            diagnostics: Diagnostics {
                ear_diff: liveness.ear_diff,
                distance: identity.distance,
                min_ear: liveness.min_ear,
                max_ear: liveness.max_ear,
                frames_total: liveness.frames_total,
                frames_valid: liveness.frames_valid,
                best_frame: liveness.best_frame,
                liveness_verdict: liveness.verdict,
                frame_errors,
            },
        })
    }

    /// Extract the embedding of the face in `image`, for later use as a reference.
    pub fn generate_embedding(&self, image: &DynamicImage) -> Result<Embedding, VerifyError> {
        let embedding = self
            .extractor
            .extract(image)
            .map_err(VerifyError::Extraction)?
            .ok_or(VerifyError::NoFaceDetected)?;
        tracing::info!(dim = embedding.dim(), "embedding generated");
        Ok(embedding)
    }

    /// Average EAR of one burst frame, or the reason the frame is unusable.
    fn observe(&self, image: &DynamicImage) -> Result<f64, String> {
        let landmarks = self
            .detector
            .detect(image)
            .map_err(|e| e.to_string())?
            .ok_or_else(|| "no face detected".to_string())?;
        let geometry =
            FaceGeometry::new(&landmarks, image.width(), image.height()).map_err(|e| e.to_string())?;
        let (left, right) = geometry.eye_aspect_ratios().map_err(|e| e.to_string())?;
        Ok((left + right) / 2.0)
    }

    fn match_identity(
        &self,
        image: &DynamicImage,
        reference: &Embedding,
        best: usize,
        frame_errors: &mut Vec<FrameError>,
    ) -> IdentityOutcome {
        let live = match self.extractor.extract(image) {
            Ok(Some(live)) => live,
            Ok(None) => {
                tracing::warn!(frame = best, "identity: no face for embedding");
                return IdentityOutcome::failed(IdentityStatus::ExtractionFailed, MSG_EXTRACTION_FAILED);
            }
            Err(e) => {
                tracing::warn!(frame = best, error = %e, "identity: extraction failed");
                frame_errors.push(FrameError {
                    index: best,
                    reason: e.to_string(),
                });
                return IdentityOutcome::failed(IdentityStatus::ExtractionFailed, MSG_EXTRACTION_FAILED);
            }
        };

        let max_distance = self.config.thresholds.max_identity_distance;
        match self.matcher.compare(&live, reference, max_distance) {
            Ok(m) => {
                tracing::debug!(
                    distance = m.distance,
                    threshold = max_distance,
                    matched = m.matched,
                    "identity: compared"
                );
                let (status, message) = if m.matched {
                    (IdentityStatus::Matched, MSG_MATCH_FOUND.to_string())
                } else {
                    (IdentityStatus::Mismatch, format!("Mismatch ({:.2})", m.distance))
                };
                IdentityOutcome {
                    passed: m.matched,
                    status,
                    message,
                    distance: m.distance,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "identity: comparison failed");
                frame_errors.push(FrameError {
                    index: best,
                    reason: format!("identity comparison: {e}"),
                });
                IdentityOutcome::failed(IdentityStatus::MatchError, MSG_MATCH_ERROR)
            }
        }
    }
}
