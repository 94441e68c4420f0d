//! Face liveness and identity decisions from landmarks and embeddings.
//!
//! Landmark detection and embedding extraction are external collaborators
//! (see [`collaborator`]); this crate turns their outputs into head pose, eye
//! and mouth ratios, challenge-action verdicts, burst liveness and identity
//! matches, and combines them in [`Verifier`].

pub mod action;
pub mod collaborator;
pub mod config;
pub mod geometry;
pub mod identity;
pub mod liveness;
pub mod pipeline;
pub mod pnp;
pub mod types;

pub use action::{Action, ActionDescriptor, ActionOutcome, SubActionResult, Verdict};
pub use collaborator::{CollaboratorError, EmbeddingExtractor, LandmarkDetector};
pub use config::{MissingReference, PipelineConfig, Thresholds};
pub use geometry::{FaceGeometry, GeometryError};
pub use identity::{CosineMatcher, MatchError, MatchResult, Matcher};
pub use liveness::{LivenessResult, LivenessVerdict};
pub use pipeline::{
    ActionReport, BurstFrame, IdentityStatus, VerificationResult, Verifier, VerifyError,
};
pub use types::{Embedding, FaceRatios, FrameObservation, Landmark, LandmarkSet, PoseAngles};
