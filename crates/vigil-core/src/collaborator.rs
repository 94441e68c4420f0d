//! Contracts for the two model-backed collaborators the pipeline consumes.
//!
//! Implementations are loaded once per process and shared read-only behind
//! an `Arc`, so both traits require `Send + Sync`.

use image::DynamicImage;
use thiserror::Error;

use crate::types::{Embedding, LandmarkSet};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CollaboratorError {
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("image preprocessing failed: {0}")]
    Image(String),
}

/// Face-mesh landmark detection.
pub trait LandmarkDetector: Send + Sync {
    /// Landmarks of the most prominent face, or `Ok(None)` when no face is present.
    fn detect(&self, image: &DynamicImage) -> Result<Option<LandmarkSet>, CollaboratorError>;
}

/// Face embedding extraction.
pub trait EmbeddingExtractor: Send + Sync {
    /// Embedding of the most prominent face, or `Ok(None)` when no face is present.
    fn extract(&self, image: &DynamicImage) -> Result<Option<Embedding>, CollaboratorError>;
}
