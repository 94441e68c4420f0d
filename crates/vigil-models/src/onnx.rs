//! ONNX Runtime implementations of the landmark and embedding collaborators.
//!
//! Sessions are created once and guarded by a `Mutex`, since inference needs
//! exclusive access to the session.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::Tensor;
use thiserror::Error;
use vigil_core::{CollaboratorError, Embedding, EmbeddingExtractor, Landmark, LandmarkDetector, LandmarkSet};

/// Face-mesh input edge in pixels.
pub const LANDMARK_INPUT_SIZE: u32 = 192;
/// Face-mesh point count.
pub const MESH_POINTS: usize = 468;
/// Embedding model input edge in pixels.
pub const EMBEDDING_INPUT_SIZE: u32 = 160;

#[derive(Error, Debug)]
pub enum OnnxError {
    #[error("failed to load model {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: ort::Error,
    },
}

fn load_session(path: &Path) -> Result<Session, OnnxError> {
    let build = || -> ort::Result<Session> { Session::builder()?.commit_from_file(path) };
    build().map_err(|source| OnnxError::Load {
        path: path.to_path_buf(),
        source,
    })
}

fn inference(e: impl std::fmt::Display) -> CollaboratorError {
    CollaboratorError::Inference(e.to_string())
}

/// Run a single-input session and return every output as a flat f32 vector.
fn run_session(session: &Mutex<Session>, input: Array4<f32>) -> Result<Vec<Vec<f32>>, CollaboratorError> {
    let tensor = Tensor::from_array(input).map_err(inference)?;
    let mut session = session
        .lock()
        .map_err(|_| CollaboratorError::Inference("session lock poisoned".into()))?;
    let outputs = session.run(ort::inputs![tensor]).map_err(inference)?;

    let mut flat = Vec::with_capacity(outputs.len());
    for i in 0..outputs.len() {
        let (_, data) = outputs[i].try_extract_tensor::<f32>().map_err(inference)?;
        flat.push(data.to_vec());
    }
    Ok(flat)
}

/// 468-point face mesh over the full frame.
pub struct OnnxLandmarkDetector {
    session: Mutex<Session>,
    min_face_score: f32,
}

impl OnnxLandmarkDetector {
    pub const DEFAULT_MIN_FACE_SCORE: f32 = 0.5;

    pub fn load(path: &Path) -> Result<Self, OnnxError> {
        let session = load_session(path)?;
        tracing::info!(path = %path.display(), "face mesh model loaded");
        Ok(Self {
            session: Mutex::new(session),
            min_face_score: Self::DEFAULT_MIN_FACE_SCORE,
        })
    }

    pub fn with_min_face_score(mut self, score: f32) -> Self {
        self.min_face_score = score;
        self
    }
}

impl LandmarkDetector for OnnxLandmarkDetector {
    fn detect(&self, image: &DynamicImage) -> Result<Option<LandmarkSet>, CollaboratorError> {
        let outputs = run_session(&self.session, landmark_input(image))?;

        let mesh = outputs
            .iter()
            .find(|o| o.len() == MESH_POINTS * 3)
            .ok_or_else(|| CollaboratorError::Inference("no face mesh output".into()))?;
        let score = outputs
            .iter()
            .find(|o| o.len() == 1)
            .map(|o| sigmoid(o[0]))
            .unwrap_or(1.0);

        if score < self.min_face_score {
            tracing::debug!(score, "face mesh: no face");
            return Ok(None);
        }
        Ok(Some(mesh_to_landmarks(mesh)))
    }
}

/// FaceNet-style embedding of the full frame.
pub struct OnnxEmbeddingExtractor {
    session: Mutex<Session>,
    model_version: String,
}

impl OnnxEmbeddingExtractor {
    pub fn load(path: &Path) -> Result<Self, OnnxError> {
        let session = load_session(path)?;
        let model_version = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        tracing::info!(path = %path.display(), "embedding model loaded");
        Ok(Self {
            session: Mutex::new(session),
            model_version,
        })
    }
}

impl EmbeddingExtractor for OnnxEmbeddingExtractor {
    fn extract(&self, image: &DynamicImage) -> Result<Option<Embedding>, CollaboratorError> {
        let input = embedding_input(image);
        let values = run_session(&self.session, input)?
            .into_iter()
            .next()
            .unwrap_or_default();

        if values.is_empty() || values.iter().all(|v| *v == 0.0) {
            return Ok(None);
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(CollaboratorError::Inference("non-finite embedding".into()));
        }
        Ok(Some(Embedding::new(values).with_model_version(&self.model_version)))
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// NCHW, RGB scaled to [0, 1].
fn landmark_input(image: &DynamicImage) -> Array4<f32> {
    let size = LANDMARK_INPUT_SIZE;
    let rgb = image.resize_exact(size, size, FilterType::Triangle).to_rgb8();
    let s = size as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, s, s));
    for (x, y, p) in rgb.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = p[c] as f32 / 255.0;
        }
    }
    tensor
}

/// NHWC with per-image standardisation.
fn embedding_input(image: &DynamicImage) -> Array4<f32> {
    let size = EMBEDDING_INPUT_SIZE;
    let rgb = image.resize_exact(size, size, FilterType::Triangle).to_rgb8();
    let s = size as usize;
    let mut tensor = Array4::<f32>::zeros((1, s, s, 3));
    for (x, y, p) in rgb.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, y as usize, x as usize, c]] = p[c] as f32;
        }
    }

    let n = tensor.len() as f32;
    let mean = tensor.sum() / n;
    let var = tensor.mapv(|v| (v - mean) * (v - mean)).sum() / n;
    let std = var.sqrt().max(1.0 / n.sqrt());
    tensor.mapv_inplace(|v| (v - mean) / std);
    tensor
}

/// Mesh coordinates are in input pixels; normalize to fractions of the frame.
fn mesh_to_landmarks(mesh: &[f32]) -> LandmarkSet {
    let scale = LANDMARK_INPUT_SIZE as f32;
    LandmarkSet::new(
        mesh.chunks_exact(3)
            .map(|p| Landmark::new(p[0] / scale, p[1] / scale, p[2] / scale))
            .collect(),
    )
}
