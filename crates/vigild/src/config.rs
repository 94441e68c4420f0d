use std::path::PathBuf;

use vigil_core::{MissingReference, PipelineConfig, Thresholds};

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Directory containing ONNX model files and their checksum lockfile.
    pub model_dir: PathBuf,
    /// Whether the daemon is running on the session bus (development mode).
    pub session_bus: bool,
    /// Maximum number of images accepted in one liveness burst.
    pub max_frames: usize,
    /// Timeout in seconds for one engine request.
    pub verify_timeout_secs: u64,
    /// Face-presence score below which the mesh model reports no face.
    pub min_face_score: f32,
    /// Thresholds and missing-reference policy handed to the pipeline.
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Load configuration from `VIGIL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let model_dir = lookup("VIGIL_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(vigil_models::default_model_dir);

        let defaults = Thresholds::default();
        let thresholds = Thresholds {
            max_identity_distance: parse_or(
                &lookup,
                "VIGIL_DISTANCE_THRESHOLD",
                defaults.max_identity_distance,
            ),
            min_ear_diff: parse_or(&lookup, "VIGIL_MIN_EAR_DIFF", defaults.min_ear_diff),
            min_open_ear: parse_or(&lookup, "VIGIL_MIN_OPEN_EAR", defaults.min_open_ear),
            ..defaults
        };

        let missing_reference = match lookup("VIGIL_REQUIRE_REFERENCE") {
            Some(v) if v != "0" => MissingReference::Fail,
            _ => MissingReference::NotApplicable,
        };

        Self {
            model_dir,
            session_bus: lookup("VIGIL_SESSION_BUS").is_some(),
            max_frames: parse_or(&lookup, "VIGIL_MAX_FRAMES", 10),
            verify_timeout_secs: parse_or(&lookup, "VIGIL_VERIFY_TIMEOUT_SECS", 10),
            min_face_score: parse_or(&lookup, "VIGIL_MIN_FACE_SCORE", 0.5),
            pipeline: PipelineConfig {
                thresholds,
                missing_reference,
            },
        }
    }

    /// Path to the face-mesh landmark model.
    pub fn landmark_model_path(&self) -> PathBuf {
        self.model_dir.join(vigil_models::LANDMARK_MODEL)
    }

    /// Path to the face embedding model.
    pub fn embedding_model_path(&self) -> PathBuf {
        self.model_dir.join(vigil_models::EMBEDDING_MODEL)
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
