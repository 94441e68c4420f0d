use std::sync::Arc;
use std::time::Duration;

use tracing::Instrument;
use vigil_core::VerifyError;
use zbus::interface;

use crate::config::Config;
use crate::engine::{EngineError, EngineHandle};
use crate::request;

pub const BUS_NAME: &str = "org.freedesktop.Vigil1";
pub const OBJECT_PATH: &str = "/org/freedesktop/Vigil1";

/// Shared state accessible by D-Bus method handlers. Read-only after startup.
pub struct AppState {
    pub config: Config,
    pub engine: EngineHandle,
}

/// D-Bus interface for the Vigil verification daemon.
///
/// Bus name: org.freedesktop.Vigil1
/// Object path: /org/freedesktop/Vigil1
pub struct VigilService {
    pub state: Arc<AppState>,
}

impl VigilService {
    fn timeout(&self) -> Duration {
        Duration::from_secs(self.state.config.verify_timeout_secs)
    }
}

fn engine_error(e: EngineError) -> zbus::fdo::Error {
    match e {
        EngineError::Verify(VerifyError::InvalidInput(msg)) => zbus::fdo::Error::InvalidArgs(msg),
        other => {
            tracing::error!(error = %other, "engine request failed");
            zbus::fdo::Error::Failed(other.to_string())
        }
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
}

fn request_span(method: &'static str) -> tracing::Span {
    tracing::info_span!("request", id = %uuid::Uuid::new_v4(), method)
}

#[interface(name = "org.freedesktop.Vigil1")]
impl VigilService {
    /// Check whether the face in `image` performs `action` (e.g. `TURN_LEFT+OPEN_MOUTH`).
    ///
    /// Returns the action report as JSON.
    async fn verify_action(&self, image: Vec<u8>, action: &str) -> zbus::fdo::Result<String> {
        async {
            tracing::info!(action, bytes = image.len(), "verify_action requested");
            request::check_action(action)?;
            let image = request::decode_image(0, &image)?;

            let report = self
                .state
                .engine
                .verify_action(image, action.to_string(), self.timeout())
                .await
                .map_err(engine_error)?;

            tracing::info!(success = report.success, "verify_action complete");
            to_json(&report)
        }
        .instrument(request_span("VerifyAction"))
        .await
    }

    /// Judge liveness over a burst of images and, when `reference` is
    /// non-empty, match identity against it.
    ///
    /// Returns the verification result as JSON.
    async fn verify_liveness(&self, images: Vec<Vec<u8>>, reference: Vec<f64>) -> zbus::fdo::Result<String> {
        async {
            tracing::info!(
                frames = images.len(),
                has_reference = !reference.is_empty(),
                "verify_liveness requested"
            );
            let burst = request::decode_burst(&images, self.state.config.max_frames)?;
            let reference = request::parse_reference(&reference)?;

            let result = self
                .state
                .engine
                .verify_liveness(burst, reference, self.timeout())
                .await
                .map_err(engine_error)?;

            tracing::info!(
                success = result.success,
                liveness = result.liveness,
                identity = result.identity,
                "verify_liveness complete"
            );
            to_json(&result)
        }
        .instrument(request_span("VerifyLiveness"))
        .await
    }

    /// Extract a reference embedding from one image.
    ///
    /// Returns `{"embedding": [...], "model_version": ...}` as JSON.
    async fn generate_embedding(&self, image: Vec<u8>) -> zbus::fdo::Result<String> {
        async {
            tracing::info!(bytes = image.len(), "generate_embedding requested");
            let image = request::decode_image(0, &image)?;
            let embedding = self
                .state
                .engine
                .generate_embedding(image, self.timeout())
                .await
                .map_err(engine_error)?;
            to_json(&serde_json::json!({
                "embedding": embedding.values,
                "model_version": embedding.model_version,
            }))
        }
        .instrument(request_span("GenerateEmbedding"))
        .await
    }

    /// Return daemon status information as JSON.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let config = &self.state.config;
        to_json(&serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "model_dir": config.model_dir.display().to_string(),
            "session_bus": config.session_bus,
            "max_frames": config.max_frames,
            "verify_timeout_secs": config.verify_timeout_secs,
            "pipeline": config.pipeline,
        }))
    }
}
