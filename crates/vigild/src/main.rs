use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;
use vigil_core::Verifier;
use vigil_models::{OnnxEmbeddingExtractor, OnnxLandmarkDetector};

mod config;
mod dbus_interface;
mod engine;
mod request;

use config::Config;
use dbus_interface::{AppState, VigilService, BUS_NAME, OBJECT_PATH};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("vigild starting");

    let config = Config::from_env();
    tracing::info!(
        model_dir = %config.model_dir.display(),
        session_bus = config.session_bus,
        max_frames = config.max_frames,
        missing_reference = ?config.pipeline.missing_reference,
        "configuration loaded"
    );

    vigil_models::verify_models_dir(&config.model_dir)
        .context("model integrity check failed (run `vigil setup`)")?;
    tracing::info!("model checksums verified");

    let detector = OnnxLandmarkDetector::load(&config.landmark_model_path())?
        .with_min_face_score(config.min_face_score);
    let extractor = OnnxEmbeddingExtractor::load(&config.embedding_model_path())?;
    let verifier = Verifier::new(Arc::new(detector), Arc::new(extractor), config.pipeline);

    let engine = engine::spawn_engine(verifier)?;

    let session_bus = config.session_bus;
    let service = VigilService {
        state: Arc::new(AppState { config, engine }),
    };

    let builder = if session_bus {
        zbus::connection::Builder::session()?
    } else {
        zbus::connection::Builder::system()?
    };
    let _conn = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await
        .with_context(|| format!("failed to register {BUS_NAME} on the D-Bus"))?;

    tracing::info!(
        bus = if session_bus { "session" } else { "system" },
        "vigild ready"
    );

    // Keep running until signaled
    tokio::signal::ctrl_c().await?;
    tracing::info!("vigild shutting down");

    Ok(())
}
