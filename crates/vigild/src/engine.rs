use std::time::Duration;

use image::DynamicImage;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use vigil_core::{ActionReport, BurstFrame, Embedding, VerificationResult, Verifier, VerifyError};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Verify(#[from] VerifyError),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("engine thread exited")]
    ChannelClosed,
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Messages sent from D-Bus handlers to the engine thread.
enum EngineRequest {
    VerifyAction {
        image: DynamicImage,
        action: String,
        reply: oneshot::Sender<Result<ActionReport, VerifyError>>,
    },
    VerifyLiveness {
        frames: Vec<BurstFrame>,
        reference: Option<Embedding>,
        reply: oneshot::Sender<Result<VerificationResult, VerifyError>>,
    },
    GenerateEmbedding {
        image: DynamicImage,
        reply: oneshot::Sender<Result<Embedding, VerifyError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    async fn call<T>(
        &self,
        timeout: Duration,
        build: impl FnOnce(oneshot::Sender<Result<T, VerifyError>>) -> EngineRequest,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        let reply = tokio::time::timeout(timeout, reply_rx)
            .await
            .map_err(|_| EngineError::Timeout(timeout))?
            .map_err(|_| EngineError::ChannelClosed)?;
        Ok(reply?)
    }

    /// Check one image against a composite action descriptor.
    pub async fn verify_action(
        &self,
        image: DynamicImage,
        action: String,
        timeout: Duration,
    ) -> Result<ActionReport, EngineError> {
        self.call(timeout, |reply| EngineRequest::VerifyAction {
            image,
            action,
            reply,
        })
        .await
    }

    /// Burst liveness plus optional identity match.
    pub async fn verify_liveness(
        &self,
        frames: Vec<BurstFrame>,
        reference: Option<Embedding>,
        timeout: Duration,
    ) -> Result<VerificationResult, EngineError> {
        self.call(timeout, |reply| EngineRequest::VerifyLiveness {
            frames,
            reference,
            reply,
        })
        .await
    }

    pub async fn generate_embedding(
        &self,
        image: DynamicImage,
        timeout: Duration,
    ) -> Result<Embedding, EngineError> {
        self.call(timeout, |reply| EngineRequest::GenerateEmbedding { image, reply })
            .await
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The verifier's models are already loaded; the thread only serves
/// requests, one at a time, until every handle is dropped.
pub fn spawn_engine(verifier: Verifier) -> Result<EngineHandle, EngineError> {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("vigil-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::VerifyAction {
                        image,
                        action,
                        reply,
                    } => {
                        let _ = reply.send(verifier.verify_action(&image, &action));
                    }
                    EngineRequest::VerifyLiveness {
                        frames,
                        reference,
                        reply,
                    } => {
                        let _ = reply.send(verifier.verify_liveness(&frames, reference.as_ref()));
                    }
                    EngineRequest::GenerateEmbedding { image, reply } => {
                        let _ = reply.send(verifier.generate_embedding(&image));
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use vigil_core::{
        CollaboratorError, EmbeddingExtractor, LandmarkDetector, LandmarkSet, PipelineConfig,
    };

    struct NoFace {
        delay: Duration,
    }

    impl LandmarkDetector for NoFace {
        fn detect(&self, _: &DynamicImage) -> Result<Option<LandmarkSet>, CollaboratorError> {
            std::thread::sleep(self.delay);
            Ok(None)
        }
    }

    struct Fixed;

    impl EmbeddingExtractor for Fixed {
        fn extract(&self, _: &DynamicImage) -> Result<Option<Embedding>, CollaboratorError> {
            Ok(Some(Embedding::new(vec![0.6, 0.8])))
        }
    }

    fn engine(delay: Duration) -> EngineHandle {
        let verifier = Verifier::new(
            Arc::new(NoFace { delay }),
            Arc::new(Fixed),
            PipelineConfig::default(),
        );
        spawn_engine(verifier).unwrap()
    }

    fn image() -> DynamicImage {
        DynamicImage::new_rgb8(8, 8)
    }

    const LONG: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn generate_embedding_round_trips_through_thread() {
        let e = engine(Duration::ZERO);
        let emb = e.generate_embedding(image(), LONG).await.unwrap();
        assert_eq!(emb.values, vec![0.6, 0.8]);
    }

    #[tokio::test]
    async fn pipeline_errors_are_propagated() {
        let e = engine(Duration::ZERO);
        let err = e
            .verify_action(image(), "BLINK".into(), LONG)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Verify(VerifyError::NoFaceDetected)));
    }

    #[tokio::test]
    async fn no_face_burst_is_a_result_not_an_error() {
        let e = engine(Duration::ZERO);
        let result = e
            .verify_liveness(vec![Ok(image()), Ok(image())], None, LONG)
            .await
            .unwrap();
        assert!(!result.success);
        assert!(!result.liveness);
    }

    #[tokio::test]
    async fn undecodable_frame_is_reported_not_raised() {
        let e = engine(Duration::ZERO);
        let result = e
            .verify_liveness(vec![Ok(image()), Err("bad header".into())], None, LONG)
            .await
            .unwrap();
        assert_eq!(result.diagnostics.frames_total, 2);
        let errors = &result.diagnostics.frame_errors;
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[1].index, 1);
        assert_eq!(errors[1].reason, "bad header");
    }

    #[tokio::test]
    async fn slow_requests_time_out() {
        let e = engine(Duration::from_millis(500));
        let err = e
            .verify_action(image(), "BLINK".into(), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Timeout(_)));
    }
}
