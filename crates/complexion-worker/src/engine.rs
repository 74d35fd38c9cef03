use complexion_core::decode;
use complexion_core::{
    AnalysisPipeline, LandmarkSet, PipelineError, QualityReport, SkinMetrics,
};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{0}")]
    Pipeline(#[from] PipelineError),
    #[error("photo rejected by quality gate: {0}")]
    Rejected(String),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Result of an analysis request.
pub struct AnalyzeResult {
    pub quality: QualityReport,
    pub metrics: SkinMetrics,
}

/// Messages sent from request handlers to the engine thread.
pub(crate) enum EngineRequest {
    Initialize {
        reply: oneshot::Sender<Result<String, EngineError>>,
    },
    Analyze {
        image: String,
        landmarks: LandmarkSet,
        previous: Option<SkinMetrics>,
        gate: bool,
        reply: oneshot::Sender<Result<AnalyzeResult, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Bring up the tensor runtime; returns the selected backend name.
    pub async fn initialize(&self) -> Result<String, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Initialize { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Decode, gate, canonicalize and score one photo. With `gate` off a
    /// rejected photo is scored anyway.
    pub async fn analyze(
        &self,
        image: String,
        landmarks: LandmarkSet,
        previous: Option<SkinMetrics>,
        gate: bool,
    ) -> Result<AnalyzeResult, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Analyze {
                image,
                landmarks,
                previous,
                gate,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The thread owns the pipeline (and with it the tensor runtime), so no pixel
/// data is ever shared with the caller. Requests are served one at a time;
/// at most `queue_depth` wait in line.
pub fn spawn_engine(
    mut pipeline: AnalysisPipeline,
    queue_depth: usize,
) -> Result<EngineHandle, EngineError> {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(queue_depth.max(1));

    std::thread::Builder::new()
        .name("complexion-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Initialize { reply } => {
                        let _ = reply.send(run_initialize(&mut pipeline));
                    }
                    EngineRequest::Analyze {
                        image,
                        landmarks,
                        previous,
                        gate,
                        reply,
                    } => {
                        let result = run_analyze(
                            &mut pipeline,
                            image,
                            &landmarks,
                            previous.as_ref(),
                            gate,
                        );
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx })
}

/// A handle whose requests are queued but never served while the returned
/// receiver is alive.
#[cfg(test)]
pub(crate) fn stalled_engine(queue_depth: usize) -> (EngineHandle, mpsc::Receiver<EngineRequest>) {
    let (tx, rx) = mpsc::channel(queue_depth.max(1));
    (EngineHandle { tx }, rx)
}

fn run_initialize(pipeline: &mut AnalysisPipeline) -> Result<String, EngineError> {
    let backend = pipeline.runtime().initialize()?;
    Ok(backend.name().to_string())
}

fn run_analyze(
    pipeline: &mut AnalysisPipeline,
    image: String,
    landmarks: &LandmarkSet,
    previous: Option<&SkinMetrics>,
    gate: bool,
) -> Result<AnalyzeResult, EngineError> {
    let buffer = decode::decode_data_url(&image)?;
    drop(image);
    tracing::debug!(
        width = buffer.width(),
        height = buffer.height(),
        landmarks = landmarks.len(),
        "analyze: decoded photo"
    );

    let outcome = if gate {
        pipeline.analyze_against(buffer, landmarks, previous)?
    } else {
        pipeline.analyze_ungated(buffer, landmarks, previous)?
    };
    match outcome.metrics {
        Some(metrics) => Ok(AnalyzeResult {
            quality: outcome.quality,
            metrics,
        }),
        None => Err(EngineError::Rejected(outcome.quality.issues.join("; "))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{landmarks, png_data_url, relaxed_pipeline};
    use complexion_core::{QualityConfig, TensorRuntime};

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let engine = spawn_engine(relaxed_pipeline(), 4).unwrap();
        assert_eq!(engine.initialize().await.unwrap(), "cpu");
        assert_eq!(engine.initialize().await.unwrap(), "cpu");
    }

    #[tokio::test]
    async fn test_analyze_scores_photo() {
        let engine = spawn_engine(relaxed_pipeline(), 4).unwrap();
        let result = engine.analyze(png_data_url(64), landmarks(), None, true).await.unwrap();
        assert!(result.quality.is_valid);
        assert_eq!(result.metrics.wrinkles.score, 100);
    }

    #[tokio::test]
    async fn test_analyze_bad_image_is_decode_failure() {
        let engine = spawn_engine(relaxed_pipeline(), 4).unwrap();
        let err = engine
            .analyze("data:image/png;base64,AAAA".into(), landmarks(), None, true)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::Pipeline(PipelineError::DecodeFailure(_))));
    }

    #[tokio::test]
    async fn test_analyze_without_landmarks() {
        let engine = spawn_engine(relaxed_pipeline(), 4).unwrap();
        let err = engine
            .analyze(png_data_url(64), LandmarkSet::default(), None, true)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::Pipeline(PipelineError::NoFaceDetected)));
    }

    #[tokio::test]
    async fn test_gate_rejection_is_reported() {
        let pipeline = AnalysisPipeline::new(QualityConfig::default(), TensorRuntime::new(32));
        let engine = spawn_engine(pipeline, 1).unwrap();
        let err = engine.analyze(png_data_url(64), landmarks(), None, true).await.err().unwrap();
        match err {
            EngineError::Rejected(cause) => assert!(cause.contains("Resolution")),
            other => panic!("unexpected {other}"),
        }
    }

    #[tokio::test]
    async fn test_ungated_request_scores_small_photo() {
        let pipeline = AnalysisPipeline::new(QualityConfig::default(), TensorRuntime::new(32));
        let engine = spawn_engine(pipeline, 1).unwrap();
        let result = engine
            .analyze(png_data_url(64), landmarks(), None, false)
            .await
            .unwrap();
        assert!(!result.quality.is_valid);
        assert_eq!(result.metrics.wrinkles.score, 100);
    }

    #[tokio::test]
    async fn test_engine_survives_failed_request() {
        let engine = spawn_engine(relaxed_pipeline(), 4).unwrap();
        assert!(engine.analyze("not base64!".into(), landmarks(), None, true).await.is_err());
        assert!(engine.analyze(png_data_url(64), landmarks(), None, true).await.is_ok());
    }
}
