//! Dedicated inference thread.
//!
//! The ONNX sessions live on one OS thread; async callers send requests over
//! an mpsc channel and await a oneshot reply, so exactly one inference runs
//! at a time.

use image::GrayImage;
use personar_core::{
    build_registry, recognize_faces, AnalyzerError, Detection, FaceAnalyzer, FaceMatcher,
    FaceRegistry, IdentitySources, RecognizedFace,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("analysis failed: {0}")]
    Analyzer(#[from] AnalyzerError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from async tasks to the engine thread.
enum EngineRequest {
    Recognize {
        image: GrayImage,
        matcher: Arc<FaceMatcher>,
        reply: oneshot::Sender<Result<Vec<RecognizedFace>, EngineError>>,
    },
    AnalyzeSingle {
        image: GrayImage,
        reply: oneshot::Sender<Result<Option<Detection>, EngineError>>,
    },
    BuildRegistry {
        identities: Vec<IdentitySources>,
        reply: oneshot::Sender<FaceRegistry>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Recognise every face in `image` against `matcher`.
    pub async fn recognize(
        &self,
        image: GrayImage,
        matcher: Arc<FaceMatcher>,
    ) -> Result<Vec<RecognizedFace>, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Recognize { image, matcher, reply }).await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Most confident face in `image`, if any.
    pub async fn analyze_single(&self, image: GrayImage) -> Result<Option<Detection>, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::AnalyzeSingle { image, reply }).await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Embed all reference images. Per-image failures are skipped.
    pub async fn build_registry(&self, identities: Vec<IdentitySources>) -> Result<FaceRegistry, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::BuildRegistry { identities, reply }).await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    async fn send(&self, req: EngineRequest) -> Result<(), EngineError> {
        self.tx.send(req).await.map_err(|_| EngineError::ChannelClosed)
    }
}

/// Move `analyzer` onto a dedicated OS thread and return a handle to it.
///
/// The thread exits once every handle has been dropped.
pub fn spawn_engine<A>(mut analyzer: A) -> Result<EngineHandle, EngineError>
where
    A: FaceAnalyzer + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("personar-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Recognize { image, matcher, reply } => {
                        let result = recognize_faces(&mut analyzer, &image, &matcher).map_err(EngineError::from);
                        let _ = reply.send(result);
                    }
                    EngineRequest::AnalyzeSingle { image, reply } => {
                        let result = analyzer.analyze_single(&image).map_err(EngineError::from);
                        let _ = reply.send(result);
                    }
                    EngineRequest::BuildRegistry { identities, reply } => {
                        let _ = reply.send(build_registry(&mut analyzer, &identities));
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx })
}


#[cfg(test)]
mod tests {
    use super::testing::MeanAnalyzer;
    use super::*;
    use image::Luma;
    use personar_core::{Embedding, LabeledDescriptors, MatchLabel, ReferenceImage};

    fn matcher() -> Arc<FaceMatcher> {
        let registry = FaceRegistry::new(vec![LabeledDescriptors {
            label: "Khoi".into(),
            descriptors: vec![Embedding::new(vec![200.0 / 255.0])],
        }]);
        Arc::new(FaceMatcher::new(registry, 0.1).unwrap())
    }

    #[tokio::test]
    async fn test_recognize_through_engine() {
        let engine = spawn_engine(MeanAnalyzer::default()).unwrap();
        let faces = engine
            .recognize(GrayImage::from_pixel(8, 8, Luma([200])), matcher())
            .await
            .unwrap();
        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0].label, MatchLabel::Known("Khoi".into()));

        let none = engine
            .recognize(GrayImage::from_pixel(8, 8, Luma([0])), matcher())
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_analyze_single_through_engine() {
        let engine = spawn_engine(MeanAnalyzer::default()).unwrap();
        let found = engine.analyze_single(GrayImage::from_pixel(4, 4, Luma([128]))).await.unwrap();
        assert!(found.is_some());
        let missing = engine.analyze_single(GrayImage::new(4, 4)).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_build_registry_skips_missing_files() {
        let engine = spawn_engine(MeanAnalyzer::default()).unwrap();
        let registry = engine
            .build_registry(vec![IdentitySources {
                label: "Jun".into(),
                images: vec![ReferenceImage::File("/nonexistent/1.jpg".into())],
            }])
            .await
            .unwrap();
        assert!(registry.is_empty());
    }
}
