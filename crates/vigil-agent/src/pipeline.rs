use std::sync::Arc;
use std::time::Duration;

use image::DynamicImage;
use thiserror::Error;
use tokio::sync::watch;
use vigil_core::{
    annotate, baseline::preprocess, crop_face, AnyMatch, BestMatch, ChangeDetector, ChangeError,
    Detection, EncodeError, FaceLocalizer, IdentityEncoder, LocalizeError, MatchOutcome,
    MatchPolicy, Metric, STATUS_KNOWN, STATUS_NO_PERSON, STATUS_UNCHANGED, STATUS_UNKNOWN,
};
use vigil_store::{BackgroundStore, IdentityStore, StoreError};

use crate::camera::{CameraError, FrameSource};
use crate::report::CoordinatorClient;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("change detection error: {0}")]
    Change(#[from] ChangeError),
    #[error("image encoding error: {0}")]
    Image(#[from] image::ImageError),
    #[error("face localization error: {0}")]
    Localize(#[from] LocalizeError),
    #[error("face encoding error: {0}")]
    Encode(#[from] EncodeError),
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

/// One evaluated frame, ready to send to the coordinator.
#[derive(Debug)]
pub struct Report {
    pub detection: Detection,
    pub jpeg: Vec<u8>,
}

/// The per-frame evaluation pipeline: change detection first, then face
/// localization, then identity matching against the enrolled set.
pub struct Pipeline<S: FrameSource> {
    pub source: S,
    pub change: ChangeDetector,
    pub localizer: Arc<dyn FaceLocalizer>,
    pub encoder: Arc<dyn IdentityEncoder>,
    pub policy: MatchPolicy,
    pub metric: Metric,
    pub identities: IdentityStore,
}

/// Capture `count` frames, average them into a background reference,
/// persist it, and hand it back.
pub async fn initialize_baseline<S: FrameSource>(
    source: &mut S,
    backgrounds: &BackgroundStore,
    count: usize,
) -> Result<image::GrayImage, PipelineError> {
    let mut frames = Vec::with_capacity(count);
    for _ in 0..count {
        frames.push(preprocess(&source.grab()?));
    }
    let reference = vigil_core::baseline::average_frames(&frames)?;
    backgrounds.save(&reference).await?;
    tracing::info!(frames = count, "background reference initialized");
    Ok(reference)
}

impl<S: FrameSource> Pipeline<S> {
    /// Evaluate one frame against the background and the enrolled identities.
    pub async fn evaluate(&self, frame: &DynamicImage) -> Result<Report, PipelineError> {
        let score = self.change.score(frame)?;
        if !self.change.is_changed(score) {
            tracing::debug!(score, "background unchanged");
            return Ok(Report {
                detection: Detection::new(STATUS_UNCHANGED, "background unchanged"),
                jpeg: encode_frame(frame, &[])?,
            });
        }
        tracing::debug!(score, "change detected");

        let boxes = self.localizer.localize(frame)?;
        if boxes.is_empty() {
            return Ok(Report {
                detection: Detection::new(STATUS_NO_PERSON, "no person detected"),
                jpeg: encode_frame(frame, &[])?,
            });
        }

        let identities = self.identities.fetch_all().await?;
        let mut labels = Vec::with_capacity(boxes.len());
        let mut any_known = false;

        for bbox in &boxes {
            let face = crop_face(frame, bbox)?;
            let embedding = self.encoder.encode(&face)?;

            let label = match self.policy {
                MatchPolicy::Best => {
                    match (BestMatch { metric: self.metric }).evaluate(&embedding, &identities) {
                        MatchOutcome::Identified { name, score } => {
                            any_known = true;
                            format!("{name} ({score:.3})")
                        }
                        MatchOutcome::Unknown { .. } => "unidentified".to_string(),
                    }
                }
                MatchPolicy::Any => {
                    if (AnyMatch { metric: self.metric }).evaluate(&embedding, &identities) {
                        any_known = true;
                        "known".to_string()
                    } else {
                        "unidentified".to_string()
                    }
                }
            };
            labels.push(label);
        }

        let status = if any_known { STATUS_KNOWN } else { STATUS_UNKNOWN };
        Ok(Report {
            detection: Detection::new(status, &labels.join(", ")),
            jpeg: encode_frame(frame, &boxes)?,
        })
    }

    /// Run the capture loop until a shutdown signal arrives.
    ///
    /// Transient failures (a dropped frame, a rejected notification) are
    /// logged and the loop continues; only a missing background reference
    /// is fatal, since every further tick would fail the same way.
    pub async fn run(
        mut self,
        client: CoordinatorClient,
        tick_delay: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), PipelineError> {
        loop {
            let frame = match self.source.grab() {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::warn!(error = %e, "frame capture failed, retrying");
                    tokio::time::sleep(tick_delay).await;
                    continue;
                }
            };

            match self.evaluate(&frame).await {
                Ok(report) => {
                    tracing::info!(
                        status = %report.detection.status,
                        detail = %report.detection.detail,
                        "frame evaluated"
                    );
                    if let Err(e) = client.notify(&report.detection, report.jpeg).await {
                        tracing::warn!(error = %e, "failed to notify coordinator");
                    }
                }
                Err(PipelineError::Change(ChangeError::BaselineMissing)) => {
                    return Err(PipelineError::Change(ChangeError::BaselineMissing));
                }
                Err(e) => {
                    tracing::error!(error = %e, "frame evaluation failed");
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(tick_delay) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("pipeline shutting down");
                        return Ok(());
                    }
                }
            }
        }
    }
}

fn annotated(frame: &DynamicImage, boxes: &[vigil_core::BoundingBox]) -> image::RgbImage {
    let mut rgb = frame.to_rgb8();
    annotate::draw_boxes(&mut rgb, boxes);
    rgb
}

fn encode_frame(
    frame: &DynamicImage,
    boxes: &[vigil_core::BoundingBox],
) -> Result<Vec<u8>, image::ImageError> {
    annotate::encode_jpeg(&annotated(frame, boxes))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vigil_core::{BoundingBox, Embedding};

    const DIM: usize = 4;

    struct StaticSource {
        frame: DynamicImage,
    }

    impl FrameSource for StaticSource {
        fn grab(&mut self) -> Result<DynamicImage, CameraError> {
            Ok(self.frame.clone())
        }
    }

    struct StubLocalizer {
        boxes: Vec<BoundingBox>,
    }

    impl FaceLocalizer for StubLocalizer {
        fn localize(&self, _image: &DynamicImage) -> Result<Vec<BoundingBox>, LocalizeError> {
            Ok(self.boxes.clone())
        }
    }

    struct StubEncoder {
        output: Vec<f32>,
        calls: AtomicUsize,
    }

    impl StubEncoder {
        fn new(output: Vec<f32>) -> Self {
            Self {
                output,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl IdentityEncoder for StubEncoder {
        fn encode(&self, _face: &DynamicImage) -> Result<Embedding, EncodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Embedding::new(self.output.clone()))
        }

        fn embedding_dim(&self) -> usize {
            DIM
        }

        fn metric(&self) -> Metric {
            Metric::similarity(0.9)
        }
    }

    fn gray_frame(luma: u8) -> DynamicImage {
        DynamicImage::ImageLuma8(image::GrayImage::from_pixel(320, 240, image::Luma([luma])))
    }

    async fn pipeline(
        background_luma: u8,
        boxes: Vec<BoundingBox>,
        encoder: Arc<StubEncoder>,
    ) -> Pipeline<StaticSource> {
        let background = preprocess(&gray_frame(background_luma));
        let metric = encoder.metric();
        Pipeline {
            source: StaticSource {
                frame: gray_frame(background_luma),
            },
            change: ChangeDetector::with_baseline(background, 0.85),
            localizer: Arc::new(StubLocalizer { boxes }),
            encoder,
            policy: MatchPolicy::Best,
            metric,
            identities: IdentityStore::open(Path::new(":memory:"), DIM).await.unwrap(),
        }
    }

    #[tokio::test]
    async fn test_unchanged_frame_short_circuits() {
        let encoder = Arc::new(StubEncoder::new(vec![1.0, 0.0, 0.0, 0.0]));
        let p = pipeline(128, vec![BoundingBox::new(0, 0, 50, 50)], encoder.clone()).await;

        let report = p.evaluate(&gray_frame(128)).await.unwrap();
        assert_eq!(report.detection.status, STATUS_UNCHANGED);
        assert_eq!(report.detection.detail, "background unchanged");
        // An identical frame scores exactly 1.0, so localization never runs
        assert_eq!(encoder.calls.load(Ordering::SeqCst), 0);
        // The report still carries a usable JPEG
        assert_eq!(&report.jpeg[..2], &[0xFF, 0xD8]);
    }

    #[tokio::test]
    async fn test_changed_frame_without_faces() {
        let encoder = Arc::new(StubEncoder::new(vec![1.0, 0.0, 0.0, 0.0]));
        let p = pipeline(0, vec![], encoder.clone()).await;

        let report = p.evaluate(&gray_frame(255)).await.unwrap();
        assert_eq!(report.detection.status, STATUS_NO_PERSON);
        assert_eq!(report.detection.detail, "no person detected");
        assert_eq!(encoder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_known_face_is_identified() {
        let enrolled = vec![1.0, 0.0, 0.0, 0.0];
        let encoder = Arc::new(StubEncoder::new(enrolled.clone()));
        let p = pipeline(0, vec![BoundingBox::new(10, 10, 60, 60)], encoder).await;
        p.identities
            .enroll("admin", &[Embedding::new(enrolled)])
            .await
            .unwrap();

        let report = p.evaluate(&gray_frame(255)).await.unwrap();
        assert_eq!(report.detection.status, STATUS_KNOWN);
        assert!(report.detection.detail.contains("admin"));
    }

    #[tokio::test]
    async fn test_unenrolled_face_is_unknown() {
        let encoder = Arc::new(StubEncoder::new(vec![1.0, 0.0, 0.0, 0.0]));
        let p = pipeline(0, vec![BoundingBox::new(10, 10, 60, 60)], encoder).await;
        // Orthogonal vector scores 0.0 under cosine similarity
        p.identities
            .enroll("admin", &[Embedding::new(vec![0.0, 1.0, 0.0, 0.0])])
            .await
            .unwrap();

        let report = p.evaluate(&gray_frame(255)).await.unwrap();
        assert_eq!(report.detection.status, STATUS_UNKNOWN);
        assert_eq!(report.detection.detail, "unidentified");
    }

    #[tokio::test]
    async fn test_any_policy_reports_known_without_name() {
        let enrolled = vec![1.0, 0.0, 0.0, 0.0];
        let encoder = Arc::new(StubEncoder::new(enrolled.clone()));
        let mut p = pipeline(0, vec![BoundingBox::new(10, 10, 60, 60)], encoder).await;
        p.policy = MatchPolicy::Any;
        p.identities
            .enroll("admin", &[Embedding::new(enrolled)])
            .await
            .unwrap();

        let report = p.evaluate(&gray_frame(255)).await.unwrap();
        assert_eq!(report.detection.status, STATUS_KNOWN);
        assert_eq!(report.detection.detail, "known");
    }

    #[tokio::test]
    async fn test_missing_baseline_is_an_error() {
        let encoder = Arc::new(StubEncoder::new(vec![1.0, 0.0, 0.0, 0.0]));
        let mut p = pipeline(0, vec![], encoder).await;
        p.change = ChangeDetector::new(0.85);

        let err = p.evaluate(&gray_frame(10)).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Change(ChangeError::BaselineMissing)
        ));
    }

    #[tokio::test]
    async fn test_initialize_baseline_averages_and_persists() {
        let backgrounds = BackgroundStore::open(Path::new(":memory:")).await.unwrap();
        let mut source = StaticSource {
            frame: gray_frame(100),
        };

        let reference = initialize_baseline(&mut source, &backgrounds, 3)
            .await
            .unwrap();
        assert_eq!(reference.dimensions(), (320, 240));
        assert!(reference.pixels().all(|p| p[0] == 100));

        let stored = backgrounds.load().await.unwrap().unwrap();
        assert_eq!(stored.as_raw(), reference.as_raw());
    }
}
