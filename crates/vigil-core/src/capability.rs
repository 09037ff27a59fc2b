//! Capability contracts for the injected model backends.
//!
//! Face localization and identity encoding are external capabilities: the
//! core treats them as opaque functions behind traits and does not care how
//! the boxes or vectors are produced. One concrete backend (ONNX models via
//! `ort`) ships behind the non-default `onnx` cargo feature.

use std::path::PathBuf;
use std::sync::Arc;

use image::DynamicImage;
use thiserror::Error;

use crate::embedding::Embedding;
use crate::matcher::Metric;

#[derive(Error, Debug)]
pub enum LocalizeError {
    #[error("face localization failed: {0}")]
    Backend(String),
}

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("identity encoding failed: {0}")]
    Backend(String),
    #[error("face region is empty after clamping to the frame")]
    EmptyCrop,
}

/// Axis-aligned face region in source-image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct BoundingBox {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl BoundingBox {
    pub fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> u32 {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> u32 {
        self.y2.saturating_sub(self.y1)
    }

    /// Restrict the box to an image of the given dimensions.
    pub fn clamped(&self, width: u32, height: u32) -> Self {
        Self {
            x1: self.x1.min(width),
            y1: self.y1.min(height),
            x2: self.x2.min(width),
            y2: self.y2.min(height),
        }
    }
}

/// Locates faces in a frame.
///
/// Implementations must be callable repeatedly without mutating their own
/// detection state across calls, and return boxes in a stable order.
pub trait FaceLocalizer: Send + Sync {
    fn localize(&self, image: &DynamicImage) -> Result<Vec<BoundingBox>, LocalizeError>;
}

/// Turns a face crop into a fixed-length embedding.
pub trait IdentityEncoder: Send + Sync {
    fn encode(&self, face: &DynamicImage) -> Result<Embedding, EncodeError>;

    /// Dimensionality of every vector this encoder produces.
    fn embedding_dim(&self) -> usize;

    /// The comparison metric this backend's embeddings are meant for.
    fn metric(&self) -> Metric;
}

/// Cut a localized face out of the frame.
///
/// This is the single cropping step used both at enrollment and at query
/// time; scores are only comparable when both paths go through it.
pub fn crop_face(image: &DynamicImage, bbox: &BoundingBox) -> Result<DynamicImage, EncodeError> {
    let clamped = bbox.clamped(image.width(), image.height());
    if clamped.width() == 0 || clamped.height() == 0 {
        return Err(EncodeError::EmptyCrop);
    }
    Ok(image.crop_imm(clamped.x1, clamped.y1, clamped.width(), clamped.height()))
}

/// Which concrete capability backend to construct.
#[derive(Debug, Clone)]
pub enum BackendConfig {
    /// ONNX face detector + recognizer model pair.
    Onnx {
        detector_model: PathBuf,
        recognizer_model: PathBuf,
    },
}

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("backend '{0}' is not available in this build (rebuild with the matching cargo feature)")]
    Unavailable(&'static str),
    #[error("failed to load model: {0}")]
    ModelLoad(String),
}

/// Construct the localizer/encoder pair for the configured backend.
#[allow(unused_variables)]
pub fn build_backend(
    config: &BackendConfig,
) -> Result<(Arc<dyn FaceLocalizer>, Arc<dyn IdentityEncoder>), BackendError> {
    match config {
        BackendConfig::Onnx {
            detector_model,
            recognizer_model,
        } => {
            #[cfg(feature = "onnx")]
            {
                let localizer = crate::onnx::OnnxFaceLocalizer::load(detector_model)
                    .map_err(|e| BackendError::ModelLoad(e.to_string()))?;
                let encoder = crate::onnx::OnnxIdentityEncoder::load(recognizer_model)
                    .map_err(|e| BackendError::ModelLoad(e.to_string()))?;
                Ok((Arc::new(localizer), Arc::new(encoder)))
            }
            #[cfg(not(feature = "onnx"))]
            Err(BackendError::Unavailable("onnx"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn test_crop_face_within_bounds() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(100, 80));
        let crop = crop_face(&img, &BoundingBox::new(10, 20, 50, 60)).unwrap();
        assert_eq!((crop.width(), crop.height()), (40, 40));
    }

    #[test]
    fn test_crop_face_clamps_overhang() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(100, 80));
        let crop = crop_face(&img, &BoundingBox::new(90, 70, 200, 200)).unwrap();
        assert_eq!((crop.width(), crop.height()), (10, 10));
    }

    #[test]
    fn test_crop_face_rejects_empty_region() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(100, 80));
        let err = crop_face(&img, &BoundingBox::new(100, 80, 120, 120)).unwrap_err();
        assert!(matches!(err, EncodeError::EmptyCrop));
    }

    #[test]
    fn test_bounding_box_dimensions() {
        let bbox = BoundingBox::new(5, 10, 25, 40);
        assert_eq!(bbox.width(), 20);
        assert_eq!(bbox.height(), 30);
        // Inverted coordinates saturate instead of underflowing
        let inverted = BoundingBox::new(30, 30, 10, 10);
        assert_eq!(inverted.width(), 0);
    }
}
