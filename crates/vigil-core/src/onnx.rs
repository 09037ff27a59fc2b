//! ONNX-backed capability implementations (`onnx` cargo feature).
//!
//! Two CPU sessions: a YOLO-layout face detector (output `[1, 5, N]`: box
//! center/size plus confidence) and an ArcFace-style recognizer (112x112
//! input, L2-normalized 512-d output compared by cosine similarity).

use std::path::Path;
use std::sync::Mutex;

use image::{imageops::FilterType, DynamicImage};
use ndarray::{Array, IxDyn};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use thiserror::Error;

use crate::capability::{BoundingBox, EncodeError, FaceLocalizer, IdentityEncoder, LocalizeError};
use crate::embedding::Embedding;
use crate::matcher::Metric;

const DETECTOR_INPUT_SIZE: u32 = 640;
const RECOGNIZER_INPUT_SIZE: u32 = 112;
const EMBEDDING_DIM: usize = 512;
const CONFIDENCE_THRESHOLD: f32 = 0.6;
const IOU_THRESHOLD: f32 = 0.4;
const COSINE_THRESHOLD: f32 = 0.40;

#[derive(Error, Debug)]
pub enum OnnxError {
    #[error("onnx runtime error: {0}")]
    Ort(#[from] ort::Error),
    #[error("unexpected model output shape")]
    OutputShape,
    #[error("session lock poisoned")]
    Poisoned,
}

fn load_session(model_path: &Path) -> Result<Session, OnnxError> {
    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .commit_from_file(model_path)?;
    tracing::info!(path = %model_path.display(), "ONNX model loaded");
    Ok(session)
}

/// NCHW float tensor in [0, 1] from an RGB resize.
fn to_unit_tensor(image: &DynamicImage, size: u32) -> Array<f32, IxDyn> {
    let rgb = image
        .resize_exact(size, size, FilterType::Triangle)
        .to_rgb8();
    let mut input = Array::zeros(IxDyn(&[1, 3, size as usize, size as usize]));
    for (x, y, pixel) in rgb.enumerate_pixels() {
        for c in 0..3 {
            input[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
        }
    }
    input
}

/// NCHW float tensor in [-1, 1] (ArcFace convention).
fn to_signed_tensor(image: &DynamicImage, size: u32) -> Array<f32, IxDyn> {
    let rgb = image
        .resize_exact(size, size, FilterType::Triangle)
        .to_rgb8();
    let mut input = Array::zeros(IxDyn(&[1, 3, size as usize, size as usize]));
    for (x, y, pixel) in rgb.enumerate_pixels() {
        for c in 0..3 {
            input[[0, c, y as usize, x as usize]] = (pixel[c] as f32 / 127.5) - 1.0;
        }
    }
    input
}

pub struct OnnxFaceLocalizer {
    session: Mutex<Session>,
}

impl OnnxFaceLocalizer {
    pub fn load(model_path: &Path) -> Result<Self, OnnxError> {
        Ok(Self {
            session: Mutex::new(load_session(model_path)?),
        })
    }

    fn run(&self, image: &DynamicImage) -> Result<Vec<BoundingBox>, OnnxError> {
        let input = to_unit_tensor(image, DETECTOR_INPUT_SIZE);
        let input_tensor = Value::from_array(input)?;

        let mut session = self.session.lock().map_err(|_| OnnxError::Poisoned)?;
        let outputs = session.run(ort::inputs![input_tensor])?;
        let output_value = outputs
            .get("output")
            .or_else(|| outputs.get("output0"))
            .ok_or(OnnxError::OutputShape)?;
        let (shape, data) = output_value.try_extract_tensor::<f32>()?;
        let shape: Vec<usize> = shape.as_ref().iter().map(|&d| d as usize).collect();
        let output = Array::from_shape_vec(IxDyn(&shape), data.to_vec())
            .map_err(|_| OnnxError::OutputShape)?;

        if output.ndim() != 3 || output.shape()[1] < 5 {
            return Err(OnnxError::OutputShape);
        }

        let scale_x = image.width() as f32 / DETECTOR_INPUT_SIZE as f32;
        let scale_y = image.height() as f32 / DETECTOR_INPUT_SIZE as f32;

        let mut candidates = Vec::new();
        for i in 0..output.shape()[2] {
            let confidence = output[[0, 4, i]];
            if confidence < CONFIDENCE_THRESHOLD {
                continue;
            }
            let cx = output[[0, 0, i]];
            let cy = output[[0, 1, i]];
            let w = output[[0, 2, i]];
            let h = output[[0, 3, i]];

            let x1 = ((cx - w / 2.0) * scale_x).max(0.0) as u32;
            let y1 = ((cy - h / 2.0) * scale_y).max(0.0) as u32;
            let x2 = ((cx + w / 2.0) * scale_x).min(image.width() as f32) as u32;
            let y2 = ((cy + h / 2.0) * scale_y).min(image.height() as f32) as u32;
            candidates.push((BoundingBox::new(x1, y1, x2, y2), confidence));
        }

        Ok(nms(candidates))
    }
}

impl FaceLocalizer for OnnxFaceLocalizer {
    fn localize(&self, image: &DynamicImage) -> Result<Vec<BoundingBox>, LocalizeError> {
        self.run(image).map_err(|e| LocalizeError::Backend(e.to_string()))
    }
}

fn nms(mut candidates: Vec<(BoundingBox, f32)>) -> Vec<BoundingBox> {
    candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    let mut kept: Vec<(BoundingBox, f32)> = Vec::new();
    for (bbox, confidence) in candidates {
        if kept.iter().all(|(k, _)| iou(k, &bbox) < IOU_THRESHOLD) {
            kept.push((bbox, confidence));
        }
    }
    kept.into_iter().map(|(bbox, _)| bbox).collect()
}

fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let x1 = a.x1.max(b.x1);
    let y1 = a.y1.max(b.y1);
    let x2 = a.x2.min(b.x2);
    let y2 = a.y2.min(b.y2);
    let intersection = (x2.saturating_sub(x1) * y2.saturating_sub(y1)) as f32;
    let union = (a.width() * a.height() + b.width() * b.height()) as f32 - intersection;
    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

pub struct OnnxIdentityEncoder {
    session: Mutex<Session>,
}

impl OnnxIdentityEncoder {
    pub fn load(model_path: &Path) -> Result<Self, OnnxError> {
        Ok(Self {
            session: Mutex::new(load_session(model_path)?),
        })
    }

    fn run(&self, face: &DynamicImage) -> Result<Embedding, OnnxError> {
        let input = to_signed_tensor(face, RECOGNIZER_INPUT_SIZE);
        let input_tensor = Value::from_array(input)?;

        let mut session = self.session.lock().map_err(|_| OnnxError::Poisoned)?;
        let outputs = session.run(ort::inputs![input_tensor])?;
        let output_value = outputs
            .get("output")
            .or_else(|| outputs.get("output0"))
            .or_else(|| outputs.get("embedding"))
            .ok_or(OnnxError::OutputShape)?;
        let (shape, data) = output_value.try_extract_tensor::<f32>()?;
        let shape: Vec<usize> = shape.as_ref().iter().map(|&d| d as usize).collect();
        if shape.len() != 2 || shape[1] != EMBEDDING_DIM {
            return Err(OnnxError::OutputShape);
        }

        let mut values: Vec<f32> = data[..EMBEDDING_DIM].to_vec();
        let norm: f32 = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut values {
                *v /= norm;
            }
        }
        Ok(Embedding::new(values))
    }
}

impl IdentityEncoder for OnnxIdentityEncoder {
    fn encode(&self, face: &DynamicImage) -> Result<Embedding, EncodeError> {
        self.run(face).map_err(|e| EncodeError::Backend(e.to_string()))
    }

    fn embedding_dim(&self) -> usize {
        EMBEDDING_DIM
    }

    fn metric(&self) -> Metric {
        Metric::similarity(COSINE_THRESHOLD)
    }
}
