//! Background baseline and structural-similarity change scoring.
//!
//! A single reference image of the empty scene is kept at a fixed canonical
//! resolution and color depth. Incoming frames run through the identical
//! preprocessing before comparison, so the score is a pure function of the
//! (baseline, frame) pair.

use image::{imageops::FilterType, DynamicImage, GrayImage};
use thiserror::Error;

/// Canonical comparison resolution. Both the baseline and every scored frame
/// are reduced to this size before SSIM.
pub const CANONICAL_WIDTH: u32 = 320;
pub const CANONICAL_HEIGHT: u32 = 240;

/// Frames scoring below this similarity are treated as "changed".
pub const DEFAULT_CHANGE_THRESHOLD: f32 = 0.85;

const SSIM_WINDOW: u32 = 8;
// Standard SSIM stabilizers for 8-bit dynamic range: (0.01*255)^2, (0.03*255)^2.
const C1: f64 = 6.5025;
const C2: f64 = 58.5225;

#[derive(Error, Debug)]
pub enum ChangeError {
    #[error("no background baseline set")]
    BaselineMissing,
    #[error("baseline initialization requires at least one frame")]
    NoFrames,
    #[error("image size mismatch: {0}x{1} (expected {CANONICAL_WIDTH}x{CANONICAL_HEIGHT})")]
    SizeMismatch(u32, u32),
}

/// Reduce a frame to the canonical comparison form: fixed resolution, single
/// intensity channel. Shared by the baseline and query paths.
pub fn preprocess(frame: &DynamicImage) -> GrayImage {
    frame
        .resize_exact(CANONICAL_WIDTH, CANONICAL_HEIGHT, FilterType::Triangle)
        .to_luma8()
}

/// Per-pixel mean of several preprocessed frames, to suppress sensor noise
/// in the stored baseline.
pub fn average_frames(frames: &[GrayImage]) -> Result<GrayImage, ChangeError> {
    if frames.is_empty() {
        return Err(ChangeError::NoFrames);
    }
    for frame in frames {
        if frame.dimensions() != (CANONICAL_WIDTH, CANONICAL_HEIGHT) {
            let (w, h) = frame.dimensions();
            return Err(ChangeError::SizeMismatch(w, h));
        }
    }

    let len = (CANONICAL_WIDTH * CANONICAL_HEIGHT) as usize;
    let mut sums = vec![0u32; len];
    for frame in frames {
        for (sum, px) in sums.iter_mut().zip(frame.as_raw().iter()) {
            *sum += u32::from(*px);
        }
    }

    let count = frames.len() as u32;
    let pixels: Vec<u8> = sums.iter().map(|s| (s / count) as u8).collect();
    // from_raw only fails on a length mismatch, which the sums vec rules out
    GrayImage::from_raw(CANONICAL_WIDTH, CANONICAL_HEIGHT, pixels)
        .ok_or(ChangeError::NoFrames)
}

/// Mean structural similarity over non-overlapping 8x8 windows.
///
/// Deterministic and side-effect free; identical inputs score exactly 1.0.
pub fn ssim(a: &GrayImage, b: &GrayImage) -> Result<f32, ChangeError> {
    if a.dimensions() != b.dimensions() {
        let (w, h) = b.dimensions();
        return Err(ChangeError::SizeMismatch(w, h));
    }

    let (width, height) = a.dimensions();
    let mut total = 0.0f64;
    let mut windows = 0usize;

    let mut y = 0;
    while y < height {
        let wh = SSIM_WINDOW.min(height - y);
        let mut x = 0;
        while x < width {
            let ww = SSIM_WINDOW.min(width - x);
            total += window_ssim(a, b, x, y, ww, wh);
            windows += 1;
            x += SSIM_WINDOW;
        }
        y += SSIM_WINDOW;
    }

    Ok((total / windows as f64) as f32)
}

fn window_ssim(a: &GrayImage, b: &GrayImage, x0: u32, y0: u32, w: u32, h: u32) -> f64 {
    let n = f64::from(w * h);
    let mut sum_a = 0.0f64;
    let mut sum_b = 0.0f64;
    let mut sum_aa = 0.0f64;
    let mut sum_bb = 0.0f64;
    let mut sum_ab = 0.0f64;

    for y in y0..y0 + h {
        for x in x0..x0 + w {
            let pa = f64::from(a.get_pixel(x, y).0[0]);
            let pb = f64::from(b.get_pixel(x, y).0[0]);
            sum_a += pa;
            sum_b += pb;
            sum_aa += pa * pa;
            sum_bb += pb * pb;
            sum_ab += pa * pb;
        }
    }

    let mean_a = sum_a / n;
    let mean_b = sum_b / n;
    let var_a = sum_aa / n - mean_a * mean_a;
    let var_b = sum_bb / n - mean_b * mean_b;
    let cov = sum_ab / n - mean_a * mean_b;

    ((2.0 * mean_a * mean_b + C1) * (2.0 * cov + C2))
        / ((mean_a * mean_a + mean_b * mean_b + C1) * (var_a + var_b + C2))
}

/// Holds the reference image and scores frames against it.
pub struct ChangeDetector {
    baseline: Option<GrayImage>,
    threshold: f32,
}

impl ChangeDetector {
    pub fn new(threshold: f32) -> Self {
        Self {
            baseline: None,
            threshold,
        }
    }

    pub fn with_baseline(baseline: GrayImage, threshold: f32) -> Self {
        Self {
            baseline: Some(baseline),
            threshold,
        }
    }

    pub fn has_baseline(&self) -> bool {
        self.baseline.is_some()
    }

    /// The stored reference image, for persistence.
    pub fn baseline(&self) -> Option<&GrayImage> {
        self.baseline.as_ref()
    }

    /// Derive and install a baseline from one or more captures, replacing any
    /// prior one wholesale. Averaging several samples is the default; a
    /// single-frame slice is the simpler legacy path.
    pub fn set_baseline(&mut self, frames: &[DynamicImage]) -> Result<(), ChangeError> {
        let preprocessed: Vec<GrayImage> = frames.iter().map(preprocess).collect();
        self.baseline = Some(average_frames(&preprocessed)?);
        Ok(())
    }

    /// Install a previously persisted baseline.
    pub fn load_baseline(&mut self, baseline: GrayImage) -> Result<(), ChangeError> {
        if baseline.dimensions() != (CANONICAL_WIDTH, CANONICAL_HEIGHT) {
            let (w, h) = baseline.dimensions();
            return Err(ChangeError::SizeMismatch(w, h));
        }
        self.baseline = Some(baseline);
        Ok(())
    }

    /// Structural similarity between the baseline and `frame` after identical
    /// preprocessing. Fails until a baseline exists.
    pub fn score(&self, frame: &DynamicImage) -> Result<f32, ChangeError> {
        let baseline = self.baseline.as_ref().ok_or(ChangeError::BaselineMissing)?;
        ssim(baseline, &preprocess(frame))
    }

    pub fn is_changed(&self, score: f32) -> bool {
        score < self.threshold
    }
}
