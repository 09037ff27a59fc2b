use std::path::{Path, PathBuf};

use image::DynamicImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("failed to open frame source: {0}")]
    Open(String),
    #[error("failed to capture frame: {0}")]
    Capture(String),
}

/// A source of camera frames.
///
/// `grab` hands back the next frame. A capture failure is transient; the
/// caller decides whether to retry or give up.
pub trait FrameSource: Send {
    fn grab(&mut self) -> Result<DynamicImage, CameraError>;
}

/// Frame source backed by a directory of image files, cycled in sorted
/// order. Stands in for a live camera on machines without one.
#[derive(Debug)]
pub struct DirectorySource {
    files: Vec<PathBuf>,
    next: usize,
}

impl DirectorySource {
    pub fn open(dir: &Path) -> Result<Self, CameraError> {
        let entries = std::fs::read_dir(dir)
            .map_err(|e| CameraError::Open(format!("{}: {e}", dir.display())))?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("jpg" | "jpeg" | "png")
                )
            })
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(CameraError::Open(format!(
                "no image files in {}",
                dir.display()
            )));
        }

        tracing::info!(dir = %dir.display(), count = files.len(), "frame directory opened");
        Ok(Self { files, next: 0 })
    }
}

impl FrameSource for DirectorySource {
    fn grab(&mut self) -> Result<DynamicImage, CameraError> {
        let path = &self.files[self.next];
        self.next = (self.next + 1) % self.files.len();
        image::open(path).map_err(|e| CameraError::Capture(format!("{}: {e}", path.display())))
    }
}
