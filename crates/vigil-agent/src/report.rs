use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use thiserror::Error;
use vigil_core::Detection;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("coordinator rejected notification: {0}")]
    Rejected(StatusCode),
}

/// HTTP client for pushing detection results to the coordinator.
pub struct CoordinatorClient {
    base_url: String,
    http: reqwest::Client,
}

impl CoordinatorClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// POST the detection and its annotated JPEG frame to /notification.
    pub async fn notify(&self, detection: &Detection, jpeg: Vec<u8>) -> Result<(), ReportError> {
        let part = Part::bytes(jpeg)
            .file_name("frame.jpg")
            .mime_str("image/jpeg")?;
        let form = Form::new()
            .text("status", detection.status.clone())
            .text("detail", detection.detail.clone())
            .part("image", part);

        let response = self
            .http
            .post(format!("{}/notification", self.base_url))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ReportError::Rejected(response.status()));
        }
        Ok(())
    }
}
