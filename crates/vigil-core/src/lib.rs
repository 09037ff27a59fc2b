//! Core building blocks for the Vigil surveillance system.
//!
//! This crate holds everything that is independent of transport and storage:
//! the background baseline and structural-similarity change scoring, the
//! embedding types and identity-matching policies, the capability contracts
//! for face localization and identity encoding, and frame annotation for
//! outbound reports.

pub mod annotate;
pub mod baseline;
pub mod capability;
pub mod detection;
pub mod embedding;
pub mod matcher;

#[cfg(feature = "onnx")]
pub mod onnx;

pub use baseline::{ChangeDetector, ChangeError};
pub use capability::{
    build_backend, crop_face, BackendConfig, BackendError, BoundingBox, EncodeError, FaceLocalizer,
    IdentityEncoder, LocalizeError,
};
pub use detection::{
    Detection, STATUS_KNOWN, STATUS_NO_PERSON, STATUS_UNCHANGED, STATUS_UNKNOWN,
};
pub use embedding::{Embedding, EmbeddingError, Identity};
pub use matcher::{AnyMatch, BestMatch, MatchOutcome, MatchPolicy, Metric, MetricDirection};
