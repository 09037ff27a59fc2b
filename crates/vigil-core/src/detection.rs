//! The detection event reported by the agent and served to pollers.

use serde::{Deserialize, Serialize};

pub const STATUS_UNCHANGED: &str = "no difference detected";
pub const STATUS_NO_PERSON: &str = "something detected";
pub const STATUS_KNOWN: &str = "known person detected";
pub const STATUS_UNKNOWN: &str = "unknown person detected";

/// Latest classification outcome. Overwritten on every report, never merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Detection {
    pub status: String,
    pub detail: String,
}

impl Detection {
    pub fn new(status: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            detail: detail.into(),
        }
    }
}
