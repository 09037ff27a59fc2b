use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("embedding is empty")]
    Empty,
    #[error("invalid embedding value (NaN/Inf) at index {0}")]
    NonFinite(usize),
}

/// Fixed-length feature vector summarizing one face sample.
///
/// The dimensionality is dictated by the encoder backend; all vectors
/// compared against each other must share it.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Reject empty vectors and non-finite components before they reach
    /// storage or comparison.
    pub fn validate(&self) -> Result<(), EmbeddingError> {
        if self.values.is_empty() {
            return Err(EmbeddingError::Empty);
        }
        if let Some(idx) = self.values.iter().position(|v| !v.is_finite()) {
            return Err(EmbeddingError::NonFinite(idx));
        }
        Ok(())
    }
}

/// One enrolled identity record.
///
/// Records are append-only: re-enrolling a name creates a new record with a
/// fresh id rather than merging into an existing one, and nothing enforces
/// name uniqueness.
#[derive(Debug, Clone)]
pub struct Identity {
    /// Monotonic sequential id assigned by the store.
    pub id: i64,
    pub name: String,
    /// One or more samples for this identity.
    pub embeddings: Vec<Embedding>,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
}
