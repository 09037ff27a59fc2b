//! SQLite-backed persistence for vigil.
//!
//! Two stores share one database file: [`identity::IdentityStore`] holds
//! enrolled identities and their embedding vectors, and
//! [`background::BackgroundStore`] holds the single reference background
//! frame used for change detection. Both run their SQLite work on the
//! tokio-rusqlite connection's dedicated thread.

use thiserror::Error;

pub mod background;
pub mod identity;

pub use background::BackgroundStore;
pub use identity::IdentityStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] tokio_rusqlite::Error),
    #[error("rusqlite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
    #[error("invalid embedding blob size: {0} bytes")]
    InvalidBlob(usize),
    #[error("invalid embedding dimension: {0} (expected {1})")]
    InvalidDim(usize, usize),
    #[error("invalid embedding value (NaN/Inf)")]
    InvalidValue,
    #[error("enrollment requires at least one embedding")]
    NoEmbeddings,
    #[error("stored background frame is corrupt ({0}x{1} with short pixel buffer)")]
    InvalidBaseline(u32, u32),
}
