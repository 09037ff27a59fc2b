//! Vigil coordinator daemon library.
//!
//! Holds the latest camera frame and detection result in memory, persists
//! enrolled identities, and serves both to operators over HTTP. The binary
//! in `main.rs` wires configuration and the face backend into
//! [`routes::create_router`].

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::{AppState, SharedState};
