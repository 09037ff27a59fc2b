use std::sync::Arc;

use tokio::sync::RwLock;
use vigil_core::{Detection, FaceLocalizer, IdentityEncoder};
use vigil_store::IdentityStore;

/// Shared coordinator state.
///
/// The latest frame and latest detection live behind separate locks so a
/// slow frame upload never blocks a detection read. Handlers take one lock
/// at a time and never hold two together. A reader sees either a complete
/// previous value or a complete new one, never a torn mix.
pub struct AppState {
    pub latest_frame: RwLock<Option<Vec<u8>>>,
    pub latest_detection: RwLock<Option<Detection>>,
    pub identities: IdentityStore,
    pub localizer: Arc<dyn FaceLocalizer>,
    pub encoder: Arc<dyn IdentityEncoder>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(
        identities: IdentityStore,
        localizer: Arc<dyn FaceLocalizer>,
        encoder: Arc<dyn IdentityEncoder>,
    ) -> SharedState {
        Arc::new(Self {
            latest_frame: RwLock::new(None),
            latest_detection: RwLock::new(None),
            identities,
            localizer,
            encoder,
        })
    }
}
