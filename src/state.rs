use std::sync::Arc;

use crate::db::ClassroomStore;
use crate::detect::{DetectionParams, Detector};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ClassroomStore>,
    /// Loaded once at startup and shared by every request.
    pub detector: Arc<dyn Detector>,
    pub detection: DetectionParams,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(store: Arc<dyn ClassroomStore>, detector: Arc<dyn Detector>) -> Self {
        Self {
            store,
            detector,
            detection: DetectionParams::default(),
            max_upload_bytes: 20 * 1024 * 1024,
        }
    }

    pub fn with_max_upload_bytes(mut self, max_upload_bytes: usize) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self
    }
}
