use std::sync::Arc;

use crate::services::streaming_service::StreamingService;
use crate::services::upload_service::UploadCoordinator;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub uploads: Arc<UploadCoordinator>,
    pub streaming: Arc<StreamingService>,
}

impl AppState {
    pub fn new(uploads: Arc<UploadCoordinator>, streaming: Arc<StreamingService>) -> Self {
        Self { uploads, streaming }
    }
}
