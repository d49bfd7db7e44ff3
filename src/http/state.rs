//! Shared state handed to every axum handler (§4.6).

use std::sync::Arc;

use crate::annotate::Annotator;
use crate::capture::CaptureWorker;
use crate::context::Context;

#[derive(Clone)]
pub struct AppState {
    pub context: Arc<Context>,
    pub annotator: Arc<Annotator>,
    pub capture: Arc<CaptureWorker>,
}

impl AppState {
    pub fn new(context: Arc<Context>, annotator: Arc<Annotator>, capture: Arc<CaptureWorker>) -> Self {
        Self {
            context,
            annotator,
            capture,
        }
    }
}
