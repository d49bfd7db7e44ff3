//! The HTTP service (§4.6): an axum `Router` over the documented endpoints,
//! layered with request tracing the way the other corpus services
//! (blue-onyx, slab-server) wire up `tower-http`.

mod handlers;
mod state;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::annotate::Annotator;
use crate::capture::CaptureWorker;
use crate::context::Context;

pub use state::AppState;

/// Builds the full router over a shared [`AppState`] (§4.6, §7).
pub fn router(context: Arc<Context>, annotator: Arc<Annotator>, capture: Arc<CaptureWorker>) -> Router {
    let state = AppState::new(context, annotator, capture);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/stats", get(handlers::stats))
        .route("/result", get(handlers::result))
        .route("/snapshot", get(handlers::snapshot))
        .route("/frame/latest", get(handlers::frame_latest))
        .route("/stream", get(handlers::mjpeg_stream))
        .route("/model/load", post(handlers::load_model))
        .route("/camera/start", post(handlers::camera_start))
        .route("/camera/stop", post(handlers::camera_stop))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_returns_ok_status() {
        let context = Arc::new(Context::create(RuntimeConfig::default()));
        let annotator = Arc::new(Annotator::new());
        let capture = Arc::new(CaptureWorker::new());
        let app = router(context, annotator, capture);

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn result_with_no_model_is_empty_json() {
        let context = Arc::new(Context::create(RuntimeConfig::default()));
        let annotator = Arc::new(Annotator::new());
        let capture = Arc::new(CaptureWorker::new());
        let app = router(context, annotator, capture);

        let response = app
            .oneshot(Request::builder().uri("/result").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn frame_latest_is_service_unavailable_before_first_publish() {
        // §5: a read before any frame has been captured returns a
        // ServiceUnavailable-equivalent error, not a generic file-not-found.
        let context = Arc::new(Context::create(RuntimeConfig::default()));
        let annotator = Arc::new(Annotator::new());
        let capture = Arc::new(CaptureWorker::new());
        let app = router(context, annotator, capture);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/frame/latest")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::SERVICE_UNAVAILABLE);
    }
}
