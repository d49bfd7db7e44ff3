//! Process entry point: loads configuration, builds the dispatcher, and
//! serves the HTTP surface until interrupted. Graceful shutdown races a
//! `CancellationToken` against `ctrl_c` inside `tokio::select!`, also
//! tripped from a panic hook so a worker-thread panic still brings the
//! server down cleanly.
//!
//! CLI argument parsing is intentionally out of scope — configuration
//! comes entirely from `cira.toml` and the per-model manifest.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use cira_rt_lib::annotate::Annotator;
use cira_rt_lib::capture::CaptureWorker;
use cira_rt_lib::config::RuntimeConfig;
use cira_rt_lib::context::Context;
use cira_rt_lib::http;
use cira_rt_lib::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let config = RuntimeConfig::load_or_default();
    let bind_addr = config.bind_addr.clone();

    let context = Arc::new(Context::create(config));
    let annotator = Arc::new(Annotator::new());
    let capture = Arc::new(CaptureWorker::new());

    let shutdown = CancellationToken::new();
    let panic_shutdown = shutdown.clone();
    let orig_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        orig_hook(info);
        panic_shutdown.cancel();
    }));

    let app = http::router(context.clone(), annotator.clone(), capture.clone());

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "listening");

    let shutdown_capture = capture.clone();
    let shutdown_context = context.clone();
    let shutdown_signal = async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("ctrl-c received, shutting down");
            }
            _ = shutdown.cancelled() => {
                tracing::warn!("shutdown requested by panic hook");
            }
        }
        shutdown_capture.stop();
        shutdown_context.destroy();
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    Ok(())
}
