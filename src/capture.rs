//! The camera capture worker (§4.4): a background thread that owns a
//! `cv::videoio::VideoCapture`, pushes each frame into the [`Context`], and
//! runs inference + (periodic) annotation on it. A plain device-index
//! capture rather than a GStreamer RTSP pipeline, since this runtime has no
//! outbound video stream of its own to feed.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use opencv::core::{Mat, MatTraitConst};
use opencv::prelude::*;
use opencv::videoio::{VideoCapture, VideoCaptureTrait, VideoCaptureTraitConst};

use crate::annotate::Annotator;
use crate::context::Context;
use crate::error::{CiraError, CiraResult};
use crate::logging::ErrorRateLimiter;

/// The resolution requested from the capture device on open (§4.4); the
/// device is free to grant a different one, which the worker then adopts.
const REQUESTED_WIDTH: f64 = 1280.0;
const REQUESTED_HEIGHT: f64 = 720.0;

/// A running (or stopped) capture worker. `start`/`stop` are idempotent
/// (§4.4): starting an already-running worker or stopping an already-
/// stopped one is a no-op, not an error.
pub struct CaptureWorker {
    running: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
    iteration: Arc<AtomicU32>,
}

impl Default for CaptureWorker {
    fn default() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
            iteration: Arc::new(AtomicU32::new(0)),
        }
    }
}

impl CaptureWorker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Spawns the capture thread against `device_id` if one is not already
    /// running (§4.4).
    pub fn start(&self, context: Arc<Context>, annotator: Arc<Annotator>, device_id: i32) -> CiraResult<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let running = self.running.clone();
        let iteration = self.iteration.clone();
        let annotate_every_n = context.config().annotate_every_n.max(1);

        let handle = thread::spawn(move || {
            let mut capture = match VideoCapture::new(device_id, opencv::videoio::CAP_ANY) {
                Ok(c) => c,
                Err(e) => {
                    tracing::error!(error = %e, device_id, "failed to open camera device");
                    context.set_last_error(CiraError::Input(format!(
                        "failed to open camera device {device_id}: {e}"
                    )));
                    running.store(false, Ordering::Release);
                    return;
                }
            };

            match capture.is_opened() {
                Ok(true) => {}
                _ => {
                    context.set_last_error(CiraError::Input(format!(
                        "camera device {device_id} did not open"
                    )));
                    running.store(false, Ordering::Release);
                    return;
                }
            }
            let _ = capture.set(opencv::videoio::CAP_PROP_FRAME_WIDTH, REQUESTED_WIDTH);
            let _ = capture.set(opencv::videoio::CAP_PROP_FRAME_HEIGHT, REQUESTED_HEIGHT);

            // §4.4 step 1: on a read failure, retry after a short sleep;
            // give up and exit the worker after too many in a row.
            const MAX_CONSECUTIVE_READ_FAILURES: u32 = 50;
            let mut consecutive_failures = 0u32;
            let mut inference_error_limiter = ErrorRateLimiter::new();

            while running.load(Ordering::Acquire) {
                let mut frame = Mat::default();
                match capture.read(&mut frame) {
                    Ok(true) => {
                        consecutive_failures = 0;
                    }
                    Ok(false) => {
                        consecutive_failures += 1;
                        thread::sleep(Duration::from_millis(10));
                        if consecutive_failures >= MAX_CONSECUTIVE_READ_FAILURES {
                            tracing::error!(device_id, "camera produced no frames, stopping worker");
                            break;
                        }
                        continue;
                    }
                    Err(e) => {
                        consecutive_failures += 1;
                        tracing::warn!(error = %e, consecutive_failures, "camera read failed");
                        context.set_last_error(CiraError::Input(format!("camera read failed: {e}")));
                        thread::sleep(Duration::from_millis(50));
                        if consecutive_failures >= MAX_CONSECUTIVE_READ_FAILURES {
                            tracing::error!(device_id, "repeated camera read failures, stopping worker");
                            break;
                        }
                        continue;
                    }
                }

                context.record_capture_tick();
                context.publish_frame(frame.clone());

                // The capture worker never propagates inference errors to a
                // caller; it logs and continues, rate-limited so a
                // persistently failing model doesn't flood the log (§7).
                let predict_result = match frame.data_typed::<u8>() {
                    Ok(bytes) => {
                        let (w, h) = frame
                            .size()
                            .map(|s| (s.width.max(0) as u32, s.height.max(0) as u32))
                            .unwrap_or((0, 0));
                        context.predict_image(bytes, w, h, frame.channels() as u32)
                    }
                    Err(e) => Err(CiraError::Input(format!("reading raw frame bytes failed: {e}"))),
                };
                if let Err(e) = predict_result {
                    if inference_error_limiter.tick() {
                        tracing::warn!(
                            error = %e,
                            occurrences = inference_error_limiter.count(),
                            "inference failed, continuing"
                        );
                    }
                }

                let n = iteration.fetch_add(1, Ordering::AcqRel);
                if n % annotate_every_n == 0 {
                    if let Err(e) = annotator.publish(&context, &frame) {
                        tracing::warn!(error = %e, "frame-file publish failed");
                    }
                }
            }
            running.store(false, Ordering::Release);
        });

        *self.handle.lock().expect("capture handle mutex poisoned") = Some(handle);
        Ok(())
    }

    /// Signals the capture thread to stop and waits for it to finish its
    /// current iteration before releasing the camera (§4.4: "stop joins the
    /// worker and then releases the camera"). A no-op if nothing is running.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.lock().expect("capture handle mutex poisoned").take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_before_start_is_a_no_op() {
        let worker = CaptureWorker::new();
        worker.stop();
        assert!(!worker.is_running());
    }

    #[test]
    #[ignore = "requires an attached camera on a test system"]
    fn start_against_device_zero() {
        let context = Arc::new(Context::create(crate::config::RuntimeConfig::default()));
        let annotator = Arc::new(Annotator::new());
        let worker = CaptureWorker::new();
        worker.start(context, annotator, 0).unwrap();
        assert!(worker.is_running());
        worker.stop();
    }
}
