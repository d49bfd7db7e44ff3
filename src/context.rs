//! The dispatcher (§4.1, §5): the shared, `Arc`-held object the capture
//! worker and every HTTP handler reach through — one `Context` per process,
//! addressed by a stable [`Uuid`] for log correlation.
//!
//! Four locks guard independent pieces of state so a slow model swap never
//! blocks a `/stats` poll, and a slow inference never blocks a frame-file
//! publish:
//!
//! - `model` — the loaded backend, manifest, and decode configuration.
//! - `result` — the most recent detection list plus the frame it was
//!   computed against.
//! - `frame` — the most recently captured raw frame (written by the
//!   capture worker, read by `predict_image` and the annotator).
//! - `frame_file` — the published annotated-JPEG path and its sequence
//!   counter (§4.5, `X-Frame-Sequence`).
//!
//! Model swap is a non-blocking trylock protocol (§5): a `predict_image`
//! call that lands mid-swap does not queue behind the load, it fails fast
//! with [`CiraError::Model`] so the caller can retry.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use opencv::core::{Mat, Vec3b};
use opencv::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use crate::backend::BackendHandle;
use crate::config::RuntimeConfig;
use crate::decoder::{self, DecodeConfig};
use crate::detection::{Detection, MAX_DETECTIONS};
use crate::error::{CiraError, CiraResult};
use crate::image_utils;
use crate::labels::LabelTable;
use crate::manifest::{ModelManifest, YoloVersionSetting, DEFAULT_INPUT_SIZE};
use crate::stats::{Stats, StatsView};

/// Bound on the serialized `/result` body (§4.1, §6): at 256 detections the
/// JSON never realistically approaches this, but the bound is enforced
/// rather than assumed.
pub const MAX_RESULT_JSON_BYTES: usize = 64 * 1024;

#[derive(Default)]
struct ModelSlot {
    backend: Option<BackendHandle>,
    manifest: ModelManifest,
    labels: LabelTable,
    decode_cfg: DecodeConfig,
    path: Option<PathBuf>,
}

#[derive(Default)]
struct ResultState {
    detections: Vec<Detection>,
    frame_w: u32,
    frame_h: u32,
}

/// One detection rendered into the `/result` JSON view, bit-exact to the
/// documented schema (§6): `{"label":…,"confidence":…,"bbox":[px,py,pw,ph]}`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DetectionView {
    pub label: String,
    pub confidence: f64,
    pub bbox: [i64; 4],
}

/// The full `/result` body (§6): `{"detections":[…],"count":N}`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ResultView {
    pub detections: Vec<DetectionView>,
    pub count: usize,
}

/// Rounds to 3-decimal precision (§6: "confidence has 3-decimal precision").
fn round3(v: f32) -> f64 {
    ((v as f64) * 1000.0).round() / 1000.0
}

/// A single raw frame to run through [`Context::predict_batch`] (§4.1).
pub struct RawFrame<'a> {
    pub data: &'a [u8],
    pub w: u32,
    pub h: u32,
    pub channels: u32,
}

pub struct Context {
    id: Uuid,
    config: RuntimeConfig,
    model: Mutex<ModelSlot>,
    swapping: AtomicBool,
    result: Mutex<ResultState>,
    frame: Mutex<Option<Mat>>,
    stats: Stats,
    last_error: Mutex<Option<CiraError>>,
}

impl Context {
    /// Creates a fresh, model-less context (§4.1 `create`). A process holds
    /// exactly one of these; the id exists for log correlation, not for
    /// addressing multiple instances.
    pub fn create(config: RuntimeConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            config,
            model: Mutex::new(ModelSlot::default()),
            swapping: AtomicBool::new(false),
            result: Mutex::new(ResultState::default()),
            frame: Mutex::new(None),
            stats: Stats::new(),
            last_error: Mutex::new(None),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Composes the documented `/stats` view (§6): the counters `Stats`
    /// owns, translated from class id to label name, plus the model
    /// identity only the model slot knows.
    pub fn stats(&self) -> StatsView {
        let snapshot = self.stats.snapshot();
        let slot = self.model.lock().expect("model mutex poisoned");
        let model_loaded = slot.backend.is_some();
        let model_name = slot
            .backend
            .as_ref()
            .map(|b| b.format().to_string())
            .unwrap_or_else(|| "none".to_string());
        let model_path = slot
            .path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        let labels = &slot.labels;
        snapshot.into_view(|id| labels.name_of(id).to_string(), model_loaded, model_name, model_path)
    }

    /// Call once per captured frame (§4.4 step 5), independent of whether
    /// inference ran on it — drives the rolling FPS computation.
    pub fn record_capture_tick(&self) {
        self.stats.record_capture();
    }

    /// Publishes a freshly captured frame for `predict_image` and the
    /// annotator to pick up (§4.4).
    pub fn publish_frame(&self, frame: Mat) {
        *self.frame.lock().expect("frame mutex poisoned") = Some(frame);
    }

    pub fn current_frame(&self) -> Option<Mat> {
        self.frame.lock().expect("frame mutex poisoned").clone()
    }

    /// Loads a model directory, probing its format and rebuilding the
    /// decode configuration from its manifest (§4.1, §4.2). Fails fast
    /// rather than blocking if another load is already in flight.
    pub fn load(&self, model_dir: &Path) -> CiraResult<()> {
        if self.swapping.swap(true, Ordering::AcqRel) {
            return Err(CiraError::Model("model swap already in progress".into()));
        }
        let result = self.load_inner(model_dir);
        self.swapping.store(false, Ordering::Release);
        if let Err(ref e) = result {
            self.set_last_error(e.clone());
        }
        result
    }

    fn load_inner(&self, model_dir: &Path) -> CiraResult<()> {
        let manifest = ModelManifest::load(model_dir);
        let labels = LabelTable::load(model_dir);

        let input_w = manifest.input_width.unwrap_or(DEFAULT_INPUT_SIZE);
        let input_h = manifest.input_height.unwrap_or(DEFAULT_INPUT_SIZE);
        let backend = BackendHandle::load(model_dir, input_w, input_h)?;

        let num_classes = manifest
            .num_classes
            .map(|n| n as usize)
            .unwrap_or_else(|| labels.len().max(1));

        let version = match manifest.yolo_version {
            YoloVersionSetting::Auto => None,
            YoloVersionSetting::Fixed(v) => Some(v),
        };

        let decode_cfg = DecodeConfig {
            version,
            input_w,
            input_h,
            num_classes,
            conf_threshold: manifest.confidence_threshold,
            nms_threshold: manifest.nms_threshold,
            max_detections: MAX_DETECTIONS,
        };

        let mut slot = self.model.lock().expect("model mutex poisoned");
        *slot = ModelSlot {
            backend: Some(backend),
            manifest,
            labels,
            decode_cfg,
            path: Some(model_dir.to_path_buf()),
        };
        tracing::info!(path = %model_dir.display(), version = ?version, "model loaded");
        Ok(())
    }

    /// Runs inference on one raw frame and replaces the shared result
    /// (§4.1 `predict_image(data, w, h, channels=3)`). `data` is a packed
    /// row-major RGB byte buffer; only 3-channel frames are accepted, and
    /// both a wrong channel count and a null/empty/undersized buffer are
    /// reported as [`CiraError::Input`] rather than attempted. Returns the
    /// detection count. A swap in flight, or no model loaded yet, is
    /// reported as [`CiraError::Model`] rather than blocking.
    pub fn predict_image(&self, data: &[u8], w: u32, h: u32, channels: u32) -> CiraResult<usize> {
        if channels != 3 {
            return Err(CiraError::Input(format!(
                "predict_image requires exactly 3 channels, got {channels}"
            )));
        }
        if w == 0 || h == 0 || data.is_empty() {
            return Err(CiraError::Input("predict_image requires a non-empty frame".into()));
        }
        let expected_len = w as usize * h as usize * channels as usize;
        if data.len() < expected_len {
            return Err(CiraError::Input(format!(
                "frame buffer too small: expected at least {expected_len} bytes, got {}",
                data.len()
            )));
        }

        if self.swapping.load(Ordering::Acquire) {
            return Err(CiraError::Model("model swap in progress, retry shortly".into()));
        }
        let slot = self
            .model
            .try_lock()
            .map_err(|_| CiraError::Model("model busy, retry shortly".into()))?;
        let backend = slot
            .backend
            .as_ref()
            .ok_or_else(|| CiraError::Model("no model loaded".into()))?;

        let pixels: Vec<Vec3b> = data[..expected_len]
            .chunks_exact(3)
            .map(|c| Vec3b::from([c[0], c[1], c[2]]))
            .collect();
        let frame = Mat::new_rows_cols_with_data(h as i32, w as i32, &pixels)
            .map_err(|e| CiraError::Input(format!("failed building frame mat: {e}")))?;

        let (frame_w, frame_h) = image_utils::frame_dims(&frame)?;
        let tensors = backend.infer(&frame)?;
        let raw = decoder::decode_multi(&tensors, &slot.decode_cfg);
        let detections: Vec<Detection> = raw
            .iter()
            .map(|r| {
                Detection::from_corners(
                    r.x1, r.y1, r.x2, r.y2, r.score, r.class_id, frame_w as f32, frame_h as f32,
                )
            })
            .collect();
        drop(slot);

        self.stats.record_inference(&detections);
        let count = detections.len();

        let mut result = self.result.lock().expect("result mutex poisoned");
        result.detections = detections;
        result.frame_w = frame_w;
        result.frame_h = frame_h;
        Ok(count)
    }

    /// Runs [`Self::predict_image`] over a batch, in order, continuing past
    /// per-frame failures rather than aborting the whole batch (§4.1).
    pub fn predict_batch(&self, frames: &[RawFrame<'_>]) -> Vec<CiraResult<usize>> {
        frames
            .iter()
            .map(|f| self.predict_image(f.data, f.w, f.h, f.channels))
            .collect()
    }

    pub fn result_count(&self) -> usize {
        self.result.lock().expect("result mutex poisoned").detections.len()
    }

    pub fn result_bbox(&self, index: usize) -> Option<(i64, i64, i64, i64)> {
        let result = self.result.lock().expect("result mutex poisoned");
        let det = result.detections.get(index)?;
        Some(det.pixel_bbox(result.frame_w, result.frame_h))
    }

    pub fn result_score(&self, index: usize) -> Option<f32> {
        let result = self.result.lock().expect("result mutex poisoned");
        result.detections.get(index).map(|d| *d.confidence())
    }

    pub fn result_class_id(&self, index: usize) -> Option<i32> {
        let result = self.result.lock().expect("result mutex poisoned");
        result.detections.get(index).map(|d| *d.class_id())
    }

    pub fn result_label(&self, index: usize) -> Option<String> {
        let result = self.result.lock().expect("result mutex poisoned");
        let det = result.detections.get(index)?;
        let slot = self.model.lock().expect("model mutex poisoned");
        Some(slot.labels.name_of(*det.class_id()).to_string())
    }

    /// Snapshots the current result list as `(pixel bbox, confidence,
    /// label)` tuples, the shape the annotator draws from (§4.5). Kept
    /// separate from [`Self::result_json`] since the annotator has no use
    /// for a JSON string.
    pub fn result_boxes_and_labels(&self) -> Vec<(i64, i64, i64, i64, f32, String)> {
        let result = self.result.lock().expect("result mutex poisoned");
        let slot = self.model.lock().expect("model mutex poisoned");
        result
            .detections
            .iter()
            .map(|d| {
                let (x, y, w, h) = d.pixel_bbox(result.frame_w, result.frame_h);
                (x, y, w, h, *d.confidence(), slot.labels.name_of(*d.class_id()).to_string())
            })
            .collect()
    }

    /// Renders the documented `/result` body, `{"detections":[…],"count":N}`
    /// (§6, bit-exact). Detections are appended until the serialized body
    /// would exceed [`MAX_RESULT_JSON_BYTES`]; further ones are omitted and
    /// `count` reflects only what was actually emitted (§4.1).
    pub fn result_json(&self) -> CiraResult<String> {
        let result = self.result.lock().expect("result mutex poisoned");
        let slot = self.model.lock().expect("model mutex poisoned");

        let mut emitted: Vec<DetectionView> = Vec::with_capacity(result.detections.len());
        for d in &result.detections {
            let (x, y, w, h) = d.pixel_bbox(result.frame_w, result.frame_h);
            let mut candidate = emitted.clone();
            candidate.push(DetectionView {
                label: slot.labels.name_of(*d.class_id()).to_string(),
                confidence: round3(*d.confidence()),
                bbox: [x, y, w, h],
            });
            let probe = ResultView {
                count: candidate.len(),
                detections: candidate.clone(),
            };
            let body = serde_json::to_string(&probe)
                .map_err(|e| CiraError::Generic(format!("result serialization failed: {e}")))?;
            if body.len() > MAX_RESULT_JSON_BYTES {
                tracing::warn!(
                    bytes = body.len(),
                    emitted = emitted.len(),
                    total = result.detections.len(),
                    "result JSON bound reached, omitting remaining detections"
                );
                break;
            }
            emitted = candidate;
        }

        let view = ResultView {
            count: emitted.len(),
            detections: emitted,
        };
        serde_json::to_string(&view)
            .map_err(|e| CiraError::Generic(format!("result serialization failed: {e}")))
    }

    pub fn set_last_error(&self, error: CiraError) {
        *self.last_error.lock().expect("error mutex poisoned") = Some(error);
    }

    pub fn last_error(&self) -> Option<CiraError> {
        self.last_error.lock().expect("error mutex poisoned").clone()
    }

    /// Tears down the loaded model (§4.1 `destroy`), releasing the backend
    /// and clearing the shared result so a stale detection list never
    /// outlives the model that produced it.
    pub fn destroy(&self) {
        let mut slot = self.model.lock().expect("model mutex poisoned");
        *slot = ModelSlot::default();
        drop(slot);
        let mut result = self.result.lock().expect("result mutex poisoned");
        *result = ResultState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_context_has_no_results() {
        let ctx = Context::create(RuntimeConfig::default());
        assert_eq!(ctx.result_count(), 0);
        assert_eq!(ctx.result_json().unwrap(), r#"{"detections":[],"count":0}"#);
        assert!(ctx.result_bbox(0).is_none());
    }

    #[test]
    fn stats_report_no_model_loaded_by_default() {
        let ctx = Context::create(RuntimeConfig::default());
        let stats = ctx.stats();
        assert!(!stats.model_loaded);
        assert_eq!(stats.model_name, "none");
        assert_eq!(stats.total_frames, 0);
    }

    #[test]
    fn predict_without_model_reports_model_error() {
        let ctx = Context::create(RuntimeConfig::default());
        let data = vec![0u8; 4 * 4 * 3];
        let err = ctx.predict_image(&data, 4, 4, 3).unwrap_err();
        assert_eq!(err.status(), crate::error::StatusCode::Model);
    }

    #[test]
    fn predict_with_wrong_channel_count_reports_input_error() {
        let ctx = Context::create(RuntimeConfig::default());
        let data = vec![0u8; 4 * 4];
        let err = ctx.predict_image(&data, 4, 4, 1).unwrap_err();
        assert_eq!(err.status(), crate::error::StatusCode::Input);
    }

    #[test]
    fn predict_with_empty_buffer_reports_input_error() {
        let ctx = Context::create(RuntimeConfig::default());
        let err = ctx.predict_image(&[], 4, 4, 3).unwrap_err();
        assert_eq!(err.status(), crate::error::StatusCode::Input);
    }

    #[test]
    fn load_missing_directory_reports_model_error() {
        let ctx = Context::create(RuntimeConfig::default());
        let err = ctx
            .load(Path::new("/nonexistent/cira-context-test"))
            .unwrap_err();
        assert_eq!(err.status(), crate::error::StatusCode::Model);
    }

    #[test]
    fn destroy_clears_stale_results() {
        let ctx = Context::create(RuntimeConfig::default());
        ctx.destroy();
        assert_eq!(ctx.result_count(), 0);
    }
}
