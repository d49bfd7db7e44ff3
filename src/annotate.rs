//! The annotator (§4.5): draws the current detection set onto a copy of the
//! latest frame, encodes it to JPEG, and publishes it to a frame-file under
//! an atomic rename so `/frame/latest` and the MJPEG stream never read a
//! half-written file.
//!
//! Detections persist for a short hold-over window after the model
//! momentarily reports none, so a single missed frame does not make boxes
//! flicker out and back in on a live stream (§4.5 anti-flicker).

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use opencv::core::{Point, Rect, Scalar};
use opencv::imgproc;

use crate::context::Context;
use crate::error::{CiraError, CiraResult};
use crate::image_utils::encode_jpeg;

/// The anti-flicker hold-over window (§4.5): a gap of fewer than this many
/// frames since the last non-empty result still draws the held-over boxes.
const PERSIST_FRAMES: u32 = 3;

const BOX_COLOR: (f64, f64, f64) = (0.0, 220.0, 0.0);
const BOX_THICKNESS: i32 = 2;
const FONT_SCALE: f64 = 0.5;

struct AnnotatorState {
    sequence: u64,
    published_path: Option<PathBuf>,
    last_boxes: Vec<(i64, i64, i64, i64, f32, String)>,
    frames_since_nonempty: u32,
}

impl Default for AnnotatorState {
    fn default() -> Self {
        Self {
            sequence: 0,
            published_path: None,
            last_boxes: Vec::new(),
            frames_since_nonempty: 0,
        }
    }
}

pub struct Annotator {
    state: Mutex<AnnotatorState>,
}

impl Default for Annotator {
    fn default() -> Self {
        Self {
            state: Mutex::new(AnnotatorState::default()),
        }
    }
}

impl Annotator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sequence(&self) -> u64 {
        self.state.lock().expect("frame-file mutex poisoned").sequence
    }

    pub fn published_path(&self) -> Option<PathBuf> {
        self.state
            .lock()
            .expect("frame-file mutex poisoned")
            .published_path
            .clone()
    }

    /// Draws the current (or held-over) detections onto `frame`, encodes to
    /// JPEG, and atomically publishes it under `context.config().temp_dir`.
    pub fn publish(&self, context: &Context, frame: &opencv::core::Mat) -> CiraResult<()> {
        let boxes = self.boxes_to_draw(context);

        let mut annotated = frame.clone();
        for (x, y, w, h, confidence, label) in &boxes {
            draw_box(&mut annotated, *x, *y, *w, *h, *confidence, label)?;
        }

        let jpeg = encode_jpeg(&annotated)?;
        let temp_dir = &context.config().temp_dir;
        std::fs::create_dir_all(temp_dir)
            .map_err(|e| CiraError::File(format!("failed creating frame-file dir: {e}")))?;

        // `<tempdir>/cira_frame_<ctx>.jpg`, staged under `.tmp` and
        // atomically renamed into place (§4.5, §6).
        let published = temp_dir.join(format!("cira_frame_{}.jpg", context.id()));
        let staging = temp_dir.join(format!("cira_frame_{}.tmp", context.id()));
        std::fs::write(&staging, &jpeg).map_err(|e| CiraError::File(format!("frame-file write failed: {e}")))?;

        publish_atomically(&staging, &published)?;

        let mut state = self.state.lock().expect("frame-file mutex poisoned");
        state.sequence += 1;
        state.published_path = Some(published);
        Ok(())
    }

    /// Implements the anti-flicker rule (§4.5): an empty current result
    /// still draws the previous non-empty set as long as fewer than
    /// [`PERSIST_FRAMES`] frames have elapsed since that set was current.
    /// This is rendering-only — the JSON/stats view always reads the true
    /// current list, never this held-over one.
    fn boxes_to_draw(&self, context: &Context) -> Vec<(i64, i64, i64, i64, f32, String)> {
        let current = context.result_boxes_and_labels();
        let mut state = self.state.lock().expect("frame-file mutex poisoned");

        if !current.is_empty() {
            state.last_boxes = current.clone();
            state.frames_since_nonempty = 0;
            return current;
        }

        state.frames_since_nonempty += 1;
        if state.frames_since_nonempty < PERSIST_FRAMES {
            return state.last_boxes.clone();
        }

        state.last_boxes.clear();
        Vec::new()
    }
}

fn draw_box(
    frame: &mut opencv::core::Mat,
    x: i64,
    y: i64,
    w: i64,
    h: i64,
    confidence: f32,
    label: &str,
) -> CiraResult<()> {
    let rect = Rect::new(x as i32, y as i32, w.max(1) as i32, h.max(1) as i32);
    let color = Scalar::from(BOX_COLOR);
    imgproc::rectangle(frame, rect, color, BOX_THICKNESS, imgproc::LINE_8, 0)
        .map_err(|e| CiraError::Model(format!("draw rectangle failed: {e}")))?;

    let text = format!("{label} {confidence:.2}");
    let origin = Point::new(x as i32, (y - 6).max(0) as i32);
    imgproc::put_text(
        frame,
        &text,
        origin,
        imgproc::FONT_HERSHEY_SIMPLEX,
        FONT_SCALE,
        color,
        1,
        imgproc::LINE_8,
        false,
    )
    .map_err(|e| CiraError::Model(format!("draw label failed: {e}")))?;
    Ok(())
}

/// Renames `staging` onto `published`, falling back to remove-then-write
/// when the rename fails (e.g. cross-filesystem temp dirs) so a reader can
/// never observe a partially written frame-file either way (§4.5).
fn publish_atomically(staging: &Path, published: &Path) -> CiraResult<()> {
    if std::fs::rename(staging, published).is_ok() {
        return Ok(());
    }
    let bytes = std::fs::read(staging).map_err(|e| CiraError::File(format!("staging read failed: {e}")))?;
    let _ = std::fs::remove_file(published);
    std::fs::write(published, bytes).map_err(|e| CiraError::File(format!("frame-file publish failed: {e}")))?;
    let _ = std::fs::remove_file(staging);
    Ok(())
}
