//! The canonical detection representation (§3): normalized top-left + size,
//! confidence, class id. Every downstream reader — the JSON view, the
//! annotator, the stats counters — consumes this form.

use derive_getters::Getters;

/// Bounded capacity of the detection list (§3, §6).
pub const MAX_DETECTIONS: usize = 256;

/// One bounding box in normalized top-left + size form.
#[derive(Debug, Clone, Copy, PartialEq, Getters)]
pub struct Detection {
    x: f32,
    y: f32,
    w: f32,
    h: f32,
    confidence: f32,
    class_id: i32,
}

impl Detection {
    /// Constructs a detection from a pixel-space corner-form box plus the
    /// frame dimensions it was decoded against, normalizing and clamping to
    /// `[0, 1]` as required at the decoder/context boundary (§3).
    pub fn from_corners(
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        confidence: f32,
        class_id: i32,
        frame_w: f32,
        frame_h: f32,
    ) -> Self {
        let (x, y, w, h) = if frame_w > 0.0 && frame_h > 0.0 {
            (x1 / frame_w, y1 / frame_h, (x2 - x1) / frame_w, (y2 - y1) / frame_h)
        } else {
            (0.0, 0.0, 0.0, 0.0)
        };

        let mut det = Self {
            x,
            y,
            w,
            h,
            confidence,
            class_id,
        };
        det.clamp_unit();
        det
    }

    /// Clamps `x, y, w, h, confidence` into `[0, 1]` and ensures
    /// `x + w <= 1`, `y + h <= 1` (invariant 1, §8).
    pub fn clamp_unit(&mut self) {
        self.x = self.x.clamp(0.0, 1.0);
        self.y = self.y.clamp(0.0, 1.0);
        self.w = self.w.clamp(0.0, 1.0 - self.x);
        self.h = self.h.clamp(0.0, 1.0 - self.y);
        self.confidence = self.confidence.clamp(0.0, 1.0);
    }

    /// Pixel-space bounding box `(x, y, w, h)` rounded to integers, relative
    /// to the supplied frame dimensions (used by the JSON result view,
    /// §4.1).
    pub fn pixel_bbox(&self, frame_w: u32, frame_h: u32) -> (i64, i64, i64, i64) {
        let px = (self.x * frame_w as f32).round() as i64;
        let py = (self.y * frame_h as f32).round() as i64;
        let pw = (self.w * frame_w as f32).round() as i64;
        let ph = (self.h * frame_h as f32).round() as i64;
        (px, py, pw, ph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn from_corners_normalizes_and_converts() {
        let det = Detection::from_corners(320.0, 180.0, 480.0, 420.0, 0.91, 37, 800.0, 600.0);
        assert_approx_eq!(*det.x(), 0.4, 1e-4);
        assert_approx_eq!(*det.y(), 0.3, 1e-4);
        assert_approx_eq!(*det.w(), 0.2, 1e-4);
        assert_approx_eq!(*det.h(), 0.4, 1e-4);
        assert_eq!(*det.class_id(), 37);
    }

    #[test]
    fn clamp_unit_keeps_box_inside_frame() {
        let mut det = Detection {
            x: -0.2,
            y: 0.9,
            w: 1.5,
            h: 0.5,
            confidence: 1.4,
            class_id: 0,
        };
        det.clamp_unit();
        assert!(*det.x() >= 0.0 && *det.x() <= 1.0);
        assert!(*det.x() + *det.w() <= 1.0 + 1e-6);
        assert!(*det.y() + *det.h() <= 1.0 + 1e-6);
        assert!(*det.confidence() <= 1.0);
    }

    #[test]
    fn pixel_bbox_rounds_from_normalized() {
        let det = Detection::from_corners(320.0, 180.0, 480.0, 420.0, 0.9, 0, 800.0, 600.0);
        assert_eq!(det.pixel_bbox(800, 600), (320, 180, 160, 240));
    }
}
