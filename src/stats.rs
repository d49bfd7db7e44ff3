//! Cumulative runtime statistics (§4.1, §3, §6 `/stats`).
//!
//! Two update paths feed this, matching the capture worker's per-iteration
//! steps (§4.4): `record_capture` bumps the rolling frame counter used to
//! recompute `fps` once per wall-clock second (step 5), while
//! `record_inference` bumps `total_frames`/`total_detections`/`by_label`
//! whenever a `predict` call actually ran (step 4 — "increment the
//! total-frames counter"). Model identity (`model_loaded`, `model_name`,
//! `model_path`) is not tracked here — the context composes the final view
//! from this plus its own model slot.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::Local;
use serde::Serialize;

use crate::detection::Detection;

#[derive(Debug, Default)]
struct Counters {
    total_frames: u64,
    total_detections: u64,
    by_class: BTreeMap<i32, u64>,
}

/// Rolling one-second window used to recompute `fps` (§4.4 step 5).
struct FpsWindow {
    count: u64,
    window_start: Instant,
    current_fps: f64,
}

impl Default for FpsWindow {
    fn default() -> Self {
        Self {
            count: 0,
            window_start: Instant::now(),
            current_fps: 0.0,
        }
    }
}

/// Thread-safe statistics accumulator (§4.1). Monotonic for the lifetime of
/// the process (invariant 4, §8) — nothing here is ever decremented except
/// the FPS window's own rolling count.
pub struct Stats {
    counters: Mutex<Counters>,
    fps: Mutex<FpsWindow>,
    started_at: Instant,
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            counters: Mutex::new(Counters::default()),
            fps: Mutex::new(FpsWindow::default()),
            started_at: Instant::now(),
        }
    }
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call once per captured frame, whether or not inference ran on it.
    /// Recomputes `fps` once the rolling window has spanned a full second.
    pub fn record_capture(&self) {
        let mut w = self.fps.lock().expect("fps mutex poisoned");
        w.count += 1;
        let elapsed = w.window_start.elapsed();
        if elapsed >= Duration::from_secs(1) {
            w.current_fps = w.count as f64 / elapsed.as_secs_f64();
            w.count = 0;
            w.window_start = Instant::now();
        }
    }

    /// Call once per completed `predict_image`, successful or not: bumps
    /// `total_frames` by one, `total_detections` by the detection count, and
    /// `by_class` per class id observed (§3).
    pub fn record_inference(&self, detections: &[Detection]) {
        let mut c = self.counters.lock().expect("stats mutex poisoned");
        c.total_frames += 1;
        c.total_detections += detections.len() as u64;
        for det in detections {
            *c.by_class.entry(*det.class_id()).or_insert(0) += 1;
        }
    }

    pub fn uptime_seconds(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }

    /// Renders the counters accumulated so far, leaving class-id → label
    /// translation and model identity for the caller to fill in (§6) — the
    /// label table and bound backend both live outside this module.
    pub fn snapshot(&self) -> StatsSnapshot {
        let c = self.counters.lock().expect("stats mutex poisoned");
        let fps = self.fps.lock().expect("fps mutex poisoned").current_fps;
        StatsSnapshot {
            total_detections: c.total_detections,
            total_frames: c.total_frames,
            by_class: c.by_class.clone(),
            fps,
            uptime_sec: self.uptime_seconds() as i64,
        }
    }
}

pub struct StatsSnapshot {
    pub total_detections: u64,
    pub total_frames: u64,
    pub by_class: BTreeMap<i32, u64>,
    pub fps: f64,
    pub uptime_sec: i64,
}

/// Detections per hour of uptime (§4.6 "Stats view"), extrapolated from the
/// cumulative total rather than a separate rolling window. Zero uptime (the
/// very first poll) reports `0.0` instead of dividing by zero.
fn defects_per_hour(total_detections: u64, uptime_sec: i64) -> f64 {
    if uptime_sec <= 0 {
        return 0.0;
    }
    total_detections as f64 / (uptime_sec as f64 / 3600.0)
}

/// The documented `/stats` JSON body (§6).
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatsView {
    pub total_detections: u64,
    pub total_frames: u64,
    pub by_label: BTreeMap<String, u64>,
    pub fps: f64,
    pub uptime_sec: i64,
    pub defects_per_hour: f64,
    pub timestamp: String,
    pub model_loaded: bool,
    pub model_name: String,
    pub model_path: String,
}

impl StatsSnapshot {
    /// Folds in the parts of the view only the context's model slot knows:
    /// class-id → label translation (via `label_of`) and model identity.
    pub fn into_view(
        self,
        label_of: impl Fn(i32) -> String,
        model_loaded: bool,
        model_name: String,
        model_path: String,
    ) -> StatsView {
        let mut by_label = BTreeMap::new();
        for (class_id, count) in self.by_class {
            *by_label.entry(label_of(class_id)).or_insert(0) += count;
        }
        StatsView {
            total_detections: self.total_detections,
            total_frames: self.total_frames,
            by_label,
            fps: self.fps,
            uptime_sec: self.uptime_sec,
            defects_per_hour: defects_per_hour(self.total_detections, self.uptime_sec),
            timestamp: Local::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
            model_loaded,
            model_name,
            model_path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(class_id: i32) -> Detection {
        Detection::from_corners(0.0, 0.0, 10.0, 10.0, 0.9, class_id, 100.0, 100.0)
    }

    #[test]
    fn starts_at_zero() {
        let stats = Stats::new();
        let snap = stats.snapshot();
        assert_eq!(snap.total_frames, 0);
        assert_eq!(snap.total_detections, 0);
        assert!(snap.by_class.is_empty());
    }

    #[test]
    fn accumulates_by_class() {
        let stats = Stats::new();
        stats.record_inference(&[det(0), det(0), det(1)]);
        stats.record_inference(&[]);

        let snap = stats.snapshot();
        assert_eq!(snap.total_frames, 2);
        assert_eq!(snap.total_detections, 3);
        assert_eq!(snap.by_class.get(&0), Some(&2));
        assert_eq!(snap.by_class.get(&1), Some(&1));
    }

    #[test]
    fn view_translates_class_ids_to_labels_and_carries_model_identity() {
        let stats = Stats::new();
        stats.record_inference(&[det(0), det(1)]);
        let view = stats.snapshot().into_view(
            |id| if id == 0 { "person".to_string() } else { "unknown".to_string() },
            true,
            "ONNX".to_string(),
            "models/yolov8".to_string(),
        );
        assert_eq!(view.by_label.get("person"), Some(&1));
        assert_eq!(view.by_label.get("unknown"), Some(&1));
        assert!(view.model_loaded);
        assert_eq!(view.model_name, "ONNX");
    }

    #[test]
    fn defects_per_hour_extrapolates_from_uptime() {
        assert_eq!(defects_per_hour(0, 0), 0.0);
        assert_eq!(defects_per_hour(360, 3600), 360.0);
        assert_eq!(defects_per_hour(1, 1800), 2.0);
    }

    #[test]
    fn monotonic_counters_never_decrease_across_calls() {
        let stats = Stats::new();
        let mut prev_frames = 0;
        let mut prev_detections = 0;
        for _ in 0..5 {
            stats.record_inference(&[det(0)]);
            let snap = stats.snapshot();
            assert!(snap.total_frames >= prev_frames);
            assert!(snap.total_detections >= prev_detections);
            prev_frames = snap.total_frames;
            prev_detections = snap.total_detections;
        }
    }
}
