//! The YOLO output decoder (§4.3): a pure function that turns a raw float
//! tensor plus its shape into canonical pixel-space corner-form detections,
//! auto-detecting the model family from the tensor shape when not pinned by
//! the manifest.

mod boxes;
mod nms;
mod shape;

pub use nms::nms;
pub use shape::detect_version;

use serde::{Deserialize, Serialize};

use crate::detection::MAX_DETECTIONS;

/// The YOLO output families this decoder understands (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum YoloVersion {
    /// v3/v4: 3-D, row-per-box, pre-decoded per-scale grids.
    V3V4,
    /// v5/v7: 3-D, row-per-box, concatenated across scales.
    V5V7,
    /// v8/v9/v11: 3-D, transposed `[1, 4+C, N]`, no objectness.
    V8Plus,
    /// v10: 3-D `[1, 300, 6]`, NMS-free.
    V10,
}

/// A detection in pixel-space corner form, the decoder's native output unit
/// before the context converts it to the canonical normalized form (§3).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDetection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub score: f32,
    pub class_id: i32,
}

impl RawDetection {
    fn iou(&self, other: &Self) -> f32 {
        let x1 = self.x1.max(other.x1);
        let y1 = self.y1.max(other.y1);
        let x2 = self.x2.min(other.x2);
        let y2 = self.y2.min(other.y2);
        let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let area_a = (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0);
        let area_b = (other.x2 - other.x1).max(0.0) * (other.y2 - other.y1).max(0.0);
        let union = area_a + area_b - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// Decoder configuration, threaded through from the manifest/context (§4.3).
#[derive(Debug, Clone, Copy)]
pub struct DecodeConfig {
    pub version: Option<YoloVersion>,
    pub input_w: u32,
    pub input_h: u32,
    pub num_classes: usize,
    pub conf_threshold: f32,
    pub nms_threshold: f32,
    pub max_detections: usize,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            version: None,
            input_w: 416,
            input_h: 416,
            num_classes: 80,
            conf_threshold: 0.5,
            nms_threshold: 0.4,
            max_detections: MAX_DETECTIONS,
        }
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Shared per-tensor decode step, without NMS: auto-detects (or honors a
/// manifest-pinned) version and dispatches to the matching layout reader.
fn decode_one_no_nms(tensor: &[f32], shape: &[usize], cfg: &DecodeConfig) -> (YoloVersion, Vec<RawDetection>) {
    if tensor.is_empty() || shape.iter().product::<usize>() == 0 {
        return (cfg.version.unwrap_or(YoloVersion::V5V7), Vec::new());
    }

    let version = cfg.version.unwrap_or_else(|| detect_version(shape));
    let detections = match version {
        YoloVersion::V3V4 | YoloVersion::V5V7 => boxes::decode_row_per_box(tensor, shape, cfg),
        YoloVersion::V8Plus => boxes::decode_transposed(tensor, shape, cfg),
        YoloVersion::V10 => boxes::decode_v10(tensor, shape, cfg),
    };
    (version, detections)
}

/// Decodes a single raw output tensor into scored, NMS-filtered pixel-space
/// boxes.
///
/// `tensor` is the flattened row-major data; `shape` is its full dimension
/// list including the leading batch dimension. Returns an empty vector for
/// zero rows or for tensors this decoder cannot interpret at all.
pub fn decode(tensor: &[f32], shape: &[usize], cfg: &DecodeConfig) -> Vec<RawDetection> {
    let (version, mut detections) = decode_one_no_nms(tensor, shape, cfg);

    if version != YoloVersion::V10 {
        detections = nms::nms(detections, cfg.nms_threshold);
    }

    detections.truncate(cfg.max_detections);
    detections
}

/// Decodes every tensor a backend's forward pass produced independently,
/// then applies one final cross-scale NMS pass over the concatenated result
/// (§4.2: "ONNX iterates over all output tensors... then a final cross-scale
/// NMS is applied"). A single-tensor backend is just the `N == 1` case of
/// this function.
pub fn decode_multi(tensors: &[(Vec<f32>, Vec<usize>)], cfg: &DecodeConfig) -> Vec<RawDetection> {
    let mut all = Vec::new();
    let mut needs_nms = false;
    for (tensor, shape) in tensors {
        let (version, detections) = decode_one_no_nms(tensor, shape, cfg);
        if version != YoloVersion::V10 {
            needs_nms = true;
        }
        all.extend(detections);
    }

    if needs_nms {
        all = nms::nms(all, cfg.nms_threshold);
    }
    all.truncate(cfg.max_detections);
    all
}

/// The 5-D anchor-per-cell ONNX output path (§4.3, optional). Returns `None`
/// for shapes it does not recognize — callers should log and continue
/// rather than treat this as fatal.
pub fn decode_grid5d(tensor: &[f32], shape: &[usize], cfg: &DecodeConfig) -> Option<Vec<RawDetection>> {
    boxes::decode_grid5d(tensor, shape, cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_rows_yields_no_detections() {
        let cfg = DecodeConfig {
            version: Some(YoloVersion::V5V7),
            num_classes: 2,
            ..Default::default()
        };
        let out = decode(&[], &[1, 0, 7], &cfg);
        assert!(out.is_empty());
    }

    #[test]
    fn v10_emits_without_nms() {
        // [1, 300, 6] rows of [x1,y1,x2,y2,score,class]; two overlapping
        // boxes above threshold, the rest below.
        let mut tensor = vec![0.0f32; 300 * 6];
        tensor[0..6].copy_from_slice(&[100.0, 100.0, 200.0, 200.0, 0.9, 0.0]);
        tensor[6..12].copy_from_slice(&[101.0, 101.0, 199.0, 199.0, 0.88, 0.0]);
        let cfg = DecodeConfig {
            version: Some(YoloVersion::V10),
            input_w: 416,
            input_h: 416,
            num_classes: 1,
            conf_threshold: 0.5,
            nms_threshold: 0.4,
            max_detections: 256,
        };
        let out = decode(&tensor, &[1, 300, 6], &cfg);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn v8_transposed_decodes_single_peak() {
        // [1, 84, 8400], C=80. One cell (n=0) has class 37 at 0.91 after
        // sigmoid; everything else scores <= 0.5.
        let c = 84usize;
        let n = 8400usize;
        let mut tensor = vec![0.0f32; c * n];
        tensor[0 * n] = 0.5; // cx
        tensor[1 * n] = 0.5; // cy
        tensor[2 * n] = 0.2; // w
        tensor[3 * n] = 0.4; // h
        let target_class = 37usize;
        tensor[(4 + target_class) * n] = 0.91;
        let cfg = DecodeConfig {
            version: Some(YoloVersion::V8Plus),
            input_w: 800,
            input_h: 600,
            num_classes: 80,
            conf_threshold: 0.5,
            nms_threshold: 0.4,
            max_detections: 256,
        };
        let out = decode(&tensor, &[1, 84, 8400], &cfg);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].class_id, 37);
        // center (0.5,0.5), size (0.2,0.4) normalized -> scaled to 800x600
        assert!((out[0].x1 - 320.0).abs() < 1.0);
        assert!((out[0].y1 - 180.0).abs() < 1.0);
        assert!((out[0].x2 - 480.0).abs() < 1.0);
        assert!((out[0].y2 - 420.0).abs() < 1.0);
    }

    #[test]
    fn decode_multi_merges_scales_and_applies_one_nms_pass() {
        // Two per-scale tensors, each one row, both landing on the same box
        // — the final cross-scale pass must suppress the weaker duplicate.
        let row_len = 7usize;
        let mut scale_a = vec![0.0f32; row_len];
        scale_a.copy_from_slice(&[0.5, 0.5, 0.2, 0.2, 0.9, 0.8, 0.1]);
        let mut scale_b = vec![0.0f32; row_len];
        scale_b.copy_from_slice(&[0.5, 0.5, 0.2, 0.2, 0.85, 0.8, 0.1]);

        let cfg = DecodeConfig {
            version: Some(YoloVersion::V5V7),
            input_w: 100,
            input_h: 100,
            num_classes: 2,
            conf_threshold: 0.3,
            nms_threshold: 0.4,
            max_detections: 256,
        };
        let tensors = vec![(scale_a, vec![1, 1, row_len]), (scale_b, vec![1, 1, row_len])];
        let out = decode_multi(&tensors, &cfg);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].score, 0.9 * 0.8);
    }
}
