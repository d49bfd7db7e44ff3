//! Per-layout box extraction (§4.3). Each function reads one tensor layout
//! and returns unfiltered-by-NMS, threshold-filtered `RawDetection`s in
//! pixel space scaled against `cfg.input_w` / `cfg.input_h`.

use super::{sigmoid, DecodeConfig, RawDetection};

/// Applies the sigmoid-or-raw-logit heuristic (§4.3, §9 open question):
/// a value already inside `[0, 1]` is treated as a probability, anything
/// else is assumed to be a pre-sigmoid logit.
fn as_probability(v: f32) -> f32 {
    if (0.0..=1.0).contains(&v) {
        v
    } else {
        sigmoid(v)
    }
}

/// Row-per-box layout shared by v3/v4 (after OpenCV's `dnn` module has
/// flattened per-scale grids) and v5/v7: `[1, N, 5 + num_classes]` rows of
/// `[cx, cy, w, h, objectness, class_probs...]`. Center and size are
/// normalized `[0, 1]` relative to the model's input dimensions.
pub fn decode_row_per_box(tensor: &[f32], shape: &[usize], cfg: &DecodeConfig) -> Vec<RawDetection> {
    if shape.len() != 3 {
        return Vec::new();
    }
    let n = shape[1];
    let row_len = shape[2];
    let class_count = cfg.num_classes.min(row_len.saturating_sub(5));
    if row_len < 5 + class_count || class_count == 0 {
        return Vec::new();
    }

    let mut out = Vec::new();
    for i in 0..n {
        let row = &tensor[i * row_len..(i + 1) * row_len];
        let cx = row[0];
        let cy = row[1];
        let w = row[2];
        let h = row[3];
        let objectness = as_probability(row[4]);

        let (best_class, best_prob) = row[5..5 + class_count]
            .iter()
            .enumerate()
            .map(|(idx, &v)| (idx, as_probability(v)))
            .fold((0usize, 0.0f32), |acc, cur| if cur.1 > acc.1 { cur } else { acc });

        let score = objectness * best_prob;
        if score < cfg.conf_threshold {
            continue;
        }

        let (cx_px, cy_px, w_px, h_px) = scale_center_box(cx, cy, w, h, cfg);
        out.push(RawDetection {
            x1: cx_px - w_px / 2.0,
            y1: cy_px - h_px / 2.0,
            x2: cx_px + w_px / 2.0,
            y2: cy_px + h_px / 2.0,
            score,
            class_id: best_class as i32,
        });
    }
    out
}

/// Transposed v8/v9/v11 layout: `[1, 4 + num_classes, N]`, no objectness
/// column — the max class probability alone is the score.
pub fn decode_transposed(tensor: &[f32], shape: &[usize], cfg: &DecodeConfig) -> Vec<RawDetection> {
    if shape.len() != 3 {
        return Vec::new();
    }
    let row_len = shape[1];
    let n = shape[2];
    let class_count = cfg.num_classes.min(row_len.saturating_sub(4));
    if row_len < 4 + class_count || class_count == 0 {
        return Vec::new();
    }

    let at = |channel: usize, idx: usize| tensor[channel * n + idx];

    let mut out = Vec::new();
    for i in 0..n {
        let cx = at(0, i);
        let cy = at(1, i);
        let w = at(2, i);
        let h = at(3, i);

        let (best_class, best_prob) = (0..class_count)
            .map(|c| (c, as_probability(at(4 + c, i))))
            .fold((0usize, 0.0f32), |acc, cur| if cur.1 > acc.1 { cur } else { acc });

        if best_prob < cfg.conf_threshold {
            continue;
        }

        let (cx_px, cy_px, w_px, h_px) = scale_center_box(cx, cy, w, h, cfg);
        out.push(RawDetection {
            x1: cx_px - w_px / 2.0,
            y1: cy_px - h_px / 2.0,
            x2: cx_px + w_px / 2.0,
            y2: cy_px + h_px / 2.0,
            score: best_prob,
            class_id: best_class as i32,
        });
    }
    out
}

/// v10's NMS-free head: `[1, 300, 6]` rows of
/// `[x1, y1, x2, y2, score, class_id]`, already in corner form.
pub fn decode_v10(tensor: &[f32], shape: &[usize], cfg: &DecodeConfig) -> Vec<RawDetection> {
    if shape.len() != 3 || shape[2] < 6 {
        return Vec::new();
    }
    let n = shape[1];
    let row_len = shape[2];

    let mut out = Vec::new();
    for i in 0..n {
        let row = &tensor[i * row_len..(i + 1) * row_len];
        let score = row[4];
        if score < cfg.conf_threshold {
            continue;
        }
        out.push(RawDetection {
            x1: row[0],
            y1: row[1],
            x2: row[2],
            y2: row[3],
            score,
            class_id: row[5] as i32,
        });
    }
    out
}

/// The optional 5-D anchor-per-cell ONNX layout
/// `[1, anchors, grid_h, grid_w, 5 + num_classes]`. Returns `None` for any
/// shape that isn't exactly this rank, matching §4.3's escape hatch for
/// unrecognized tensor shapes.
pub fn decode_grid5d(tensor: &[f32], shape: &[usize], cfg: &DecodeConfig) -> Option<Vec<RawDetection>> {
    if shape.len() != 5 {
        return None;
    }
    let (anchors, grid_h, grid_w, row_len) = (shape[1], shape[2], shape[3], shape[4]);
    let class_count = cfg.num_classes.min(row_len.saturating_sub(5));
    if row_len < 5 + class_count || class_count == 0 {
        return Some(Vec::new());
    }

    let mut out = Vec::new();
    for a in 0..anchors {
        for gy in 0..grid_h {
            for gx in 0..grid_w {
                let base = (((a * grid_h + gy) * grid_w) + gx) * row_len;
                let row = &tensor[base..base + row_len];
                let objectness = as_probability(row[4]);
                let (best_class, best_prob) = row[5..5 + class_count]
                    .iter()
                    .enumerate()
                    .map(|(idx, &v)| (idx, as_probability(v)))
                    .fold((0usize, 0.0f32), |acc, cur| if cur.1 > acc.1 { cur } else { acc });
                let score = objectness * best_prob;
                if score < cfg.conf_threshold {
                    continue;
                }
                let (cx_px, cy_px, w_px, h_px) = scale_center_box(row[0], row[1], row[2], row[3], cfg);
                out.push(RawDetection {
                    x1: cx_px - w_px / 2.0,
                    y1: cy_px - h_px / 2.0,
                    x2: cx_px + w_px / 2.0,
                    y2: cy_px + h_px / 2.0,
                    score,
                    class_id: best_class as i32,
                });
            }
        }
    }
    Some(out)
}

/// Scales a center-form box into pixel space against the configured input
/// dimensions. Values already outside `[0, 1]` are assumed to already be in
/// pixel space and pass through unscaled.
fn scale_center_box(cx: f32, cy: f32, w: f32, h: f32, cfg: &DecodeConfig) -> (f32, f32, f32, f32) {
    let normalized = (0.0..=1.0).contains(&cx) && (0.0..=1.0).contains(&cy);
    if normalized {
        (
            cx * cfg.input_w as f32,
            cy * cfg.input_h as f32,
            w * cfg.input_w as f32,
            h * cfg.input_h as f32,
        )
    } else {
        (cx, cy, w, h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::YoloVersion;

    #[test]
    fn row_per_box_filters_below_threshold() {
        let row_len = 7usize; // 4 box + obj + 2 classes
        let mut tensor = vec![0.0f32; row_len * 2];
        // row 0: strong detection
        tensor[0..7].copy_from_slice(&[0.5, 0.5, 0.2, 0.2, 0.9, 0.8, 0.1]);
        // row 1: below threshold
        tensor[7..14].copy_from_slice(&[0.1, 0.1, 0.1, 0.1, 0.05, 0.1, 0.1]);
        let cfg = DecodeConfig {
            version: Some(YoloVersion::V5V7),
            input_w: 100,
            input_h: 100,
            num_classes: 2,
            conf_threshold: 0.3,
            nms_threshold: 0.4,
            max_detections: 256,
        };
        let out = decode_row_per_box(&tensor, &[1, 2, row_len], &cfg);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].class_id, 0);
    }

    #[test]
    fn grid5d_rejects_wrong_rank() {
        assert!(decode_grid5d(&[], &[1, 3, 85], &DecodeConfig::default()).is_none());
    }
}
