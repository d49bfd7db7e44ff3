//! Class-aware greedy non-maximum suppression (§4.3). Skipped entirely for
//! v10 output, whose head is already NMS-free.

use super::RawDetection;

/// Suppresses overlapping same-class boxes, keeping the higher-scoring one
/// whenever IoU exceeds `threshold`. Boxes of different classes never
/// suppress each other.
pub fn nms(mut detections: Vec<RawDetection>, threshold: f32) -> Vec<RawDetection> {
    detections.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept: Vec<RawDetection> = Vec::with_capacity(detections.len());
    for candidate in detections {
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == candidate.class_id && k.iou(&candidate) > threshold);
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x1: f32, y1: f32, x2: f32, y2: f32, score: f32, class_id: i32) -> RawDetection {
        RawDetection { x1, y1, x2, y2, score, class_id }
    }

    #[test]
    fn suppresses_overlapping_same_class() {
        let out = nms(
            vec![
                det(0.0, 0.0, 100.0, 100.0, 0.9, 0),
                det(5.0, 5.0, 95.0, 95.0, 0.8, 0),
            ],
            0.4,
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].score, 0.9);
    }

    #[test]
    fn keeps_overlapping_different_classes() {
        let out = nms(
            vec![
                det(0.0, 0.0, 100.0, 100.0, 0.9, 0),
                det(5.0, 5.0, 95.0, 95.0, 0.8, 1),
            ],
            0.4,
        );
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn idempotent_on_already_disjoint_set() {
        let disjoint = vec![
            det(0.0, 0.0, 10.0, 10.0, 0.9, 0),
            det(100.0, 100.0, 110.0, 110.0, 0.8, 0),
        ];
        let once = nms(disjoint.clone(), 0.4);
        let twice = nms(once.clone(), 0.4);
        assert_eq!(once.len(), twice.len());
        assert_eq!(once.len(), 2);
    }
}
