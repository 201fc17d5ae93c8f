use crate::pipeline::geometry::{compute_iou, union_bbox};
use crate::pipeline::types::{DetectionBox, DetectionLabel};

/// Default IoU above which two smoke boxes are folded together
pub const DEFAULT_MERGE_IOU: f32 = 0.3;

/// Greedy, single-pass merge of overlapping smoke boxes.
///
/// Candidates are visited in the order given (row-major scan order). Each smoke box is
/// folded into the first already-accepted smoke box whose IoU exceeds `iou_threshold`:
/// the merged box takes the max confidence and the union rectangle. Anything else
/// (including every fire box) is kept as-is at the position where it was first accepted.
/// The result depends on input order; it is not a global clustering.
pub fn merge_smoke_detections(
    candidates: Vec<DetectionBox>,
    iou_threshold: f32,
) -> Vec<DetectionBox> {
    let mut merged: Vec<DetectionBox> = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        if candidate.label != DetectionLabel::Smoke {
            merged.push(candidate);
            continue;
        }

        let target = merged.iter_mut().find(|m| {
            m.label == DetectionLabel::Smoke
                && compute_iou(&candidate.bbox, &m.bbox) > iou_threshold
        });

        match target {
            Some(existing) => {
                existing.confidence = existing.confidence.max(candidate.confidence);
                existing.bbox = union_bbox(&existing.bbox, &candidate.bbox);
            }
            None => merged.push(candidate),
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::BBox;

    fn smoke(conf: f32, x1: f32, y1: f32, x2: f32, y2: f32) -> DetectionBox {
        DetectionBox::new(DetectionLabel::Smoke, conf, BBox::new(x1, y1, x2, y2))
    }

    fn fire(conf: f32, x1: f32, y1: f32, x2: f32, y2: f32) -> DetectionBox {
        DetectionBox::new(DetectionLabel::Fire, conf, BBox::new(x1, y1, x2, y2))
    }

    #[test]
    fn test_singleton_is_unchanged() {
        let only = smoke(0.8, 0.0, 0.0, 32.0, 32.0);
        let result = merge_smoke_detections(vec![only.clone()], DEFAULT_MERGE_IOU);
        assert_eq!(result, vec![only]);
    }

    #[test]
    fn test_empty_input() {
        assert!(merge_smoke_detections(Vec::new(), DEFAULT_MERGE_IOU).is_empty());
    }

    #[test]
    fn test_overlapping_smoke_merges_to_union_with_max_confidence() {
        let a = smoke(0.7, 0.0, 0.0, 10.0, 10.0);
        let b = smoke(0.9, 2.0, 1.0, 12.0, 11.0);
        let result = merge_smoke_detections(vec![a, b], DEFAULT_MERGE_IOU);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].bbox, BBox::new(0.0, 0.0, 12.0, 11.0));
        assert_eq!(result[0].confidence, 0.9);
        assert_eq!(result[0].label, DetectionLabel::Smoke);
    }

    #[test]
    fn test_low_overlap_stays_separate() {
        // IoU = 1/3 with threshold 0.5
        let a = smoke(0.7, 0.0, 0.0, 10.0, 10.0);
        let b = smoke(0.9, 5.0, 0.0, 15.0, 10.0);
        let result = merge_smoke_detections(vec![a, b], 0.5);
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn test_disjoint_tiles_never_merge() {
        let tiles: Vec<_> = (0..4)
            .map(|i| {
                let x = i as f32 * 32.0;
                smoke(0.8, x, 0.0, x + 32.0, 32.0)
            })
            .collect();
        let result = merge_smoke_detections(tiles.clone(), DEFAULT_MERGE_IOU);
        assert_eq!(result, tiles);
    }

    #[test]
    fn test_fire_passes_through_and_is_never_merged() {
        let f1 = fire(0.5, 0.0, 0.0, 10.0, 10.0);
        let f2 = fire(0.6, 0.0, 0.0, 10.0, 10.0);
        let s = smoke(0.9, 0.0, 0.0, 10.0, 10.0);
        let result = merge_smoke_detections(vec![f1.clone(), s.clone(), f2.clone()], 0.3);
        assert_eq!(result, vec![f1, s, f2]);
    }

    #[test]
    fn test_first_match_wins() {
        let a = smoke(0.6, 0.0, 0.0, 10.0, 10.0);
        let b = smoke(0.6, 20.0, 0.0, 30.0, 10.0);
        // Folded into a, the first accepted box it overlaps
        let c = smoke(0.95, 1.0, 0.0, 11.0, 10.0);
        let result = merge_smoke_detections(vec![a, b.clone(), c], 0.3);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].bbox, BBox::new(0.0, 0.0, 11.0, 10.0));
        assert_eq!(result[0].confidence, 0.95);
        assert_eq!(result[1], b);
    }
}
