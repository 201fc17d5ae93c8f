use crate::pipeline::types::BBox;

/// Compute Intersection over Union between two bounding boxes
pub fn compute_iou(a: &BBox, b: &BBox) -> f32 {
    let x1 = a.x1.max(b.x1);
    let y1 = a.y1.max(b.y1);
    let x2 = a.x2.min(b.x2);
    let y2 = a.y2.min(b.y2);

    if x2 <= x1 || y2 <= y1 {
        return 0.0;
    }

    let intersection = (x2 - x1) * (y2 - y1);
    let union = a.area() + b.area() - intersection;

    if union <= 0.0 {
        0.0
    } else {
        intersection / union
    }
}

/// Smallest box containing both inputs
pub fn union_bbox(a: &BBox, b: &BBox) -> BBox {
    BBox {
        x1: a.x1.min(b.x1),
        y1: a.y1.min(b.y1),
        x2: a.x2.max(b.x2),
        y2: a.y2.max(b.y2),
    }
}

/// Per-axis factors mapping inference space back to source space.
pub fn scale_factors(
    source_width: u32,
    source_height: u32,
    inference_width: u32,
    inference_height: u32,
) -> (f32, f32) {
    (
        source_width as f32 / inference_width.max(1) as f32,
        source_height as f32 / inference_height.max(1) as f32,
    )
}

/// Map a box produced at the model's input resolution back to source coordinates
pub fn rescale_bbox(bbox: &BBox, scale_x: f32, scale_y: f32) -> BBox {
    BBox {
        x1: bbox.x1 * scale_x,
        y1: bbox.y1 * scale_y,
        x2: bbox.x2 * scale_x,
        y2: bbox.y2 * scale_y,
    }
}

/// Normalise corner order and clamp to the frame's pixel-edge extent `[0, w] x [0, h]`.
/// Classifier output is untrusted, so non-finite coordinates collapse to zero.
pub fn clamp_to_frame(bbox: &BBox, width: u32, height: u32) -> BBox {
    let w = width as f32;
    let h = height as f32;
    let fix = |v: f32, max: f32| if v.is_finite() { v.clamp(0.0, max) } else { 0.0 };

    let (x1, x2) = (fix(bbox.x1, w), fix(bbox.x2, w));
    let (y1, y2) = (fix(bbox.y1, h), fix(bbox.y2, h));

    BBox {
        x1: x1.min(x2),
        y1: y1.min(y2),
        x2: x1.max(x2),
        y2: y1.max(y2),
    }
}

/// Confidence forced into [0, 1]; NaN counts as no confidence at all.
pub fn sanitize_confidence(confidence: f32) -> f32 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iou_identical_is_one() {
        for b in [
            BBox::new(0.0, 0.0, 10.0, 10.0),
            BBox::new(3.5, 7.25, 91.0, 12.0),
            BBox::new(100.0, 200.0, 164.0, 264.0),
        ] {
            assert_eq!(compute_iou(&b, &b), 1.0);
        }
    }

    #[test]
    fn test_iou_disjoint_is_zero() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        let far = BBox::new(50.0, 50.0, 60.0, 60.0);
        // Touching edges share no area
        let adjacent = BBox::new(10.0, 0.0, 20.0, 10.0);
        assert_eq!(compute_iou(&a, &far), 0.0);
        assert_eq!(compute_iou(&a, &adjacent), 0.0);
    }

    #[test]
    fn test_iou_partial_overlap() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BBox::new(5.0, 0.0, 15.0, 10.0);
        // 50 / (100 + 100 - 50)
        assert!((compute_iou(&a, &b) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_zero_area_boxes() {
        let p = BBox::new(5.0, 5.0, 5.0, 5.0);
        assert_eq!(compute_iou(&p, &p), 0.0);
    }

    #[test]
    fn test_union_bbox_is_elementwise_min_max() {
        let a = BBox::new(10.0, 20.0, 30.0, 40.0);
        let b = BBox::new(5.0, 25.0, 35.0, 38.0);
        assert_eq!(union_bbox(&a, &b), BBox::new(5.0, 20.0, 35.0, 40.0));
    }

    #[test]
    fn test_rescale_scales_area_by_factor_product() {
        let cases = [
            (BBox::new(10.0, 20.0, 110.0, 80.0), 320, 192, 1920, 1080),
            (BBox::new(0.0, 0.0, 640.0, 640.0), 640, 640, 1280, 720),
            (BBox::new(1.5, 2.5, 3.5, 9.0), 224, 224, 100, 50),
            (BBox::new(30.0, 40.0, 31.0, 44.0), 416, 416, 416, 416),
        ];
        for (raw, iw, ih, sw, sh) in cases {
            let (sx, sy) = scale_factors(sw, sh, iw, ih);
            let scaled = rescale_bbox(&raw, sx, sy);
            let expected = raw.area() * sx * sy;
            let rel = (scaled.area() - expected).abs() / expected;
            assert!(rel < 1e-5, "area {} vs {}", scaled.area(), expected);
        }
    }

    #[test]
    fn test_rescale_uses_source_over_inference() {
        let (sx, sy) = scale_factors(1920, 1080, 320, 192);
        assert_eq!(sx, 6.0);
        assert_eq!(sy, 5.625);
        let b = rescale_bbox(&BBox::new(10.0, 10.0, 20.0, 20.0), sx, sy);
        assert_eq!(b, BBox::new(60.0, 56.25, 120.0, 112.5));
    }

    #[test]
    fn test_clamp_to_frame() {
        let b = clamp_to_frame(&BBox::new(-20.0, 5.0, 700.0, 900.0), 640, 480);
        assert_eq!(b, BBox::new(0.0, 5.0, 640.0, 480.0));

        // Swapped corners are normalised
        let b = clamp_to_frame(&BBox::new(50.0, 60.0, 10.0, 20.0), 640, 480);
        assert_eq!(b, BBox::new(10.0, 20.0, 50.0, 60.0));

        let b = clamp_to_frame(&BBox::new(f32::NAN, 1.0, f32::INFINITY, 2.0), 64, 64);
        assert_eq!(b, BBox::new(0.0, 1.0, 0.0, 2.0));
    }

    #[test]
    fn test_sanitize_confidence() {
        assert_eq!(sanitize_confidence(f32::NAN), 0.0);
        assert_eq!(sanitize_confidence(1.7), 1.0);
        assert_eq!(sanitize_confidence(-0.2), 0.0);
        assert_eq!(sanitize_confidence(0.42), 0.42);
    }
}
