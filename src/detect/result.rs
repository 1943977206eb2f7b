/// Axis-aligned box in source-frame pixel coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection over union with another box.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix1 = self.x.max(other.x);
        let iy1 = self.y.max(other.y);
        let ix2 = (self.x + self.width).min(other.x + other.width);
        let iy2 = (self.y + self.height).min(other.y + other.height);
        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        if inter == 0.0 {
            return 0.0;
        }
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// One detector output. Produced fresh each tick, never retained.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub label: String,
    /// Score in [0, 1].
    pub confidence: f32,
}

impl Detection {
    pub fn new(bbox: BoundingBox, label: impl Into<String>, confidence: f32) -> Self {
        Self {
            bbox,
            label: label.into(),
            confidence,
        }
    }
}

/// Greedy non-maximum suppression.
///
/// Keeps the highest-scoring box of every overlapping cluster, returned in
/// descending score order and capped at `max_detections`.
pub fn non_max_suppression(
    mut detections: Vec<Detection>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<Detection> = Vec::new();
    for candidate in detections {
        if kept.len() >= max_detections {
            break;
        }
        if kept
            .iter()
            .all(|k| k.bbox.iou(&candidate.bbox) <= iou_threshold)
        {
            kept.push(candidate);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iou_of_disjoint_and_identical_boxes() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(20.0, 20.0, 10.0, 10.0);
        assert_eq!(a.iou(&b), 0.0);
        assert!((a.iou(&a) - 1.0).abs() < f32::EPSILON);

        let half = BoundingBox::new(5.0, 0.0, 10.0, 10.0);
        let expected = 50.0 / 150.0;
        assert!((a.iou(&half) - expected).abs() < 1e-6);
    }

    #[test]
    fn nms_drops_overlapping_lower_scores() {
        let detections = vec![
            Detection::new(BoundingBox::new(0.0, 0.0, 10.0, 10.0), "person", 0.6),
            Detection::new(BoundingBox::new(1.0, 1.0, 10.0, 10.0), "person", 0.9),
            Detection::new(BoundingBox::new(50.0, 50.0, 10.0, 10.0), "dog", 0.7),
        ];
        let kept = non_max_suppression(detections, 0.5, 20);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].label, "dog");
    }

    #[test]
    fn nms_respects_cap() {
        let detections = (0..5)
            .map(|i| {
                Detection::new(
                    BoundingBox::new(i as f32 * 100.0, 0.0, 10.0, 10.0),
                    "cup",
                    0.5 + i as f32 * 0.1,
                )
            })
            .collect();
        let kept = non_max_suppression(detections, 0.5, 3);
        assert_eq!(kept.len(), 3);
        assert!(kept[0].confidence > kept[2].confidence);
    }
}
