//! Candidate-region detection for concept identification.
//!
//! The open-vocabulary detector itself is a collaborator behind the [`Detector`] trait; this
//! module owns what happens to its raw output: priority-aware suppression
//! ([`select_regions`]) and clamped cropping ([`crop`]). Labels fall into three tiers:
//! specific labels (tier 1) beat `pet`/`person` (tier 2), which beat the catch-all `object`
//! (tier 3) when boxes overlap.

pub mod http;

use anyhow::{Context, Result};
use base64::Engine as _;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use tracing::debug;

use crate::config::DetectionConfig;

/// Axis-aligned box in pixel coordinates, `(x1, y1)` top-left, `(x2, y2)` bottom-right.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl From<[f32; 4]> for BoundingBox {
    fn from([x1, y1, x2, y2]: [f32; 4]) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

impl From<BoundingBox> for [f32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    /// Intersection over union; 0 for degenerate boxes.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let iy = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let intersection = ix * iy;
        let union = self.area() + other.area() - intersection;
        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }
}

/// One raw detector hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
    pub score: f32,
    pub label: String,
}

/// Open-vocabulary object detector.
pub trait Detector: Send + Sync {
    /// Detect regions matching any of `labels`. An empty result is not an error.
    fn detect(&self, image: &DynamicImage, labels: &[String]) -> Result<Vec<Detection>>;
}

/// Detector that never finds anything, so identification always uses the whole image.
pub struct NullDetector;

impl Detector for NullDetector {
    fn detect(&self, _image: &DynamicImage, _labels: &[String]) -> Result<Vec<Detection>> {
        Ok(Vec::new())
    }
}

/// Create a detector from config: `"none"` or `"http"`.
pub fn create_detector(config: &DetectionConfig) -> Result<Box<dyn Detector>> {
    match config.provider.as_str() {
        "none" => Ok(Box::new(NullDetector)),
        "http" => Ok(Box::new(http::HttpDetector::new(config)?)),
        other => anyhow::bail!("unknown detection provider: {other}. Supported: none, http"),
    }
}

/// Priority tier of a label; lower is more specific.
pub fn label_priority(label: &str) -> u8 {
    match label.trim().to_lowercase().as_str() {
        "object" => 3,
        "pet" | "person" => 2,
        _ => 1,
    }
}

/// Choose which detections to keep, returning their indices in acceptance order.
///
/// Stage one is greedy suppression by score at `nms_iou`, except that a box never suppresses
/// one with a more specific label. Stage two walks the survivors most-specific first (higher
/// score first within a tier) and drops any box overlapping an accepted one by more than
/// `redundancy_iou`.
pub fn select_regions(detections: &[Detection], nms_iou: f32, redundancy_iou: f32) -> Vec<usize> {
    let priority: Vec<u8> = detections.iter().map(|d| label_priority(&d.label)).collect();

    let mut by_score: Vec<usize> = (0..detections.len()).collect();
    by_score.sort_by(|&a, &b| {
        detections[b]
            .score
            .total_cmp(&detections[a].score)
            .then(a.cmp(&b))
    });

    let mut suppressed = vec![false; detections.len()];
    let mut survivors = Vec::new();
    for (pos, &i) in by_score.iter().enumerate() {
        if suppressed[i] {
            continue;
        }
        survivors.push(i);
        for &j in &by_score[pos + 1..] {
            if !suppressed[j]
                && priority[j] >= priority[i]
                && detections[i].bbox.iou(&detections[j].bbox) > nms_iou
            {
                suppressed[j] = true;
            }
        }
    }

    survivors.sort_by(|&a, &b| {
        priority[a]
            .cmp(&priority[b])
            .then(detections[b].score.total_cmp(&detections[a].score))
            .then(a.cmp(&b))
    });

    let mut accepted: Vec<usize> = Vec::new();
    for i in survivors {
        let redundant = accepted
            .iter()
            .any(|&a| detections[a].bbox.iou(&detections[i].bbox) > redundancy_iou);
        if redundant {
            debug!(label = %detections[i].label, score = detections[i].score, "dropping redundant detection");
        } else {
            accepted.push(i);
        }
    }
    accepted
}

/// Crop `bbox` out of `image`, clamped to the image bounds. `None` if nothing remains.
pub fn crop(image: &DynamicImage, bbox: &BoundingBox) -> Option<DynamicImage> {
    let (w, h) = (image.width() as f32, image.height() as f32);
    let x1 = bbox.x1.max(0.0).min(w).floor() as u32;
    let y1 = bbox.y1.max(0.0).min(h).floor() as u32;
    let x2 = bbox.x2.max(0.0).min(w).ceil() as u32;
    let y2 = bbox.y2.max(0.0).min(h).ceil() as u32;
    if x2 <= x1 || y2 <= y1 {
        return None;
    }
    Some(image.crop_imm(x1, y1, x2 - x1, y2 - y1))
}

/// Detect, deduplicate, and crop candidate regions. May return an empty list.
pub fn detect_and_crop(
    detector: &dyn Detector,
    image: &DynamicImage,
    config: &DetectionConfig,
) -> Result<Vec<DynamicImage>> {
    let detections = detector.detect(image, &config.labels)?;
    if detections.is_empty() {
        return Ok(Vec::new());
    }
    let keep = select_regions(&detections, config.nms_iou, config.redundancy_iou);
    debug!(raw = detections.len(), kept = keep.len(), "detections selected");
    Ok(keep
        .into_iter()
        .filter_map(|i| crop(image, &detections[i].bbox))
        .collect())
}

/// Shrink `image` so its longest side is at most `max_side`, keeping the aspect ratio.
pub fn downscale(image: &DynamicImage, max_side: u32) -> DynamicImage {
    if image.width().max(image.height()) <= max_side {
        return image.clone();
    }
    image.resize(max_side, max_side, image::imageops::FilterType::Lanczos3)
}

/// PNG-encode `image` and return it as standard base64.
pub fn encode_png_base64(image: &DynamicImage) -> Result<String> {
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, image::ImageFormat::Png)
        .context("failed to encode image as PNG")?;
    Ok(base64::engine::general_purpose::STANDARD.encode(buf.into_inner()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(label: &str, score: f32, b: [f32; 4]) -> Detection {
        Detection {
            bbox: b.into(),
            score,
            label: label.into(),
        }
    }

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        let a = BoundingBox::from([0.0, 0.0, 10.0, 10.0]);
        let b = BoundingBox::from([20.0, 20.0, 30.0, 30.0]);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        assert_eq!(a.iou(&b), 0.0);
        assert_eq!(BoundingBox::from([5.0, 5.0, 5.0, 5.0]).iou(&a), 0.0);
    }

    #[test]
    fn specific_label_beats_generic_despite_lower_score() {
        // IoU of these two boxes is 0.8
        let detections = vec![
            det("object", 0.95, [0.0, 0.0, 100.0, 100.0]),
            det("pet", 0.9, [0.0, 0.0, 100.0, 80.0]),
        ];
        let iou = detections[0].bbox.iou(&detections[1].bbox);
        assert!((iou - 0.8).abs() < 1e-6);

        assert_eq!(select_regions(&detections, 0.5, 0.6), vec![1]);
    }

    #[test]
    fn same_tier_duplicates_are_suppressed_by_score() {
        let detections = vec![
            det("animal", 0.6, [0.0, 0.0, 100.0, 100.0]),
            det("animal", 0.9, [2.0, 2.0, 100.0, 100.0]),
        ];
        assert_eq!(select_regions(&detections, 0.5, 0.6), vec![1]);
    }

    #[test]
    fn separate_regions_are_all_kept_most_specific_first() {
        let detections = vec![
            det("object", 0.99, [0.0, 0.0, 10.0, 10.0]),
            det("person", 0.5, [50.0, 50.0, 60.0, 60.0]),
            det("animal", 0.4, [100.0, 100.0, 120.0, 120.0]),
        ];
        assert_eq!(select_regions(&detections, 0.5, 0.6), vec![2, 1, 0]);
    }

    #[test]
    fn moderate_overlap_survives_both_stages() {
        // IoU 0.55: past NMS threshold only for same tier, below redundancy threshold
        let detections = vec![
            det("pet", 0.8, [0.0, 0.0, 100.0, 100.0]),
            det("object", 0.9, [0.0, 0.0, 100.0, 55.0]),
        ];
        assert_eq!(select_regions(&detections, 0.5, 0.6), vec![0, 1]);
    }

    #[test]
    fn crop_clamps_to_bounds() {
        let img = DynamicImage::new_rgb8(50, 40);
        let c = crop(&img, &BoundingBox::from([-10.0, 5.0, 80.0, 30.5])).unwrap();
        assert_eq!((c.width(), c.height()), (50, 26));
        assert!(crop(&img, &BoundingBox::from([60.0, 0.0, 90.0, 10.0])).is_none());
    }

    struct Canned(Vec<Detection>);

    impl Detector for Canned {
        fn detect(&self, _image: &DynamicImage, _labels: &[String]) -> Result<Vec<Detection>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn detect_and_crop_returns_selected_crops() {
        let img = DynamicImage::new_rgb8(200, 200);
        let detector = Canned(vec![
            det("object", 0.95, [0.0, 0.0, 100.0, 100.0]),
            det("pet", 0.9, [0.0, 0.0, 100.0, 80.0]),
        ]);
        let crops = detect_and_crop(&detector, &img, &DetectionConfig::default()).unwrap();
        assert_eq!(crops.len(), 1);
        assert_eq!((crops[0].width(), crops[0].height()), (100, 80));
    }

    #[test]
    fn null_detector_finds_nothing() {
        let img = DynamicImage::new_rgb8(8, 8);
        let crops = detect_and_crop(&NullDetector, &img, &DetectionConfig::default()).unwrap();
        assert!(crops.is_empty());
    }

    #[test]
    fn downscale_caps_longest_side() {
        let img = DynamicImage::new_rgb8(1280, 640);
        let small = downscale(&img, 640);
        assert_eq!((small.width(), small.height()), (640, 320));
        let tiny = DynamicImage::new_rgb8(10, 10);
        assert_eq!(downscale(&tiny, 640).width(), 10);
    }

    #[test]
    fn detection_deserializes_box_array() {
        let d: Detection =
            serde_json::from_str(r#"{"box": [1, 2, 3, 4], "score": 0.5, "label": "pet"}"#).unwrap();
        assert_eq!(d.bbox, BoundingBox::from([1.0, 2.0, 3.0, 4.0]));
    }
}
