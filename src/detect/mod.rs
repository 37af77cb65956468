//! Object detection collaborators.
//!
//! A [`Detector`] turns a decoded RGB image into labelled bounding boxes. The
//! occupancy pipeline only cares about detections labelled [`PERSON_LABEL`].

pub mod http;
#[cfg(feature = "backend-tract")]
pub mod tract;

use async_trait::async_trait;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use http::HttpDetector;
#[cfg(feature = "backend-tract")]
pub use tract::TractDetector;

pub const PERSON_LABEL: &str = "person";

/// COCO class names in model output order.
pub const COCO_CLASSES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch", "potted plant",
    "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote", "keyboard", "cell phone",
    "microwave", "oven", "toaster", "sink", "refrigerator", "book", "clock", "vase", "scissors",
    "teddy bear", "hair drier", "toothbrush",
];

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("no detector configured: {0}")]
    Unavailable(String),

    #[error("detector request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("detector returned an invalid response: {0}")]
    InvalidResponse(String),

    #[error("model inference failed: {0}")]
    Model(String),

    #[error("image encoding failed: {0}")]
    Image(#[from] image::ImageError),
}

/// Inference settings passed with every call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionParams {
    /// Square model input resolution in pixels.
    pub image_size: u32,
    /// Minimum confidence for a detection to be reported.
    pub confidence: f32,
    /// IoU above which overlapping boxes of the same class are suppressed.
    pub iou: f32,
    /// Test-time augmentation.
    pub augment: bool,
}

impl Default for DetectionParams {
    /// Tuned for small and distant people: a large input, a permissive
    /// confidence floor and a tight overlap threshold.
    fn default() -> Self {
        Self {
            image_size: 1920,
            confidence: 0.25,
            iou: 0.45,
            augment: true,
        }
    }
}

/// Axis-aligned box in source image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 { 0.0 } else { inter / union }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn is_person(&self) -> bool {
        self.label.eq_ignore_ascii_case(PERSON_LABEL)
    }
}

#[async_trait]
pub trait Detector: Send + Sync {
    fn name(&self) -> &'static str;

    async fn detect(
        &self,
        image: &RgbImage,
        params: &DetectionParams,
    ) -> Result<Vec<Detection>, DetectError>;
}

/// Used when no detector is configured. Every call fails, so uploads fall
/// back to echoing the original image.
pub struct NoopDetector;

#[async_trait]
impl Detector for NoopDetector {
    fn name(&self) -> &'static str {
        "noop"
    }

    async fn detect(
        &self,
        _image: &RgbImage,
        _params: &DetectionParams,
    ) -> Result<Vec<Detection>, DetectError> {
        Err(DetectError::Unavailable(
            "set DETECTOR_URL or DETECTOR_MODEL".to_string(),
        ))
    }
}

/// Greedy per-label non-maximum suppression. Keeps the highest-confidence
/// box and drops same-label boxes overlapping it by more than `iou`.
pub fn non_max_suppression(mut detections: Vec<Detection>, iou: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
    for candidate in detections {
        let suppressed = kept
            .iter()
            .any(|k| k.label == candidate.label && k.bbox.iou(&candidate.bbox) > iou);
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}
