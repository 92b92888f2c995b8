use crate::error::DetectError;
use image::RgbImage;
use serde::Serialize;

pub const DEFAULT_CONFIDENCE: f32 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceThreshold(f32);

impl ConfidenceThreshold {
    pub fn new(value: f32) -> Result<Self, DetectError> {
        if !(0.0..=1.0).contains(&value) {
            return Err(DetectError::InvalidThreshold(value));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> f32 {
        self.0
    }

    pub fn admits(&self, confidence: f32) -> bool {
        confidence >= self.0
    }
}

impl Default for ConfidenceThreshold {
    fn default() -> Self {
        Self(DEFAULT_CONFIDENCE)
    }
}

/// Corners in original-image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
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

    pub fn intersection(&self, other: &BoundingBox) -> f32 {
        let w = self.x2.min(other.x2) - self.x1.max(other.x1);
        let h = self.y2.min(other.y2) - self.y1.max(other.y1);
        w.max(0.0) * h.max(0.0)
    }

    pub fn union(&self, other: &BoundingBox) -> f32 {
        self.area() + other.area() - self.intersection(other)
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let union = self.union(other);
        if union <= 0.0 {
            return 0.0;
        }
        self.intersection(other) / union
    }
}

/// What a model backend reports before labels are attached.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDetection {
    pub class_id: usize,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub class_id: usize,
    pub label: String,
    pub confidence: f32,
}

impl Detection {
    pub fn summary(&self) -> String {
        format!("{} with {:.2} confidence", self.label, self.confidence)
    }
}

pub type DetectionSet = Vec<Detection>;

/// The input image with detections drawn on it, in RGB order.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedImage(pub RgbImage);

impl AnnotatedImage {
    pub fn image(&self) -> &RgbImage {
        &self.0
    }

    pub fn into_inner(self) -> RgbImage {
        self.0
    }
}
