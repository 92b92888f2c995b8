use crate::{
    detection::{ConfidenceThreshold, RawDetection},
    error::DetectError,
    labels::ClassLabels,
};
use image::RgbImage;
use std::sync::Arc;

/// A loaded detector. Implementations own resizing, candidate decoding and
/// duplicate suppression; callers only see final detections.
pub trait DetectionModel: Send + Sync + 'static {
    fn labels(&self) -> &ClassLabels;

    fn predict(
        &self,
        image: &RgbImage,
        threshold: ConfidenceThreshold,
    ) -> Result<Vec<RawDetection>, DetectError>;
}

pub type ModelHandle = Arc<dyn DetectionModel>;
