use crate::{
    annotate::Annotator,
    detection::{AnnotatedImage, ConfidenceThreshold, Detection, DetectionSet},
    error::DetectError,
    model::DetectionModel,
};
use image::RgbImage;

/// Runs one synchronous detection pass over an RGB image.
///
/// Every returned detection has `confidence >= threshold`, whatever the
/// backend reports, and the annotated image is RGB like its input. With no
/// detections the annotated image equals the input.
pub fn detect<M: DetectionModel + ?Sized>(
    model: &M,
    annotator: &Annotator,
    image: &RgbImage,
    threshold: f32,
) -> Result<(AnnotatedImage, DetectionSet), DetectError> {
    let threshold = ConfidenceThreshold::new(threshold)?;
    if image.width() == 0 || image.height() == 0 {
        return Err(DetectError::Inference(format!(
            "cannot process an empty image ({}x{})",
            image.width(),
            image.height()
        )));
    }

    let labels = model.labels();
    let detections: DetectionSet = model
        .predict(image, threshold)?
        .into_iter()
        .filter(|raw| threshold.admits(raw.confidence))
        .map(|raw| Detection {
            bbox: raw.bbox,
            class_id: raw.class_id,
            label: labels.name(raw.class_id),
            confidence: raw.confidence,
        })
        .collect();

    for (i, detection) in detections.iter().enumerate() {
        tracing::debug!(
            "Detection {}: label={}, confidence={:.3}, bbox=({:.1}, {:.1}, {:.1}, {:.1})",
            i,
            detection.label,
            detection.confidence,
            detection.bbox.x1,
            detection.bbox.y1,
            detection.bbox.x2,
            detection.bbox.y2
        );
    }

    let annotated = annotator.annotate(image, &detections, labels);
    Ok((AnnotatedImage(annotated), detections))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        detection::{BoundingBox, RawDetection},
        labels::ClassLabels,
    };
    use image::Rgb;

    /// Always reports one square at 0.95, ignoring the threshold it is given.
    struct MockModel {
        labels: ClassLabels,
    }

    impl MockModel {
        fn new() -> Self {
            Self {
                labels: ClassLabels::from_names(&["square"]),
            }
        }
    }

    impl DetectionModel for MockModel {
        fn labels(&self) -> &ClassLabels {
            &self.labels
        }

        fn predict(
            &self,
            _image: &RgbImage,
            _threshold: ConfidenceThreshold,
        ) -> Result<Vec<RawDetection>, DetectError> {
            Ok(vec![RawDetection {
                class_id: 0,
                confidence: 0.95,
                bbox: square_box(),
            }])
        }
    }

    struct FailingModel {
        labels: ClassLabels,
    }

    impl DetectionModel for FailingModel {
        fn labels(&self) -> &ClassLabels {
            &self.labels
        }

        fn predict(
            &self,
            _image: &RgbImage,
            _threshold: ConfidenceThreshold,
        ) -> Result<Vec<RawDetection>, DetectError> {
            Err(DetectError::Inference("shape mismatch".to_string()))
        }
    }

    fn square_box() -> BoundingBox {
        BoundingBox {
            x1: 30.0,
            y1: 30.0,
            x2: 70.0,
            y2: 70.0,
        }
    }

    fn red_square() -> RgbImage {
        let mut img = RgbImage::from_pixel(100, 100, Rgb([255, 255, 255]));
        for x in 30..70 {
            for y in 30..70 {
                img.put_pixel(x, y, Rgb([255, 0, 0]));
            }
        }
        img
    }

    #[test]
    fn test_detect_reports_square() {
        let img = red_square();

        let (annotated, detections) =
            detect(&MockModel::new(), &Annotator::default(), &img, 0.9).unwrap();

        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].label, "square");
        assert_eq!(detections[0].confidence, 0.95);
        assert_eq!(detections[0].bbox, square_box());
        assert_eq!(detections[0].summary(), "square with 0.95 confidence");
        assert_ne!(annotated.image(), &img);
    }

    #[test]
    fn test_detect_above_confidence_yields_nothing() {
        let img = red_square();

        let (annotated, detections) =
            detect(&MockModel::new(), &Annotator::default(), &img, 0.99).unwrap();

        assert!(detections.is_empty());
        assert_eq!(annotated.into_inner(), img);
    }

    #[test]
    fn test_every_detection_meets_threshold() {
        let img = red_square();
        let model = MockModel::new();

        for step in 0..=20 {
            let threshold = step as f32 / 20.0;
            let (_, detections) = detect(&model, &Annotator::default(), &img, threshold).unwrap();
            assert!(detections.iter().all(|d| d.confidence >= threshold));
        }
    }

    #[test]
    fn test_detect_is_deterministic() {
        let img = red_square();
        let model = MockModel::new();

        let first = detect(&model, &Annotator::default(), &img, 0.25).unwrap();
        let second = detect(&model, &Annotator::default(), &img, 0.25).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_invalid_threshold() {
        let img = red_square();

        let err = detect(&MockModel::new(), &Annotator::default(), &img, 1.2).unwrap_err();

        assert_eq!(err, DetectError::InvalidThreshold(1.2));
        assert_eq!(err.kind(), "InvalidThresholdError");
    }

    #[test]
    fn test_empty_image_is_an_inference_error() {
        let img = RgbImage::new(0, 10);

        let err = detect(&MockModel::new(), &Annotator::default(), &img, 0.5).unwrap_err();

        assert_eq!(err.kind(), "InferenceError");
    }

    #[test]
    fn test_backend_failure_propagates() {
        let model = FailingModel {
            labels: ClassLabels::default(),
        };

        let err = detect(&model, &Annotator::default(), &red_square(), 0.5).unwrap_err();

        assert_eq!(err, DetectError::Inference("shape mismatch".to_string()));
    }

    #[test]
    fn test_detect_through_handle() {
        let handle: crate::model::ModelHandle = std::sync::Arc::new(MockModel::new());

        let (_, detections) =
            detect(handle.as_ref(), &Annotator::default(), &red_square(), 0.5).unwrap();

        assert_eq!(detections.len(), 1);
    }
}
