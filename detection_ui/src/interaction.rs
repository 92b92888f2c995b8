//! One user-facing request/response cycle.
//!
//! `NoImage -> ImageLoaded -> Detecting -> Detected | Failed`. Both end
//! states accept a new upload or a re-trigger with another threshold; a
//! rejected upload drops back to `NoImage`.

use crate::upload::{decode_upload, AcceptedFormats, UploadError};
use base64::{prelude::BASE64_STANDARD, Engine};
use image::{ImageFormat, RgbImage};
use serde::Serialize;
use std::{io::Cursor, sync::Arc};
use yolo_detection::{
    detect, AnnotatedImage, Annotator, DetectError, DetectionSet, ModelProvider,
};

pub const NO_IMAGE_MESSAGE: &str = "Please upload an image to start.";

#[derive(Debug)]
pub struct LoadedImage {
    pub file_name: String,
    pub image: RgbImage,
}

#[derive(Debug)]
pub struct DetectionOutcome {
    pub threshold: f32,
    pub annotated: AnnotatedImage,
    pub detections: DetectionSet,
}

#[derive(Debug)]
pub enum InteractionState {
    NoImage,
    ImageLoaded(Arc<LoadedImage>),
    Detecting(Arc<LoadedImage>),
    Detected {
        image: Arc<LoadedImage>,
        outcome: DetectionOutcome,
    },
    Failed {
        image: Arc<LoadedImage>,
        threshold: f32,
        error: DetectError,
    },
}

impl InteractionState {
    pub fn name(&self) -> &'static str {
        match self {
            InteractionState::NoImage => "no_image",
            InteractionState::ImageLoaded(_) => "image_loaded",
            InteractionState::Detecting(_) => "detecting",
            InteractionState::Detected { .. } => "detected",
            InteractionState::Failed { .. } => "failed",
        }
    }

    fn image(&self) -> Option<&Arc<LoadedImage>> {
        match self {
            InteractionState::NoImage => None,
            InteractionState::ImageLoaded(image)
            | InteractionState::Detecting(image)
            | InteractionState::Detected { image, .. }
            | InteractionState::Failed { image, .. } => Some(image),
        }
    }
}

pub struct InteractionHandler {
    provider: Arc<ModelProvider>,
    annotator: Arc<Annotator>,
    formats: AcceptedFormats,
    state: InteractionState,
    rejected_upload: Option<UploadError>,
}

impl InteractionHandler {
    pub fn new(
        provider: Arc<ModelProvider>,
        annotator: Arc<Annotator>,
        formats: AcceptedFormats,
    ) -> Self {
        Self {
            provider,
            annotator,
            formats,
            state: InteractionState::NoImage,
            rejected_upload: None,
        }
    }

    pub fn state(&self) -> &InteractionState {
        &self.state
    }

    fn transition(&mut self, next: InteractionState) {
        tracing::debug!("Interaction {} -> {}", self.state.name(), next.name());
        self.state = next;
    }

    /// Replaces whatever image is loaded. Decoding happens here, so the
    /// trigger never sees an undecodable file.
    pub fn upload(&mut self, file_name: &str, image_data: &[u8]) -> Result<(), UploadError> {
        match decode_upload(file_name, image_data, &self.formats) {
            Ok(image) => {
                self.rejected_upload = None;
                self.transition(InteractionState::ImageLoaded(Arc::new(LoadedImage {
                    file_name: file_name.to_string(),
                    image,
                })));
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Rejected upload {}: {}", file_name, e);
                self.rejected_upload = Some(e.clone());
                self.transition(InteractionState::NoImage);
                Err(e)
            }
        }
    }

    /// Runs detection on the loaded image. Without an image this is a
    /// no-op and the handler stays in `NoImage`.
    pub fn trigger(&mut self, threshold: f32) -> &InteractionState {
        let Some(image) = self.state.image().cloned() else {
            tracing::info!("Detect triggered without an image");
            return &self.state;
        };

        self.transition(InteractionState::Detecting(image.clone()));

        let result = self
            .provider
            .get_model()
            .map_err(DetectError::from)
            .and_then(|model| detect(model.as_ref(), &self.annotator, &image.image, threshold));

        let next = match result {
            Ok((annotated, detections)) => {
                tracing::info!(
                    "Detected {} objects in {} at confidence {:.2}",
                    detections.len(),
                    image.file_name,
                    threshold
                );
                InteractionState::Detected {
                    image,
                    outcome: DetectionOutcome {
                        threshold,
                        annotated,
                        detections,
                    },
                }
            }
            Err(error) => {
                tracing::error!("Detection failed for {}: {}", image.file_name, error);
                InteractionState::Failed {
                    image,
                    threshold,
                    error,
                }
            }
        };
        self.transition(next);
        &self.state
    }

    pub fn render(&self) -> View {
        let mut view = View {
            state: self.state.name(),
            ..View::default()
        };

        if let Some(image) = self.state.image() {
            view.file_name = Some(image.file_name.clone());
            view.original = data_url(&image.image);
        }

        match &self.state {
            InteractionState::NoImage => {
                view.info = Some(NO_IMAGE_MESSAGE.to_string());
                if let Some(e) = &self.rejected_upload {
                    view.error_kind = Some(e.kind());
                    view.message = Some(e.to_string());
                }
            }
            InteractionState::ImageLoaded(_) | InteractionState::Detecting(_) => {}
            InteractionState::Detected { outcome, .. } => {
                view.threshold = Some(outcome.threshold);
                view.annotated = data_url(outcome.annotated.image());
                view.detections = outcome.detections.iter().map(|d| d.summary()).collect();
            }
            InteractionState::Failed {
                threshold, error, ..
            } => {
                view.threshold = Some(*threshold);
                view.error_kind = Some(error.kind());
                view.message = Some(format!("{}: {}", error.kind(), error));
            }
        }

        view
    }
}

/// What the page renders after one request.
#[derive(Debug, Default, Serialize, PartialEq)]
pub struct View {
    pub state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotated: Option<String>,
    pub detections: Vec<String>,
}

fn data_url(image: &RgbImage) -> Option<String> {
    let mut buffer = Vec::new();
    match image.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png) {
        Ok(()) => Some(format!(
            "data:image/png;base64,{}",
            BASE64_STANDARD.encode(&buffer)
        )),
        Err(e) => {
            tracing::error!("Failed to encode image for display: {}", e);
            None
        }
    }
}
