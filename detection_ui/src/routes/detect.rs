use crate::{
    interaction::{View, NO_IMAGE_MESSAGE},
    server::SharedState,
};
use axum::{
    body::Bytes,
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::instrument;

#[derive(Error, Debug)]
pub enum DetectRouteError {
    #[error("Invalid form data: {0}")]
    Multipart(#[from] MultipartError),
    #[error("Detection worker failed: {0}")]
    Worker(String),
}

impl DetectRouteError {
    pub fn kind(&self) -> &'static str {
        match self {
            DetectRouteError::Multipart(_) => "InvalidUploadError",
            DetectRouteError::Worker(_) => "InferenceError",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            // 413 when the body limit is hit, 400 for malformed forms.
            DetectRouteError::Multipart(e) => e.status(),
            DetectRouteError::Worker(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for DetectRouteError {
    fn into_response(self) -> Response {
        tracing::error!("{}: {}", self.kind(), self);
        let view = View {
            state: "no_image",
            info: Some(NO_IMAGE_MESSAGE.to_string()),
            error_kind: Some(self.kind()),
            message: Some(self.to_string()),
            ..View::default()
        };
        (self.status(), Json(view)).into_response()
    }
}

struct UploadedFile {
    file_name: String,
    image_data: Bytes,
}

#[derive(Default)]
struct DetectForm {
    file: Option<UploadedFile>,
    confidence: Option<String>,
}

impl DetectForm {
    async fn read(mut multipart: Multipart) -> Result<Self, MultipartError> {
        let mut form = DetectForm::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().map(str::to_string);
            match name.as_deref() {
                Some("file") => {
                    let file_name = field.file_name().unwrap_or_default().to_string();
                    let image_data = field.bytes().await?;
                    // Browsers send an empty part when nothing was picked.
                    if !image_data.is_empty() {
                        form.file = Some(UploadedFile {
                            file_name,
                            image_data,
                        });
                    }
                }
                Some("confidence") => form.confidence = Some(field.text().await?),
                _ => {}
            }
        }
        Ok(form)
    }
}

fn parse_confidence(raw: Option<&str>, default: f32) -> f32 {
    match raw.map(str::trim) {
        None | Some("") => default,
        Some(value) => value.parse().unwrap_or_else(|_| {
            tracing::warn!("Unparsable confidence value {:?}", value);
            f32::NAN
        }),
    }
}

impl View {
    pub fn status(&self) -> StatusCode {
        match self.error_kind {
            None => StatusCode::OK,
            Some("UnsupportedFormatError") => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Some("InvalidThresholdError") => StatusCode::BAD_REQUEST,
            Some("ModelLoadError") => StatusCode::SERVICE_UNAVAILABLE,
            Some(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Decodes the file (if any) and runs one detection on a blocking worker.
#[instrument(skip(state, multipart))]
pub async fn detect_objects(
    State(state): State<SharedState>,
    multipart: Multipart,
) -> Result<Response, DetectRouteError> {
    let form = DetectForm::read(multipart).await?;
    let threshold = parse_confidence(form.confidence.as_deref(), state.ui.default_confidence);

    let file = form.file;

    let mut handler = state.interaction();
    let handler = tokio::task::spawn_blocking(move || {
        if let Some(file) = file {
            // A rejection is recorded by the handler and rendered below.
            let _ = handler.upload(&file.file_name, &file.image_data);
        }
        handler.trigger(threshold);
        handler
    })
    .await
    .map_err(|e| DetectRouteError::Worker(e.to_string()))?;

    let view = handler.render();
    tracing::debug!(
        "Rendering {} with {} detections",
        view.state,
        view.detections.len()
    );
    Ok((view.status(), Json(view)).into_response())
}
