use thiserror::Error;

/// The model artifact or its class table could not be loaded.
///
/// Cloneable so that a cached failure can be handed out on every call.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Failed to load model: {0}")]
pub struct ModelLoadError(pub String);

impl ModelLoadError {
    pub fn kind(&self) -> &'static str {
        "ModelLoadError"
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectError {
    #[error("Confidence threshold {0} is outside [0, 1]")]
    InvalidThreshold(f32),
    #[error("Inference failed: {0}")]
    Inference(String),
    #[error(transparent)]
    ModelLoad(#[from] ModelLoadError),
}

impl DetectError {
    pub fn kind(&self) -> &'static str {
        match self {
            DetectError::InvalidThreshold(_) => "InvalidThresholdError",
            DetectError::Inference(_) => "InferenceError",
            DetectError::ModelLoad(e) => e.kind(),
        }
    }
}
