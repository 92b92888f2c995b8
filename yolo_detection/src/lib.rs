mod detect;
mod error;
mod ort_model;

pub mod annotate;
pub mod channels;
pub mod config;
pub mod detection;
pub mod labels;
pub mod model;
pub mod provider;

pub use annotate::Annotator;
pub use detect::detect;
pub use detection::{
    AnnotatedImage, BoundingBox, ConfidenceThreshold, Detection, DetectionSet, RawDetection,
    DEFAULT_CONFIDENCE,
};
pub use error::{DetectError, ModelLoadError};
pub use model::{DetectionModel, ModelHandle};
pub use ort_model::{
    class_major_head, decode_candidates, non_max_suppression, Letterbox, OrtModel,
};
pub use provider::{ModelLoader, ModelProvider, OrtModelLoader};
