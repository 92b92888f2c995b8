use crate::{
    config::{LabelsConfig, ModelConfig},
    error::ModelLoadError,
    model::ModelHandle,
    ort_model::OrtModel,
};
use std::sync::{Arc, OnceLock};

pub trait ModelLoader: Send + Sync + 'static {
    fn load(&self) -> Result<ModelHandle, ModelLoadError>;
}

pub struct OrtModelLoader {
    model: ModelConfig,
    labels: LabelsConfig,
}

impl OrtModelLoader {
    pub fn new(model: ModelConfig, labels: LabelsConfig) -> Self {
        Self { model, labels }
    }
}

impl ModelLoader for OrtModelLoader {
    fn load(&self) -> Result<ModelHandle, ModelLoadError> {
        let model = OrtModel::load(&self.model, &self.labels)?;
        Ok(Arc::new(model))
    }
}

/// Lazily loads the model on the first `get_model` call and hands out the
/// same handle afterwards. The outcome of that first load, success or
/// failure, is kept for the life of the provider and never retried. One
/// provider is created per process and never torn down.
pub struct ModelProvider {
    loader: Box<dyn ModelLoader>,
    handle: OnceLock<Result<ModelHandle, ModelLoadError>>,
}

impl ModelProvider {
    pub fn new(loader: impl ModelLoader) -> Self {
        Self {
            loader: Box::new(loader),
            handle: OnceLock::new(),
        }
    }

    pub fn get_model(&self) -> Result<ModelHandle, ModelLoadError> {
        self.handle
            .get_or_init(|| {
                tracing::info!("Loading detection model");
                let loaded = self.loader.load();
                if let Err(e) = &loaded {
                    tracing::error!("Model load failed: {}", e);
                }
                loaded
            })
            .clone()
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.handle.get(), Some(Ok(_)))
    }
}
