use crate::config::Config;
use crate::server::{HttpServer, SharedState};

use std::error::Error;
use tokio::{signal, sync::broadcast};
use yolo_detection::{
    config::Validatable, Annotator, ModelLoadError, ModelProvider, OrtModelLoader,
};

/// Missing artifacts and unusable model settings are fatal. Corrupt
/// artifacts are only found when the model is first loaded.
pub fn validate_artifacts(config: &Config) -> Result<(), ModelLoadError> {
    config.model.validate_settings().map_err(ModelLoadError)?;
    config.model.validate().map_err(ModelLoadError)?;
    config.labels.validate().map_err(ModelLoadError)?;
    Ok(())
}

pub async fn start_app(config: Config) -> Result<(), Box<dyn Error>> {
    if let Err(e) = validate_artifacts(&config) {
        tracing::error!("{}: {}", e.kind(), e);
        return Err(Box::new(e));
    }

    let provider = ModelProvider::new(OrtModelLoader::new(
        config.model.clone(),
        config.labels.clone(),
    ));
    let annotator = Annotator::from_font_file(&config.ui.font_path)
        .with_font_size(config.ui.font_size);
    let state = SharedState::new(provider, annotator, config.ui.clone());

    let server = HttpServer::new(state, &config.server).await?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let server_handle = server.run(shutdown_tx.subscribe()).await?;

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown.");

    let _ = shutdown_tx.send(());
    match server_handle.await {
        Ok(Err(e)) => tracing::error!("Server stopped with an error: {}", e),
        Err(e) => tracing::error!("Server task failed: {}", e),
        Ok(Ok(())) => {}
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
