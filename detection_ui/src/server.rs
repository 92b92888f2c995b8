use crate::{
    config::{ServerConfig, UiConfig},
    interaction::InteractionHandler,
    routes::api_routes,
    upload::AcceptedFormats,
};
use axum::{extract::DefaultBodyLimit, Router};
use std::sync::Arc;
use tokio::{net::TcpListener, sync::broadcast::Receiver, task::JoinHandle};
use yolo_detection::{Annotator, ModelProvider};

#[derive(Clone)]
pub struct SharedState {
    pub provider: Arc<ModelProvider>,
    pub annotator: Arc<Annotator>,
    pub formats: AcceptedFormats,
    pub ui: Arc<UiConfig>,
}

impl SharedState {
    pub fn new(provider: ModelProvider, annotator: Annotator, ui: UiConfig) -> Self {
        Self {
            provider: Arc::new(provider),
            annotator: Arc::new(annotator),
            formats: AcceptedFormats::new(&ui.accepted_extensions),
            ui: Arc::new(ui),
        }
    }

    /// A fresh handler in `NoImage` for one request.
    pub fn interaction(&self) -> InteractionHandler {
        InteractionHandler::new(
            self.provider.clone(),
            self.annotator.clone(),
            self.formats.clone(),
        )
    }
}

pub fn router(state: SharedState) -> Router {
    let body_limit = state.ui.max_upload_bytes;
    Router::new()
        .merge(api_routes())
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new(state: SharedState, config: &ServerConfig) -> anyhow::Result<Self> {
        let addr = config.get_address();
        let router = router(state);
        let listener = TcpListener::bind(addr).await?;

        Ok(Self { router, listener })
    }

    pub async fn run(
        self,
        mut shutdown_rx: Receiver<()>,
    ) -> anyhow::Result<JoinHandle<anyhow::Result<()>>> {
        tracing::info!("Starting app on http://{}", self.listener.local_addr()?);

        let listener = self.listener;
        let router = self.router;
        let server_handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    shutdown_rx.recv().await.ok();
                })
                .await?;
            Ok(())
        });

        Ok(server_handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interaction::tests::{red_square_png, BrokenLoader, SquareLoader};
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    const BOUNDARY: &str = "detectboundary";

    fn square_state() -> (SharedState, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let state = SharedState::new(
            ModelProvider::new(SquareLoader {
                calls: calls.clone(),
            }),
            Annotator::default(),
            UiConfig::default(),
        );
        (state, calls)
    }

    fn multipart_body(file: Option<(&str, &[u8])>, confidence: Option<&str>) -> Vec<u8> {
        let mut body = Vec::new();
        if let Some((file_name, data)) = file {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                    BOUNDARY, file_name
                )
                .as_bytes(),
            );
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        if let Some(confidence) = confidence {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"confidence\"\r\n\r\n{}\r\n",
                    BOUNDARY, confidence
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    async fn post_detect(state: SharedState, body: Vec<u8>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/detect")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap();

        let response = router(state).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_detect_route_returns_detections() {
        let (state, calls) = square_state();
        let png = red_square_png();

        let (status, view) = post_detect(
            state,
            multipart_body(Some(("square.png", png.as_slice())), Some("0.9")),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["state"], "detected");
        assert_eq!(view["detections"][0], "square with 0.95 confidence");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_detect_route_without_image() {
        let (state, calls) = square_state();

        let (status, view) = post_detect(state, multipart_body(None, Some("0.5"))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["state"], "no_image");
        assert_eq!(view["info"], "Please upload an image to start.");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_detect_route_rejects_gif() {
        let (state, calls) = square_state();

        let (status, view) = post_detect(
            state,
            multipart_body(Some(("anim.gif", &b"GIF89a"[..])), None),
        )
        .await;

        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(view["error_kind"], "UnsupportedFormatError");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_detect_route_uses_default_confidence() {
        let (state, _) = square_state();
        let png = red_square_png();

        let (_, view) = post_detect(
            state,
            multipart_body(Some(("square.png", png.as_slice())), None),
        )
        .await;

        assert_eq!(view["threshold"], 0.25);
    }

    #[tokio::test]
    async fn test_detect_route_rejects_oversized_upload() {
        let calls = Arc::new(AtomicUsize::new(0));
        let ui = UiConfig {
            max_upload_bytes: 1024,
            ..UiConfig::default()
        };
        let state = SharedState::new(
            ModelProvider::new(SquareLoader {
                calls: calls.clone(),
            }),
            Annotator::default(),
            ui,
        );
        let oversized = vec![0u8; 4096];

        let (status, view) = post_detect(
            state,
            multipart_body(Some(("big.png", oversized.as_slice())), Some("0.5")),
        )
        .await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(view["error_kind"], "InvalidUploadError");
        assert_eq!(view["info"], "Please upload an image to start.");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_detect_route_malformed_form_is_bad_request() {
        let (state, _) = square_state();
        let request = Request::builder()
            .method("POST")
            .uri("/detect")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from("--detectboundary\r\nnot a header block"))
            .unwrap();

        let response = router(state).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let view: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(view["error_kind"], "InvalidUploadError");
    }

    #[tokio::test]
    async fn test_detect_route_invalid_threshold() {
        let (state, _) = square_state();
        let png = red_square_png();

        let (status, view) = post_detect(
            state,
            multipart_body(Some(("square.png", png.as_slice())), Some("1.5")),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(view["error_kind"], "InvalidThresholdError");
    }

    #[tokio::test]
    async fn test_detect_route_model_load_failure() {
        let state = SharedState::new(
            ModelProvider::new(BrokenLoader),
            Annotator::default(),
            UiConfig::default(),
        );
        let png = red_square_png();

        let (status, view) = post_detect(
            state.clone(),
            multipart_body(Some(("square.png", png.as_slice())), Some("0.5")),
        )
        .await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(view["error_kind"], "ModelLoadError");

        // The surface stays usable for later requests.
        let (status, view) = post_detect(state, multipart_body(None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["state"], "no_image");
    }

    #[tokio::test]
    async fn test_health_and_index() {
        let (state, _) = square_state();
        let app = router(state);

        let response = app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let health: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(health["status"], "Available");
        assert_eq!(health["model_loaded"], false);

        let response = app
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let page = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(page.contains("Detect Objects"));
        assert!(page.contains(".jpg,.jpeg,.png,.webp"));
    }
}
