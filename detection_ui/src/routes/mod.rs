mod detect;
mod health;
mod index;

use crate::server::SharedState;
use axum::{
    routing::{get, post},
    Router,
};

pub use detect::detect_objects;
pub use health::healthcheck;
pub use index::index;

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        .route("/", get(index))
        .route("/detect", post(detect_objects))
        .route("/health", get(healthcheck))
}
