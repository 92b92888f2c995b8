mod interaction;
mod routes;
mod server;
mod upload;

pub mod app;
pub mod config;

pub use app::start_app;
pub use interaction::{InteractionHandler, InteractionState, View};
pub use server::{router, HttpServer, SharedState};
pub use upload::{decode_upload, AcceptedFormats, UploadError};
