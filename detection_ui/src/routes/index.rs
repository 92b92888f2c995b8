use crate::server::SharedState;
use axum::{extract::State, response::Html};

const PAGE: &str = include_str!("../../static/index.html");

pub fn render_page(title: &str, default_confidence: f32, accept: &str) -> String {
    PAGE.replace("{{TITLE}}", &escape_html(title))
        .replace("{{DEFAULT_CONFIDENCE}}", &format!("{:.2}", default_confidence))
        .replace("{{ACCEPT}}", &escape_html(accept))
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub async fn index(State(state): State<SharedState>) -> Html<String> {
    Html(render_page(
        &state.ui.title,
        state.ui.default_confidence,
        &state.formats.accept_attribute(),
    ))
}
