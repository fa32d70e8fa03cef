use axum::{routing::get, Router};
use tower_http::services::{ServeDir, ServeFile};

use crate::state::AppState;

pub const HEALTH_MESSAGE: &str = "Server is running normally.";

/// GET /
pub async fn health() -> &'static str {
    HEALTH_MESSAGE
}

/// Health check, terms of use and static assets
pub fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(health))
        .route_service(
            "/term-of-use",
            ServeFile::new(state.views_dir.join("term-of-use.html")),
        )
        .nest_service("/static", ServeDir::new(&state.public_dir))
}
