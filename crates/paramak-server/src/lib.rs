//! HTTP surface of the Paramak record service.
//!
//! [`app`] builds the complete router from an [`AppState`]; `main` adds
//! configuration, logging and the listener around it.

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod config;
pub mod error;
pub mod routes;
pub mod session;
pub mod state;
pub mod thaid;

pub use config::Config;
pub use error::{ApiError, MintError};
pub use state::AppState;

/// Build the application router
pub fn app(state: AppState) -> Router {
    routes::router(&state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
