//! Route table. Optional routes are mounted per feature flag.

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

pub mod auth;
pub mod pages;
pub mod patient;

pub fn router(state: &AppState) -> Router<AppState> {
    let mut router = Router::new()
        .merge(pages::router(state))
        .route("/patient_data", get(patient::patient_data_by_token))
        .route("/patient_data/:patient_id", get(patient::patient_data))
        .route("/mint", post(patient::mint));

    if state.thaid.is_some() {
        router = router
            .route("/thaid-auth", get(auth::thaid_auth))
            .route("/thaid-redirect", get(auth::thaid_redirect));
    }
    if state.enable_test_endpoints {
        tracing::warn!("test endpoints enabled: /patient_token issues sessions without login");
        router = router.route("/patient_token", get(patient::patient_token));
    }
    router
}
