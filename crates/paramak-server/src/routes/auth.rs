//! THAID login: redirect out, exchange the code, hand back a session token.

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use paramak_shared::{log_access, AccessLogEntry, AuditAction};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info_span, Instrument};

use crate::error::ApiError;
use crate::state::AppState;
use crate::thaid::ThaidClient;

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// 302 to `location`
fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

fn thaid_client(state: &AppState) -> Result<Arc<ThaidClient>, ApiError> {
    state
        .thaid
        .clone()
        .ok_or_else(|| ApiError::BadRequest("THAID login is not enabled".to_string()))
}

/// GET /thaid-auth
pub async fn thaid_auth(State(state): State<AppState>) -> Result<Response, ApiError> {
    let client = thaid_client(&state)?;
    Ok(found(&client.authorize_url().await))
}

/// GET /thaid-redirect?code=&state=
pub async fn thaid_redirect(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Result<Response, ApiError> {
    let client = thaid_client(&state)?;
    if let Some(error) = query.error {
        return Err(ApiError::BadRequest(format!("THAID login failed: {}", error)));
    }
    let (Some(code), Some(oauth_state)) = (query.code, query.state) else {
        return Err(ApiError::BadRequest("code and state are required".to_string()));
    };

    let span = info_span!("paramak.thaid_redirect");
    let login = client
        .exchange_code(&code, &oauth_state)
        .instrument(span)
        .await?;

    let session = state.sessions.issue(
        &login.pid,
        Some(login.access_token),
        login.refresh_token,
        Utc::now(),
    )?;
    log_access(&AccessLogEntry::new(&login.pid, AuditAction::SessionIssued).with_detail("thaid"));

    let target = client.frontend_redirect_url();
    let separator = if target.contains('?') { '&' } else { '?' };
    Ok(found(&format!(
        "{}{}token={}",
        target,
        separator,
        urlencoding::encode(&session)
    )))
}
