//! HTTP error mapping.
//!
//! Every failure is answered with `{status: "failed", kind, message}`.
//! `/mint` keeps its historical `error` field instead of `message`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use paramak_core::{PermanentKind, ProvisioningError, TransientKind};
use serde_json::json;

use crate::session::SessionError;
use crate::thaid::ThaidError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    InvalidToken(#[from] SessionError),

    #[error(transparent)]
    OAuth(#[from] ThaidError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Provisioning(err) => match err {
                // Existing clients expect 400 for an unknown patient
                ProvisioningError::NotFound { .. } => StatusCode::BAD_REQUEST,
                ProvisioningError::Transient { kind, .. } => match kind {
                    TransientKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
                    TransientKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
                },
                ProvisioningError::Permanent { kind, .. } => match kind {
                    PermanentKind::InvalidInput => StatusCode::BAD_REQUEST,
                    PermanentKind::AuthRejected => StatusCode::UNAUTHORIZED,
                    PermanentKind::Rejected => StatusCode::UNPROCESSABLE_ENTITY,
                    PermanentKind::DuplicateInFlight => StatusCode::CONFLICT,
                },
            },
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::InvalidToken(SessionError::Invalid(_)) => StatusCode::UNAUTHORIZED,
            ApiError::InvalidToken(SessionError::Signing(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::OAuth(ThaidError::UnknownState) => StatusCode::BAD_REQUEST,
            ApiError::OAuth(_) => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Provisioning(err) => match err {
                ProvisioningError::NotFound { .. } => "not_found",
                ProvisioningError::Transient { kind, .. } => match kind {
                    TransientKind::Timeout => "timeout",
                    TransientKind::Unavailable => "unavailable",
                },
                ProvisioningError::Permanent { kind, .. } => match kind {
                    PermanentKind::InvalidInput => "invalid_input",
                    PermanentKind::AuthRejected => "auth_rejected",
                    PermanentKind::Rejected => "rejected",
                    PermanentKind::DuplicateInFlight => "duplicate_in_flight",
                },
            },
            ApiError::BadRequest(_) => "invalid_input",
            ApiError::InvalidToken(SessionError::Invalid(_)) => "invalid_token",
            ApiError::InvalidToken(SessionError::Signing(_)) => "internal",
            ApiError::OAuth(_) => "oauth_failed",
        }
    }

    fn into_body_response(self, message_field: &str) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(kind = self.kind(), error = %self, "request failed");
        } else {
            tracing::debug!(kind = self.kind(), error = %self, "request rejected");
        }

        let mut body = json!({
            "status": "failed",
            "kind": self.kind(),
        });
        body[message_field] = json!(self.to_string());
        (status, Json(body)).into_response()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.into_body_response("message")
    }
}

/// Failure of `POST /mint`, reported under `error`
#[derive(Debug)]
pub struct MintError(pub ApiError);

impl From<ApiError> for MintError {
    fn from(err: ApiError) -> Self {
        MintError(err)
    }
}

impl From<ProvisioningError> for MintError {
    fn from(err: ProvisioningError) -> Self {
        MintError(err.into())
    }
}

impl IntoResponse for MintError {
    fn into_response(self) -> Response {
        self.0.into_body_response("error")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_and_kind_mapping() {
        let cases = [
            (
                ApiError::from(ProvisioningError::NotFound {
                    patient_id: "X".into(),
                }),
                StatusCode::BAD_REQUEST,
                "not_found",
            ),
            (
                ApiError::from(ProvisioningError::timeout("ledger", std::time::Duration::from_secs(1))),
                StatusCode::GATEWAY_TIMEOUT,
                "timeout",
            ),
            (
                ApiError::from(ProvisioningError::unavailable("storage", "down")),
                StatusCode::SERVICE_UNAVAILABLE,
                "unavailable",
            ),
            (
                ApiError::from(ProvisioningError::Permanent {
                    kind: PermanentKind::DuplicateInFlight,
                    message: "busy".into(),
                }),
                StatusCode::CONFLICT,
                "duplicate_in_flight",
            ),
            (
                ApiError::from(SessionError::Invalid("bad".into())),
                StatusCode::UNAUTHORIZED,
                "invalid_token",
            ),
        ];
        for (err, status, kind) in cases {
            assert_eq!(err.status(), status);
            assert_eq!(err.kind(), kind);
        }
    }
}
