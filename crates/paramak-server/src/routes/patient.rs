//! Record and wallet endpoints.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use paramak_core::{MintRequest, ProvisioningError, TokenId};
use paramak_shared::{log_access, validate_patient_id, AccessLogEntry, AuditAction};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info_span, Instrument};

use crate::error::{ApiError, MintError};
use crate::state::AppState;

pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PidQuery {
    pub pid: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintBody {
    pub id: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MintResponse {
    pub status: &'static str,
    pub transaction_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_id: Option<TokenId>,
    pub wallet_created: bool,
    pub duplicate: bool,
}

async fn records_response(state: &AppState, patient_id: &str) -> Result<Json<Value>, ApiError> {
    let records = state.service.list_records(patient_id).await?;
    let data: Vec<Value> = records.into_iter().map(|r| r.payload).collect();
    Ok(Json(json!({ "status": "success", "data": data })))
}

/// GET /patient_data/:patient_id
pub async fn patient_data(
    State(state): State<AppState>,
    Path(patient_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let span = info_span!("paramak.patient_data", patient_id = %patient_id);
    records_response(&state, &patient_id).instrument(span).await
}

/// GET /patient_data?token=
pub async fn patient_data_by_token(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<Value>, ApiError> {
    let token = query
        .token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::BadRequest("token is required".to_string()))?;
    let claims = state.sessions.verify(&token)?;

    let span = info_span!("paramak.patient_data", patient_id = %claims.pid, via = "session");
    records_response(&state, &claims.pid).instrument(span).await
}

/// POST /mint
pub async fn mint(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<MintBody>, JsonRejection>,
) -> Result<Json<MintResponse>, MintError> {
    let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let idempotency_key = body.idempotency_key.or_else(|| {
        headers
            .get(IDEMPOTENCY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    });
    let patient_id = body.id.unwrap_or_default();

    let span = info_span!(
        "paramak.mint",
        patient_id = %patient_id,
        keyed = idempotency_key.is_some()
    );
    let result = state
        .service
        .mint_record(MintRequest {
            patient_id,
            payload: body.data,
            idempotency_key,
        })
        .instrument(span)
        .await?;

    Ok(Json(MintResponse {
        status: "success",
        transaction_hash: result.receipt.transaction_hash,
        token_id: result.receipt.token_id,
        wallet_created: result.wallet_created,
        duplicate: result.duplicate,
    }))
}

/// GET /patient_token?pid= (test deployments only)
pub async fn patient_token(
    State(state): State<AppState>,
    Query(query): Query<PidQuery>,
) -> Result<Json<Value>, ApiError> {
    let pid = query.pid.unwrap_or_default();
    validate_patient_id(&pid)
        .into_result()
        .map_err(ProvisioningError::from)?;

    let token = state.sessions.issue(&pid, None, None, Utc::now())?;
    log_access(&AccessLogEntry::new(&pid, AuditAction::SessionIssued).with_detail("test endpoint"));
    Ok(Json(json!({ "status": "success", "token": token })))
}
