use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;

use crate::api::AppState;
use crate::domain::TimeMs;
use crate::error::AppError;
use crate::orchestration::{normalize, PayloadError, WebhookOutcome, SIGNATURE_HEADER};

/// `POST /v1/webhooks/commissions`
///
/// Unparseable or schema-violating bodies get 400. Unrecognised shapes get
/// 200 so partners do not retry them.
pub async fn receive_commission(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookOutcome>, AppError> {
    if let Some(verifier) = &state.signature {
        let header = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok());
        verifier
            .verify(&body, header)
            .map_err(|e| AppError::Unauthorized(e.to_string()))?;
    }

    let event = normalize(&body, state.config.max_credit_amount).map_err(|e| match e {
        PayloadError::Signature => AppError::Unauthorized(e.to_string()),
        PayloadError::Malformed(_) | PayloadError::Invalid(_) => AppError::BadRequest(e.to_string()),
    })?;

    let outcome = state.webhooks.ingest(event, TimeMs::now()).await?;
    Ok(Json(outcome))
}
