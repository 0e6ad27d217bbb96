use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use crate::api::{json_body, parse_field, AppState};
use crate::domain::{deserialize_amount, Decimal, EarningSource, TimeMs, TransactionKind, UserId};
use crate::error::AppError;
use crate::orchestration::{CreditOutcome, CreditRequest};

const MAX_KEY_LEN: usize = 128;
const MAX_DESCRIPTION_LEN: usize = 256;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRequest {
    pub user_id: String,
    pub tx_hash: String,
    #[serde(deserialize_with = "deserialize_amount")]
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualCreditRequest {
    pub user_id: String,
    #[serde(deserialize_with = "deserialize_amount")]
    pub amount: Decimal,
    pub source: String,
    #[serde(default)]
    pub external_event_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// `POST /v1/purchases`: an on-chain purchase, idempotent on its tx hash.
pub async fn record_purchase(
    State(state): State<AppState>,
    body: Result<Json<PurchaseRequest>, JsonRejection>,
) -> Result<Json<CreditOutcome>, AppError> {
    let request = json_body(body)?;
    let user: UserId = parse_field("userId", &request.user_id)?;

    let tx_hash = request.tx_hash.trim().to_ascii_lowercase();
    if tx_hash.is_empty() || tx_hash.len() > MAX_KEY_LEN {
        return Err(AppError::BadRequest(format!(
            "txHash must be 1..={} characters",
            MAX_KEY_LEN
        )));
    }

    let outcome = state
        .credits
        .credit(
            CreditRequest {
                user_id: user,
                amount: request.amount,
                source: EarningSource::TokenPurchase,
                kind: TransactionKind::Purchased,
                description: format!("NCTR purchase {}", tx_hash),
                external_event_id: Some(tx_hash),
                settles_pending: false,
            },
            TimeMs::now(),
        )
        .await?;
    Ok(Json(outcome))
}

/// `POST /v1/credits`: referral, daily check-in and manual rewards.
pub async fn record_credit(
    State(state): State<AppState>,
    body: Result<Json<ManualCreditRequest>, JsonRejection>,
) -> Result<Json<CreditOutcome>, AppError> {
    let request = json_body(body)?;
    let user: UserId = parse_field("userId", &request.user_id)?;
    let source: EarningSource = parse_field("source", &request.source)?;
    if !matches!(
        source,
        EarningSource::Referral | EarningSource::DailyCheckin | EarningSource::Manual
    ) {
        return Err(AppError::BadRequest(format!(
            "source {} cannot be credited directly",
            source
        )));
    }

    let external_event_id = request
        .external_event_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty());
    if external_event_id.as_ref().is_some_and(|id| id.len() > MAX_KEY_LEN) {
        return Err(AppError::BadRequest(format!(
            "externalEventId must be at most {} characters",
            MAX_KEY_LEN
        )));
    }

    let description = match request.description {
        Some(d) if d.chars().count() > MAX_DESCRIPTION_LEN => {
            return Err(AppError::BadRequest(format!(
                "description must be at most {} characters",
                MAX_DESCRIPTION_LEN
            )))
        }
        Some(d) if !d.trim().is_empty() => d.trim().to_string(),
        _ => format!("{} reward", source),
    };

    let outcome = state
        .credits
        .credit(
            CreditRequest {
                user_id: user,
                amount: request.amount,
                source,
                kind: TransactionKind::Earned,
                description,
                external_event_id,
                settles_pending: false,
            },
            TimeMs::now(),
        )
        .await?;
    Ok(Json(outcome))
}
