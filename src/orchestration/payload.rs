//! Webhook payload normalisation.
//!
//! Partner bodies come in several shapes. `normalize` turns raw bytes into a
//! closed set of canonical events, or a structured error. Shape detection:
//! - an object with `order_id` is an order completion and is parsed strictly
//! - an object with `eventType` and `data` is a status-transition envelope
//! - any other JSON value is `Unrecognized`

use crate::domain::{deserialize_amount, CommissionStatus, Decimal, UserId};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

const MAX_ORDER_ID_LEN: usize = 128;
const MAX_STATUS_LEN: usize = 32;
const MAX_REF_LEN: usize = 256;
const MAX_BATCH_IDS: usize = 500;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    /// Body is not JSON at all.
    #[error("malformed body: {0}")]
    Malformed(String),
    /// Body has a recognised shape but violates its schema.
    #[error("invalid payload: {0}")]
    Invalid(String),
    #[error("invalid webhook signature")]
    Signature,
}

/// Order-completion shape. Unknown fields are rejected.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct OrderCompletionWire {
    order_id: String,
    order_status: String,
    #[serde(deserialize_with = "deserialize_amount")]
    total_amount: Decimal,
    currency: String,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    tracking_id: Option<String>,
    #[serde(default)]
    source: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnvelopeWire {
    event_type: String,
    data: EnvelopeData,
}

#[derive(Debug, Clone, Deserialize)]
struct EnvelopeData {
    transactions: Vec<String>,
    changes: EnvelopeChanges,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnvelopeChanges {
    new_status: String,
}

/// Validated order completion. The user may still need resolving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderEvent {
    pub order_id: String,
    pub status: CommissionStatus,
    pub raw_status: String,
    pub amount: Decimal,
    pub currency: String,
    pub user_id: Option<UserId>,
    pub tracking_id: Option<String>,
    pub source: Option<String>,
}

/// A batch of partner transaction ids moving to a new status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusTransition {
    pub event_type: String,
    pub transaction_ids: Vec<String>,
    pub new_status: CommissionStatus,
    pub raw_status: String,
}

/// Canonical inbound webhook event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Order(OrderEvent),
    Transition(StatusTransition),
    Unrecognized,
}

/// Parse and validate a raw webhook body.
///
/// # Errors
/// `Malformed` when the body is not JSON; `Invalid` when a recognised shape
/// fails validation.
pub fn normalize(body: &[u8], max_amount: Decimal) -> Result<InboundEvent, PayloadError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| PayloadError::Malformed(e.to_string()))?;

    let Some(object) = value.as_object() else {
        return Ok(InboundEvent::Unrecognized);
    };

    if object.contains_key("order_id") {
        let wire: OrderCompletionWire =
            serde_json::from_value(value).map_err(|e| PayloadError::Invalid(e.to_string()))?;
        return validate_order(wire, max_amount).map(InboundEvent::Order);
    }

    if object.contains_key("eventType") && object.contains_key("data") {
        let wire: EnvelopeWire =
            serde_json::from_value(value).map_err(|e| PayloadError::Invalid(e.to_string()))?;
        return validate_envelope(wire).map(InboundEvent::Transition);
    }

    Ok(InboundEvent::Unrecognized)
}

fn validate_order(wire: OrderCompletionWire, max_amount: Decimal) -> Result<OrderEvent, PayloadError> {
    let order_id = wire.order_id.trim().to_string();
    check_len("order_id", &order_id, 1, MAX_ORDER_ID_LEN)?;
    check_len("order_status", wire.order_status.trim(), 1, MAX_STATUS_LEN)?;

    if !wire.total_amount.is_positive() {
        return Err(PayloadError::Invalid(
            "total_amount must be greater than zero".to_string(),
        ));
    }
    if wire.total_amount > max_amount {
        return Err(PayloadError::Invalid(format!(
            "total_amount exceeds maximum of {}",
            max_amount
        )));
    }

    let currency = wire.currency.trim().to_ascii_uppercase();
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(PayloadError::Invalid(
            "currency must be a 3-letter code".to_string(),
        ));
    }

    let user_id = optional_ref("user_id", wire.user_id)?
        .map(|raw| {
            raw.parse::<UserId>()
                .map_err(|e| PayloadError::Invalid(format!("user_id: {}", e)))
        })
        .transpose()?;

    Ok(OrderEvent {
        order_id,
        status: CommissionStatus::from_external(&wire.order_status),
        raw_status: wire.order_status.trim().to_string(),
        amount: wire.total_amount,
        currency,
        user_id,
        tracking_id: optional_ref("tracking_id", wire.tracking_id)?,
        source: optional_ref("source", wire.source)?,
    })
}

fn validate_envelope(wire: EnvelopeWire) -> Result<StatusTransition, PayloadError> {
    check_len("eventType", wire.event_type.trim(), 1, MAX_REF_LEN)?;
    check_len("newStatus", wire.data.changes.new_status.trim(), 1, MAX_STATUS_LEN)?;
    if wire.data.transactions.len() > MAX_BATCH_IDS {
        return Err(PayloadError::Invalid(format!(
            "at most {} transactions per event",
            MAX_BATCH_IDS
        )));
    }

    let mut transaction_ids = Vec::with_capacity(wire.data.transactions.len());
    for id in wire.data.transactions {
        let id = id.trim().to_string();
        check_len("transactions[]", &id, 1, MAX_ORDER_ID_LEN)?;
        if !transaction_ids.contains(&id) {
            transaction_ids.push(id);
        }
    }

    Ok(StatusTransition {
        event_type: wire.event_type.trim().to_string(),
        transaction_ids,
        new_status: CommissionStatus::from_external(&wire.data.changes.new_status),
        raw_status: wire.data.changes.new_status.trim().to_string(),
    })
}

fn check_len(field: &str, value: &str, min: usize, max: usize) -> Result<(), PayloadError> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(PayloadError::Invalid(format!(
            "{} must be {}..={} characters",
            field, min, max
        )));
    }
    Ok(())
}

/// Blank optional references count as absent.
fn optional_ref(field: &str, value: Option<String>) -> Result<Option<String>, PayloadError> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if v.is_empty() => Ok(None),
        Some(v) => {
            check_len(field, &v, 1, MAX_REF_LEN)?;
            Ok(Some(v))
        }
        None => Ok(None),
    }
}
