use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::domain::TimeMs;

/// Error kinds of the reconciliation and lock-accounting core.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("external account email does not match the local account")]
    IdentityMismatch,
    #[error("wallet {wallet} is already linked to another account")]
    DuplicateWalletClaim { wallet: String },
    #[error("cannot resolve user: {0}")]
    UnresolvableIdentity(String),
    #[error("sync attempted too soon; retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("lock is not unlockable until {}", unlock_at.to_rfc3339())]
    NotYetUnlockable { unlock_at: TimeMs },
    #[error("not found: {0}")]
    NotFound(String),
    /// A key is already bound to a different owner, amount or wallet.
    #[error("conflict: {0}")]
    Conflict(String),
    /// The partner rejected this commission; it can no longer be credited.
    #[error("commission {0} was rejected by the partner")]
    CommissionRejected(String),
    #[error("storage conflict: {0}")]
    StorageConflict(String),
    #[error("external fetch failed: {0}")]
    ExternalFetchFailure(String),
    #[error("storage error: {0}")]
    Storage(sqlx::Error),
}

impl LedgerError {
    /// Whether the caller may retry the whole operation unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LedgerError::RateLimited { .. }
                | LedgerError::StorageConflict(_)
                | LedgerError::ExternalFetchFailure(_)
        )
    }

    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::Validation(_) => "validation_error",
            LedgerError::IdentityMismatch => "identity_mismatch",
            LedgerError::DuplicateWalletClaim { .. } => "duplicate_wallet_claim",
            LedgerError::UnresolvableIdentity(_) => "unresolvable_identity",
            LedgerError::RateLimited { .. } => "rate_limited",
            LedgerError::InvalidState(_) => "invalid_state",
            LedgerError::NotYetUnlockable { .. } => "not_yet_unlockable",
            LedgerError::NotFound(_) => "not_found",
            LedgerError::Conflict(_) => "conflict",
            LedgerError::CommissionRejected(_) => "commission_rejected",
            LedgerError::StorageConflict(_) => "storage_conflict",
            LedgerError::ExternalFetchFailure(_) => "external_fetch_failure",
            LedgerError::Storage(_) => "storage_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            LedgerError::Validation(_) => StatusCode::BAD_REQUEST,
            LedgerError::IdentityMismatch => StatusCode::FORBIDDEN,
            LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
            LedgerError::DuplicateWalletClaim { .. }
            | LedgerError::InvalidState(_)
            | LedgerError::NotYetUnlockable { .. }
            | LedgerError::Conflict(_)
            | LedgerError::CommissionRejected(_) => StatusCode::CONFLICT,
            LedgerError::UnresolvableIdentity(_) => StatusCode::UNPROCESSABLE_ENTITY,
            LedgerError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            LedgerError::ExternalFetchFailure(_) => StatusCode::BAD_GATEWAY,
            LedgerError::StorageConflict(_) => StatusCode::SERVICE_UNAVAILABLE,
            LedgerError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        if is_busy(&err) {
            LedgerError::StorageConflict(err.to_string())
        } else {
            LedgerError::Storage(err)
        }
    }
}

/// SQLITE_BUSY (5) and SQLITE_LOCKED (6), including extended codes.
fn is_busy(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            let primary = db
                .code()
                .and_then(|c| c.parse::<i32>().ok())
                .map(|c| c & 0xff);
            matches!(primary, Some(5) | Some(6)) || db.message().contains("database is locked")
        }
        sqlx::Error::PoolTimedOut => true,
        _ => false,
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Internal server error: {0}")]
    Internal(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Ledger(LedgerError::from(err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut retry_after = None;
        let (status, code, error_message) = match self {
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            AppError::Ledger(err) => {
                if let LedgerError::RateLimited { retry_after_secs } = &err {
                    retry_after = Some(*retry_after_secs);
                }
                let status = err.status();
                if status.is_server_error() {
                    tracing::error!(code = err.code(), error = %err, "request failed");
                }
                (status, err.code(), err.to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
            "code": code,
        }));

        let mut response = (status, body).into_response();
        if let Some(secs) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
