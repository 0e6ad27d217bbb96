use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::{json_body, parse_field, AppState};
use crate::domain::{deserialize_amount, Decimal, LedgerTransaction, Lock, LockCategory, TimeMs, UserId};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitLockRequest {
    pub user_id: String,
    #[serde(deserialize_with = "deserialize_amount")]
    pub amount: Decimal,
    pub category: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitLockResponse {
    pub lock: Lock,
    pub transaction: LedgerTransaction,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeLockResponse {
    pub previous: Lock,
    pub replacement: Lock,
    pub transaction: LedgerTransaction,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseLockResponse {
    pub lock: Lock,
}

/// `POST /v1/locks`
pub async fn commit_lock(
    State(state): State<AppState>,
    body: Result<Json<CommitLockRequest>, JsonRejection>,
) -> Result<Json<CommitLockResponse>, AppError> {
    let request = json_body(body)?;
    let user: UserId = parse_field("userId", &request.user_id)?;
    let category: LockCategory = parse_field("category", &request.category)?;

    let (lock, transaction) = state
        .locks
        .commit(&user, request.amount, category, TimeMs::now())
        .await?;
    Ok(Json(CommitLockResponse { lock, transaction }))
}

/// `POST /v1/locks/:lock_id/upgrade`
pub async fn upgrade_lock(
    State(state): State<AppState>,
    Path(lock_id): Path<String>,
) -> Result<Json<UpgradeLockResponse>, AppError> {
    let applied = state.locks.upgrade(&lock_id, TimeMs::now()).await?;
    Ok(Json(UpgradeLockResponse {
        previous: applied.previous,
        replacement: applied.replacement,
        transaction: applied.transaction,
    }))
}

/// `POST /v1/locks/:lock_id/release`
pub async fn release_lock(
    State(state): State<AppState>,
    Path(lock_id): Path<String>,
) -> Result<Json<ReleaseLockResponse>, AppError> {
    let lock = state.locks.release(&lock_id, TimeMs::now()).await?;
    Ok(Json(ReleaseLockResponse { lock }))
}
