use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::{json_body, parse_field, AppState};
use crate::domain::{Email, UserId, WalletAddress};
use crate::error::AppError;
use crate::orchestration::{SyncCredits, SyncStatus};

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SyncRequest {
    #[serde(rename_all = "camelCase")]
    SyncProfile {
        user_id: String,
        wallet_address: String,
        user_email: String,
    },
    #[serde(rename_all = "camelCase")]
    CheckSyncStatus { user_id: String },
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum SyncResponse {
    Synced(SyncCredits),
    Status(SyncStatus),
}

/// `POST /v1/sync`. The caller's `userId` is trusted from the upstream gateway.
pub async fn sync(
    State(state): State<AppState>,
    body: Result<Json<SyncRequest>, JsonRejection>,
) -> Result<Json<SyncResponse>, AppError> {
    match json_body(body)? {
        SyncRequest::SyncProfile {
            user_id,
            wallet_address,
            user_email,
        } => {
            let user: UserId = parse_field("userId", &user_id)?;
            let wallet: WalletAddress = parse_field("walletAddress", &wallet_address)?;
            let email: Email = parse_field("userEmail", &user_email)?;

            let credits = state.reconciler.sync_profile(&user, &wallet, &email).await?;
            Ok(Json(SyncResponse::Synced(credits)))
        }
        SyncRequest::CheckSyncStatus { user_id } => {
            let user: UserId = parse_field("userId", &user_id)?;
            let status = state.reconciler.sync_status(&user).await?;
            Ok(Json(SyncResponse::Status(status)))
        }
    }
}
