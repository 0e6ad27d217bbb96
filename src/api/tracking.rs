use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::{json_body, parse_field, AppState};
use crate::domain::{TimeMs, UserId};
use crate::error::AppError;

const MAX_REF_LEN: usize = 256;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingLinkRequest {
    pub user_id: String,
    pub brand: String,
    #[serde(default)]
    pub tracking_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingLinkResponse {
    pub tracking_id: String,
    pub user_id: UserId,
    pub brand: String,
}

/// `POST /v1/tracking-links`: register the token embedded in affiliate links.
///
/// A tracking id already registered to someone else is a 409.
pub async fn create_tracking_link(
    State(state): State<AppState>,
    body: Result<Json<TrackingLinkRequest>, JsonRejection>,
) -> Result<Json<TrackingLinkResponse>, AppError> {
    let request = json_body(body)?;
    let user: UserId = parse_field("userId", &request.user_id)?;

    let brand = request.brand.trim().to_string();
    if brand.is_empty() || brand.len() > MAX_REF_LEN {
        return Err(AppError::BadRequest(format!(
            "brand must be 1..={} characters",
            MAX_REF_LEN
        )));
    }
    let tracking_id = match request.tracking_id.map(|t| t.trim().to_string()) {
        Some(t) if t.is_empty() || t.len() > MAX_REF_LEN => {
            return Err(AppError::BadRequest(format!(
                "trackingId must be 1..={} characters",
                MAX_REF_LEN
            )))
        }
        Some(t) => t,
        None => uuid::Uuid::new_v4().simple().to_string(),
    };

    let created = state
        .repo
        .insert_tracking_link(&tracking_id, &user, &brand, TimeMs::now())
        .await?;
    if !created {
        match state.repo.resolve_tracking_id(&tracking_id).await? {
            Some((owner, existing_brand)) if owner == user && existing_brand == brand => {}
            _ => {
                return Err(crate::error::LedgerError::Conflict(format!(
                    "tracking id {} is already registered",
                    tracking_id
                ))
                .into())
            }
        }
    }

    tracing::info!(user = %user, %brand, %tracking_id, created, "tracking link registered");
    Ok(Json(TrackingLinkResponse {
        tracking_id,
        user_id: user,
        brand,
    }))
}
