use axum::extract::State;
use axum::Json;

use crate::api::AppState;
use crate::error::AppError;

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Ready once the ledger store answers and the tier table is seeded.
pub async fn ready(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let levels = state.repo.load_status_levels().await?;
    if levels.is_empty() {
        return Err(AppError::Internal("status levels not seeded".to_string()));
    }
    Ok(Json(serde_json::json!({
        "status": "ready",
        "splitPolicyVersion": state.credits.policy().version(),
    })))
}
