use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::{parse_field, AppState};
use crate::domain::{LedgerTransaction, Lock, Portfolio, UserId};
use crate::engine::{tier_for, TierStanding};
use crate::error::AppError;

const DEFAULT_TRANSACTION_LIMIT: u32 = 50;
const MAX_TRANSACTION_LIMIT: u32 = 500;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioResponse {
    #[serde(flatten)]
    pub portfolio: Portfolio,
    pub active_locks: Vec<Lock>,
    /// Recomputed from `lockedThreeSixty` on every read.
    pub tier: TierStanding,
}

#[derive(Debug, Deserialize)]
pub struct TransactionsQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionsResponse {
    pub user_id: UserId,
    pub transactions: Vec<LedgerTransaction>,
}

/// `GET /v1/portfolio/:user_id`. Unknown users get an all-zero portfolio.
pub async fn get_portfolio(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<PortfolioResponse>, AppError> {
    let user: UserId = parse_field("userId", &user_id)?;

    let (portfolio, active_locks) = state.repo.get_portfolio_with_locks(&user).await?;
    let portfolio = portfolio.unwrap_or_else(|| Portfolio::empty(user.clone()));
    let tier = tier_for(portfolio.locked_three_sixty, state.credits.levels());

    Ok(Json(PortfolioResponse {
        portfolio,
        active_locks,
        tier,
    }))
}

/// `GET /v1/portfolio/:user_id/transactions`, newest first.
pub async fn get_transactions(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<TransactionsQuery>,
) -> Result<Json<TransactionsResponse>, AppError> {
    let user: UserId = parse_field("userId", &user_id)?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_TRANSACTION_LIMIT)
        .clamp(1, MAX_TRANSACTION_LIMIT);

    let transactions = state.repo.list_transactions(&user, limit).await?;
    Ok(Json(TransactionsResponse {
        user_id: user,
        transactions,
    }))
}
