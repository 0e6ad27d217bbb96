pub mod credits;
pub mod health;
pub mod locks;
pub mod portfolio;
pub mod sync;
pub mod tracking;
pub mod webhooks;

use crate::config::Config;
use crate::datasource::DataSource;
use crate::db::Repository;
use crate::domain::StatusLevel;
use crate::engine::{LockMinimums, SplitPolicyTable};
use crate::error::AppError;
use crate::orchestration::{
    CreditService, LockService, Reconciler, SignatureVerifier, WebhookIngestor,
};
use axum::extract::rejection::JsonRejection;
use axum::{
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Config,
    pub credits: Arc<CreditService>,
    pub webhooks: Arc<WebhookIngestor>,
    pub reconciler: Arc<Reconciler>,
    pub locks: Arc<LockService>,
    pub signature: Option<SignatureVerifier>,
}

impl AppState {
    /// Wire services together. `levels` is the status table loaded at startup.
    pub fn new(
        repo: Arc<Repository>,
        config: Config,
        datasource: Arc<dyn DataSource>,
        levels: Vec<StatusLevel>,
    ) -> Self {
        let credits = Arc::new(CreditService::new(
            repo.clone(),
            SplitPolicyTable::current(),
            levels,
            config.max_credit_amount,
        ));
        let webhooks = Arc::new(WebhookIngestor::new(repo.clone(), credits.clone()));
        let reconciler = Arc::new(Reconciler::new(
            repo.clone(),
            datasource,
            config.sync_cooldown(),
            config.partner_timeout(),
        ));
        let locks = Arc::new(LockService::new(
            repo.clone(),
            LockMinimums {
                ninety_day: config.min_lock_ninety,
                three_sixty_day: config.min_lock_three_sixty,
            },
        ));
        let signature = config.webhook_secret.as_deref().map(SignatureVerifier::new);

        Self {
            repo,
            config,
            credits,
            webhooks,
            reconciler,
            locks,
            signature,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/webhooks/commissions", post(webhooks::receive_commission))
        .route("/v1/sync", post(sync::sync))
        .route("/v1/locks", post(locks::commit_lock))
        .route("/v1/locks/:lock_id/upgrade", post(locks::upgrade_lock))
        .route("/v1/locks/:lock_id/release", post(locks::release_lock))
        .route("/v1/purchases", post(credits::record_purchase))
        .route("/v1/credits", post(credits::record_credit))
        .route("/v1/tracking-links", post(tracking::create_tracking_link))
        .route("/v1/portfolio/:user_id", get(portfolio::get_portfolio))
        .route(
            "/v1/portfolio/:user_id/transactions",
            get(portfolio::get_transactions),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Unwrap a JSON body, reporting rejections in the standard error shape.
pub(crate) fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    body.map(|Json(inner)| inner)
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))
}

/// Parse a request field, reporting failures as 400.
pub(crate) fn parse_field<T>(field: &str, raw: &str) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| AppError::BadRequest(format!("invalid {}: {}", field, e)))
}
