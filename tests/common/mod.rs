//! Shared harness for endpoint tests.

#![allow(dead_code)]

use axum::http::{Request, StatusCode};
use nctr_ledger::api::{self, AppState};
use nctr_ledger::config::Config;
use nctr_ledger::datasource::MockDataSource;
use nctr_ledger::db::init_db;
use nctr_ledger::domain::Decimal;
use nctr_ledger::Repository;
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;

pub struct TestApp {
    pub app: axum::Router,
    pub state: AppState,
    pub repo: Arc<Repository>,
    pub datasource: MockDataSource,
    _temp: TempDir,
}

pub struct TestOptions {
    pub sync_cooldown_secs: u64,
    pub partner_timeout_ms: u64,
    pub webhook_secret: Option<String>,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            sync_cooldown_secs: 0,
            partner_timeout_ms: 1_000,
            webhook_secret: None,
        }
    }
}

pub async fn setup_test_app(datasource: MockDataSource) -> TestApp {
    setup_test_app_with(datasource, TestOptions::default()).await
}

pub async fn setup_test_app_with(datasource: MockDataSource, options: TestOptions) -> TestApp {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(Repository::new(pool));
    let levels = repo.load_status_levels().await.unwrap();

    let config = Config {
        port: 0,
        database_path: db_path,
        db_busy_timeout_ms: 5_000,
        db_max_connections: 5,
        partner_api_url: "http://example.invalid".to_string(),
        partner_timeout_ms: options.partner_timeout_ms,
        sync_cooldown_secs: options.sync_cooldown_secs,
        min_lock_ninety: Decimal::from(100u32),
        min_lock_three_sixty: Decimal::from(100u32),
        max_credit_amount: Decimal::from(1_000_000u32),
        webhook_secret: options.webhook_secret,
        lock_sweep_interval_secs: 0,
    };

    let state = AppState::new(repo.clone(), config, Arc::new(datasource.clone()), levels);
    let app = api::create_router(state.clone());

    TestApp {
        app,
        state,
        repo,
        datasource,
        _temp: temp_dir,
    }
}

pub async fn send(app: &axum::Router, request: Request<axum::body::Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(Value::Null)
    };
    (status, json)
}

pub async fn get(app: &axum::Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();
    send(app, request).await
}

pub async fn post_json(app: &axum::Router, uri: &str, body: Value) -> (StatusCode, Value) {
    post_raw(app, uri, body.to_string(), None).await
}

pub async fn post_raw(
    app: &axum::Router,
    uri: &str,
    body: String,
    signature: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(sig) = signature {
        builder = builder.header("x-webhook-signature", sig);
    }
    send(app, builder.body(axum::body::Body::from(body)).unwrap()).await
}

/// Decimal JSON fields are strings; compare by value.
pub fn dec(value: &Value) -> Decimal {
    Decimal::from_str_canonical(value.as_str().unwrap_or_else(|| panic!("not a string: {value}")))
        .unwrap()
}

pub fn d(s: &str) -> Decimal {
    Decimal::from_str_canonical(s).unwrap()
}
