mod common;

use axum::http::StatusCode;
use common::{d, dec, get, post_json, setup_test_app, TestApp};
use nctr_ledger::datasource::MockDataSource;
use nctr_ledger::domain::{LockStatus, TimeMs};
use serde_json::{json, Value};

async fn fund(test_app: &TestApp, user: &str, amount: &str) {
    let (status, body) = post_json(
        &test_app.app,
        "/v1/credits",
        json!({"userId": user, "amount": amount, "source": "manual", "externalEventId": format!("fund-{user}-{amount}")}),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "funding failed: {body}");
}

async fn commit(test_app: &TestApp, user: &str, amount: Value, category: &str) -> (StatusCode, Value) {
    post_json(
        &test_app.app,
        "/v1/locks",
        json!({"userId": user, "amount": amount, "category": category}),
    )
    .await
}

#[tokio::test]
async fn test_commit_moves_available_into_bucket() {
    let test_app = setup_test_app(MockDataSource::new()).await;
    fund(&test_app, "member-1", "1000").await;

    let (status, body) = commit(&test_app, "member-1", json!(400), "90").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["lock"]["category"], "ninety_day");
    assert_eq!(body["lock"]["commitmentDays"], 90);
    assert_eq!(body["lock"]["canUpgrade"], true);
    assert_eq!(body["transaction"]["kind"], "locked");

    let (_, portfolio) = get(&test_app.app, "/v1/portfolio/member-1").await;
    assert_eq!(dec(&portfolio["available"]), d("600"));
    assert_eq!(dec(&portfolio["lockedNinety"]), d("400"));
    assert_eq!(dec(&portfolio["totalEarned"]), d("1000"));
}

#[tokio::test]
async fn test_commit_validation() {
    let test_app = setup_test_app(MockDataSource::new()).await;
    fund(&test_app, "member-1", "150").await;

    // Below the configured minimum.
    let (status, body) = commit(&test_app, "member-1", json!(50), "ninety_day").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_error");

    // More than available.
    let (status, _) = commit(&test_app, "member-1", json!(200), "ninety_day").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = commit(&test_app, "member-1", json!(100), "forever").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, portfolio) = get(&test_app.app, "/v1/portfolio/member-1").await;
    assert_eq!(dec(&portfolio["available"]), d("150"));
}

#[tokio::test]
async fn test_upgrade_then_second_upgrade_conflicts() {
    let test_app = setup_test_app(MockDataSource::new()).await;
    fund(&test_app, "member-1", "500").await;
    let (_, body) = commit(&test_app, "member-1", json!(500), "ninety_day").await;
    let lock_id = body["lock"]["id"].as_str().unwrap().to_string();

    let uri = format!("/v1/locks/{lock_id}/upgrade");
    let (status, upgraded) = post_json(&test_app.app, &uri, json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(upgraded["previous"]["status"], "upgraded");
    assert_eq!(upgraded["replacement"]["category"], "three_sixty_day");
    assert_eq!(upgraded["replacement"]["upgradedFromLockId"], lock_id.as_str());
    assert_eq!(upgraded["transaction"]["kind"], "upgraded");

    let (_, before) = get(&test_app.app, "/v1/portfolio/member-1").await;
    assert_eq!(dec(&before["lockedNinety"]), d("0"));
    assert_eq!(dec(&before["lockedThreeSixty"]), d("500"));

    let (status, body) = post_json(&test_app.app, &uri, json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "invalid_state");

    let (_, after) = get(&test_app.app, "/v1/portfolio/member-1").await;
    assert_eq!(after["lockedThreeSixty"], before["lockedThreeSixty"]);
    assert_eq!(after["activeLocks"], before["activeLocks"]);
}

#[tokio::test]
async fn test_upgrade_rejects_three_sixty_and_unknown_locks() {
    let test_app = setup_test_app(MockDataSource::new()).await;
    fund(&test_app, "member-1", "300").await;
    let (_, body) = commit(&test_app, "member-1", json!(300), "360").await;
    let lock_id = body["lock"]["id"].as_str().unwrap().to_string();

    let (status, _) = post_json(&test_app.app, &format!("/v1/locks/{lock_id}/upgrade"), json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = post_json(&test_app.app, "/v1/locks/no-such-lock/upgrade", json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn test_early_release_is_rejected() {
    let test_app = setup_test_app(MockDataSource::new()).await;
    fund(&test_app, "member-1", "200").await;
    let (_, body) = commit(&test_app, "member-1", json!(200), "ninety_day").await;
    let lock_id = body["lock"]["id"].as_str().unwrap().to_string();

    let (status, body) = post_json(&test_app.app, &format!("/v1/locks/{lock_id}/release"), json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "not_yet_unlockable");

    let (_, portfolio) = get(&test_app.app, "/v1/portfolio/member-1").await;
    assert_eq!(dec(&portfolio["lockedNinety"]), d("200"));
}

#[tokio::test]
async fn test_sweep_releases_matured_locks() {
    let test_app = setup_test_app(MockDataSource::new()).await;
    fund(&test_app, "member-1", "700").await;
    let (_, ninety) = commit(&test_app, "member-1", json!(300), "ninety_day").await;
    let (_, three_sixty) = commit(&test_app, "member-1", json!(400), "three_sixty_day").await;

    let after_ninety = TimeMs::now().plus_days(91);
    let report = test_app.state.locks.sweep_due(after_ninety).await.unwrap();
    assert_eq!(report.released, 1);
    assert_eq!(report.failed, 0);

    let released = test_app
        .repo
        .get_lock(ninety["lock"]["id"].as_str().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(released.status, LockStatus::Unlocked);
    let still_locked = test_app
        .repo
        .get_lock(three_sixty["lock"]["id"].as_str().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(still_locked.status, LockStatus::Active);

    let (_, portfolio) = get(&test_app.app, "/v1/portfolio/member-1").await;
    assert_eq!(dec(&portfolio["available"]), d("300"));
    assert_eq!(dec(&portfolio["lockedNinety"]), d("0"));
    assert_eq!(dec(&portfolio["lockedThreeSixty"]), d("400"));
    assert_eq!(dec(&portfolio["totalEarned"]), d("700"));

    // A second pass at the same instant finds nothing.
    let report = test_app.state.locks.sweep_due(after_ninety).await.unwrap();
    assert_eq!(report.released, 0);
}
