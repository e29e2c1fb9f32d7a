//! Subscription integration tests.

mod common;

use axum::http::StatusCode;
use common::{TestHarness, ADMIN_API_KEY, SERVICE_API_KEY};
use serde_json::{json, Value};

async fn upsert(harness: &TestHarness, provider: &str, plan: Value) -> Value {
    let response = harness
        .server
        .put(&format!("/v1/subscriptions/{provider}"))
        .add_header("x-admin-key", ADMIN_API_KEY)
        .json(&plan)
        .await;
    response.assert_status_ok();
    response.json()
}

#[tokio::test]
async fn upsert_requires_admin_key() {
    let harness = TestHarness::new();

    harness
        .server
        .put("/v1/subscriptions/builtwith")
        .json(&json!({ "name": "basic", "cost": 295.0, "billing_period": "monthly" }))
        .await
        .assert_status_unauthorized();

    let list: Vec<Value> = harness.server.get("/v1/subscriptions").await.json();
    assert!(list.is_empty());
}

#[tokio::test]
async fn invalid_plan_is_rejected() {
    let harness = TestHarness::new();

    harness
        .server
        .put("/v1/subscriptions/builtwith")
        .add_header("x-admin-key", ADMIN_API_KEY)
        .json(&json!({ "name": "basic", "cost": -1.0, "billing_period": "monthly" }))
        .await
        .assert_status_bad_request();
}

#[tokio::test]
async fn active_subscriptions_count_as_monthly_commitment() {
    let harness = TestHarness::new();

    let sub = upsert(
        &harness,
        "builtwith",
        json!({ "name": "basic", "cost": 295.0, "billing_period": "monthly", "status": "active" }),
    )
    .await;
    assert_eq!(sub["provider"], "builtwith");
    assert_eq!(sub["plan"]["cost"], 295.0);

    upsert(
        &harness,
        "social_data",
        json!({ "name": "annual", "cost": 1200.0, "billing_period": "yearly", "status": "active" }),
    )
    .await;
    upsert(
        &harness,
        "semrush",
        json!({ "name": "pro", "cost": 130.0, "billing_period": "monthly", "status": "cancelled" }),
    )
    .await;

    let usage: Value = harness.server.get("/v1/usage/monthly").await.json();
    assert_eq!(usage["costs"]["subscriptions"], 395.0);
    assert_eq!(usage["costs"]["usage"], 0.0);
    assert_eq!(usage["costs"]["total"], 395.0);

    let list: Vec<Value> = harness.server.get("/v1/subscriptions").await.json();
    assert_eq!(list.len(), 3);
}

#[tokio::test]
async fn usage_counts_against_an_active_plan() {
    let harness = TestHarness::new();
    upsert(
        &harness,
        "builtwith",
        json!({
            "name": "basic",
            "cost": 295.0,
            "billing_period": "monthly",
            "status": "active",
            "credits_total": 2000,
            "requests_total": 100
        }),
    )
    .await;

    for quantity in [3, 4] {
        harness
            .server
            .post("/v1/usage")
            .add_header("x-api-key", SERVICE_API_KEY)
            .json(&json!({ "provider": "builtwith", "endpoint": "domain_lookup", "quantity": quantity }))
            .await
            .assert_status(StatusCode::ACCEPTED);
    }

    let list: Vec<Value> = harness.server.get("/v1/subscriptions").await.json();
    assert_eq!(list[0]["usage"]["requests"], json!({ "used": 2, "total": 100 }));
    assert_eq!(list[0]["usage"]["credits"], json!({ "used": 7, "total": 2000 }));

    // Updating the plan keeps this cycle's counters.
    let sub = upsert(
        &harness,
        "builtwith",
        json!({
            "name": "pro",
            "cost": 495.0,
            "billing_period": "monthly",
            "status": "active",
            "credits_total": 5000,
            "requests_total": 500
        }),
    )
    .await;
    assert_eq!(sub["plan"]["name"], "pro");
    assert_eq!(sub["usage"]["requests"]["used"], 2);
    assert_eq!(sub["usage"]["requests"]["total"], 500);
}
