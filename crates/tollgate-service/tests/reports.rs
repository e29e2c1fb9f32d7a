//! Export, health, suggestion and outage integration tests.

mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use common::{FlakyLedger, TestHarness, SERVICE_API_KEY};
use serde_json::{json, Value};

use tollgate_core::{BillingType, Endpoint, Provider, MICROS_PER_USD};

async fn report(harness: &TestHarness, body: Value) {
    harness
        .server
        .post("/v1/usage")
        .add_header("x-api-key", SERVICE_API_KEY)
        .json(&body)
        .await
        .assert_status(StatusCode::ACCEPTED);
}

// ============================================================================
// Export
// ============================================================================

#[tokio::test]
async fn export_rejects_unknown_format() {
    let harness = TestHarness::new();

    let response = harness.server.get("/v1/usage/export?format=xml").await;

    response.assert_status_bad_request();
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "bad_request");
    assert!(body["error"]["message"].as_str().unwrap().contains("xml"));
}

#[tokio::test]
async fn export_format_is_checked_before_the_ledger() {
    let ledger = Arc::new(FlakyLedger::default());
    let harness = TestHarness::with_ledger(ledger.clone());
    ledger.set_down(true);

    harness
        .server
        .get("/v1/usage/export?format=pdf")
        .await
        .assert_status_bad_request();
    harness
        .server
        .get("/v1/usage/export?format=csv")
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn json_export_is_the_event_array() {
    let harness = TestHarness::new();
    report(&harness, json!({ "provider": "semrush", "endpoint": "domain_overview" })).await;
    report(&harness, json!({ "provider": "builtwith", "endpoint": "domain_lookup" })).await;

    let response = harness.server.get("/v1/usage/export?provider=semrush").await;
    response.assert_status_ok();
    assert_eq!(
        response.header("content-type").to_str().unwrap(),
        "application/json"
    );
    let events: Vec<Value> = response.json();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["provider"], "semrush");
    assert_eq!(events[0]["cost_micros"], 500);
}

#[tokio::test]
async fn csv_export_has_fixed_columns() {
    let harness = TestHarness::new();
    report(
        &harness,
        json!({
            "provider": "google_places",
            "endpoint": "text_search",
            "occurred_at": "2026-09-10T08:00:00Z",
            "request_id": "req-42"
        }),
    )
    .await;
    report(
        &harness,
        json!({
            "provider": "google_places",
            "endpoint": "text_search",
            "occurred_at": "2026-08-10T08:00:00Z"
        }),
    )
    .await;

    let response = harness
        .server
        .get("/v1/usage/export?format=csv&start=2026-09-01&end=2026-10-01")
        .await;
    response.assert_status_ok();
    assert!(response
        .header("content-disposition")
        .to_str()
        .unwrap()
        .ends_with(".csv\""));

    let text = response.text();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines[0],
        "event_id,timestamp,provider,endpoint,quantity,unit_cost_usd,cost_usd,status_code,success,response_time_ms,unrecognized,path,request_id,profile_id"
    );
    assert_eq!(lines.len(), 2);
    assert!(lines[1].ends_with(",google_places,text_search,1,0.032,0.032,200,true,,false,,req-42,"));
}

// ============================================================================
// Provider health
// ============================================================================

#[tokio::test]
async fn every_registered_provider_is_listed() {
    let harness = TestHarness::new();
    for status in [200, 200, 500, 503] {
        report(
            &harness,
            json!({
                "provider": "google_places",
                "endpoint": "place_details",
                "status_code": status,
                "response_time_ms": 120
            }),
        )
        .await;
    }

    let response = harness.server.get("/v1/providers/health").await;
    response.assert_status_ok();
    let records: Vec<Value> = response.json();

    let names: Vec<&str> = records
        .iter()
        .map(|r| r["provider"].as_str().unwrap())
        .collect();
    assert_eq!(
        names,
        vec!["builtwith", "dataforseo", "google_places", "semrush", "social_data"]
    );

    let places = &records[2];
    assert_eq!(places["status"], "unhealthy");
    assert_eq!(places["total_requests"], 4);
    assert_eq!(places["success_rate"], 0.5);
    assert_eq!(places["p95_response_ms"], 120);
    assert_eq!(records[0]["status"], "unknown");
    assert_eq!(records[1]["rate_limit"]["limit_per_minute"], 2000);
}

// ============================================================================
// Optimization suggestions
// ============================================================================

#[tokio::test]
async fn larger_savings_rank_first() {
    let harness = TestHarness::new();
    harness
        .tracker
        .replace_provider(
            Provider::new("acme", BillingType::Subscription)
                .with_endpoint(Endpoint::new("alpha", 10 * MICROS_PER_USD))
                .with_endpoint(Endpoint::new("beta", 6 * MICROS_PER_USD)),
        )
        .unwrap();

    // Half of ten calls fail on each endpoint: $50 wasted on alpha, $30 on beta.
    for endpoint in ["beta", "alpha"] {
        for i in 0..10 {
            let status = if i % 2 == 0 { 200 } else { 500 };
            report(
                &harness,
                json!({ "provider": "acme", "endpoint": endpoint, "status_code": status }),
            )
            .await;
        }
    }

    let response = harness.server.get("/v1/optimization/suggestions").await;
    response.assert_status_ok();
    let body: Value = response.json();
    let suggestions = body["suggestions"].as_array().unwrap();

    assert_eq!(suggestions.len(), 2);
    assert_eq!(suggestions[0]["endpoint"], "alpha");
    assert_eq!(suggestions[0]["potential_savings"], 50.0);
    assert_eq!(suggestions[0]["priority"], "high");
    assert_eq!(suggestions[1]["endpoint"], "beta");
    assert_eq!(suggestions[1]["potential_savings"], 30.0);
    assert!(suggestions.iter().all(|s| s["kind"] == "error_rate"));
    assert_eq!(body["totalPotentialSavings"], 80.0);
}

// ============================================================================
// Ledger outage
// ============================================================================

#[tokio::test]
async fn reads_fail_with_503_but_reports_are_accepted() {
    let ledger = Arc::new(FlakyLedger::default());
    let harness = TestHarness::with_ledger(ledger.clone());
    ledger.set_down(true);

    for url in [
        "/v1/usage/monthly",
        "/v1/usage/breakdown",
        "/v1/providers/health",
        "/v1/optimization/suggestions",
        "/v1/budget",
        "/v1/subscriptions",
    ] {
        let response = harness.server.get(url).await;
        response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
        let body: Value = response.json();
        assert_eq!(body["error"]["code"], "service_unavailable", "{url}");
    }

    let response = harness
        .server
        .post("/v1/usage")
        .add_header("x-api-key", SERVICE_API_KEY)
        .json(&json!({ "provider": "semrush", "endpoint": "domain_overview" }))
        .await;
    response.assert_status(StatusCode::ACCEPTED);
    let body: Value = response.json();
    assert_eq!(body["cost"], 0.0005);

    ledger.set_down(false);
    harness
        .server
        .get("/v1/usage/monthly")
        .await
        .assert_status_ok();
}
