//! Usage reporting and aggregation integration tests.

mod common;

use axum::http::StatusCode;
use common::{TestHarness, SERVICE_API_KEY};
use serde_json::{json, Value};

use tollgate_core::MICROS_PER_USD;

async fn report(harness: &TestHarness, body: Value) -> Value {
    let response = harness
        .server
        .post("/v1/usage")
        .add_header("x-api-key", SERVICE_API_KEY)
        .json(&body)
        .await;
    response.assert_status(StatusCode::ACCEPTED);
    response.json()
}

// ============================================================================
// Authentication
// ============================================================================

#[tokio::test]
async fn report_requires_api_key() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/usage")
        .json(&json!({ "provider": "dataforseo", "endpoint": "serp_organic" }))
        .await;
    response.assert_status_unauthorized();
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "unauthorized");

    harness
        .server
        .post("/v1/usage")
        .add_header("x-api-key", "not-the-key")
        .json(&json!({ "provider": "dataforseo", "endpoint": "serp_organic" }))
        .await
        .assert_status_unauthorized();

    assert_eq!(harness.tracker.monthly_usage(None).unwrap().costs.usage, 0);
}

// ============================================================================
// Recording
// ============================================================================

#[tokio::test]
async fn keyword_volume_scenario() {
    let harness = TestHarness::new();

    let body = report(
        &harness,
        json!({
            "provider": "dataforseo",
            "endpoint": "keywords_volume",
            "quantity": 1000
        }),
    )
    .await;
    assert_eq!(body["cost"], 0.75);
    assert_eq!(body["unrecognized"], false);

    let response = harness.server.get("/v1/usage/monthly").await;
    response.assert_status_ok();
    let usage: Value = response.json();
    assert_eq!(
        usage["providers"],
        json!([{
            "_id": "dataforseo",
            "totalCost": 0.75,
            "totalRequests": 1,
            "totalQuantity": 1000,
            "endpoints": [{
                "endpoint": "keywords_volume",
                "totalCost": 0.75,
                "totalRequests": 1,
                "totalQuantity": 1000
            }]
        }])
    );
    assert_eq!(usage["costs"]["usage"], 0.75);
}

#[tokio::test]
async fn unknown_provider_is_recorded_at_zero_cost() {
    let harness = TestHarness::new();

    let body = report(
        &harness,
        json!({
            "provider": "ghost_provider",
            "endpoint": "ghost_endpoint",
            "quantity": 5
        }),
    )
    .await;

    assert_eq!(body["cost"], 0.0);
    assert_eq!(body["unrecognized"], true);
    assert_eq!(body["quantity"], 5);

    let events = harness
        .tracker
        .ledger()
        .scan(&tollgate_store::LedgerFilter::default())
        .unwrap();
    assert_eq!(events.len(), 1);
    assert!(events[0].unrecognized);
}

#[tokio::test]
async fn wire_paths_resolve_to_endpoints() {
    let harness = TestHarness::new();

    let body = report(
        &harness,
        json!({
            "provider": "dataforseo",
            "endpoint": "/v3/serp/google/organic/live/advanced/?depth=10",
            "status_code": 200,
            "response_time_ms": 850,
            "request_id": "req-1"
        }),
    )
    .await;

    assert_eq!(body["endpoint"], "serp_organic");
    assert_eq!(body["cost"], 0.002);
}

#[tokio::test]
async fn collector_header_is_recorded() {
    let harness = TestHarness::new();

    harness
        .server
        .post("/v1/usage")
        .add_header("x-api-key", SERVICE_API_KEY)
        .add_header("x-collector", "serp-worker")
        .json(&json!({ "provider": "semrush", "endpoint": "domain_overview" }))
        .await
        .assert_status(StatusCode::ACCEPTED);

    let events = harness
        .tracker
        .ledger()
        .scan(&tollgate_store::LedgerFilter::default())
        .unwrap();
    assert_eq!(events[0].collector.as_deref(), Some("serp-worker"));
}

#[tokio::test]
async fn batch_reports_every_event() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/usage/batch")
        .add_header("x-api-key", SERVICE_API_KEY)
        .json(&json!({
            "events": [
                { "provider": "google_places", "endpoint": "place_details" },
                { "provider": "google_places", "endpoint": "text_search", "quantity": 2 },
                { "provider": "nobody", "endpoint": "nothing" }
            ]
        }))
        .await;

    response.assert_status(StatusCode::ACCEPTED);
    let body: Value = response.json();
    assert_eq!(body["accepted"], 3);
    assert_eq!(body["unrecognized"], 1);
    assert_eq!(body["total_cost"], 0.081);
    assert_eq!(body["results"][1]["cost"], 0.064);
}

#[tokio::test]
async fn batch_total_saturates_instead_of_overflowing() {
    let harness = TestHarness::new();
    let huge = json!({
        "provider": "dataforseo",
        "endpoint": "serp_organic",
        "quantity": 9_000_000_000_000_000_000u64
    });

    let response = harness
        .server
        .post("/v1/usage/batch")
        .add_header("x-api-key", SERVICE_API_KEY)
        .json(&json!({ "events": [huge.clone(), huge] }))
        .await;

    response.assert_status(StatusCode::ACCEPTED);
    let body: Value = response.json();
    assert_eq!(body["accepted"], 2);
    assert_eq!(
        body["total_cost"].as_f64().unwrap(),
        tollgate_core::micros_to_usd(i64::MAX)
    );

    let usage = harness.tracker.monthly_usage(None).unwrap();
    assert_eq!(usage.costs.usage, i64::MAX);
    assert_eq!(usage.costs.total, i64::MAX);
}

#[tokio::test]
async fn oversized_batch_is_rejected() {
    let harness = TestHarness::new();
    let events: Vec<Value> = (0..1_001)
        .map(|_| json!({ "provider": "semrush", "endpoint": "domain_overview" }))
        .collect();

    let response = harness
        .server
        .post("/v1/usage/batch")
        .add_header("x-api-key", SERVICE_API_KEY)
        .json(&json!({ "events": events }))
        .await;

    response.assert_status_bad_request();
    assert_eq!(harness.tracker.monthly_usage(None).unwrap().costs.usage, 0);
}

// ============================================================================
// Aggregation
// ============================================================================

#[tokio::test]
async fn usage_total_is_independent_of_report_order() {
    // (endpoint, quantity, unit cost in micros)
    let calls = [
        ("keywords_volume", 1_000, 750),
        ("serp_organic", 3, 2_000),
        ("backlinks_summary", 7, 20_000),
        ("onpage_lighthouse", 11, 4_250),
    ];
    let expected: i64 = calls.iter().map(|(_, q, unit)| q * unit).sum();

    let mut totals = Vec::new();
    for order in [[0, 1, 2, 3], [3, 2, 1, 0], [2, 0, 3, 1]] {
        let harness = TestHarness::new();
        let events: Vec<Value> = order
            .iter()
            .map(|&i| {
                let (endpoint, quantity, _) = calls[i];
                json!({ "provider": "dataforseo", "endpoint": endpoint, "quantity": quantity })
            })
            .collect();
        harness
            .server
            .post("/v1/usage/batch")
            .add_header("x-api-key", SERVICE_API_KEY)
            .json(&json!({ "events": events }))
            .await
            .assert_status(StatusCode::ACCEPTED);

        let usage = harness.tracker.monthly_usage(None).unwrap();
        assert_eq!(usage.costs.usage, expected);
        totals.push(usage.costs.usage);
    }
    assert!(totals.windows(2).all(|w| w[0] == w[1]));
}

#[tokio::test]
async fn breakdown_over_a_closed_range_is_idempotent() {
    let harness = TestHarness::new();
    for (day, quantity) in [("2026-09-03", 1), ("2026-09-03", 4), ("2026-09-20", 2)] {
        report(
            &harness,
            json!({
                "provider": "google_places",
                "endpoint": "place_details",
                "quantity": quantity,
                "occurred_at": format!("{day}T10:00:00Z")
            }),
        )
        .await;
    }

    let url = "/v1/usage/breakdown?provider=google_places&start=2026-09-01&end=2026-10-01&group_by=week";
    let first = harness.server.get(url).await;
    first.assert_status_ok();
    let second = harness.server.get(url).await;
    assert_eq!(first.text(), second.text());

    let body: Value = first.json();
    assert_eq!(body["group_by"], "week");
    assert_eq!(body["total"], 0.119);
    // Weeks starting 2026-08-31, 09-07, 09-14, 09-21 and 09-28.
    assert_eq!(body["series"].as_array().unwrap().len(), 5);
    assert_eq!(body["series"][0]["requests"], 2);
}

#[tokio::test]
async fn breakdown_rejects_bad_input() {
    let harness = TestHarness::new();

    harness
        .server
        .get("/v1/usage/breakdown?group_by=fortnight")
        .await
        .assert_status_bad_request();
    harness
        .server
        .get("/v1/usage/breakdown?start=2026-10-10&end=2026-10-01")
        .await
        .assert_status_bad_request();
    harness
        .server
        .get("/v1/usage/breakdown?start=last-tuesday")
        .await
        .assert_status_bad_request();
}

#[tokio::test]
async fn monthly_usage_accepts_a_period() {
    let harness = TestHarness::new();
    report(
        &harness,
        json!({
            "provider": "semrush",
            "endpoint": "domain_overview",
            "quantity": 2_000,
            "occurred_at": "2026-08-15T00:00:00Z"
        }),
    )
    .await;

    let response = harness.server.get("/v1/usage/monthly?period=2026-08").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["period"], "2026-08");
    assert_eq!(body["closed"], true);
    assert_eq!(body["costs"]["usage"], 1.0);

    let august = harness
        .tracker
        .monthly_usage(Some("2026-08".parse().unwrap()))
        .unwrap();
    assert_eq!(august.costs.usage, MICROS_PER_USD);

    harness
        .server
        .get("/v1/usage/monthly?period=2026-13")
        .await
        .assert_status_bad_request();
}
