//! Spend reservation and refund RPC integration tests.

mod common;

use common::{TestHarness, SERVICE_API_KEY};
use serde_json::json;

async fn post_spend(
    harness: &TestHarness,
    cost: i64,
    job_id: &str,
) -> axum_test::TestResponse {
    harness
        .server
        .post("/v1/spend")
        .add_header("x-api-key", SERVICE_API_KEY)
        .add_header("x-service-name", "render-pipeline")
        .json(&json!({
            "customer_id": harness.customer_id.to_string(),
            "cost": cost,
            "job_id": job_id,
            "reason": "staging render"
        }))
        .await
}

async fn post_refund(harness: &TestHarness, job_id: &str) -> axum_test::TestResponse {
    harness
        .server
        .post("/v1/refund")
        .add_header("x-api-key", SERVICE_API_KEY)
        .add_header("x-service-name", "render-pipeline")
        .json(&json!({
            "customer_id": harness.customer_id.to_string(),
            "job_id": job_id,
            "reason": "generation failed"
        }))
        .await
}

// ============================================================================
// Spend
// ============================================================================

#[tokio::test]
async fn spend_reserves_tokens() {
    let harness = TestHarness::new();
    harness.fund(10);

    let response = post_spend(&harness, 2, "job_a").await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["balance"], 8);
    assert_eq!(harness.balance(), 8);
}

#[tokio::test]
async fn spend_retry_with_same_job_is_a_noop() {
    let harness = TestHarness::new();
    harness.fund(10);

    post_spend(&harness, 2, "job_a").await.assert_status_ok();

    // A caller retrying after a timeout reuses the job id.
    let retry = post_spend(&harness, 2, "job_a").await;
    retry.assert_status_ok();

    let body: serde_json::Value = retry.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["balance"], 8);
    assert_eq!(harness.balance(), 8);
}

#[tokio::test]
async fn insufficient_balance_reports_failure_and_spends_nothing() {
    let harness = TestHarness::new();
    harness.fund(5);

    let response = post_spend(&harness, 100, "job_big").await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    assert_eq!(body["success"], false);
    assert_eq!(body["balance"], 5);
    assert_eq!(harness.balance(), 5);
}

#[tokio::test]
async fn non_positive_cost_is_rejected() {
    let harness = TestHarness::new();
    harness.fund(10);

    post_spend(&harness, 0, "job_zero")
        .await
        .assert_status_bad_request();
    post_spend(&harness, -3, "job_negative")
        .await
        .assert_status_bad_request();
    assert_eq!(harness.balance(), 10);
}

#[tokio::test]
async fn spend_requires_service_key() {
    let harness = TestHarness::new();
    harness.fund(10);

    let missing = harness
        .server
        .post("/v1/spend")
        .json(&json!({
            "customer_id": harness.customer_id.to_string(),
            "cost": 2,
            "job_id": "job_a"
        }))
        .await;
    missing.assert_status_unauthorized();

    let wrong = harness
        .server
        .post("/v1/spend")
        .add_header("x-api-key", "not-the-key")
        .json(&json!({
            "customer_id": harness.customer_id.to_string(),
            "cost": 2,
            "job_id": "job_a"
        }))
        .await;
    wrong.assert_status_unauthorized();

    assert_eq!(harness.balance(), 10);
}

// ============================================================================
// Refund
// ============================================================================

#[tokio::test]
async fn refund_restores_pre_spend_balance() {
    let harness = TestHarness::new();
    harness.fund(10);

    post_spend(&harness, 3, "job_a").await.assert_status_ok();
    assert_eq!(harness.balance(), 7);

    let response = post_refund(&harness, "job_a").await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    assert_eq!(body["refunded"], true);
    assert_eq!(body["balance"], 10);
    assert_eq!(harness.balance(), 10);
}

#[tokio::test]
async fn refund_retry_cannot_double_refund() {
    let harness = TestHarness::new();
    harness.fund(10);

    post_spend(&harness, 3, "job_a").await.assert_status_ok();
    post_refund(&harness, "job_a").await.assert_status_ok();

    let retry = post_refund(&harness, "job_a").await;
    retry.assert_status_ok();

    let body: serde_json::Value = retry.json();
    assert_eq!(body["refunded"], false);
    assert_eq!(body["balance"], 10);
    assert_eq!(harness.balance(), 10);
}

#[tokio::test]
async fn refund_without_spend_is_refused() {
    let harness = TestHarness::new();
    harness.fund(10);

    let response = post_refund(&harness, "job_never_spent").await;
    response.assert_status_not_found();
    assert_eq!(harness.balance(), 10);
}

// ============================================================================
// Reads
// ============================================================================

#[tokio::test]
async fn balance_and_ledger_reads() {
    let harness = TestHarness::new();
    harness.fund(10);
    // Entry ids only order across millisecond boundaries.
    tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    post_spend(&harness, 2, "job_a").await.assert_status_ok();

    let response = harness
        .server
        .get(&format!("/v1/balance/{}", harness.customer_id))
        .add_header("x-api-key", SERVICE_API_KEY)
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["balance"], 8);

    let response = harness
        .server
        .get(&format!("/v1/ledger/{}?limit=1", harness.customer_id))
        .add_header("x-api-key", SERVICE_API_KEY)
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let entries = body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    // Newest first: the spend precedes the seed grant in the listing.
    assert_eq!(entries[0]["kind"], "spend");
    assert_eq!(entries[0]["delta"], -2);
}

#[tokio::test]
async fn subscription_read_404s_without_state() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .get(&format!("/v1/subscription/{}", harness.customer_id))
        .add_header("x-api-key", SERVICE_API_KEY)
        .await;
    response.assert_status_not_found();
}
