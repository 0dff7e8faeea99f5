//! Receipt verification endpoint integration tests.

mod common;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use common::{
    rejected_receipt, renewal, valid_receipt, TestHarness, PRODUCTION_PATH, SANDBOX_PATH,
};
use iap_billing_core::{
    OriginalTransactionId, Plan, SubscriptionStatus, TransactionId, VerificationStatus,
};
use iap_billing_store::Store;

fn request(transaction_id: &str, product_id: &str) -> Value {
    json!({
        "transactionId": transaction_id,
        "rawReceipt": "MIIT...",
        "productId": product_id,
        "userId": "user-1"
    })
}

fn otx(id: &str) -> OriginalTransactionId {
    OriginalTransactionId::new(id).unwrap()
}

#[tokio::test]
async fn valid_receipt_grants_plan() {
    let harness = TestHarness::new().await;
    harness
        .mount_production(valid_receipt(
            "com.app.pro.monthly",
            "tx-1",
            "otx-1",
            Utc::now() + Duration::days(30),
        ))
        .await;

    let response = harness
        .server
        .post("/verify-receipt")
        .json(&request("tx-1", "com.app.pro.monthly"))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["ok"], true);
    assert_eq!(body["verified"], true);
    assert_eq!(body["plan"], "pro");
    assert_eq!(body["appleResp"]["status"], 0);
    assert_eq!(body["appleResp"]["environment"], "Production");

    let receipt = harness
        .store
        .get_receipt(&TransactionId::new("tx-1").unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(receipt.verification_status, VerificationStatus::Verified);
    assert_eq!(receipt.verification_response["status"], 0);
}

#[tokio::test]
async fn sandbox_receipt_falls_back_to_sandbox() {
    let harness = TestHarness::new().await;
    harness.mount_production(rejected_receipt(21007)).await;
    let mut sandbox = valid_receipt(
        "com.app.essentials.monthly",
        "tx-1",
        "otx-1",
        Utc::now() + Duration::days(30),
    );
    sandbox["environment"] = json!("Sandbox");
    harness.mount_sandbox(sandbox).await;

    let body: Value = harness
        .server
        .post("/verify-receipt")
        .json(&request("tx-1", "com.app.essentials.monthly"))
        .await
        .json();

    assert_eq!(body["verified"], true);
    assert_eq!(body["plan"], "essentials");
    assert_eq!(body["appleResp"]["environment"], "Sandbox");
    assert_eq!(harness.apple_calls(PRODUCTION_PATH).await, 1);
    assert_eq!(harness.apple_calls(SANDBOX_PATH).await, 1);
}

#[tokio::test]
async fn rejected_receipt_is_reported_not_raised() {
    let harness = TestHarness::new().await;
    harness.mount_production(rejected_receipt(21003)).await;

    let response = harness
        .server
        .post("/verify-receipt")
        .json(&request("tx-1", "com.app.pro.monthly"))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["ok"], true);
    assert_eq!(body["verified"], false);
    assert_eq!(body["appleResp"]["status"], 21003);
    assert!(body["error"].as_str().unwrap().contains("21003"));
    assert!(body.get("plan").is_none());
    assert_eq!(harness.apple_calls(SANDBOX_PATH).await, 0);

    let receipt = harness
        .store
        .get_receipt(&TransactionId::new("tx-1").unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(receipt.verification_status, VerificationStatus::Failed);
}

#[tokio::test]
async fn valid_status_without_renewal_entry_is_not_verified() {
    let harness = TestHarness::new().await;
    harness
        .mount_production(json!({ "status": 0, "environment": "Production", "receipt": { "in_app": [] } }))
        .await;

    let body: Value = harness
        .server
        .post("/verify-receipt")
        .json(&request("tx-1", "com.app.pro.monthly"))
        .await
        .json();

    assert_eq!(body["verified"], false);
    assert_eq!(body["error"], "No receipt info in Apple response");
}

#[tokio::test]
async fn apple_outage_is_internal_error() {
    let harness = TestHarness::new().await;
    Mock::given(method("POST"))
        .and(path(PRODUCTION_PATH))
        .respond_with(ResponseTemplate::new(500))
        .mount(&harness.apple)
        .await;

    let response = harness
        .server
        .post("/verify-receipt")
        .json(&request("tx-1", "com.app.pro.monthly"))
        .await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "external_service_error");
}

#[tokio::test]
async fn missing_fields_are_rejected() {
    let harness = TestHarness::new().await;

    let response = harness
        .server
        .post("/verify-receipt")
        .json(&json!({ "transactionId": "tx-1", "rawReceipt": "MIIT..." }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(harness.apple_calls(PRODUCTION_PATH).await, 0);
}

#[tokio::test]
async fn renewals_update_the_same_subscription() {
    let harness = TestHarness::new().await;
    let now = Utc::now();
    harness
        .mount_production(json!({
            "status": 0,
            "latest_receipt_info": [
                renewal("com.app.pro.monthly", "tx-1", "otx-1", now - Duration::days(30), now - Duration::days(1)),
                renewal("com.app.pro.monthly", "tx-2", "otx-1", now - Duration::days(1), now + Duration::days(29)),
            ],
            "pending_renewal_info": [
                { "original_transaction_id": "otx-1", "auto_renew_status": "0" }
            ]
        }))
        .await;

    for transaction_id in ["tx-1", "tx-2"] {
        harness
            .server
            .post("/verify-receipt")
            .json(&request(transaction_id, "com.app.pro.monthly"))
            .await
            .assert_status_ok();
    }

    let sub = harness.store.get_subscription(&otx("otx-1")).unwrap().unwrap();
    assert_eq!(sub.transaction_id.as_str(), "tx-2");
    assert_eq!(sub.status, SubscriptionStatus::Active);
    assert!(sub.cancel_at_period_end);
    assert_eq!(sub.plan, Plan::Pro);
}

#[tokio::test]
async fn verified_lapsed_period_is_recorded_active() {
    let harness = TestHarness::new().await;
    let expired = Utc::now() - Duration::days(2);
    harness
        .mount_production(valid_receipt("com.app.pro.monthly", "tx-1", "otx-1", expired))
        .await;

    let body: Value = harness
        .server
        .post("/verify-receipt")
        .json(&request("tx-1", "com.app.pro.monthly"))
        .await
        .json();

    assert_eq!(body["verified"], true);
    let sub = harness.store.get_subscription(&otx("otx-1")).unwrap().unwrap();
    assert_eq!(sub.status, SubscriptionStatus::Active);
    assert_eq!(sub.current_period_end.timestamp_millis(), expired.timestamp_millis());
}

#[tokio::test]
async fn numeric_transaction_id_is_accepted() {
    let harness = TestHarness::new().await;
    harness
        .mount_production(valid_receipt(
            "com.app.pro.monthly",
            "1000000001",
            "1000000001",
            Utc::now() + Duration::days(30),
        ))
        .await;

    let response = harness
        .server
        .post("/verify-receipt")
        .json(&json!({
            "transactionId": 1_000_000_001_u64,
            "rawReceipt": "MIIT...",
            "productId": "com.app.pro.monthly"
        }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["verified"], true);
    assert!(harness
        .store
        .get_receipt(&TransactionId::new("1000000001").unwrap())
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn missing_body_is_bad_request() {
    let harness = TestHarness::new().await;

    let response = harness.server.post("/verify-receipt").await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "bad_request");
    assert_eq!(harness.apple_calls(PRODUCTION_PATH).await, 0);
}

#[tokio::test]
async fn repeated_verification_accumulates_attempts() {
    let harness = TestHarness::new().await;
    harness.mount_production(rejected_receipt(21002)).await;

    for _ in 0..2 {
        harness
            .server
            .post("/verify-receipt")
            .json(&request("tx-1", "com.app.pro.monthly"))
            .await
            .assert_status_ok();
    }

    let receipt = harness
        .store
        .get_receipt(&TransactionId::new("tx-1").unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(receipt.attempts, 2);
    assert_eq!(receipt.user_id.as_deref(), Some("user-1"));
}
