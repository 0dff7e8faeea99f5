//! Client tests against a mock iap-billing service.

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use iap_billing_client::{
    ClientError, ClientOptions, EnqueueRequest, IapBillingClient, Plan, VerifyReceiptRequest,
};

#[tokio::test]
async fn enqueue_sends_camel_case_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/enqueue"))
        .and(body_json(json!({
            "transactionId": "tx-1",
            "rawReceipt": "MIIT...",
            "productId": "com.app.pro.monthly"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "message": "Purchase queued for verification",
            "transactionId": "tx-1",
            "queueId": "01HV0000000000000000000000"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = IapBillingClient::new(server.uri()).unwrap();
    let response = client
        .enqueue(&EnqueueRequest {
            transaction_id: "tx-1".into(),
            raw_receipt: Some("MIIT...".into()),
            product_id: Some("com.app.pro.monthly".into()),
            user_id: None,
            email: None,
        })
        .await
        .unwrap();

    assert!(response.ok);
    assert_eq!(response.queue_id, "01HV0000000000000000000000");
}

#[tokio::test]
async fn verify_receipt_parses_plan() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/verify-receipt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "verified": true,
            "plan": "elite",
            "appleResp": { "status": 0, "environment": "Sandbox" }
        })))
        .mount(&server)
        .await;

    let client = IapBillingClient::new(server.uri()).unwrap();
    let response = client
        .verify_receipt(&VerifyReceiptRequest {
            transaction_id: "tx-1".into(),
            raw_receipt: "MIIT...".into(),
            product_id: "com.app.elite.monthly".into(),
            user_id: Some("user-1".into()),
        })
        .await
        .unwrap();

    assert!(response.verified);
    assert_eq!(response.plan, Some(Plan::Elite));
    assert_eq!(response.apple_resp.environment.as_deref(), Some("Sandbox"));
    assert!(response.error.is_none());
}

#[tokio::test]
async fn upstream_failure_maps_to_typed_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/verify-receipt"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": { "code": "external_service_error", "message": "Apple unreachable" }
        })))
        .mount(&server)
        .await;

    let client = IapBillingClient::new(server.uri()).unwrap();
    let err = client
        .verify_receipt(&VerifyReceiptRequest {
            transaction_id: "tx-1".into(),
            raw_receipt: "MIIT...".into(),
            product_id: "com.app.pro.monthly".into(),
            user_id: None,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::Upstream(msg) if msg == "Apple unreachable"));
}

#[tokio::test]
async fn process_queue_sends_bearer_secret() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/process-queue"))
        .and(header("authorization", "Bearer cron-secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "message": "Processed 3 queued purchases",
            "results": { "processed": 3, "succeeded": 2, "retried": 1, "failed": 0 }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/process-queue"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": { "code": "unauthorized", "message": "unauthorized" }
        })))
        .mount(&server)
        .await;

    let client = IapBillingClient::with_options(
        server.uri(),
        ClientOptions::with_cron_secret("cron-secret"),
    )
    .unwrap();
    let response = client.process_queue().await.unwrap();
    assert_eq!(response.results.processed, 3);
    assert_eq!(response.results.retried, 1);

    let anonymous = IapBillingClient::new(server.uri()).unwrap();
    let err = anonymous.process_queue().await.unwrap_err();
    assert!(matches!(err, ClientError::Unauthorized));
}

#[tokio::test]
async fn non_json_errors_keep_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&server)
        .await;

    let client = IapBillingClient::new(server.uri()).unwrap();
    let err = client.health().await.unwrap_err();

    assert!(matches!(err, ClientError::Api { status: 503, .. }));
}
