//! Common test utilities for iap-billing integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue};
use axum::Router;
use axum_test::TestServer;
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use iap_billing_service::{create_router, AppState, ServiceConfig};
use iap_billing_store::MemoryStore;

pub const CRON_SECRET: &str = "test-cron-secret";
pub const ADMIN_KEY: &str = "test-admin-key";
pub const APPLE_SECRET: &str = "test-shared-secret";

pub const PRODUCTION_PATH: &str = "/verifyReceipt";
pub const SANDBOX_PATH: &str = "/sandbox/verifyReceipt";

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// Stand-in for Apple's production and sandbox endpoints.
    pub apple: MockServer,
    /// The store behind the service.
    pub store: Arc<MemoryStore>,
    /// The state the router was built from, for driving the processor directly.
    pub state: AppState,
}

impl TestHarness {
    /// Create a harness with every secret configured.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a harness, adjusting the configuration first.
    pub async fn with_config(customize: impl FnOnce(&mut ServiceConfig)) -> Self {
        let apple = MockServer::start().await;
        let store = Arc::new(MemoryStore::new());

        let mut config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            cron_secret: Some(CRON_SECRET.into()),
            admin_api_key: Some(ADMIN_KEY.into()),
            apple_shared_secret: Some(APPLE_SECRET.into()),
            apple_production_url: format!("{}{PRODUCTION_PATH}", apple.uri()),
            apple_sandbox_url: format!("{}{SANDBOX_PATH}", apple.uri()),
            apple_timeout_seconds: 5,
            ..ServiceConfig::default()
        };
        customize(&mut config);

        let state = AppState::new(store.clone(), config).expect("Failed to build state");
        let router: Router = create_router(state.clone());
        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            apple,
            store,
            state,
        }
    }

    /// Answer every production request with `body`.
    pub async fn mount_production(&self, body: Value) {
        mount(&self.apple, PRODUCTION_PATH, ResponseTemplate::new(200).set_body_json(body)).await;
    }

    /// Answer every sandbox request with `body`.
    pub async fn mount_sandbox(&self, body: Value) {
        mount(&self.apple, SANDBOX_PATH, ResponseTemplate::new(200).set_body_json(body)).await;
    }

    /// Number of requests Apple received on `endpoint`.
    pub async fn apple_calls(&self, endpoint: &str) -> usize {
        self.apple
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == endpoint)
            .count()
    }

    /// Enqueue a purchase over HTTP.
    pub async fn enqueue(&self, transaction_id: &str, product_id: &str) {
        self.server
            .post("/enqueue")
            .json(&json!({
                "transactionId": transaction_id,
                "rawReceipt": format!("receipt-{transaction_id}"),
                "productId": product_id,
                "userId": "user-1",
            }))
            .await
            .assert_status_ok();
    }
}

async fn mount(apple: &MockServer, endpoint: &str, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path(endpoint))
        .respond_with(response)
        .mount(apple)
        .await;
}

/// Header name/value pair accepted by `add_header`.
pub fn header(name: &'static str, value: &str) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static(name),
        HeaderValue::from_str(value).expect("valid header value"),
    )
}

/// One renewal entry in Apple's format.
pub fn renewal(
    product_id: &str,
    transaction_id: &str,
    original_transaction_id: &str,
    purchased_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> Value {
    json!({
        "product_id": product_id,
        "transaction_id": transaction_id,
        "original_transaction_id": original_transaction_id,
        "purchase_date_ms": purchased_at.timestamp_millis().to_string(),
        "expires_date_ms": expires_at.timestamp_millis().to_string(),
    })
}

/// A valid `verifyReceipt` answer with a single renewal expiring at `expires_at`.
pub fn valid_receipt(
    product_id: &str,
    transaction_id: &str,
    original_transaction_id: &str,
    expires_at: DateTime<Utc>,
) -> Value {
    json!({
        "status": 0,
        "environment": "Production",
        "latest_receipt_info": [renewal(
            product_id,
            transaction_id,
            original_transaction_id,
            expires_at - Duration::days(30),
            expires_at,
        )],
    })
}

/// A rejected `verifyReceipt` answer.
pub fn rejected_receipt(status: i64) -> Value {
    json!({ "status": status })
}
