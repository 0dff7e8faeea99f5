//! Queue processor integration tests.
//!
//! HTTP tests cover the trigger and its auth; scenario tests drive
//! `process_queue` directly with an advancing clock.

mod common;

use chrono::{Duration, Utc};
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, ResponseTemplate};

use common::{
    header, rejected_receipt, valid_receipt, TestHarness, CRON_SECRET, PRODUCTION_PATH,
};
use iap_billing_core::{JobStatus, OriginalTransactionId, Plan, SubscriptionStatus, TransactionId};
use iap_billing_service::{process_queue, QueueRunSummary};
use iap_billing_store::Store;

fn tx(id: &str) -> TransactionId {
    TransactionId::new(id).unwrap()
}

// ============================================================================
// Trigger and auth
// ============================================================================

#[tokio::test]
async fn process_queue_requires_secret() {
    let harness = TestHarness::new().await;

    harness.server.post("/process-queue").await.assert_status_unauthorized();

    let (name, value) = header("authorization", "Bearer wrong-secret");
    harness
        .server
        .post("/process-queue")
        .add_header(name, value)
        .await
        .assert_status_unauthorized();
}

#[tokio::test]
async fn process_queue_accepts_bearer_and_query_secrets() {
    let harness = TestHarness::new().await;

    let (name, value) = header("authorization", &format!("Bearer {CRON_SECRET}"));
    harness
        .server
        .post("/process-queue")
        .add_header(name, value)
        .await
        .assert_status_ok();

    harness
        .server
        .get("/process-queue")
        .add_query_param("secret", CRON_SECRET)
        .await
        .assert_status_ok();

    harness
        .server
        .get("/process-queue")
        .add_query_param("cron_secret", CRON_SECRET)
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn process_queue_accepts_lowercase_scheme_and_bare_secret() {
    let harness = TestHarness::new().await;

    for authorization in [format!("bearer {CRON_SECRET}"), CRON_SECRET.to_string()] {
        let (name, value) = header("authorization", &authorization);
        harness
            .server
            .post("/process-queue")
            .add_header(name, value)
            .await
            .assert_status_ok();
    }
}

#[tokio::test]
async fn process_queue_is_open_without_configured_secret() {
    let harness = TestHarness::with_config(|config| config.cron_secret = None).await;

    let response = harness.server.get("/process-queue").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["results"]["processed"], 0);
}

#[tokio::test]
async fn verified_purchase_is_removed_and_subscription_recorded() {
    let harness = TestHarness::new().await;
    let expires = Utc::now() + Duration::days(30);
    harness
        .mount_production(valid_receipt("com.app.pro.monthly", "tx-1", "otx-1", expires))
        .await;
    harness.enqueue("tx-1", "com.app.pro.monthly").await;

    let (name, value) = header("authorization", &format!("Bearer {CRON_SECRET}"));
    let response = harness.server.post("/process-queue").add_header(name, value).await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["ok"], true);
    assert_eq!(
        body["results"],
        json!({ "processed": 1, "succeeded": 1, "retried": 0, "failed": 0 })
    );

    assert!(harness.store.get_job(&tx("tx-1")).unwrap().is_none());

    let sub = harness
        .store
        .get_subscription(&OriginalTransactionId::new("otx-1").unwrap())
        .unwrap()
        .expect("subscription recorded");
    assert_eq!(sub.plan, Plan::Pro);
    assert_eq!(sub.status, SubscriptionStatus::Active);
    assert_eq!(sub.user_id.as_deref(), Some("user-1"));
    assert_eq!(
        sub.current_period_end.timestamp_millis(),
        expires.timestamp_millis()
    );
}

#[tokio::test]
async fn verified_purchase_with_lapsed_period_is_active() {
    let harness = TestHarness::new().await;
    harness
        .mount_production(valid_receipt(
            "com.app.pro.monthly",
            "tx-1",
            "otx-1",
            Utc::now() - Duration::days(1),
        ))
        .await;
    harness.enqueue("tx-1", "com.app.pro.monthly").await;

    let summary = process_queue(&harness.state, Utc::now()).await.unwrap();

    assert_eq!(summary.succeeded, 1);
    assert!(harness.store.get_job(&tx("tx-1")).unwrap().is_none());
    let sub = harness
        .store
        .get_subscription(&OriginalTransactionId::new("otx-1").unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(sub.status, SubscriptionStatus::Active);
}

// ============================================================================
// Scenarios with an advancing clock
// ============================================================================

#[tokio::test]
async fn shared_secret_is_sent_to_apple() {
    let harness = TestHarness::new().await;
    Mock::given(method("POST"))
        .and(path(PRODUCTION_PATH))
        .and(body_partial_json(json!({
            "receipt-data": "receipt-tx-1",
            "password": common::APPLE_SECRET,
            "exclude-old-transactions": false
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(valid_receipt(
            "com.app.pro.monthly",
            "tx-1",
            "otx-1",
            Utc::now() + Duration::days(30),
        )))
        .expect(1)
        .mount(&harness.apple)
        .await;
    harness.enqueue("tx-1", "com.app.pro.monthly").await;

    let summary = process_queue(&harness.state, Utc::now()).await.unwrap();

    assert_eq!(summary.succeeded, 1);
}

#[tokio::test]
async fn always_failing_receipt_becomes_terminal_after_max_attempts() {
    let harness = TestHarness::new().await;
    harness.mount_production(rejected_receipt(21003)).await;
    harness.enqueue("tx-bad", "com.app.pro.monthly").await;

    let mut now = Utc::now();
    for cycle in 1..=5u32 {
        let summary = process_queue(&harness.state, now).await.unwrap();
        assert_eq!(summary.processed, 1, "cycle {cycle}");

        let job = harness.store.get_job(&tx("tx-bad")).unwrap().unwrap();
        assert_eq!(job.attempts, cycle);
        if cycle < 5 {
            assert_eq!(summary.retried, 1);
            assert_eq!(job.status, JobStatus::Pending);
        } else {
            assert_eq!(summary.failed, 1);
            assert_eq!(job.status, JobStatus::Failed);
        }
        assert!(job
            .error_message
            .as_deref()
            .is_some_and(|msg| msg.contains("21003")));

        now += Duration::hours(2);
    }

    let summary = process_queue(&harness.state, now).await.unwrap();
    assert_eq!(summary, QueueRunSummary::default());
    assert_eq!(harness.apple_calls(PRODUCTION_PATH).await, 5);

    let job = harness.store.get_job(&tx("tx-bad")).unwrap().unwrap();
    assert_eq!(job.attempts, 5);
}

#[tokio::test]
async fn transient_apple_error_is_retried_after_backoff() {
    let harness = TestHarness::new().await;
    Mock::given(method("POST"))
        .and(path(PRODUCTION_PATH))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&harness.apple)
        .await;
    harness
        .mount_production(valid_receipt(
            "com.app.pro.monthly",
            "tx-1",
            "otx-1",
            Utc::now() + Duration::days(30),
        ))
        .await;
    harness.enqueue("tx-1", "com.app.pro.monthly").await;

    let start = Utc::now();
    let first = process_queue(&harness.state, start).await.unwrap();
    assert_eq!(first.retried, 1);
    let job = harness.store.get_job(&tx("tx-1")).unwrap().unwrap();
    assert_eq!(job.attempts, 1);
    assert_eq!(job.next_attempt_at, start + Duration::seconds(120));

    // Still backing off.
    let early = process_queue(&harness.state, start + Duration::seconds(30))
        .await
        .unwrap();
    assert_eq!(early.processed, 0);

    let later = process_queue(&harness.state, start + Duration::minutes(10))
        .await
        .unwrap();
    assert_eq!(later.succeeded, 1);
    assert!(harness.store.get_job(&tx("tx-1")).unwrap().is_none());
}

#[tokio::test]
async fn batch_is_limited_and_oldest_first() {
    let harness = TestHarness::new().await;
    let base = Utc::now() - Duration::minutes(30);
    for i in 0..12 {
        harness
            .server
            .post("/enqueue")
            .json(&json!({ "transactionId": format!("tx-{i:02}") }))
            .await
            .assert_status_ok();
        // Spread creation times so FIFO order is unambiguous.
        let mut job = harness.store.get_job(&tx(&format!("tx-{i:02}"))).unwrap().unwrap();
        job.created_at = base + Duration::seconds(i);
        harness.store.put_job(&job).unwrap();
    }

    let summary = process_queue(&harness.state, Utc::now()).await.unwrap();
    assert_eq!(summary.processed, 10);

    let untouched: Vec<String> = harness
        .store
        .list_jobs(Some(JobStatus::Pending), 20)
        .unwrap()
        .into_iter()
        .filter(|job| job.attempts == 0)
        .map(|job| job.transaction_id.to_string())
        .collect();
    assert_eq!(untouched, vec!["tx-10", "tx-11"]);
}

#[tokio::test]
async fn job_without_receipt_fails_without_calling_apple() {
    let harness = TestHarness::new().await;
    harness
        .server
        .post("/enqueue")
        .json(&json!({ "transactionId": "tx-empty" }))
        .await
        .assert_status_ok();

    let summary = process_queue(&harness.state, Utc::now()).await.unwrap();

    assert_eq!(summary.retried, 1);
    assert_eq!(harness.apple_calls(PRODUCTION_PATH).await, 0);
    let job = harness.store.get_job(&tx("tx-empty")).unwrap().unwrap();
    assert_eq!(job.error_message.as_deref(), Some("Job has no receipt data"));
}

#[tokio::test]
async fn failed_jobs_do_not_block_the_batch() {
    let harness = TestHarness::with_config(|config| config.queue_concurrency = 4).await;
    harness
        .mount_production(valid_receipt(
            "com.app.elite.annual",
            "tx-good",
            "otx-good",
            Utc::now() + Duration::days(365),
        ))
        .await;
    harness
        .server
        .post("/enqueue")
        .json(&json!({ "transactionId": "tx-empty" }))
        .await
        .assert_status_ok();
    harness.enqueue("tx-good", "com.app.elite.annual").await;

    let summary = process_queue(&harness.state, Utc::now()).await.unwrap();

    assert_eq!(summary.processed, 2);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.retried, 1);
    let sub = harness
        .store
        .get_subscription(&OriginalTransactionId::new("otx-good").unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(sub.plan, Plan::Elite);
}
