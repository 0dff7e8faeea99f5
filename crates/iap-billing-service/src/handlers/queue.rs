//! Verification queue handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use iap_billing_core::{JobId, JobPayload, QueueJob, TransactionId};
use iap_billing_store::Enqueued;

use super::non_empty;
use crate::apple::types::string_or_number;
use crate::auth::CronAuth;
use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::processor::{self, QueueRunSummary};
use crate::state::AppState;

/// Request to queue a purchase for verification.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueRequest {
    /// Purchase transaction (required). Numeric ids are accepted.
    #[serde(default, deserialize_with = "string_or_number")]
    pub transaction_id: Option<String>,
    /// Base64 receipt blob.
    pub raw_receipt: Option<String>,
    /// Store product identifier.
    pub product_id: Option<String>,
    /// Internal user.
    pub user_id: Option<String>,
    /// Contact email.
    pub email: Option<String>,
}

/// Enqueue response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueResponse {
    /// Always `true`.
    pub ok: bool,
    /// Human readable result.
    pub message: String,
    /// The queued transaction.
    pub transaction_id: TransactionId,
    /// Identifier of the job holding the transaction.
    pub queue_id: JobId,
}

/// Queue a purchase for background verification.
///
/// Enqueueing a transaction that is already queued succeeds and leaves the
/// existing job untouched.
pub async fn enqueue(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<EnqueueRequest>,
) -> Result<Json<EnqueueResponse>, ApiError> {
    let transaction_id = non_empty(request.transaction_id)
        .ok_or_else(|| ApiError::BadRequest("Missing required field: transactionId".into()))?;
    let transaction_id = TransactionId::new(transaction_id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid transactionId: {e}")))?;

    let now = Utc::now();
    let payload = JobPayload {
        transaction_id,
        raw_receipt: non_empty(request.raw_receipt),
        product_id: non_empty(request.product_id),
        user_id: non_empty(request.user_id),
        email: non_empty(request.email),
        enqueued_at: now,
    };

    let enqueued = state.store.insert_job_if_absent(&QueueJob::new(payload, now))?;
    let message = match &enqueued {
        Enqueued::Inserted(job) => {
            tracing::info!(
                transaction_id = %job.transaction_id,
                queue_id = %job.id,
                "Purchase queued for verification"
            );
            "Purchase queued for verification"
        }
        Enqueued::Existing(job) => {
            tracing::debug!(
                transaction_id = %job.transaction_id,
                status = job.status.as_str(),
                "Purchase already queued"
            );
            "Purchase already queued"
        }
    };

    let job = enqueued.job();
    Ok(Json(EnqueueResponse {
        ok: true,
        message: message.to_string(),
        transaction_id: job.transaction_id.clone(),
        queue_id: job.id,
    }))
}

/// Queue run response.
#[derive(Debug, Serialize)]
pub struct ProcessQueueResponse {
    /// Always `true`.
    pub ok: bool,
    /// Human readable result.
    pub message: String,
    /// Counts for the run.
    pub results: QueueRunSummary,
}

/// Run the queue processor once.
pub async fn process_queue(
    auth: CronAuth,
    State(state): State<Arc<AppState>>,
) -> Result<Json<ProcessQueueResponse>, ApiError> {
    tracing::debug!(access = ?auth.access, "Queue run triggered");

    let results = processor::process_queue(&state, Utc::now()).await?;

    Ok(Json(ProcessQueueResponse {
        ok: true,
        message: format!("Processed {} queued purchases", results.processed),
        results,
    }))
}
