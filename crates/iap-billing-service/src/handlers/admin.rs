//! Queue inspection handlers for operators.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use iap_billing_core::{JobId, JobStatus, QueueJob, TransactionId};

use crate::auth::AdminAuth;
use crate::error::ApiError;
use crate::state::AppState;

/// Default page size for job listings.
const DEFAULT_LIMIT: usize = 50;

/// Largest page size for job listings.
const MAX_LIMIT: usize = 500;

/// Job listing query.
#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    /// `pending`, `processing` or `failed`.
    pub status: Option<String>,
    /// Maximum jobs returned.
    pub limit: Option<usize>,
}

/// Operator view of a queue job.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobView {
    /// Job identifier.
    pub queue_id: JobId,
    /// Purchase transaction.
    pub transaction_id: TransactionId,
    /// Current status.
    pub status: JobStatus,
    /// Attempts made so far.
    pub attempts: u32,
    /// Earliest next attempt.
    pub next_attempt_at: DateTime<Utc>,
    /// Last failure reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Product, if supplied at enqueue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    /// User, if supplied at enqueue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Whether a receipt blob is attached.
    pub has_receipt: bool,
    /// When the job was enqueued.
    pub created_at: DateTime<Utc>,
    /// When the job last changed.
    pub updated_at: DateTime<Utc>,
}

impl From<QueueJob> for JobView {
    fn from(job: QueueJob) -> Self {
        Self {
            queue_id: job.id,
            transaction_id: job.transaction_id,
            status: job.status,
            attempts: job.attempts,
            next_attempt_at: job.next_attempt_at,
            error_message: job.error_message,
            has_receipt: job.payload.raw_receipt.is_some(),
            product_id: job.payload.product_id,
            user_id: job.payload.user_id,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

/// Job listing response.
#[derive(Debug, Serialize)]
pub struct ListJobsResponse {
    /// Jobs, oldest first.
    pub jobs: Vec<JobView>,
}

/// List queue jobs.
pub async fn list_jobs(
    _admin: AdminAuth,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListJobsQuery>,
) -> Result<Json<ListJobsResponse>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<JobStatus>)
        .transpose()
        .map_err(ApiError::BadRequest)?;
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    let jobs = state.store.list_jobs(status, limit)?;

    Ok(Json(ListJobsResponse {
        jobs: jobs.into_iter().map(JobView::from).collect(),
    }))
}

/// Give a failed job a fresh set of attempts.
pub async fn retry_job(
    _admin: AdminAuth,
    State(state): State<Arc<AppState>>,
    Path(transaction_id): Path<String>,
) -> Result<Json<JobView>, ApiError> {
    let transaction_id = TransactionId::new(transaction_id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid transaction id: {e}")))?;

    let mut job = state
        .store
        .get_job(&transaction_id)?
        .ok_or_else(|| ApiError::NotFound(format!("No queued job for {transaction_id}")))?;

    if !job.requeue(Utc::now()) {
        return Err(ApiError::Conflict(format!(
            "Job for {transaction_id} is {}, only failed jobs can be retried",
            job.status.as_str()
        )));
    }

    if !state.store.update_job_if_present(&job)? {
        return Err(ApiError::NotFound(format!("No queued job for {transaction_id}")));
    }
    tracing::info!(transaction_id = %transaction_id, "Failed job requeued by operator");

    Ok(Json(job.into()))
}
