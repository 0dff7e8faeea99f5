//! Verification queue processor.
//!
//! A run claims up to `queue_batch_size` due jobs, oldest first, and drives
//! each one through `Pending -> Processing -> {deleted | Pending | Failed}`.
//! Jobs are independent: a failure in one never aborts the rest of the batch.
//!
//! Every side effect is a keyed upsert or an idempotent delete, so two
//! overlapping runs that pick the same job leave the store consistent. Queue
//! rows are only rewritten while they still exist, so a run holding a stale
//! snapshot never brings back a job another run already removed.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;

use iap_billing_core::{FailureDisposition, QueueJob};
use iap_billing_store::StoreError;

use crate::state::AppState;
use crate::verification::{verify_receipt, VerifyInput};

/// Counts for one processor run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueRunSummary {
    /// Jobs claimed by this run.
    pub processed: usize,
    /// Jobs verified and removed from the queue.
    pub succeeded: usize,
    /// Jobs rescheduled with backoff.
    pub retried: usize,
    /// Jobs that exhausted their attempts.
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobOutcome {
    Succeeded,
    Retried,
    Failed,
}

impl QueueRunSummary {
    fn record(&mut self, outcome: JobOutcome) {
        self.processed += 1;
        match outcome {
            JobOutcome::Succeeded => self.succeeded += 1,
            JobOutcome::Retried => self.retried += 1,
            JobOutcome::Failed => self.failed += 1,
        }
    }
}

/// Run one pass over the queue.
///
/// # Errors
///
/// Returns an error only when the due jobs cannot be selected.
pub async fn process_queue(
    state: &AppState,
    now: DateTime<Utc>,
) -> Result<QueueRunSummary, StoreError> {
    let policy = state.retry_policy;
    let jobs = state
        .store
        .list_due_jobs(now, &policy, state.config.queue_batch_size)?;

    if jobs.is_empty() {
        tracing::debug!("No due jobs in verification queue");
        return Ok(QueueRunSummary::default());
    }

    tracing::info!(count = jobs.len(), "Processing verification queue");

    let outcomes: Vec<Option<JobOutcome>> = stream::iter(jobs)
        .map(|job| process_job(state, job, now))
        .buffer_unordered(state.config.queue_concurrency.max(1))
        .collect()
        .await;

    let summary = outcomes
        .into_iter()
        .flatten()
        .fold(QueueRunSummary::default(), |mut summary, outcome| {
            summary.record(outcome);
            summary
        });

    tracing::info!(
        processed = summary.processed,
        succeeded = summary.succeeded,
        retried = summary.retried,
        failed = summary.failed,
        "Verification queue run complete"
    );

    Ok(summary)
}

/// Drive one job. `None` means another run completed it first.
async fn process_job(
    state: &AppState,
    mut job: QueueJob,
    now: DateTime<Utc>,
) -> Option<JobOutcome> {
    let transaction_id = job.transaction_id.clone();

    job.mark_processing(now);
    match state.store.update_job_if_present(&job) {
        Ok(true) => {}
        Ok(false) => {
            tracing::debug!(transaction_id = %transaction_id, "Job already completed, skipping");
            return None;
        }
        Err(e) => {
            tracing::error!(
                transaction_id = %transaction_id,
                error = %e,
                "Failed to claim queue job"
            );
            return Some(JobOutcome::Retried);
        }
    }

    let failure = match attempt(state, &job, now).await {
        Ok(()) => {
            return Some(match state.store.delete_job(&transaction_id) {
                Ok(()) => JobOutcome::Succeeded,
                Err(e) => {
                    // Processing jobs stay selectable, so the next run re-verifies it.
                    tracing::error!(
                        transaction_id = %transaction_id,
                        error = %e,
                        "Verified job could not be removed from queue"
                    );
                    JobOutcome::Retried
                }
            });
        }
        Err(message) => message,
    };

    let disposition = job.record_failure(&failure, now, &state.retry_policy);

    match state.store.update_job_if_present(&job) {
        Ok(true) => {}
        Ok(false) => {
            tracing::debug!(
                transaction_id = %transaction_id,
                "Job completed by another run, failure discarded"
            );
            return None;
        }
        Err(e) => {
            // The row is still Processing and due, so the next run picks it up.
            tracing::error!(
                transaction_id = %transaction_id,
                error = %e,
                "Failed to persist queue job failure"
            );
            return Some(JobOutcome::Retried);
        }
    }

    Some(match disposition {
        FailureDisposition::Retry { next_attempt_at } => {
            tracing::warn!(
                transaction_id = %transaction_id,
                attempts = job.attempts,
                next_attempt_at = %next_attempt_at,
                error = %failure,
                "Verification failed, rescheduled"
            );
            JobOutcome::Retried
        }
        FailureDisposition::Exhausted => {
            tracing::error!(
                transaction_id = %transaction_id,
                attempts = job.attempts,
                error = %failure,
                "Verification failed, giving up"
            );
            JobOutcome::Failed
        }
    })
}

/// Verify one job. `Err` carries the message recorded on the job.
async fn attempt(state: &AppState, job: &QueueJob, now: DateTime<Utc>) -> Result<(), String> {
    let Some(raw_receipt) = job.payload.raw_receipt.clone() else {
        return Err("Job has no receipt data".to_string());
    };

    let input = VerifyInput {
        transaction_id: job.transaction_id.clone(),
        raw_receipt,
        product_id: job.payload.product_id.clone(),
        user_id: job.payload.user_id.clone(),
    };

    match verify_receipt(state.store.as_ref(), &state.apple, &input, now).await {
        Ok(outcome) if outcome.verified => Ok(()),
        Ok(outcome) => Err(outcome
            .error
            .unwrap_or_else(|| "Receipt verification failed".to_string())),
        Err(e) => Err(e.to_string()),
    }
}
