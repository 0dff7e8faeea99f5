//! Post-purchase verification queue types.
//!
//! A `QueueJob` exists for every purchase that still needs to be reconciled
//! against the platform store. The row is deleted once the receipt verifies,
//! so the queue only ever holds outstanding or permanently failed work.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{JobId, TransactionId};

// ============================================================================
// Constants
// ============================================================================

/// Number of verification attempts before a job is parked as `Failed`.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Base retry delay in seconds (doubled per attempt).
pub const DEFAULT_BASE_DELAY_SECONDS: u64 = 60;

/// Ceiling for the retry delay in seconds.
pub const DEFAULT_MAX_DELAY_SECONDS: u64 = 3600;

/// Longest error message kept on a job.
const MAX_ERROR_MESSAGE_LEN: usize = 1024;

/// Exponential backoff and cutoff settings for the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after which a job becomes terminal.
    pub max_attempts: u32,
    /// Delay multiplied by `2^attempts`.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_secs(DEFAULT_BASE_DELAY_SECONDS),
            max_delay: Duration::from_secs(DEFAULT_MAX_DELAY_SECONDS),
        }
    }
}

impl RetryPolicy {
    /// Delay before the next attempt once `attempts` attempts have been made.
    ///
    /// `min(base_delay * 2^attempts, max_delay)`, saturating on overflow.
    #[must_use]
    pub fn backoff(&self, attempts: u32) -> Duration {
        let factor = 1u32.checked_shl(attempts).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Timestamp at which a job with `attempts` attempts becomes due again.
    #[must_use]
    pub fn next_attempt_at(&self, attempts: u32, now: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::from_std(self.backoff(attempts))
            .ok()
            .and_then(|delay| now.checked_add_signed(delay))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Status of a queue job. A deleted row means the job succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for its next attempt.
    Pending,
    /// Picked up by a processor run. Still eligible, so a crashed run is retried.
    Processing,
    /// Exhausted its attempts; kept for inspection, never selected again.
    Failed,
}

impl JobStatus {
    /// Wire name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// Everything the verifier needs, captured at enqueue time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPayload {
    /// The purchase transaction.
    pub transaction_id: TransactionId,
    /// Base64 receipt blob from the client.
    pub raw_receipt: Option<String>,
    /// Store product identifier.
    pub product_id: Option<String>,
    /// Internal user the purchase belongs to.
    pub user_id: Option<String>,
    /// Contact email supplied by the client.
    pub email: Option<String>,
    /// When the purchase was enqueued.
    pub enqueued_at: DateTime<Utc>,
}

/// Outcome of recording a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// The job was rescheduled.
    Retry {
        /// When the job becomes due again.
        next_attempt_at: DateTime<Utc>,
    },
    /// The job reached `max_attempts` and is now `Failed`.
    Exhausted,
}

/// A pending verification job, unique per transaction id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueJob {
    /// Queue-assigned identifier.
    pub id: JobId,
    /// The purchase transaction (unique key).
    pub transaction_id: TransactionId,
    /// Verifier input.
    pub payload: JobPayload,
    /// Verification attempts made so far.
    pub attempts: u32,
    /// Current status.
    pub status: JobStatus,
    /// Earliest time the job may be processed.
    pub next_attempt_at: DateTime<Utc>,
    /// Reason for the last failure.
    pub error_message: Option<String>,
    /// When the job was enqueued.
    pub created_at: DateTime<Utc>,
    /// When the job was last changed.
    pub updated_at: DateTime<Utc>,
}

impl QueueJob {
    /// Create a job that is due immediately.
    #[must_use]
    pub fn new(payload: JobPayload, now: DateTime<Utc>) -> Self {
        Self {
            id: JobId::generate(),
            transaction_id: payload.transaction_id.clone(),
            payload,
            attempts: 0,
            status: JobStatus::Pending,
            next_attempt_at: now,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether a processor run at `now` should pick this job up.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>, policy: &RetryPolicy) -> bool {
        matches!(self.status, JobStatus::Pending | JobStatus::Processing)
            && self.attempts < policy.max_attempts
            && self.next_attempt_at <= now
    }

    /// Claim the job for the current run.
    pub fn mark_processing(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Processing;
        self.updated_at = now;
    }

    /// Record a failed attempt and move the job to `Pending` or `Failed`.
    pub fn record_failure(
        &mut self,
        error: impl Into<String>,
        now: DateTime<Utc>,
        policy: &RetryPolicy,
    ) -> FailureDisposition {
        self.attempts = self.attempts.saturating_add(1).min(policy.max_attempts);
        self.error_message = Some(truncate(error.into()));
        self.updated_at = now;

        if self.attempts >= policy.max_attempts {
            self.status = JobStatus::Failed;
            FailureDisposition::Exhausted
        } else {
            self.status = JobStatus::Pending;
            self.next_attempt_at = policy.next_attempt_at(self.attempts, now);
            FailureDisposition::Retry {
                next_attempt_at: self.next_attempt_at,
            }
        }
    }

    /// Give a `Failed` job a fresh set of attempts.
    ///
    /// Returns `false` (and changes nothing) for jobs that are not `Failed`.
    pub fn requeue(&mut self, now: DateTime<Utc>) -> bool {
        if self.status != JobStatus::Failed {
            return false;
        }
        self.status = JobStatus::Pending;
        self.attempts = 0;
        self.next_attempt_at = now;
        self.error_message = None;
        self.updated_at = now;
        true
    }
}

fn truncate(mut message: String) -> String {
    if message.len() > MAX_ERROR_MESSAGE_LEN {
        let mut cut = MAX_ERROR_MESSAGE_LEN;
        while !message.is_char_boundary(cut) {
            cut -= 1;
        }
        message.truncate(cut);
    }
    message
}
