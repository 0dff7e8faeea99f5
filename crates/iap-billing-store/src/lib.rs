//! Storage layer for iap-billing.
//!
//! This crate provides persistent storage for the verification queue, the
//! receipt audit table and the subscriptions table.
//!
//! # Architecture
//!
//! Three tables, each a plain keyed map:
//!
//! - `queue_jobs`: outstanding verification jobs, keyed by `transaction_id`
//! - `receipts`: one audit row per purchase transaction, keyed by `transaction_id`
//! - `subscriptions`: one row per renewal lineage, keyed by `original_transaction_id`
//!
//! Every write is a keyed upsert, so replaying the same write (for example
//! when two processor runs overlap) leaves the tables in the same state.
//!
//! Two backends implement [`Store`]: [`RocksStore`] (feature
//! `rocksdb-backend`, on by default) and [`MemoryStore`].
//!
//! # Example
//!
//! ```
//! use chrono::Utc;
//! use iap_billing_core::{JobPayload, QueueJob, TransactionId};
//! use iap_billing_store::{Enqueued, MemoryStore, Store};
//!
//! let store = MemoryStore::new();
//! let now = Utc::now();
//! let payload = JobPayload {
//!     transaction_id: TransactionId::new("tx1").unwrap(),
//!     raw_receipt: None,
//!     product_id: None,
//!     user_id: None,
//!     email: None,
//!     enqueued_at: now,
//! };
//!
//! let first = store.insert_job_if_absent(&QueueJob::new(payload.clone(), now)).unwrap();
//! let second = store.insert_job_if_absent(&QueueJob::new(payload, now)).unwrap();
//! assert!(matches!(first, Enqueued::Inserted(_)));
//! assert!(matches!(second, Enqueued::Existing(_)));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod memory;
#[cfg(feature = "rocksdb-backend")]
pub mod rocks;
pub mod schema;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
#[cfg(feature = "rocksdb-backend")]
pub use rocks::RocksStore;

use chrono::{DateTime, Utc};
use iap_billing_core::{
    JobStatus, OriginalTransactionId, QueueJob, Receipt, RetryPolicy, Subscription, TransactionId,
};

/// Result of an idempotent enqueue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enqueued {
    /// The job was written.
    Inserted(QueueJob),
    /// A job for the transaction already existed and was left unchanged.
    Existing(QueueJob),
}

impl Enqueued {
    /// The job now stored for the transaction.
    #[must_use]
    pub fn job(&self) -> &QueueJob {
        match self {
            Self::Inserted(job) | Self::Existing(job) => job,
        }
    }

    /// Whether this call created the job.
    #[must_use]
    pub fn is_new(&self) -> bool {
        matches!(self, Self::Inserted(_))
    }
}

/// The storage trait defining all database operations.
///
/// This trait abstracts the storage layer, allowing for different implementations
/// (e.g., `RocksDB`, in-memory for testing).
pub trait Store: Send + Sync {
    // =========================================================================
    // Queue Operations
    // =========================================================================

    /// Insert a job unless one already exists for its transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn insert_job_if_absent(&self, job: &QueueJob) -> Result<Enqueued>;

    /// Get a job by transaction ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_job(&self, transaction_id: &TransactionId) -> Result<Option<QueueJob>>;

    /// Insert or replace a job.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_job(&self, job: &QueueJob) -> Result<()>;

    /// Replace a job only if a row for its transaction still exists.
    ///
    /// Returns `false`, writing nothing, when the job has been removed. The
    /// processor claims and updates jobs through this so that a run holding
    /// a stale snapshot cannot recreate a job another run already completed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn update_job_if_present(&self, job: &QueueJob) -> Result<bool>;

    /// Remove a job. Removing a job that does not exist succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn delete_job(&self, transaction_id: &TransactionId) -> Result<()>;

    /// Jobs due at `now` under `policy`, oldest first, at most `limit`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_due_jobs(
        &self,
        now: DateTime<Utc>,
        policy: &RetryPolicy,
        limit: usize,
    ) -> Result<Vec<QueueJob>>;

    /// Jobs with the given status (all jobs for `None`), oldest first, at most `limit`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_jobs(&self, status: Option<JobStatus>, limit: usize) -> Result<Vec<QueueJob>>;

    // =========================================================================
    // Receipt Operations
    // =========================================================================

    /// Get a receipt by transaction ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_receipt(&self, transaction_id: &TransactionId) -> Result<Option<Receipt>>;

    /// Insert or replace a receipt.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_receipt(&self, receipt: &Receipt) -> Result<()>;

    // =========================================================================
    // Subscription Operations
    // =========================================================================

    /// Get a subscription by original transaction ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_subscription(
        &self,
        original_transaction_id: &OriginalTransactionId,
    ) -> Result<Option<Subscription>>;

    /// Insert or replace a subscription.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_subscription(&self, subscription: &Subscription) -> Result<()>;
}

/// Order jobs FIFO by creation time and keep the first `limit`.
pub(crate) fn oldest_first(mut jobs: Vec<QueueJob>, limit: usize) -> Vec<QueueJob> {
    jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    jobs.truncate(limit);
    jobs
}
