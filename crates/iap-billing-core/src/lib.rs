//! Core types for iap-billing.
//!
//! This crate provides the domain types shared by the store, the service and
//! the client SDK:
//!
//! - **Identifiers**: `TransactionId`, `OriginalTransactionId`, `JobId`
//! - **Queue**: `QueueJob`, `JobStatus`, `JobPayload`, `RetryPolicy`
//! - **Receipts**: `Receipt`, `VerificationStatus`
//! - **Subscriptions**: `Subscription`, `Plan`, `SubscriptionStatus`, `BillingPeriod`
//!
//! # Queue lifecycle
//!
//! A purchase is enqueued as a `Pending` job. The processor marks it
//! `Processing`, asks the store for a verdict and then either deletes the job
//! (verified), reschedules it with exponential backoff (`Pending`), or parks
//! it as `Failed` once `RetryPolicy::max_attempts` is reached.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod ids;
pub mod queue;
pub mod receipt;
pub mod subscription;

pub use ids::{IdError, JobId, OriginalTransactionId, TransactionId};
pub use queue::{
    FailureDisposition, JobPayload, JobStatus, QueueJob, RetryPolicy, DEFAULT_BASE_DELAY_SECONDS,
    DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY_SECONDS,
};
pub use receipt::{Receipt, VerificationStatus};
pub use subscription::{BillingPeriod, Plan, Subscription, SubscriptionStatus};
