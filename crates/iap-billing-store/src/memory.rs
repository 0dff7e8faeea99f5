//! In-memory storage implementation.
//!
//! Used by tests and by service builds without the `RocksDB` backend. Data
//! lives only as long as the process.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use iap_billing_core::{
    JobStatus, OriginalTransactionId, QueueJob, Receipt, RetryPolicy, Subscription, TransactionId,
};

use crate::error::{Result, StoreError};
use crate::{oldest_first, Enqueued, Store};

/// `HashMap`-backed storage implementation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    jobs: RwLock<HashMap<TransactionId, QueueJob>>,
    receipts: RwLock<HashMap<TransactionId, Receipt>>,
    subscriptions: RwLock<HashMap<OriginalTransactionId, Subscription>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|_| StoreError::Database("lock poisoned".into()))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|_| StoreError::Database("lock poisoned".into()))
}

impl Store for MemoryStore {
    fn insert_job_if_absent(&self, job: &QueueJob) -> Result<Enqueued> {
        let mut jobs = write(&self.jobs)?;
        if let Some(existing) = jobs.get(&job.transaction_id) {
            return Ok(Enqueued::Existing(existing.clone()));
        }
        jobs.insert(job.transaction_id.clone(), job.clone());
        Ok(Enqueued::Inserted(job.clone()))
    }

    fn get_job(&self, transaction_id: &TransactionId) -> Result<Option<QueueJob>> {
        Ok(read(&self.jobs)?.get(transaction_id).cloned())
    }

    fn put_job(&self, job: &QueueJob) -> Result<()> {
        write(&self.jobs)?.insert(job.transaction_id.clone(), job.clone());
        Ok(())
    }

    fn update_job_if_present(&self, job: &QueueJob) -> Result<bool> {
        let mut jobs = write(&self.jobs)?;
        match jobs.get_mut(&job.transaction_id) {
            Some(stored) => {
                stored.clone_from(job);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn delete_job(&self, transaction_id: &TransactionId) -> Result<()> {
        write(&self.jobs)?.remove(transaction_id);
        Ok(())
    }

    fn list_due_jobs(
        &self,
        now: DateTime<Utc>,
        policy: &RetryPolicy,
        limit: usize,
    ) -> Result<Vec<QueueJob>> {
        let due = read(&self.jobs)?
            .values()
            .filter(|job| job.is_due(now, policy))
            .cloned()
            .collect();
        Ok(oldest_first(due, limit))
    }

    fn list_jobs(&self, status: Option<JobStatus>, limit: usize) -> Result<Vec<QueueJob>> {
        let jobs = read(&self.jobs)?
            .values()
            .filter(|job| status.map_or(true, |s| job.status == s))
            .cloned()
            .collect();
        Ok(oldest_first(jobs, limit))
    }

    fn get_receipt(&self, transaction_id: &TransactionId) -> Result<Option<Receipt>> {
        Ok(read(&self.receipts)?.get(transaction_id).cloned())
    }

    fn put_receipt(&self, receipt: &Receipt) -> Result<()> {
        write(&self.receipts)?.insert(receipt.transaction_id.clone(), receipt.clone());
        Ok(())
    }

    fn get_subscription(
        &self,
        original_transaction_id: &OriginalTransactionId,
    ) -> Result<Option<Subscription>> {
        Ok(read(&self.subscriptions)?
            .get(original_transaction_id)
            .cloned())
    }

    fn put_subscription(&self, subscription: &Subscription) -> Result<()> {
        write(&self.subscriptions)?.insert(
            subscription.original_transaction_id.clone(),
            subscription.clone(),
        );
        Ok(())
    }
}
