//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, IteratorMode, MultiThreaded,
    Options,
};

use iap_billing_core::{
    JobStatus, OriginalTransactionId, QueueJob, Receipt, RetryPolicy, Subscription, TransactionId,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::{oldest_first, Enqueued, Store};

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    /// Serializes queue writes so conditional writes see a stable row.
    queue_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            queue_lock: Mutex::new(()),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn get_value<T: serde::de::DeserializeOwned>(
        &self,
        family: &str,
        key: &[u8],
    ) -> Result<Option<T>> {
        let cf = self.cf(family)?;
        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn put_value<T: serde::Serialize>(&self, family: &str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.cf(family)?;
        let value = Self::serialize(value)?;
        self.db
            .put_cf(&cf, key, value)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn lock_queue(&self) -> Result<MutexGuard<'_, ()>> {
        self.queue_lock
            .lock()
            .map_err(|_| StoreError::Database("queue lock poisoned".into()))
    }

    fn write_job(&self, job: &QueueJob) -> Result<()> {
        self.put_value(cf::QUEUE_JOBS, &keys::job_key(&job.transaction_id), job)
    }

    /// Scan the whole queue table.
    ///
    /// The queue only holds outstanding work, so a full scan stays small.
    fn scan_jobs(&self) -> Result<Vec<QueueJob>> {
        let cf = self.cf(cf::QUEUE_JOBS)?;
        let mut jobs = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            jobs.push(Self::deserialize(&value)?);
        }
        Ok(jobs)
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Queue Operations
    // =========================================================================

    fn insert_job_if_absent(&self, job: &QueueJob) -> Result<Enqueued> {
        let _guard = self.lock_queue()?;

        if let Some(existing) = self.get_job(&job.transaction_id)? {
            return Ok(Enqueued::Existing(existing));
        }

        self.write_job(job)?;
        Ok(Enqueued::Inserted(job.clone()))
    }

    fn get_job(&self, transaction_id: &TransactionId) -> Result<Option<QueueJob>> {
        self.get_value(cf::QUEUE_JOBS, &keys::job_key(transaction_id))
    }

    fn put_job(&self, job: &QueueJob) -> Result<()> {
        let _guard = self.lock_queue()?;
        self.write_job(job)
    }

    fn update_job_if_present(&self, job: &QueueJob) -> Result<bool> {
        let _guard = self.lock_queue()?;

        if self.get_job(&job.transaction_id)?.is_none() {
            return Ok(false);
        }

        self.write_job(job)?;
        Ok(true)
    }

    fn delete_job(&self, transaction_id: &TransactionId) -> Result<()> {
        let _guard = self.lock_queue()?;
        let cf = self.cf(cf::QUEUE_JOBS)?;
        self.db
            .delete_cf(&cf, keys::job_key(transaction_id))
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn list_due_jobs(
        &self,
        now: DateTime<Utc>,
        policy: &RetryPolicy,
        limit: usize,
    ) -> Result<Vec<QueueJob>> {
        let due = self
            .scan_jobs()?
            .into_iter()
            .filter(|job| job.is_due(now, policy))
            .collect();
        Ok(oldest_first(due, limit))
    }

    fn list_jobs(&self, status: Option<JobStatus>, limit: usize) -> Result<Vec<QueueJob>> {
        let jobs = self
            .scan_jobs()?
            .into_iter()
            .filter(|job| status.map_or(true, |s| job.status == s))
            .collect();
        Ok(oldest_first(jobs, limit))
    }

    // =========================================================================
    // Receipt Operations
    // =========================================================================

    fn get_receipt(&self, transaction_id: &TransactionId) -> Result<Option<Receipt>> {
        self.get_value(cf::RECEIPTS, &keys::receipt_key(transaction_id))
    }

    fn put_receipt(&self, receipt: &Receipt) -> Result<()> {
        self.put_value(
            cf::RECEIPTS,
            &keys::receipt_key(&receipt.transaction_id),
            receipt,
        )
    }

    // =========================================================================
    // Subscription Operations
    // =========================================================================

    fn get_subscription(
        &self,
        original_transaction_id: &OriginalTransactionId,
    ) -> Result<Option<Subscription>> {
        self.get_value(
            cf::SUBSCRIPTIONS,
            &keys::subscription_key(original_transaction_id),
        )
    }

    fn put_subscription(&self, subscription: &Subscription) -> Result<()> {
        self.put_value(
            cf::SUBSCRIPTIONS,
            &keys::subscription_key(&subscription.original_transaction_id),
            subscription,
        )
    }
}
