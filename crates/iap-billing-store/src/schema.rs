//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Outstanding verification jobs, keyed by `transaction_id`.
    pub const QUEUE_JOBS: &str = "queue_jobs";

    /// Receipt audit rows, keyed by `transaction_id`.
    pub const RECEIPTS: &str = "receipts";

    /// Subscriptions, keyed by `original_transaction_id`.
    pub const SUBSCRIPTIONS: &str = "subscriptions";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![cf::QUEUE_JOBS, cf::RECEIPTS, cf::SUBSCRIPTIONS]
}
