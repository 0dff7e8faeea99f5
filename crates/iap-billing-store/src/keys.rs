//! Key encoding utilities for `RocksDB`.
//!
//! Every table is keyed by a platform identifier, so keys are the UTF-8
//! bytes of that identifier.

use iap_billing_core::{OriginalTransactionId, TransactionId};

/// Create a queue job key from a transaction ID.
#[must_use]
pub fn job_key(transaction_id: &TransactionId) -> Vec<u8> {
    transaction_id.as_str().as_bytes().to_vec()
}

/// Create a receipt key from a transaction ID.
#[must_use]
pub fn receipt_key(transaction_id: &TransactionId) -> Vec<u8> {
    transaction_id.as_str().as_bytes().to_vec()
}

/// Create a subscription key from an original transaction ID.
#[must_use]
pub fn subscription_key(original_transaction_id: &OriginalTransactionId) -> Vec<u8> {
    original_transaction_id.as_str().as_bytes().to_vec()
}
