//! Receipt audit records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::TransactionId;

/// Verdict recorded for a receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    /// The platform confirmed the receipt and a renewal entry was found.
    Verified,
    /// The platform rejected the receipt or returned no usable entry.
    Failed,
}

/// One row per purchase transaction, rewritten on every verification attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    /// The purchase transaction (unique key).
    pub transaction_id: TransactionId,
    /// Internal user, when known.
    pub user_id: Option<String>,
    /// Store product identifier.
    pub product_id: String,
    /// Receipt blob as submitted.
    pub raw_receipt: String,
    /// Latest verdict.
    pub verification_status: VerificationStatus,
    /// Raw platform response, kept for audit.
    pub verification_response: serde_json::Value,
    /// Number of verification attempts recorded.
    pub attempts: u32,
    /// When the latest attempt ran.
    pub last_attempt_at: DateTime<Utc>,
    /// When the row was first written.
    pub created_at: DateTime<Utc>,
    /// When the row was last written.
    pub updated_at: DateTime<Utc>,
}

impl Receipt {
    /// Build the row for a verification attempt, folding in any previous row.
    ///
    /// Attempts accumulate and the original `created_at` is kept; a `None`
    /// user never erases a user recorded earlier.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn record_attempt(
        previous: Option<Self>,
        transaction_id: TransactionId,
        user_id: Option<String>,
        product_id: String,
        raw_receipt: String,
        verification_status: VerificationStatus,
        verification_response: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Self {
        let (attempts, created_at, previous_user) = previous.map_or((0, now, None), |p| {
            (p.attempts, p.created_at, p.user_id)
        });

        Self {
            transaction_id,
            user_id: user_id.or(previous_user),
            product_id,
            raw_receipt,
            verification_status,
            verification_response,
            attempts: attempts.saturating_add(1),
            last_attempt_at: now,
            created_at,
            updated_at: now,
        }
    }
}
