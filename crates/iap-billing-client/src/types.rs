//! Request and response types for the iap-billing client.

use serde::{Deserialize, Serialize};

pub use iap_billing_core::Plan;

/// Purchase to hand to the verification queue.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueRequest {
    /// Store transaction identifier.
    pub transaction_id: String,
    /// Base64 receipt blob.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_receipt: Option<String>,
    /// Store product identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    /// Internal user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Contact email.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Enqueue response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueResponse {
    /// Whether the request succeeded.
    pub ok: bool,
    /// Human readable result.
    pub message: String,
    /// The queued transaction.
    pub transaction_id: String,
    /// Identifier of the job holding the transaction.
    pub queue_id: String,
}

/// Receipt to verify immediately.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyReceiptRequest {
    /// Store transaction identifier.
    pub transaction_id: String,
    /// Base64 receipt blob.
    pub raw_receipt: String,
    /// Store product identifier.
    pub product_id: String,
    /// Internal user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Apple's verdict as relayed by the service.
#[derive(Debug, Clone, Deserialize)]
pub struct AppleResponseSummary {
    /// Apple `status` field, `0` when valid.
    pub status: i64,
    /// `Production` or `Sandbox`.
    #[serde(default)]
    pub environment: Option<String>,
}

/// Receipt verification response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyReceiptResponse {
    /// Whether the request was handled.
    pub ok: bool,
    /// Whether the receipt verified.
    pub verified: bool,
    /// Plan granted by the receipt.
    #[serde(default)]
    pub plan: Option<Plan>,
    /// Apple's verdict.
    pub apple_resp: AppleResponseSummary,
    /// Why the receipt did not verify.
    #[serde(default)]
    pub error: Option<String>,
}

/// Counts for one processor run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct QueueRunResults {
    /// Jobs claimed.
    pub processed: u64,
    /// Jobs verified and removed.
    pub succeeded: u64,
    /// Jobs rescheduled.
    pub retried: u64,
    /// Jobs that exhausted their attempts.
    pub failed: u64,
}

/// Processor trigger response.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessQueueResponse {
    /// Whether the run completed.
    pub ok: bool,
    /// Human readable result.
    pub message: String,
    /// Counts for the run.
    pub results: QueueRunResults,
}

/// Health check response.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Service name.
    pub service: String,
    /// Service version.
    pub version: String,
}

/// API error response.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiErrorResponse {
    pub error: ApiErrorBody,
}

/// API error body.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiErrorBody {
    pub code: String,
    pub message: String,
}
