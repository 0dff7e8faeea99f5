//! Direct receipt verification handler.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use iap_billing_core::{Plan, TransactionId};

use super::non_empty;
use crate::apple::types::string_or_number;
use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::state::AppState;
use crate::verification::{verify_receipt as verify, VerifyInput};

/// Receipt verification request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyReceiptRequest {
    /// Purchase transaction. Numeric ids are accepted.
    #[serde(default, deserialize_with = "string_or_number")]
    pub transaction_id: Option<String>,
    /// Base64 receipt blob.
    pub raw_receipt: Option<String>,
    /// Store product identifier.
    pub product_id: Option<String>,
    /// Internal user.
    pub user_id: Option<String>,
}

/// Summary of Apple's answer.
#[derive(Debug, Serialize)]
pub struct AppleResponseSummary {
    /// Apple `status` field.
    pub status: i64,
    /// Environment that answered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
}

/// Receipt verification response.
///
/// Returned with HTTP 200 whether or not the receipt verified.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyReceiptResponse {
    /// The request was handled.
    pub ok: bool,
    /// Apple accepted the receipt and a renewal was recorded.
    pub verified: bool,
    /// Plan granted by the receipt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<Plan>,
    /// Apple's verdict.
    pub apple_resp: AppleResponseSummary,
    /// Why the receipt did not verify.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Verify a receipt with Apple and record the subscription.
pub async fn verify_receipt(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<VerifyReceiptRequest>,
) -> Result<Json<VerifyReceiptResponse>, ApiError> {
    let (Some(transaction_id), Some(raw_receipt), Some(product_id)) = (
        non_empty(request.transaction_id),
        non_empty(request.raw_receipt),
        non_empty(request.product_id),
    ) else {
        return Err(ApiError::BadRequest(
            "Missing required fields: transactionId, rawReceipt, productId".into(),
        ));
    };

    let input = VerifyInput {
        transaction_id: TransactionId::new(transaction_id)
            .map_err(|e| ApiError::BadRequest(format!("Invalid transactionId: {e}")))?,
        raw_receipt,
        product_id: Some(product_id),
        user_id: non_empty(request.user_id),
    };

    let outcome = verify(state.store.as_ref(), &state.apple, &input, Utc::now()).await?;

    Ok(Json(VerifyReceiptResponse {
        ok: true,
        verified: outcome.verified,
        plan: outcome.plan,
        apple_resp: AppleResponseSummary {
            status: outcome.apple_status,
            environment: outcome.environment,
        },
        error: outcome.error,
    }))
}
