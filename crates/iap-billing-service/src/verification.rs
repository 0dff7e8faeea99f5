//! Receipt verification.
//!
//! One routine serves both `/verify-receipt` and the queue processor: ask
//! Apple, record the attempt in the receipt audit table and, when Apple
//! confirms a renewal, upsert the subscription for its lineage.

use chrono::{DateTime, Utc};

use iap_billing_core::{
    BillingPeriod, OriginalTransactionId, Plan, Receipt, Subscription, TransactionId,
    VerificationStatus,
};
use iap_billing_store::{Store, StoreError};

use crate::apple::{
    latest_renewal, AppleClient, AppleError, AppleStatus, ReceiptInfo, VerifyReceiptResponse,
};

/// A receipt to verify.
#[derive(Debug, Clone)]
pub struct VerifyInput {
    /// Purchase transaction.
    pub transaction_id: TransactionId,
    /// Base64 receipt blob.
    pub raw_receipt: String,
    /// Product the client purchased. Falls back to the product Apple reports.
    pub product_id: Option<String>,
    /// Internal user, when known.
    pub user_id: Option<String>,
}

/// Result of a verification that reached Apple.
#[derive(Debug, Clone)]
pub struct VerificationOutcome {
    /// Apple accepted the receipt and a renewal entry was found.
    pub verified: bool,
    /// Plan of the verified product.
    pub plan: Option<Plan>,
    /// Apple `status` field.
    pub apple_status: i64,
    /// Environment that answered.
    pub environment: Option<String>,
    /// Why verification failed.
    pub error: Option<String>,
    /// Subscription row written on success.
    pub subscription: Option<Subscription>,
}

/// Verification could not reach a verdict.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    /// Apple could not be reached or answered garbage.
    #[error("Apple verification request failed: {0}")]
    Upstream(#[from] AppleError),

    /// Persisting the result failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Verify a receipt with Apple and persist the result.
///
/// Logical rejections (non-zero Apple status, no renewal entry) are reported
/// through [`VerificationOutcome::verified`]; only transport and storage
/// failures are errors.
pub async fn verify_receipt(
    store: &dyn Store,
    apple: &AppleClient,
    input: &VerifyInput,
    now: DateTime<Utc>,
) -> Result<VerificationOutcome, VerifyError> {
    let verification = apple.verify_with_fallback(&input.raw_receipt).await?;
    let response = &verification.response;
    let environment = Some(verification.environment_name());

    let latest = if verification.is_valid() {
        latest_renewal(response.renewal_entries())
    } else {
        None
    };

    let product_id = input
        .product_id
        .clone()
        .or_else(|| latest.and_then(|entry| entry.product_id.clone()))
        .unwrap_or_default();

    let error = if !verification.is_valid() {
        Some(format!(
            "Apple verification failed with status {}: {}",
            response.status,
            AppleStatus::message(response.status)
        ))
    } else if latest.is_none() {
        Some("No receipt info in Apple response".to_string())
    } else {
        None
    };

    let status = if error.is_none() {
        VerificationStatus::Verified
    } else {
        VerificationStatus::Failed
    };

    let previous = store.get_receipt(&input.transaction_id)?;
    let receipt = Receipt::record_attempt(
        previous,
        input.transaction_id.clone(),
        input.user_id.clone(),
        product_id.clone(),
        input.raw_receipt.clone(),
        status,
        verification.raw.clone(),
        now,
    );
    store.put_receipt(&receipt)?;

    let Some(latest) = latest.filter(|_| error.is_none()) else {
        tracing::info!(
            transaction_id = %input.transaction_id,
            apple_status = response.status,
            error = error.as_deref().unwrap_or_default(),
            "Receipt not verified"
        );
        return Ok(VerificationOutcome {
            verified: false,
            plan: None,
            apple_status: response.status,
            environment,
            error,
            subscription: None,
        });
    };

    let subscription = apply_renewal(store, input, response, latest, &product_id, now)?;

    tracing::info!(
        transaction_id = %input.transaction_id,
        original_transaction_id = %subscription.original_transaction_id,
        plan = %subscription.plan,
        status = ?subscription.status,
        "Receipt verified"
    );

    Ok(VerificationOutcome {
        verified: true,
        plan: Some(subscription.plan),
        apple_status: response.status,
        environment,
        error: None,
        subscription: Some(subscription),
    })
}

/// Upsert the subscription for the lineage of `latest`.
///
/// A verified renewal always leaves the row `Active`; later lifecycle
/// changes arrive through server notifications.
fn apply_renewal(
    store: &dyn Store,
    input: &VerifyInput,
    response: &VerifyReceiptResponse,
    latest: &ReceiptInfo,
    product_id: &str,
    now: DateTime<Utc>,
) -> Result<Subscription, StoreError> {
    let start = latest.purchased_at().unwrap_or(now);
    let end = latest
        .expires_at()
        .unwrap_or_else(|| BillingPeriod::from_product_id(product_id).end_from(start));

    let transaction_id = latest
        .transaction_id
        .as_deref()
        .and_then(|id| TransactionId::new(id).ok())
        .unwrap_or_else(|| input.transaction_id.clone());
    let original_transaction_id = latest
        .original_transaction_id
        .as_deref()
        .and_then(|id| OriginalTransactionId::new(id).ok())
        .unwrap_or_else(|| input.transaction_id.clone().into());

    let mut subscription = match store.get_subscription(&original_transaction_id)? {
        Some(mut existing) => {
            existing.renew(transaction_id, start, end, now);
            existing.product_id = product_id.to_string();
            existing.plan = Plan::from_product_id(product_id);
            existing
        }
        None => Subscription::new(
            original_transaction_id.clone(),
            transaction_id,
            product_id,
            start,
            end,
            now,
        ),
    };

    if input.user_id.is_some() {
        subscription.user_id.clone_from(&input.user_id);
    }
    subscription.cancel_at_period_end =
        response.auto_renew_disabled(original_transaction_id.as_str());

    store.put_subscription(&subscription)?;
    Ok(subscription)
}
