//! Apple server notification handler.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use iap_billing_core::{
    BillingPeriod, OriginalTransactionId, Plan, Subscription, SubscriptionStatus, TransactionId,
};
use iap_billing_store::{Store, StoreError};

use crate::apple::{latest_renewal, NotificationType, ServerNotification, UnifiedReceipt};
use crate::crypto::constant_time_eq;
use crate::error::ApiError;
use crate::state::AppState;

/// Webhook response.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// Whether the webhook was received.
    pub received: bool,
}

/// What a notification did to the subscriptions table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationOutcome {
    /// The subscription was written with this status.
    Applied(SubscriptionStatus),
    /// No user is known for the lineage; the event was dropped.
    Unresolved,
    /// Nothing to apply.
    Ignored(&'static str),
}

/// Handle App Store server notifications.
pub async fn apple_webhook(
    State(state): State<Arc<AppState>>,
    body: String,
) -> Result<Json<WebhookResponse>, ApiError> {
    let notification: ServerNotification = serde_json::from_str(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid notification payload: {e}")))?;

    if notification.signed_payload.is_some() {
        tracing::info!("Received version 2 App Store notification, not processed");
        return Ok(Json(WebhookResponse { received: true }));
    }

    let Some(kind) = notification.notification_type.as_deref() else {
        return Err(ApiError::BadRequest(
            "Invalid notification format: missing notification_type".into(),
        ));
    };

    if let Some(expected) = state.config.apple_shared_secret.as_deref() {
        let authentic = notification
            .password
            .as_deref()
            .is_some_and(|password| constant_time_eq(password, expected));
        if !authentic {
            tracing::warn!(notification_type = %kind, "Apple notification with invalid password");
            return Err(ApiError::Unauthorized);
        }
    }

    let kind = NotificationType::from(kind);
    let unified = notification.unified_receipt.unwrap_or_default();
    let outcome = apply_notification(state.store.as_ref(), &kind, &unified, Utc::now())?;

    match outcome {
        NotificationOutcome::Applied(status) => tracing::info!(
            notification_type = kind.as_str(),
            status = ?status,
            "Apple notification applied"
        ),
        NotificationOutcome::Unresolved => tracing::warn!(
            notification_type = kind.as_str(),
            "Apple notification for unknown user dropped"
        ),
        NotificationOutcome::Ignored(reason) => tracing::info!(
            notification_type = kind.as_str(),
            reason,
            "Apple notification ignored"
        ),
    }

    Ok(Json(WebhookResponse { received: true }))
}

/// Apply a version 1 notification to the subscriptions table.
///
/// The user is resolved through the subscription row of the lineage. Only
/// `INITIAL_BUY` may create a row without a known user; every other event
/// for an unresolved lineage is dropped.
///
/// # Errors
///
/// Returns an error if the store cannot be read or written.
pub fn apply_notification(
    store: &dyn Store,
    kind: &NotificationType,
    receipt: &UnifiedReceipt,
    now: DateTime<Utc>,
) -> Result<NotificationOutcome, StoreError> {
    let Some(latest) = latest_renewal(&receipt.latest_receipt_info) else {
        return Ok(NotificationOutcome::Ignored("no receipt info"));
    };

    let product_id = latest.product_id.clone().unwrap_or_default();
    let plan = Plan::from_product_id(&product_id);
    if plan == Plan::Free {
        return Ok(NotificationOutcome::Ignored("unknown product"));
    }

    let Some(original_transaction_id) = latest
        .original_transaction_id
        .as_deref()
        .and_then(|id| OriginalTransactionId::new(id).ok())
    else {
        return Ok(NotificationOutcome::Ignored("missing original_transaction_id"));
    };

    let existing = store.get_subscription(&original_transaction_id)?;
    let resolved = existing
        .as_ref()
        .and_then(Subscription::resolved_user_id)
        .is_some();
    if !resolved && *kind != NotificationType::InitialBuy {
        return Ok(NotificationOutcome::Unresolved);
    }

    let subscription = match kind {
        NotificationType::InitialBuy | NotificationType::DidRenew => {
            let Some(transaction_id) = latest
                .transaction_id
                .as_deref()
                .or(Some(original_transaction_id.as_str()))
                .and_then(|id| TransactionId::new(id).ok())
            else {
                return Ok(NotificationOutcome::Ignored("missing transaction_id"));
            };

            let start = latest.purchased_at().unwrap_or(now);
            let end = latest
                .expires_at()
                .unwrap_or_else(|| BillingPeriod::from_product_id(&product_id).end_from(start));

            let mut subscription = match existing {
                Some(mut existing) => {
                    existing.renew(transaction_id, start, end, now);
                    existing.product_id = product_id;
                    existing.plan = plan;
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
            subscription.cancel_at_period_end =
                receipt.auto_renew_disabled(original_transaction_id.as_str());
            subscription
        }
        NotificationType::DidFailToRenew
        | NotificationType::DidCancel
        | NotificationType::Refund
        | NotificationType::Revoke => {
            let Some(mut subscription) = existing else {
                return Ok(NotificationOutcome::Unresolved);
            };
            let status = match kind {
                NotificationType::DidFailToRenew => SubscriptionStatus::PastDue,
                NotificationType::DidCancel => SubscriptionStatus::Cancelled,
                NotificationType::Refund => SubscriptionStatus::Refunded,
                _ => SubscriptionStatus::Revoked,
            };
            subscription.transition(status, now);
            subscription
        }
        NotificationType::Other(_) => {
            return Ok(NotificationOutcome::Ignored("unhandled notification type"));
        }
    };

    store.put_subscription(&subscription)?;
    Ok(NotificationOutcome::Applied(subscription.status))
}
