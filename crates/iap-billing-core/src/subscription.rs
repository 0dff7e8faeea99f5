//! Subscription types for iap-billing.
//!
//! Subscriptions are keyed by the original transaction id so that every
//! renewal of the same lineage updates one row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{OriginalTransactionId, TransactionId};

/// Placeholder user ids written by older clients that must not be trusted.
const UNRESOLVED_USER_IDS: [&str; 2] = ["unknown", "guest"];

/// Available subscription plans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    /// No paid entitlement.
    Free,
    /// Entry tier.
    Essentials,
    /// Middle tier.
    Pro,
    /// Top tier.
    Elite,
}

impl Plan {
    /// Derive the plan from a store product id.
    ///
    /// Product ids are dot-separated (`com.app.pro.monthly`). Each segment is
    /// matched against the known tier names, including the legacy `creator`
    /// and `premium` names, and the highest tier found wins. Ids matching no
    /// tier map to `Free`.
    #[must_use]
    pub fn from_product_id(product_id: &str) -> Self {
        product_id
            .split(['.', '_', '-'])
            .map(|segment| match segment.to_ascii_lowercase().as_str() {
                "elite" | "premium" => Self::Elite,
                "pro" => Self::Pro,
                "essentials" | "creator" => Self::Essentials,
                _ => Self::Free,
            })
            .max()
            .unwrap_or(Self::Free)
    }

    /// Wire name of the plan.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Essentials => "essentials",
            Self::Pro => "pro",
            Self::Elite => "elite",
        }
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Billing cadence of a product, used when the platform omits an expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillingPeriod {
    /// 30 days.
    Month,
    /// 365 days.
    Year,
}

impl BillingPeriod {
    /// Derive the cadence from a store product id (`annual`, `yearly`, `year` segments).
    #[must_use]
    pub fn from_product_id(product_id: &str) -> Self {
        let yearly = product_id
            .split(['.', '_', '-'])
            .any(|s| matches!(s.to_ascii_lowercase().as_str(), "annual" | "yearly" | "year"));
        if yearly {
            Self::Year
        } else {
            Self::Month
        }
    }

    /// Length of one period.
    #[must_use]
    pub fn length(self) -> chrono::Duration {
        match self {
            Self::Month => chrono::Duration::days(30),
            Self::Year => chrono::Duration::days(365),
        }
    }

    /// End of a period that started at `start`.
    #[must_use]
    pub fn end_from(self, start: DateTime<Utc>) -> DateTime<Utc> {
        start + self.length()
    }
}

/// Status of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Paid and within the current period.
    Active,
    /// Renewal payment failed.
    PastDue,
    /// Auto-renew turned off; access continues to period end.
    Cancelled,
    /// The purchase was refunded.
    Refunded,
    /// Access revoked by the platform (e.g. family sharing removed).
    Revoked,
    /// The period ended without renewal.
    Expired,
}

/// A renewable subscription lineage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Lineage identifier (unique key).
    pub original_transaction_id: OriginalTransactionId,
    /// Most recent transaction applied to this row.
    pub transaction_id: TransactionId,
    /// Internal user, if resolved.
    pub user_id: Option<String>,
    /// Plan derived from the product id.
    pub plan: Plan,
    /// Store product identifier.
    pub product_id: String,
    /// Current status.
    pub status: SubscriptionStatus,
    /// Start of the current billing period.
    pub current_period_start: DateTime<Utc>,
    /// End of the current billing period.
    pub current_period_end: DateTime<Utc>,
    /// Whether the subscription ends at `current_period_end`.
    pub cancel_at_period_end: bool,
    /// When the row was created.
    pub created_at: DateTime<Utc>,
    /// When the row was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Create an active subscription.
    #[must_use]
    pub fn new(
        original_transaction_id: OriginalTransactionId,
        transaction_id: TransactionId,
        product_id: impl Into<String>,
        current_period_start: DateTime<Utc>,
        current_period_end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        let product_id = product_id.into();
        Self {
            original_transaction_id,
            transaction_id,
            user_id: None,
            plan: Plan::from_product_id(&product_id),
            product_id,
            status: SubscriptionStatus::Active,
            current_period_start,
            current_period_end,
            cancel_at_period_end: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// The user id, unless it is missing or a known placeholder.
    #[must_use]
    pub fn resolved_user_id(&self) -> Option<&str> {
        self.user_id
            .as_deref()
            .filter(|id| !id.is_empty() && !UNRESOLVED_USER_IDS.contains(id))
    }

    /// Apply a new billing period from a renewal and mark the row active.
    pub fn renew(
        &mut self,
        transaction_id: TransactionId,
        current_period_start: DateTime<Utc>,
        current_period_end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) {
        self.transaction_id = transaction_id;
        self.status = SubscriptionStatus::Active;
        self.current_period_start = current_period_start;
        self.current_period_end = current_period_end;
        self.cancel_at_period_end = false;
        self.updated_at = now;
    }

    /// Move the row to a new status.
    pub fn transition(&mut self, status: SubscriptionStatus, now: DateTime<Utc>) {
        self.status = status;
        if status == SubscriptionStatus::Cancelled {
            self.cancel_at_period_end = true;
        }
        self.updated_at = now;
    }
}
