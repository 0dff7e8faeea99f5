//! Apple receipt API types.

use std::borrow::Cow;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Which `verifyReceipt` endpoint answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppleEnvironment {
    /// `buy.itunes.apple.com`.
    Production,
    /// `sandbox.itunes.apple.com`.
    Sandbox,
}

impl AppleEnvironment {
    /// Name as Apple reports it in the `environment` field.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Production => "Production",
            Self::Sandbox => "Sandbox",
        }
    }
}

/// `verifyReceipt` status codes.
pub struct AppleStatus;

impl AppleStatus {
    /// The receipt is valid.
    pub const OK: i64 = 0;
    /// A sandbox receipt was sent to the production endpoint.
    pub const SANDBOX_RECEIPT_IN_PRODUCTION: i64 = 21007;
    /// A production receipt was sent to the sandbox endpoint.
    pub const PRODUCTION_RECEIPT_IN_SANDBOX: i64 = 21008;

    /// Human readable message for a status code.
    #[must_use]
    pub fn message(status: i64) -> Cow<'static, str> {
        let message = match status {
            0 => "Valid receipt",
            21000 => "The request to the App Store was not made using the HTTP POST request method",
            21001 => "This status code is no longer sent by the App Store",
            21002 => "The data in the receipt-data property was malformed or the service experienced a temporary issue",
            21003 => "The receipt could not be authenticated",
            21004 => "The shared secret you provided does not match the shared secret on file for your account",
            21005 => "The receipt server was temporarily unable to provide the receipt",
            21006 => "This receipt is valid but the subscription has expired",
            21007 => "This receipt is from the test environment, but it was sent to the production environment for verification",
            21008 => "This receipt is from the production environment, but it was sent to the test environment for verification",
            21009 => "Internal data access error",
            21010 => "The user account cannot be found or has been deleted",
            21100..=21199 => return Cow::Owned(format!("Internal data access error ({status})")),
            _ => return Cow::Owned(format!("Unknown status code: {status}")),
        };
        Cow::Borrowed(message)
    }
}

/// Request body for `verifyReceipt`.
#[derive(Debug, Serialize)]
pub(crate) struct VerifyReceiptRequest<'a> {
    #[serde(rename = "receipt-data")]
    pub receipt_data: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<&'a str>,
    #[serde(rename = "exclude-old-transactions")]
    pub exclude_old_transactions: bool,
}

/// Parsed `verifyReceipt` response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerifyReceiptResponse {
    /// Verdict, `0` when valid.
    pub status: i64,
    /// `Production` or `Sandbox`.
    #[serde(default)]
    pub environment: Option<String>,
    /// Decoded receipt.
    #[serde(default)]
    pub receipt: Option<ReceiptBody>,
    /// Every auto-renewable transaction in the lineage.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub latest_receipt_info: Vec<ReceiptInfo>,
    /// Pending renewal state per lineage.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub pending_renewal_info: Vec<PendingRenewalInfo>,
}

impl VerifyReceiptResponse {
    /// Renewal entries: `latest_receipt_info`, or the receipt's `in_app` list
    /// when Apple omits it.
    #[must_use]
    pub fn renewal_entries(&self) -> &[ReceiptInfo] {
        if self.latest_receipt_info.is_empty() {
            self.receipt.as_ref().map_or(&[][..], |r| r.in_app.as_slice())
        } else {
            &self.latest_receipt_info
        }
    }

    /// Whether auto-renew is switched off for the given lineage.
    #[must_use]
    pub fn auto_renew_disabled(&self, original_transaction_id: &str) -> bool {
        auto_renew_disabled(&self.pending_renewal_info, original_transaction_id)
    }
}

/// Decoded receipt body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReceiptBody {
    /// App bundle identifier.
    #[serde(default)]
    pub bundle_id: Option<String>,
    /// In-app purchase entries.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub in_app: Vec<ReceiptInfo>,
}

/// One transaction entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ReceiptInfo {
    /// Store product identifier.
    #[serde(default)]
    pub product_id: Option<String>,
    /// This transaction.
    #[serde(default, deserialize_with = "string_or_number")]
    pub transaction_id: Option<String>,
    /// First transaction of the lineage.
    #[serde(default, deserialize_with = "string_or_number")]
    pub original_transaction_id: Option<String>,
    /// Purchase time in epoch milliseconds.
    #[serde(default, deserialize_with = "string_or_number")]
    pub purchase_date_ms: Option<String>,
    /// Expiry time in epoch milliseconds.
    #[serde(default, deserialize_with = "string_or_number")]
    pub expires_date_ms: Option<String>,
    /// Set when Apple support refunded the transaction.
    #[serde(default, deserialize_with = "string_or_number")]
    pub cancellation_date_ms: Option<String>,
}

impl ReceiptInfo {
    /// Purchase time.
    #[must_use]
    pub fn purchased_at(&self) -> Option<DateTime<Utc>> {
        self.purchase_date_ms.as_deref().and_then(parse_millis)
    }

    /// Expiry time.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_date_ms.as_deref().and_then(parse_millis)
    }

    /// Refund time, if the transaction was refunded.
    #[must_use]
    pub fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        self.cancellation_date_ms.as_deref().and_then(parse_millis)
    }
}

/// Pending renewal state of a lineage.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PendingRenewalInfo {
    /// Lineage identifier.
    #[serde(default, deserialize_with = "string_or_number")]
    pub original_transaction_id: Option<String>,
    /// Product that will renew.
    #[serde(default)]
    pub auto_renew_product_id: Option<String>,
    /// `"1"` when the subscription will renew, `"0"` when turned off.
    #[serde(default, deserialize_with = "string_or_number")]
    pub auto_renew_status: Option<String>,
}

/// Server notification types handled by the service (version 1 format).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationType {
    /// First purchase of a subscription.
    InitialBuy,
    /// Automatic renewal succeeded.
    DidRenew,
    /// Renewal failed because of a billing issue.
    DidFailToRenew,
    /// Auto-renew was turned off.
    DidCancel,
    /// Apple refunded the transaction.
    Refund,
    /// Family sharing access was revoked.
    Revoke,
    /// Any other type; acknowledged but not applied.
    Other(String),
}

impl NotificationType {
    /// Wire name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::InitialBuy => "INITIAL_BUY",
            Self::DidRenew => "DID_RENEW",
            Self::DidFailToRenew => "DID_FAIL_TO_RENEW",
            Self::DidCancel => "DID_CANCEL",
            Self::Refund => "REFUND",
            Self::Revoke => "REVOKE",
            Self::Other(name) => name,
        }
    }
}

impl From<&str> for NotificationType {
    fn from(value: &str) -> Self {
        match value {
            "INITIAL_BUY" => Self::InitialBuy,
            "DID_RENEW" => Self::DidRenew,
            "DID_FAIL_TO_RENEW" => Self::DidFailToRenew,
            "DID_CANCEL" => Self::DidCancel,
            "REFUND" => Self::Refund,
            "REVOKE" => Self::Revoke,
            other => Self::Other(other.to_string()),
        }
    }
}

/// App Store server notification body.
///
/// Version 1 notifications carry `notification_type`, `password` and
/// `unified_receipt`; version 2 notifications carry only `signedPayload`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerNotification {
    /// Event type (version 1).
    #[serde(default)]
    pub notification_type: Option<String>,
    /// The app's shared secret (version 1).
    #[serde(default)]
    pub password: Option<String>,
    /// `PROD` or `Sandbox`.
    #[serde(default)]
    pub environment: Option<String>,
    /// Receipt state after the event (version 1).
    #[serde(default)]
    pub unified_receipt: Option<UnifiedReceipt>,
    /// Signed JWS body (version 2).
    #[serde(default, rename = "signedPayload")]
    pub signed_payload: Option<String>,
}

/// Receipt state embedded in a version 1 notification.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UnifiedReceipt {
    /// Receipt status, `0` when valid.
    #[serde(default)]
    pub status: Option<i64>,
    /// Every transaction in the lineage.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub latest_receipt_info: Vec<ReceiptInfo>,
    /// Pending renewal state per lineage.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub pending_renewal_info: Vec<PendingRenewalInfo>,
}

impl UnifiedReceipt {
    /// Whether auto-renew is switched off for the given lineage.
    #[must_use]
    pub fn auto_renew_disabled(&self, original_transaction_id: &str) -> bool {
        auto_renew_disabled(&self.pending_renewal_info, original_transaction_id)
    }
}

fn auto_renew_disabled(pending: &[PendingRenewalInfo], original_transaction_id: &str) -> bool {
    pending.iter().any(|info| {
        info.original_transaction_id.as_deref() == Some(original_transaction_id)
            && info.auto_renew_status.as_deref() == Some("0")
    })
}

/// Pick the most recent renewal: the greatest expiry, falling back to the
/// purchase time for entries without one.
#[must_use]
pub fn latest_renewal(entries: &[ReceiptInfo]) -> Option<&ReceiptInfo> {
    entries
        .iter()
        .max_by_key(|entry| entry.expires_at().or_else(|| entry.purchased_at()))
}

/// Parse Apple's epoch-millisecond strings.
#[must_use]
pub fn parse_millis(value: &str) -> Option<DateTime<Utc>> {
    let millis: i64 = value.trim().parse().ok()?;
    Utc.timestamp_millis_opt(millis).single()
}

/// Apple sends identifiers and timestamps as strings; accept bare numbers too.
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Text(s) => s,
        Raw::Int(n) => n.to_string(),
        #[allow(clippy::cast_possible_truncation)]
        Raw::Float(f) => (f as i64).to_string(),
    }))
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
