//! API handlers.

pub mod admin;
pub mod health;
pub mod queue;
pub mod receipts;
pub mod webhooks;

/// Treat blank optional strings as absent.
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
