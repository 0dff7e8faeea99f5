//! Application state.

use std::sync::Arc;

use iap_billing_core::RetryPolicy;
use iap_billing_store::Store;

use crate::apple::{AppleClient, AppleError};
use crate::config::ServiceConfig;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend.
    pub store: Arc<dyn Store>,

    /// Service configuration.
    pub config: ServiceConfig,

    /// Apple `verifyReceipt` client.
    pub apple: Arc<AppleClient>,

    /// Backoff and cutoff for the verification queue.
    pub retry_policy: RetryPolicy,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Errors
    ///
    /// Returns an error if the Apple HTTP client cannot be built.
    pub fn new(store: Arc<dyn Store>, config: ServiceConfig) -> Result<Self, AppleError> {
        let apple = AppleClient::new(config.apple_config())?;

        if !apple.has_shared_secret() {
            tracing::warn!(
                "Apple shared secret not configured - subscription receipts will not verify"
            );
        }
        if config.cron_secret.is_none() {
            tracing::warn!("CRON_SECRET not configured - /process-queue is open to any caller");
        }
        if config.admin_api_key.is_none() {
            tracing::warn!("ADMIN_API_KEY not configured - admin endpoints are disabled");
        }

        Ok(Self {
            store,
            retry_policy: config.retry_policy(),
            config,
            apple: Arc::new(apple),
        })
    }
}
