//! Apple `verifyReceipt` client implementation.

use std::time::Duration;

use reqwest::Client;

use super::types::{AppleEnvironment, AppleStatus, VerifyReceiptRequest, VerifyReceiptResponse};

/// Error type for Apple operations.
#[derive(Debug, thiserror::Error)]
pub enum AppleError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Apple answered with a non-success HTTP status.
    #[error("Apple {environment:?} endpoint returned HTTP {status}")]
    Status {
        /// Endpoint that answered.
        environment: AppleEnvironment,
        /// HTTP status code.
        status: u16,
    },

    /// Response body was not a valid `verifyReceipt` response.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Endpoints and credentials for [`AppleClient`].
#[derive(Debug, Clone)]
pub struct AppleConfig {
    /// Production `verifyReceipt` URL.
    pub production_url: String,
    /// Sandbox `verifyReceipt` URL.
    pub sandbox_url: String,
    /// App-specific shared secret, required for auto-renewable receipts.
    pub shared_secret: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for AppleConfig {
    fn default() -> Self {
        Self {
            production_url: AppleClient::PRODUCTION_URL.into(),
            sandbox_url: AppleClient::SANDBOX_URL.into(),
            shared_secret: None,
            timeout: Duration::from_secs(30),
        }
    }
}

/// A `verifyReceipt` answer.
#[derive(Debug, Clone)]
pub struct AppleVerification {
    /// Endpoint that produced the answer.
    pub environment: AppleEnvironment,
    /// Parsed response.
    pub response: VerifyReceiptResponse,
    /// Response body as received, kept for the receipt audit row.
    pub raw: serde_json::Value,
}

impl AppleVerification {
    /// Whether Apple accepted the receipt.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.response.status == AppleStatus::OK
    }

    /// Environment as Apple reported it, or the endpoint that answered.
    #[must_use]
    pub fn environment_name(&self) -> String {
        self.response
            .environment
            .clone()
            .unwrap_or_else(|| self.environment.as_str().to_string())
    }
}

/// Apple `verifyReceipt` client.
#[derive(Debug, Clone)]
pub struct AppleClient {
    client: Client,
    config: AppleConfig,
}

impl AppleClient {
    /// Production endpoint.
    pub const PRODUCTION_URL: &'static str = "https://buy.itunes.apple.com/verifyReceipt";

    /// Sandbox endpoint.
    pub const SANDBOX_URL: &'static str = "https://sandbox.itunes.apple.com/verifyReceipt";

    /// Create a new Apple client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: AppleConfig) -> Result<Self, AppleError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    /// Whether a shared secret is configured.
    #[must_use]
    pub fn has_shared_secret(&self) -> bool {
        self.config.shared_secret.is_some()
    }

    /// Verify a receipt against one endpoint.
    pub async fn verify(
        &self,
        raw_receipt: &str,
        environment: AppleEnvironment,
    ) -> Result<AppleVerification, AppleError> {
        let url = match environment {
            AppleEnvironment::Production => &self.config.production_url,
            AppleEnvironment::Sandbox => &self.config.sandbox_url,
        };

        let body = VerifyReceiptRequest {
            receipt_data: raw_receipt,
            password: self.config.shared_secret.as_deref(),
            exclude_old_transactions: false,
        };

        let response = self.client.post(url).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppleError::Status {
                environment,
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await?;
        let raw: serde_json::Value = serde_json::from_slice(&bytes)?;
        let parsed: VerifyReceiptResponse = serde_json::from_value(raw.clone())?;

        tracing::debug!(
            environment = environment.as_str(),
            status = parsed.status,
            "Apple verifyReceipt answered"
        );

        Ok(AppleVerification {
            environment,
            response: parsed,
            raw,
        })
    }

    /// Verify against production, retrying once against the sandbox when
    /// Apple reports a sandbox receipt (status `21007`).
    pub async fn verify_with_fallback(
        &self,
        raw_receipt: &str,
    ) -> Result<AppleVerification, AppleError> {
        let production = self
            .verify(raw_receipt, AppleEnvironment::Production)
            .await?;

        if production.response.status != AppleStatus::SANDBOX_RECEIPT_IN_PRODUCTION {
            return Ok(production);
        }

        tracing::debug!("Sandbox receipt sent to production, retrying against sandbox");
        self.verify(raw_receipt, AppleEnvironment::Sandbox).await
    }
}
