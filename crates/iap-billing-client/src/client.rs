//! iap-billing HTTP client implementation.

use reqwest::{Client, RequestBuilder};
use std::time::Duration;

use crate::error::ClientError;
use crate::types::{
    ApiErrorResponse, EnqueueRequest, EnqueueResponse, HealthResponse, ProcessQueueResponse,
    VerifyReceiptRequest, VerifyReceiptResponse,
};

/// iap-billing API client.
///
/// Provides methods for queueing purchases, verifying receipts and triggering
/// the queue processor.
#[derive(Debug, Clone)]
pub struct IapBillingClient {
    client: Client,
    base_url: String,
    cron_secret: Option<String>,
}

impl IapBillingClient {
    /// Create a new iap-billing client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the iap-billing service (e.g., `"http://iap-billing:8080"`)
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::with_options(base_url, ClientOptions::default())
    }

    /// Create a new iap-billing client with custom options.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_options(
        base_url: impl Into<String>,
        options: ClientOptions,
    ) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(options.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            cron_secret: options.cron_secret,
        })
    }

    /// Queue a purchase for background verification.
    ///
    /// Queueing the same transaction twice succeeds and returns the existing job.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn enqueue(&self, request: &EnqueueRequest) -> Result<EnqueueResponse, ClientError> {
        let url = format!("{}/enqueue", self.base_url);
        tracing::debug!(transaction_id = %request.transaction_id, "Enqueueing purchase");

        let response = self.client.post(&url).json(request).send().await?;

        self.handle_response(response).await
    }

    /// Verify a receipt immediately.
    ///
    /// A receipt Apple rejects is not an error: check
    /// [`VerifyReceiptResponse::verified`].
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, Apple is unreachable
    /// ([`ClientError::Upstream`]) or the server returns an error.
    pub async fn verify_receipt(
        &self,
        request: &VerifyReceiptRequest,
    ) -> Result<VerifyReceiptResponse, ClientError> {
        let url = format!("{}/verify-receipt", self.base_url);

        let response = self.client.post(&url).json(request).send().await?;

        self.handle_response(response).await
    }

    /// Run the queue processor once.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Unauthorized`] if the cron secret is missing or
    /// wrong, or another error if the request fails.
    pub async fn process_queue(&self) -> Result<ProcessQueueResponse, ClientError> {
        let url = format!("{}/process-queue", self.base_url);

        let response = self
            .with_cron_secret(self.client.post(&url))
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Check service health.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn health(&self) -> Result<HealthResponse, ClientError> {
        let url = format!("{}/health", self.base_url);

        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    fn with_cron_secret(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.cron_secret {
            Some(secret) => request.bearer_auth(secret),
            None => request,
        }
    }

    /// Handle API response and convert errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        // Try to parse error response
        let error_body: Result<ApiErrorResponse, _> = response.json().await;

        match error_body {
            Ok(api_error) => match api_error.error.code.as_str() {
                "unauthorized" => Err(ClientError::Unauthorized),
                "external_service_error" => Err(ClientError::Upstream(api_error.error.message)),
                code => Err(ClientError::Api {
                    code: code.to_string(),
                    message: api_error.error.message,
                    status: status.as_u16(),
                }),
            },
            Err(_) => Err(ClientError::Api {
                code: "unknown".to_string(),
                message: format!("HTTP {status}"),
                status: status.as_u16(),
            }),
        }
    }
}

/// Client options for customization.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Request timeout in seconds (default: 30).
    pub timeout_seconds: u64,
    /// Shared secret for `/process-queue`.
    pub cron_secret: Option<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            cron_secret: None,
        }
    }
}

impl ClientOptions {
    /// Create options carrying the cron secret.
    #[must_use]
    pub fn with_cron_secret(secret: impl Into<String>) -> Self {
        Self {
            cron_secret: Some(secret.into()),
            ..Self::default()
        }
    }
}
