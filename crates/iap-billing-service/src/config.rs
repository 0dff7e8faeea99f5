//! Service configuration.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use iap_billing_core::{
    RetryPolicy, DEFAULT_BASE_DELAY_SECONDS, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY_SECONDS,
};

use crate::apple::{AppleClient, AppleConfig};

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Path to `RocksDB` data directory (default: "/data/iap-billing").
    pub data_dir: String,

    /// Shared secret guarding `/process-queue`. When unset the route is open.
    pub cron_secret: Option<String>,

    /// Admin API key for the `/admin` routes.
    pub admin_api_key: Option<String>,

    /// App-specific shared secret sent to Apple and expected on notifications.
    pub apple_shared_secret: Option<String>,

    /// Apple production `verifyReceipt` endpoint.
    pub apple_production_url: String,

    /// Apple sandbox `verifyReceipt` endpoint.
    pub apple_sandbox_url: String,

    /// Timeout for a single Apple request in seconds.
    pub apple_timeout_seconds: u64,

    /// Maximum jobs claimed per processor run.
    pub queue_batch_size: usize,

    /// Attempts after which a job is marked failed.
    pub queue_max_attempts: u32,

    /// Backoff base delay in seconds.
    pub queue_base_delay_seconds: u64,

    /// Backoff ceiling in seconds.
    pub queue_max_delay_seconds: u64,

    /// Jobs verified concurrently within one run.
    pub queue_concurrency: usize,

    /// Interval of the in-process queue ticker. `None` disables it.
    pub queue_poll_seconds: Option<u64>,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,
}

/// Apple secrets file structure.
#[derive(Debug, Deserialize)]
struct AppleSecrets {
    shared_secret: String,
}

impl ServiceConfig {
    /// Load configuration from environment variables and secrets files.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            data_dir: std::env::var("DATA_DIR").unwrap_or(defaults.data_dir),
            cron_secret: non_empty_var("CRON_SECRET"),
            admin_api_key: non_empty_var("ADMIN_API_KEY"),
            apple_shared_secret: load_apple_secret(),
            apple_production_url: std::env::var("APPLE_PRODUCTION_URL")
                .unwrap_or(defaults.apple_production_url),
            apple_sandbox_url: std::env::var("APPLE_SANDBOX_URL")
                .unwrap_or(defaults.apple_sandbox_url),
            apple_timeout_seconds: parse_var("APPLE_TIMEOUT_SECONDS")
                .unwrap_or(defaults.apple_timeout_seconds),
            queue_batch_size: parse_var("QUEUE_BATCH_SIZE").unwrap_or(defaults.queue_batch_size),
            queue_max_attempts: parse_var("QUEUE_MAX_ATTEMPTS")
                .unwrap_or(defaults.queue_max_attempts),
            queue_base_delay_seconds: parse_var("QUEUE_BASE_DELAY_SECONDS")
                .unwrap_or(defaults.queue_base_delay_seconds),
            queue_max_delay_seconds: parse_var("QUEUE_MAX_DELAY_SECONDS")
                .unwrap_or(defaults.queue_max_delay_seconds),
            queue_concurrency: parse_var("QUEUE_CONCURRENCY").unwrap_or(defaults.queue_concurrency),
            queue_poll_seconds: parse_var("QUEUE_POLL_SECONDS").filter(|s| *s > 0),
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: parse_var("MAX_BODY_BYTES").unwrap_or(defaults.max_body_bytes),
            request_timeout_seconds: parse_var("REQUEST_TIMEOUT_SECONDS")
                .unwrap_or(defaults.request_timeout_seconds),
        }
    }

    /// Apple client settings.
    #[must_use]
    pub fn apple_config(&self) -> AppleConfig {
        AppleConfig {
            production_url: self.apple_production_url.clone(),
            sandbox_url: self.apple_sandbox_url.clone(),
            shared_secret: self.apple_shared_secret.clone(),
            timeout: Duration::from_secs(self.apple_timeout_seconds),
        }
    }

    /// Retry policy for the verification queue.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.queue_max_attempts.max(1),
            base_delay: Duration::from_secs(self.queue_base_delay_seconds),
            max_delay: Duration::from_secs(self.queue_max_delay_seconds),
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

/// Load the Apple shared secret from file or environment.
fn load_apple_secret() -> Option<String> {
    let secret_paths = [
        ".secrets/apple.json",
        "iap-billing/.secrets/apple.json",
        "../.secrets/apple.json",
    ];

    for path in &secret_paths {
        if let Ok(secrets) = load_secrets_file::<AppleSecrets>(path) {
            tracing::info!(path = %path, "Loaded Apple secrets from file");
            return Some(secrets.shared_secret).filter(|s| !s.is_empty());
        }
    }

    tracing::debug!("Apple secrets file not found, using environment variables");
    non_empty_var("APPLE_SHARED_SECRET")
}

/// Load secrets from a JSON file.
fn load_secrets_file<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, std::io::Error> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Secrets file not found",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            data_dir: "/data/iap-billing".into(),
            cron_secret: None,
            admin_api_key: None,
            apple_shared_secret: None,
            apple_production_url: AppleClient::PRODUCTION_URL.into(),
            apple_sandbox_url: AppleClient::SANDBOX_URL.into(),
            apple_timeout_seconds: 30,
            queue_batch_size: 10,
            queue_max_attempts: DEFAULT_MAX_ATTEMPTS,
            queue_base_delay_seconds: DEFAULT_BASE_DELAY_SECONDS,
            queue_max_delay_seconds: DEFAULT_MAX_DELAY_SECONDS,
            queue_concurrency: 1,
            queue_poll_seconds: None,
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_retry_policy_matches_queue_defaults() {
        let policy = ServiceConfig::default().retry_policy();
        assert_eq!(policy, RetryPolicy::default());
    }

    #[test]
    fn max_attempts_is_at_least_one() {
        let config = ServiceConfig {
            queue_max_attempts: 0,
            ..ServiceConfig::default()
        };
        assert_eq!(config.retry_policy().max_attempts, 1);
    }
}
