//! iap-billing Client SDK.
//!
//! This crate provides a client library for apps' backends and schedulers to
//! talk to the iap-billing service.
//!
//! # Example
//!
//! ```no_run
//! use iap_billing_client::{EnqueueRequest, IapBillingClient};
//!
//! # async fn example() -> Result<(), iap_billing_client::ClientError> {
//! let client = IapBillingClient::new("http://iap-billing:8080")?;
//!
//! // Hand a fresh purchase to the verification queue
//! let queued = client
//!     .enqueue(&EnqueueRequest {
//!         transaction_id: "1000000123456789".to_string(),
//!         raw_receipt: Some("MIIT...".to_string()),
//!         product_id: Some("com.app.pro.monthly".to_string()),
//!         user_id: Some("user-uuid".to_string()),
//!         email: None,
//!     })
//!     .await?;
//!
//! println!("Queued as {}", queued.queue_id);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod client;
mod error;
mod types;

pub use client::{ClientOptions, IapBillingClient};
pub use error::ClientError;
pub use types::*;
