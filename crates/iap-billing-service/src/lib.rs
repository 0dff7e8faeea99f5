//! iap-billing HTTP API Service.
//!
//! This crate provides the HTTP API for the post-purchase verification queue:
//!
//! - Enqueueing purchases for background verification
//! - Processing the queue (cron trigger or in-process ticker)
//! - Direct receipt verification against Apple
//! - Apple subscription notifications
//! - Queue inspection for operators
//!
//! # Authentication
//!
//! - **Cron secret** - `/process-queue` accepts a shared secret as a bearer
//!   token or a `secret` / `cron_secret` query parameter.
//! - **Admin key** - `/admin/*` requires the `X-Admin-Key` header.
//! - **Apple shared secret** - notifications must carry the app's shared secret.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Handlers need async for axum

pub mod apple;
pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod processor;
pub mod routes;
pub mod state;
pub mod verification;
pub mod worker;

pub use apple::{AppleClient, AppleError};
pub use config::ServiceConfig;
pub use error::ApiError;
pub use processor::{process_queue, QueueRunSummary};
pub use routes::create_router;
pub use state::AppState;
pub use verification::{verify_receipt, VerificationOutcome, VerifyError, VerifyInput};
