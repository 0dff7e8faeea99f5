//! Apple `verifyReceipt` integration.
//!
//! The legacy receipt endpoint answers HTTP 200 for almost everything and
//! reports the verdict in a numeric `status` field. Production is tried
//! first; a sandbox receipt sent to production comes back with status
//! `21007` and is retried once against the sandbox.

pub mod client;
pub mod types;

pub use client::{AppleClient, AppleConfig, AppleError, AppleVerification};
pub use types::*;
