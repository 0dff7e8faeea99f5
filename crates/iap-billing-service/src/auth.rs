//! Authentication extractors.
//!
//! This module provides extractors for:
//! - `CronAuth` - Scheduler trigger of the queue processor via shared secret
//! - `AdminAuth` - Operator access to the queue inspection endpoints

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;

use crate::crypto::constant_time_eq;
use crate::error::ApiError;
use crate::state::AppState;

/// Query parameters that may carry the cron secret.
const CRON_SECRET_PARAMS: [&str; 2] = ["secret", "cron_secret"];

/// How a cron request was let through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CronAccess {
    /// The caller presented the configured secret.
    Authenticated,
    /// No secret is configured, every caller is trusted.
    Open,
}

/// Caller allowed to trigger the queue processor.
///
/// The secret may be sent as `Authorization: Bearer <secret>` (scheme in any
/// case, or omitted) or as a `secret` / `cron_secret` query parameter.
#[derive(Debug, Clone, Copy)]
pub struct CronAuth {
    /// How access was granted.
    pub access: CronAccess,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CronAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.config.cron_secret.as_deref() else {
            return Ok(Self {
                access: CronAccess::Open,
            });
        };

        let bearer = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(authorization_secret);

        let query: HashMap<String, String> = Query::try_from_uri(&parts.uri)
            .map(|Query(params)| params)
            .unwrap_or_default();

        let presented = bearer.into_iter().chain(
            CRON_SECRET_PARAMS
                .iter()
                .filter_map(|name| query.get(*name).map(String::as_str)),
        );

        for candidate in presented {
            if constant_time_eq(candidate, expected) {
                return Ok(Self {
                    access: CronAccess::Authenticated,
                });
            }
        }

        tracing::warn!(path = %parts.uri.path(), "Rejected queue trigger with invalid secret");
        Err(ApiError::Unauthorized)
    }
}

/// Secret carried by an `Authorization` header, with or without a `Bearer` scheme.
fn authorization_secret(value: &str) -> &str {
    let value = value.trim();
    match value.split_once(char::is_whitespace) {
        Some((scheme, secret)) if scheme.eq_ignore_ascii_case("bearer") => secret.trim(),
        _ => value,
    }
}

/// Admin authentication via the `X-Admin-Key` header.
///
/// Admin routes are disabled (always 401) when no admin key is configured.
#[derive(Debug, Clone)]
pub struct AdminAuth;

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AdminAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let admin_key = parts
            .headers
            .get("x-admin-key")
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthorized)?;

        let expected_key = state
            .config
            .admin_api_key
            .as_deref()
            .ok_or(ApiError::Unauthorized)?;

        if !constant_time_eq(admin_key, expected_key) {
            return Err(ApiError::Unauthorized);
        }

        Ok(AdminAuth)
    }
}
