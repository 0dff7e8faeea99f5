//! Request body extractors.

use async_trait::async_trait;
use axum::extract::{FromRequest, Request};
use axum::Json;
use serde::de::DeserializeOwned;

use crate::error::ApiError;

/// JSON body whose rejections are reported as `bad_request` errors.
///
/// A missing body, a wrong content type, malformed JSON and mistyped fields
/// all become a 400 with the standard error body.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await.map_err(|rejection| {
            tracing::debug!(error = %rejection.body_text(), "Rejected request body");
            ApiError::BadRequest(format!("Invalid request body: {}", rejection.body_text()))
        })?;
        Ok(Self(value))
    }
}
