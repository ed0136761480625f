//! Request extractors shared by appeals handlers.
//!
//! [`JsonBody`], [`QueryParams`] and [`PathParams`] wrap axum's extractors so
//! malformed input is answered with the same `{"code", "message"}` body as
//! every other error.

use crate::error::AppError;
use crate::middleware::CORRELATION_ID_HEADER;
use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts},
    http::{request::Parts, HeaderMap},
};
use std::convert::Infallible;
use uuid::Uuid;

/// Correlation id of the current request.
///
/// Behind [`crate::track_request`] this is the id the middleware settled on.
/// Without it the header is read directly, and a fresh v4 id fills the gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrelationId(pub Uuid);

impl CorrelationId {
    /// Parse `X-Correlation-ID`, generating an id when absent or malformed.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let id = headers
            .get(CORRELATION_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|raw| Uuid::parse_str(raw).ok())
            .unwrap_or_else(Uuid::new_v4);
        Self(id)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CorrelationId
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<Self>()
            .copied()
            .unwrap_or_else(|| Self::from_headers(&parts.headers)))
    }
}

/// JSON request body.
#[derive(Debug, Clone, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct JsonBody<T>(pub T);

/// Query string parameters.
#[derive(Debug, Clone, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct QueryParams<T>(pub T);

/// Path parameters.
#[derive(Debug, Clone, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct PathParams<T>(pub T);

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(parts: &mut Parts) -> CorrelationId {
        CorrelationId::from_request_parts(parts, &()).await.unwrap()
    }

    #[tokio::test]
    async fn test_stored_id_wins_over_header() {
        let stored = CorrelationId(Uuid::new_v4());
        let (mut parts, ()) = Request::builder()
            .header(CORRELATION_ID_HEADER, Uuid::new_v4().to_string())
            .body(())
            .unwrap()
            .into_parts();
        parts.extensions.insert(stored);

        assert_eq!(extract(&mut parts).await, stored);
    }

    #[tokio::test]
    async fn test_header_used_without_middleware() {
        let id = Uuid::new_v4();
        let (mut parts, ()) = Request::builder()
            .header(CORRELATION_ID_HEADER, id.to_string())
            .body(())
            .unwrap()
            .into_parts();

        assert_eq!(extract(&mut parts).await.0, id);
    }

    #[derive(Debug, serde::Deserialize)]
    struct Paging {
        #[allow(dead_code)]
        limit: u32,
    }

    #[tokio::test]
    async fn test_bad_query_is_a_validation_error() {
        let (mut parts, ()) = Request::builder()
            .uri("/tickets?limit=lots")
            .body(())
            .unwrap()
            .into_parts();

        let err = QueryParams::<Paging>::from_request_parts(&mut parts, &())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION");
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_malformed_header_gets_fresh_id() {
        let mut headers = HeaderMap::new();
        headers.insert(CORRELATION_ID_HEADER, "ticket-42".parse().unwrap());
        assert_ne!(CorrelationId::from_headers(&headers).0, Uuid::nil());
    }
}
