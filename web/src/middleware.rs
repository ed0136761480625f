//! Request tracking.
//!
//! [`track_request`] runs around every route: it settles the request's
//! [`CorrelationId`], opens an `http_request` span for the handler and echoes
//! the id back in `X-Correlation-ID`.

use crate::extractors::CorrelationId;
use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use std::time::Instant;
use tracing::Instrument;

/// Header carrying the correlation id in both directions.
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";

/// Axum middleware function; install with `axum::middleware::from_fn(track_request)`.
pub async fn track_request(mut req: Request, next: Next) -> Response {
    let correlation_id = CorrelationId::from_headers(req.headers());
    req.extensions_mut().insert(correlation_id);

    let span = tracing::info_span!(
        "http_request",
        correlation_id = %correlation_id.0,
        method = %req.method(),
        path = %req.uri().path(),
    );
    let started = Instant::now();

    let mut response = next.run(req).instrument(span.clone()).await;

    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    span.in_scope(|| {
        tracing::debug!(status = response.status().as_u16(), elapsed_ms, "Request completed");
    });

    if let Ok(value) = HeaderValue::from_str(&correlation_id.0.to_string()) {
        response.headers_mut().insert(CORRELATION_ID_HEADER, value);
    }
    response
}
