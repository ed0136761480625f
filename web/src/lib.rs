//! Axum integration for the appeals service.
//!
//! This crate is the thin imperative shell shared by every HTTP surface of the
//! service. It carries no business rules:
//!
//! - [`AppError`]: maps [`appeals_core::AppealsError`] onto HTTP status codes and
//!   `{"code", "message"}` bodies
//! - [`CorrelationId`] and [`track_request`]: request tracing
//! - [`JsonBody`], [`QueryParams`], [`PathParams`]: input extractors whose
//!   rejections are [`AppError`]s
//! - [`FanoutHub`]: in-process pub/sub over `ticket:<id>`, `department:<id>` and
//!   `user:<id>` channels, with live-subscriber queries for push suppression
//!
//! # Request Flow
//!
//! ```text
//! HTTP request
//!   └─ track_request             span "http_request", X-Correlation-ID
//!       └─ handler               builds a RequestContext, calls a service
//!           └─ AppError          domain error → status + JSON body
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod fanout;
pub mod middleware;

pub use error::AppError;
pub use extractors::{CorrelationId, JsonBody, PathParams, QueryParams};
pub use fanout::{FanoutHub, Presence, Published};
pub use middleware::{track_request, CORRELATION_ID_HEADER};

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
