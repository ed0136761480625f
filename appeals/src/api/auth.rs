//! Request authentication.
//!
//! Every API route requires a bearer token, sent as
//! `Authorization: Bearer <token>` or, for browsers opening a WebSocket,
//! as the `token` query parameter. The token is resolved through the
//! directory and flattened into a [`RequestContext`].

use crate::server::state::AppState;
use appeals_core::RequestContext;
use appeals_web::{AppError, CorrelationId};
use axum::{
    async_trait,
    extract::{FromRequestParts, Query},
    http::{header::AUTHORIZATION, request::Parts},
};
use serde::Deserialize;

/// Bearer token from the `Authorization` header or the `token` query parameter.
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(header) = parts.headers.get(AUTHORIZATION) {
            let header = header
                .to_str()
                .map_err(|_| AppError::unauthorized("Invalid authorization header"))?;
            let token = header
                .strip_prefix("Bearer ")
                .ok_or_else(|| AppError::unauthorized("Invalid authorization format. Expected 'Bearer <token>'"))?
                .trim();
            if token.is_empty() {
                return Err(AppError::unauthorized("Empty bearer token"));
            }
            return Ok(Self(token.to_string()));
        }

        Query::<TokenQuery>::try_from_uri(&parts.uri)
            .ok()
            .and_then(|Query(q)| q.token)
            .filter(|t| !t.trim().is_empty())
            .map(Self)
            .ok_or_else(|| AppError::unauthorized("Missing authorization header"))
    }
}

/// An authenticated caller allowed to use the appeals module.
#[derive(Debug, Clone)]
pub struct Authenticated(pub RequestContext);

#[async_trait]
impl FromRequestParts<AppState> for Authenticated {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let bearer = BearerToken::from_request_parts(parts, state).await?;
        let CorrelationId(correlation_id) = CorrelationId::from_request_parts(parts, state)
            .await
            .unwrap_or_else(|never| match never {});

        let ctx = state.service.authenticate(&bearer.0, correlation_id).await?;
        Ok(Self(ctx))
    }
}
