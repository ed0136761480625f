//! Thread endpoints.
//!
//! - `GET /tickets/:id/messages` - page or bootstrap a thread
//! - `POST /tickets/:id/messages` - post a message
//! - `POST /tickets/:id/messages/read-bulk` - mark messages read
//! - `POST /tickets/:id/messages/:message_id/read` - mark one message read
//! - `PUT /messages/:id`, `DELETE /messages/:id` - edit or delete one's own message

use super::auth::Authenticated;
use super::{decode_uploads, UploadRequest};
use crate::server::state::AppState;
use crate::services::{PostMessage, ThreadMode, ThreadQuery};
use crate::views::{MessageView, ThreadPageView};
use appeals_core::thread::{Anchor, Direction};
use appeals_core::{MessageId, TicketId};
use appeals_web::{JsonBody, PathParams, QueryParams, WebResult};
use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Wire form of [`ThreadMode`].
#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModeParam {
    /// Cursor paging
    #[default]
    Page,
    /// Center on the unread anchor
    Bootstrap,
}

/// Query parameters for reading a thread.
#[derive(Debug, Default, Deserialize)]
pub struct MessagesQuery {
    /// `page` (default) or `bootstrap`
    #[serde(default)]
    pub mode: ModeParam,
    /// Page size
    pub limit: Option<i64>,
    /// Cursor from a previous page
    pub cursor: Option<String>,
    /// `before` (default) or `after`
    #[serde(default)]
    pub direction: Direction,
    /// `first_unread` (default) or `last_unread`
    #[serde(default)]
    pub anchor: Anchor,
    /// Messages before the anchor
    pub before: Option<i64>,
    /// Messages after the anchor
    pub after: Option<i64>,
}

/// Request to post a message.
#[derive(Debug, Deserialize)]
pub struct PostMessageRequest {
    /// Body
    pub text: Option<String>,
    /// Files
    #[serde(default)]
    pub attachments: Vec<UploadRequest>,
}

/// Request to edit a message.
#[derive(Debug, Deserialize)]
pub struct EditMessageRequest {
    /// New body; blank is only allowed on messages with attachments
    pub text: Option<String>,
}

/// Request to mark messages read.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadBulkRequest {
    /// Messages the client has displayed
    pub message_ids: Vec<MessageId>,
}

/// Messages newly marked read.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadResponse {
    /// Ids marked by this request, ascending
    pub marked: Vec<MessageId>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Read a page of a thread.
///
/// # Errors
///
/// `VALIDATION` for malformed cursors; `NOT_FOUND` or `FORBIDDEN` for the ticket.
pub async fn list_messages(
    Authenticated(ctx): Authenticated,
    State(state): State<AppState>,
    PathParams(id): PathParams<i64>,
    QueryParams(query): QueryParams<MessagesQuery>,
) -> WebResult<Json<ThreadPageView>> {
    let query = ThreadQuery {
        mode: match query.mode {
            ModeParam::Page => ThreadMode::Page,
            ModeParam::Bootstrap => ThreadMode::Bootstrap,
        },
        limit: query.limit,
        cursor: query.cursor,
        direction: query.direction,
        anchor: query.anchor,
        before: query.before,
        after: query.after,
    };

    Ok(Json(state.service.messages(&ctx, TicketId(id), &query).await?))
}

/// Post a message.
///
/// # Errors
///
/// `VALIDATION` for empty messages or undecodable attachments.
pub async fn post_message(
    Authenticated(ctx): Authenticated,
    State(state): State<AppState>,
    PathParams(id): PathParams<i64>,
    JsonBody(request): JsonBody<PostMessageRequest>,
) -> WebResult<(StatusCode, Json<MessageView>)> {
    let input = PostMessage {
        text: request.text,
        attachments: decode_uploads(request.attachments)?,
    };

    let message = state.service.post_message(&ctx, TicketId(id), input).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// Mark messages read with backfill.
///
/// # Errors
///
/// `NOT_FOUND` or `FORBIDDEN` for the ticket.
pub async fn mark_read_bulk(
    Authenticated(ctx): Authenticated,
    State(state): State<AppState>,
    PathParams(id): PathParams<i64>,
    JsonBody(request): JsonBody<ReadBulkRequest>,
) -> WebResult<Json<ReadResponse>> {
    let marked = state
        .service
        .mark_read(&ctx, TicketId(id), &request.message_ids)
        .await?;
    Ok(Json(ReadResponse { marked }))
}

/// Mark one message read with backfill.
///
/// # Errors
///
/// `NOT_FOUND` when the message is not part of the ticket.
pub async fn mark_read_one(
    Authenticated(ctx): Authenticated,
    State(state): State<AppState>,
    PathParams((id, message_id)): PathParams<(i64, i64)>,
) -> WebResult<Json<ReadResponse>> {
    let marked = state
        .service
        .mark_one_read(&ctx, TicketId(id), MessageId(message_id))
        .await?;
    Ok(Json(ReadResponse { marked }))
}

/// Edit one's own message.
///
/// # Errors
///
/// `FORBIDDEN` for other users' or system messages.
pub async fn edit_message(
    Authenticated(ctx): Authenticated,
    State(state): State<AppState>,
    PathParams(id): PathParams<i64>,
    JsonBody(request): JsonBody<EditMessageRequest>,
) -> WebResult<Json<MessageView>> {
    Ok(Json(
        state
            .service
            .edit_message(&ctx, MessageId(id), request.text)
            .await?,
    ))
}

/// Delete one's own message.
///
/// # Errors
///
/// `FORBIDDEN` for other users' or system messages.
pub async fn delete_message(
    Authenticated(ctx): Authenticated,
    State(state): State<AppState>,
    PathParams(id): PathParams<i64>,
) -> WebResult<StatusCode> {
    state.service.delete_message(&ctx, MessageId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
