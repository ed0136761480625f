//! Ticket endpoints.
//!
//! - `POST /tickets` - create a ticket with its first message
//! - `GET /tickets` - list tickets in a scope
//! - `GET /tickets/:id` - ticket detail with recent messages
//! - `GET /tickets/:id/history` - status history
//! - `PUT /tickets/:id/assign`, `POST /tickets/:id/claim`,
//!   `PUT /tickets/:id/status`, `PUT /tickets/:id/department`,
//!   `PUT /tickets/:id/watchers` - state machine commands

use super::auth::Authenticated;
use super::{decode_uploads, parse_optional, UploadRequest};
use crate::server::state::AppState;
use crate::services::{CreateTicket, ListQuery};
use crate::views::{CreatedTicket, MutationResult, TicketDetailView};
use appeals_core::{
    DepartmentId, Priority, StatusHistoryEntry, TicketId, TicketScope, TicketStatus,
    TicketSummary, UserId,
};
use appeals_web::{AppError, JsonBody, PathParams, QueryParams, WebResult};
use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request to create a ticket.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTicketRequest {
    /// Department that should handle the ticket
    pub to_department_id: DepartmentId,
    /// Department the request comes from (defaults to the caller's)
    pub from_department_id: Option<DepartmentId>,
    /// `LOW`, `MEDIUM`, `HIGH` or `CRITICAL`
    pub priority: Option<String>,
    /// Title; blank falls back to the first message
    pub title: Option<String>,
    /// First message
    pub text: Option<String>,
    /// Optional deadline
    pub deadline: Option<DateTime<Utc>>,
    /// Files attached to the first message
    #[serde(default)]
    pub attachments: Vec<UploadRequest>,
}

/// Query parameters for listing tickets.
#[derive(Debug, Default, Deserialize)]
pub struct ListTicketsQuery {
    /// `my`, `department` or `assigned`
    #[serde(default)]
    pub scope: TicketScope,
    /// Status filter
    pub status: Option<String>,
    /// Priority filter
    pub priority: Option<String>,
    /// Page size (default 30, max 100)
    pub limit: Option<i64>,
    /// Rows to skip
    pub offset: Option<i64>,
}

/// Request to replace the assignee set.
#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    /// New assignees; empty unassigns everybody
    pub assignees: Vec<UserId>,
}

/// Request to change the status.
#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    /// Target status
    pub status: String,
}

/// Request to move a ticket.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentRequest {
    /// New owning department
    pub department_id: DepartmentId,
}

/// Request to replace the watcher set.
#[derive(Debug, Deserialize)]
pub struct WatchersRequest {
    /// New watchers
    pub watchers: Vec<UserId>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Create a ticket.
///
/// # Errors
///
/// `VALIDATION` for unknown departments, bad priorities, undecodable
/// attachments or an empty first message.
pub async fn create_ticket(
    Authenticated(ctx): Authenticated,
    State(state): State<AppState>,
    JsonBody(request): JsonBody<CreateTicketRequest>,
) -> WebResult<(StatusCode, Json<CreatedTicket>)> {
    let input = CreateTicket {
        to_department: request.to_department_id,
        from_department: request.from_department_id,
        priority: parse_optional::<Priority>(request.priority.as_deref())?,
        title: request.title,
        text: request.text,
        deadline: request.deadline,
        attachments: decode_uploads(request.attachments)?,
    };

    let created = state.service.create_ticket(&ctx, input).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// List tickets.
///
/// # Errors
///
/// `VALIDATION` for unknown status or priority values.
pub async fn list_tickets(
    Authenticated(ctx): Authenticated,
    State(state): State<AppState>,
    QueryParams(query): QueryParams<ListTicketsQuery>,
) -> WebResult<Json<Vec<TicketSummary>>> {
    let query = ListQuery {
        scope: query.scope,
        status: parse_optional::<TicketStatus>(query.status.as_deref())?,
        priority: parse_optional::<Priority>(query.priority.as_deref())?,
        limit: query.limit,
        offset: query.offset,
    };

    Ok(Json(state.service.list_tickets(&ctx, &query).await?))
}

/// Ticket detail.
///
/// # Errors
///
/// `NOT_FOUND` or `FORBIDDEN`.
pub async fn get_ticket(
    Authenticated(ctx): Authenticated,
    State(state): State<AppState>,
    PathParams(id): PathParams<i64>,
) -> WebResult<Json<TicketDetailView>> {
    Ok(Json(state.service.ticket_detail(&ctx, TicketId(id)).await?))
}

/// Status history.
///
/// # Errors
///
/// `NOT_FOUND` or `FORBIDDEN`.
pub async fn get_history(
    Authenticated(ctx): Authenticated,
    State(state): State<AppState>,
    PathParams(id): PathParams<i64>,
) -> WebResult<Json<Vec<StatusHistoryEntry>>> {
    Ok(Json(state.service.history(&ctx, TicketId(id)).await?))
}

/// Replace the assignee set.
///
/// # Errors
///
/// `FORBIDDEN` unless admin or manager; `VALIDATION` for unknown users.
pub async fn assign(
    Authenticated(ctx): Authenticated,
    State(state): State<AppState>,
    PathParams(id): PathParams<i64>,
    JsonBody(request): JsonBody<AssignRequest>,
) -> WebResult<Json<MutationResult>> {
    Ok(Json(state.service.assign(&ctx, TicketId(id), request.assignees).await?))
}

/// Self-assign.
///
/// # Errors
///
/// `FORBIDDEN` for users outside the target department.
pub async fn claim(
    Authenticated(ctx): Authenticated,
    State(state): State<AppState>,
    PathParams(id): PathParams<i64>,
) -> WebResult<Json<MutationResult>> {
    Ok(Json(state.service.claim(&ctx, TicketId(id)).await?))
}

/// Change the status.
///
/// # Errors
///
/// `VALIDATION` for unknown statuses; `FORBIDDEN` for disallowed transitions.
pub async fn change_status(
    Authenticated(ctx): Authenticated,
    State(state): State<AppState>,
    PathParams(id): PathParams<i64>,
    JsonBody(request): JsonBody<StatusRequest>,
) -> WebResult<Json<MutationResult>> {
    let status: TicketStatus = request.status.parse().map_err(AppError::from)?;
    Ok(Json(state.service.change_status(&ctx, TicketId(id), status).await?))
}

/// Move to another department.
///
/// # Errors
///
/// `FORBIDDEN` unless admin or manager of the current department.
pub async fn change_department(
    Authenticated(ctx): Authenticated,
    State(state): State<AppState>,
    PathParams(id): PathParams<i64>,
    JsonBody(request): JsonBody<DepartmentRequest>,
) -> WebResult<Json<MutationResult>> {
    Ok(Json(
        state
            .service
            .change_department(&ctx, TicketId(id), request.department_id)
            .await?,
    ))
}

/// Replace the watcher set.
///
/// # Errors
///
/// `FORBIDDEN` for uninvolved users; `VALIDATION` for unknown users.
pub async fn set_watchers(
    Authenticated(ctx): Authenticated,
    State(state): State<AppState>,
    PathParams(id): PathParams<i64>,
    JsonBody(request): JsonBody<WatchersRequest>,
) -> WebResult<Json<MutationResult>> {
    Ok(Json(state.service.set_watchers(&ctx, TicketId(id), request.watchers).await?))
}
