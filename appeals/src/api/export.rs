//! `GET /tickets/export` - CSV export for admins and auditors.

use super::auth::Authenticated;
use super::parse_optional;
use crate::server::state::AppState;
use appeals_core::{DepartmentId, ExportFilter, Priority, TicketStatus};
use appeals_web::{QueryParams, WebResult};
use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Export filters.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportQuery {
    /// Status filter
    pub status: Option<String>,
    /// Priority filter
    pub priority: Option<String>,
    /// Owning department filter
    pub to_department_id: Option<DepartmentId>,
    /// Created at or after
    pub from: Option<DateTime<Utc>>,
    /// Created before
    pub to: Option<DateTime<Utc>>,
}

/// Export tickets as CSV.
///
/// # Errors
///
/// `FORBIDDEN` without admin or the export permission.
pub async fn export_tickets(
    Authenticated(ctx): Authenticated,
    State(state): State<AppState>,
    QueryParams(query): QueryParams<ExportQuery>,
) -> WebResult<impl IntoResponse> {
    let filter = ExportFilter {
        status: parse_optional::<TicketStatus>(query.status.as_deref())?,
        priority: parse_optional::<Priority>(query.priority.as_deref())?,
        to_department: query.to_department_id,
        created_from: query.from,
        created_to: query.to,
    };

    let csv = state.service.export_csv(&ctx, &filter).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"tickets.csv\""),
        ],
        csv,
    ))
}
