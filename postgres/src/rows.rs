//! Row types and their conversion into domain records.

use appeals_core::{
    AppealsError, Attachment, AttachmentId, AttachmentKind, Department, DepartmentId, Message,
    MessageId, MessageKind, Result, StatusHistoryEntry, SystemEvent, Ticket, TicketId, UserId,
    UserProfile,
};
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use std::collections::HashMap;
use std::str::FromStr;

pub const TICKET_COLUMNS: &str = "t.id, t.number, t.from_department_id, t.to_department_id, \
     t.created_by, t.status, t.priority, t.title, t.deadline, t.created_at, t.updated_at";

pub const MESSAGE_COLUMNS: &str = "m.id, m.ticket_id, m.sender_id, m.text, m.kind, \
     m.system_event, m.edited_at, m.deleted, m.created_at";

pub const USER_COLUMNS: &str =
    "u.id, u.display_name, u.avatar_url, u.department_id, u.is_admin, u.is_manager";

fn parse<T: FromStr<Err = AppealsError>>(column: &str, raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|e| AppealsError::Storage(format!("bad {column} value in database: {e}")))
}

#[derive(Debug, sqlx::FromRow)]
pub struct TicketRow {
    pub id: i64,
    pub number: i64,
    pub from_department_id: Option<i64>,
    pub to_department_id: i64,
    pub created_by: i64,
    pub status: String,
    pub priority: String,
    pub title: String,
    pub deadline: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<TicketRow> for Ticket {
    type Error = AppealsError;

    fn try_from(row: TicketRow) -> Result<Self> {
        Ok(Self {
            id: TicketId(row.id),
            number: row.number,
            from_department: row.from_department_id.map(DepartmentId),
            to_department: DepartmentId(row.to_department_id),
            created_by: UserId(row.created_by),
            status: parse("status", &row.status)?,
            priority: parse("priority", &row.priority)?,
            title: row.title,
            deadline: row.deadline,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct TicketListRow {
    #[sqlx(flatten)]
    pub ticket: TicketRow,
    pub assignees: Vec<i64>,
    pub unread_count: i64,
}

#[derive(Debug, sqlx::FromRow)]
pub struct MessageRow {
    pub id: i64,
    pub ticket_id: i64,
    pub sender_id: Option<i64>,
    pub text: Option<String>,
    pub kind: String,
    pub system_event: Option<Json<SystemEvent>>,
    pub edited_at: Option<DateTime<Utc>>,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
}

impl MessageRow {
    pub fn into_message(self, attachments: Vec<Attachment>) -> Result<Message> {
        Ok(Message {
            id: MessageId(self.id),
            ticket_id: TicketId(self.ticket_id),
            sender_id: self.sender_id.map(UserId),
            text: self.text,
            kind: parse::<MessageKind>("kind", &self.kind)?,
            system_event: self.system_event.map(|Json(event)| event),
            edited_at: self.edited_at,
            deleted: self.deleted,
            created_at: self.created_at,
            attachments,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct AttachmentRow {
    pub id: i64,
    pub message_id: i64,
    pub storage_key: String,
    pub file_name: String,
    pub kind: String,
}

impl TryFrom<AttachmentRow> for Attachment {
    type Error = AppealsError;

    fn try_from(row: AttachmentRow) -> Result<Self> {
        Ok(Self {
            id: AttachmentId(row.id),
            message_id: MessageId(row.message_id),
            storage_key: row.storage_key,
            file_name: row.file_name,
            kind: parse::<AttachmentKind>("attachment kind", &row.kind)?,
        })
    }
}

/// Attach attachment rows to their messages, preserving message order.
pub fn hydrate(rows: Vec<MessageRow>, attachments: Vec<AttachmentRow>) -> Result<Vec<Message>> {
    let mut by_message: HashMap<i64, Vec<Attachment>> = HashMap::new();
    for row in attachments {
        by_message
            .entry(row.message_id)
            .or_default()
            .push(Attachment::try_from(row)?);
    }

    rows.into_iter()
        .map(|row| {
            let attachments = by_message.remove(&row.id).unwrap_or_default();
            row.into_message(attachments)
        })
        .collect()
}

#[derive(Debug, sqlx::FromRow)]
pub struct HistoryRow {
    pub ticket_id: i64,
    pub old_status: String,
    pub new_status: String,
    pub changed_by: i64,
    pub changed_at: DateTime<Utc>,
}

impl TryFrom<HistoryRow> for StatusHistoryEntry {
    type Error = AppealsError;

    fn try_from(row: HistoryRow) -> Result<Self> {
        Ok(Self {
            ticket_id: TicketId(row.ticket_id),
            old_status: parse("status", &row.old_status)?,
            new_status: parse("status", &row.new_status)?,
            changed_by: UserId(row.changed_by),
            changed_at: row.changed_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct UserRow {
    pub id: i64,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub department_id: Option<i64>,
    pub is_admin: bool,
    pub is_manager: bool,
}

impl From<UserRow> for UserProfile {
    fn from(row: UserRow) -> Self {
        Self {
            id: UserId(row.id),
            display_name: row.display_name,
            avatar_url: row.avatar_url,
            department_id: row.department_id.map(DepartmentId),
            is_admin: row.is_admin,
            is_manager: row.is_manager,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct DepartmentRow {
    pub id: i64,
    pub name: String,
}

impl From<DepartmentRow> for Department {
    fn from(row: DepartmentRow) -> Self {
        Self {
            id: DepartmentId(row.id),
            name: row.name,
        }
    }
}
