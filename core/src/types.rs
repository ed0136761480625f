//! Domain records: tickets, messages, attachments, history, directory entries.

use crate::error::{AppealsError, Result};
use crate::ids::{AttachmentId, DepartmentId, MessageId, TicketId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Maximum length (in characters) of a title derived from the first message.
pub const DERIVED_TITLE_MAX_CHARS: usize = 120;

// ═══════════════════════════════════════════════════════════════════════
// Ticket
// ═══════════════════════════════════════════════════════════════════════

/// Lifecycle status of a ticket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    /// Submitted, nobody working on it
    Open,
    /// At least one assignee is working on it
    InProgress,
    /// Assignee considers it done; creator may reopen or complete
    Resolved,
    /// Closed as done
    Completed,
    /// Closed without action
    Declined,
}

impl TicketStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::Open,
        Self::InProgress,
        Self::Resolved,
        Self::Completed,
        Self::Declined,
    ];

    /// Wire / storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::InProgress => "IN_PROGRESS",
            Self::Resolved => "RESOLVED",
            Self::Completed => "COMPLETED",
            Self::Declined => "DECLINED",
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = AppealsError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| AppealsError::Validation(format!("unknown status: {s}")))
    }
}

/// Urgency of a ticket.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    /// Can wait
    Low,
    /// Normal handling
    #[default]
    Medium,
    /// Handle soon
    High,
    /// Handle now
    Critical,
}

impl Priority {
    /// All priorities, lowest first.
    pub const ALL: [Self; 4] = [Self::Low, Self::Medium, Self::High, Self::Critical];

    /// Wire / storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = AppealsError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|priority| priority.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| AppealsError::Validation(format!("unknown priority: {s}")))
    }
}

/// A ticket row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    /// Primary key
    pub id: TicketId,
    /// Sequential human-readable number
    pub number: i64,
    /// Department the request comes from, if any
    pub from_department: Option<DepartmentId>,
    /// Department that owns the ticket
    pub to_department: DepartmentId,
    /// Author
    pub created_by: UserId,
    /// Current status
    pub status: TicketStatus,
    /// Urgency
    pub priority: Priority,
    /// Title
    pub title: String,
    /// Optional deadline
    pub deadline: Option<DateTime<Utc>>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

/// A ticket together with its assignee and watcher sets.
///
/// This is the state the ticket reducer operates on. It is read under the row lock.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketSnapshot {
    /// The ticket row
    #[serde(flatten)]
    pub ticket: Ticket,
    /// Current assignees
    pub assignees: BTreeSet<UserId>,
    /// Current watchers
    pub watchers: BTreeSet<UserId>,
}

impl TicketSnapshot {
    /// Snapshot of a freshly created ticket (no assignees, no watchers).
    #[must_use]
    pub const fn new(ticket: Ticket) -> Self {
        Self {
            ticket,
            assignees: BTreeSet::new(),
            watchers: BTreeSet::new(),
        }
    }
}

/// Input for ticket creation, already validated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewTicket {
    /// Originating department
    pub from_department: Option<DepartmentId>,
    /// Target department
    pub to_department: DepartmentId,
    /// Author
    pub created_by: UserId,
    /// Urgency
    pub priority: Priority,
    /// Resolved title (never blank)
    pub title: String,
    /// Optional deadline
    pub deadline: Option<DateTime<Utc>>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Resolve the title of a new ticket.
///
/// A blank title falls back to the trimmed first message text, truncated to
/// [`DERIVED_TITLE_MAX_CHARS`] characters, then to the first attachment's file name.
///
/// # Errors
///
/// Returns [`AppealsError::Validation`] when nothing usable is available.
pub fn resolve_title(
    title: Option<&str>,
    first_text: Option<&str>,
    first_file_name: Option<&str>,
) -> Result<String> {
    if let Some(title) = title.map(str::trim).filter(|t| !t.is_empty()) {
        return Ok(title.to_string());
    }

    if let Some(text) = first_text.map(str::trim).filter(|t| !t.is_empty()) {
        return Ok(text.chars().take(DERIVED_TITLE_MAX_CHARS).collect());
    }

    first_file_name
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(ToString::to_string)
        .ok_or_else(|| AppealsError::Validation("title or message text is required".into()))
}

/// One row of status history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusHistoryEntry {
    /// Ticket
    pub ticket_id: TicketId,
    /// Status before the transition
    pub old_status: TicketStatus,
    /// Status after the transition
    pub new_status: TicketStatus,
    /// Actor
    pub changed_by: UserId,
    /// Time of the transition
    pub changed_at: DateTime<Utc>,
}

/// Which tickets a list request is about.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketScope {
    /// Tickets the viewer created
    #[default]
    My,
    /// Tickets owned by the viewer's departments
    Department,
    /// Tickets the viewer is assigned to
    Assigned,
}

impl TicketScope {
    /// Wire representation, also used in cache keys.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::My => "my",
            Self::Department => "department",
            Self::Assigned => "assigned",
        }
    }
}

/// Who is listing tickets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TicketViewer {
    /// The viewer
    pub user_id: UserId,
    /// Departments whose tickets the viewer sees in `department` scope
    pub departments: Vec<DepartmentId>,
    /// Admins see every ticket in `department` scope
    pub admin: bool,
}

/// Filter for ticket lists.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TicketFilter {
    /// Scope
    pub scope: TicketScope,
    /// Status filter
    pub status: Option<TicketStatus>,
    /// Priority filter
    pub priority: Option<Priority>,
    /// Page size
    pub limit: i64,
    /// Page offset
    pub offset: i64,
}

/// Filter for CSV export.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExportFilter {
    /// Status filter
    pub status: Option<TicketStatus>,
    /// Priority filter
    pub priority: Option<Priority>,
    /// Target department filter
    pub to_department: Option<DepartmentId>,
    /// Created at or after
    pub created_from: Option<DateTime<Utc>>,
    /// Created strictly before
    pub created_to: Option<DateTime<Utc>>,
}

/// A ticket list row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketSummary {
    /// The ticket
    #[serde(flatten)]
    pub ticket: Ticket,
    /// Current assignees
    pub assignees: Vec<UserId>,
    /// Most recent non-deleted message
    pub last_message: Option<Message>,
    /// Foreign messages the viewer has not read
    pub unread_count: i64,
}

// ═══════════════════════════════════════════════════════════════════════
// Messages
// ═══════════════════════════════════════════════════════════════════════

/// Message kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    /// Written by a person
    User,
    /// Audit message generated by a ticket mutation
    System,
}

impl MessageKind {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::System => "SYSTEM",
        }
    }
}

impl FromStr for MessageKind {
    type Err = AppealsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "USER" => Ok(Self::User),
            "SYSTEM" => Ok(Self::System),
            other => Err(AppealsError::Internal(format!("unknown message kind: {other}"))),
        }
    }
}

/// Display identity of a user inside a system event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    /// User id
    pub id: UserId,
    /// Display name at the time of the event
    pub name: String,
}

/// Display identity of a department inside a system event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepartmentRef {
    /// Department id
    pub id: DepartmentId,
    /// Name at the time of the event
    pub name: String,
}

/// Structured payload of a system message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SystemEvent {
    /// Status transition
    StatusChanged {
        /// Previous status
        from: TicketStatus,
        /// New status
        to: TicketStatus,
    },
    /// Assignee set replaced
    AssigneesChanged {
        /// Newly assigned users
        added: Vec<UserRef>,
        /// Users no longer assigned
        removed: Vec<UserRef>,
    },
    /// Ticket moved to another department
    DepartmentChanged {
        /// Previous owner
        from: DepartmentRef,
        /// New owner
        to: DepartmentRef,
    },
}

impl SystemEvent {
    /// Human-readable text stored alongside the structured payload.
    #[must_use]
    pub fn describe(&self) -> String {
        fn names(users: &[UserRef]) -> String {
            users
                .iter()
                .map(|user| user.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        }

        match self {
            Self::StatusChanged { from, to } => format!("Status changed from {from} to {to}"),
            Self::AssigneesChanged { added, removed } => {
                let mut parts = Vec::with_capacity(2);
                if !added.is_empty() {
                    parts.push(format!("Assigned: {}", names(added)));
                }
                if !removed.is_empty() {
                    parts.push(format!("Unassigned: {}", names(removed)));
                }
                parts.join("; ")
            }
            Self::DepartmentChanged { from, to } => {
                format!("Department changed from {} to {}", from.name, to.name)
            }
        }
    }
}

/// Ordering key of a message within its thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageKey {
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Tie breaker
    pub id: MessageId,
}

/// A thread message with its attachments.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Primary key
    pub id: MessageId,
    /// Owning ticket
    pub ticket_id: TicketId,
    /// Author, `None` for system messages
    pub sender_id: Option<UserId>,
    /// Body, `None` for attachment-only messages
    pub text: Option<String>,
    /// Kind
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Structured payload of system messages
    pub system_event: Option<SystemEvent>,
    /// Last edit time
    pub edited_at: Option<DateTime<Utc>>,
    /// Soft-delete flag
    pub deleted: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Attached files
    pub attachments: Vec<Attachment>,
}

impl Message {
    /// Ordering key.
    #[must_use]
    pub const fn key(&self) -> MessageKey {
        MessageKey {
            created_at: self.created_at,
            id: self.id,
        }
    }

    /// Whether `viewer` did not author this message. System messages are foreign to everyone.
    #[must_use]
    pub fn is_foreign_to(&self, viewer: UserId) -> bool {
        self.sender_id != Some(viewer)
    }
}

/// Input for appending a message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewMessage {
    /// Owning ticket
    pub ticket_id: TicketId,
    /// Author, `None` for system messages
    pub sender_id: Option<UserId>,
    /// Body
    pub text: Option<String>,
    /// Kind
    pub kind: MessageKind,
    /// Structured payload of system messages
    pub system_event: Option<SystemEvent>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl NewMessage {
    /// A user-authored message.
    #[must_use]
    pub const fn user(
        ticket_id: TicketId,
        sender_id: UserId,
        text: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            ticket_id,
            sender_id: Some(sender_id),
            text,
            kind: MessageKind::User,
            system_event: None,
            created_at,
        }
    }

    /// A system message carrying `event`.
    #[must_use]
    pub fn system(ticket_id: TicketId, event: SystemEvent, created_at: DateTime<Utc>) -> Self {
        Self {
            ticket_id,
            sender_id: None,
            text: Some(event.describe()),
            kind: MessageKind::System,
            system_event: Some(event),
            created_at,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Attachments
// ═══════════════════════════════════════════════════════════════════════

/// Coarse media type of an attachment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttachmentKind {
    /// Picture
    Image,
    /// Video clip
    Video,
    /// Audio clip or voice note
    Audio,
    /// Anything else
    File,
}

impl AttachmentKind {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Image => "IMAGE",
            Self::Video => "VIDEO",
            Self::Audio => "AUDIO",
            Self::File => "FILE",
        }
    }

    /// Guess the kind from a file extension.
    #[must_use]
    pub fn from_file_name(file_name: &str) -> Self {
        let extension = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "jpg" | "jpeg" | "png" | "gif" | "webp" | "heic" | "bmp" | "svg" => Self::Image,
            "mp4" | "mov" | "avi" | "mkv" | "webm" | "3gp" => Self::Video,
            "mp3" | "wav" | "ogg" | "oga" | "m4a" | "aac" | "opus" | "flac" => Self::Audio,
            _ => Self::File,
        }
    }
}

impl FromStr for AttachmentKind {
    type Err = AppealsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "IMAGE" => Ok(Self::Image),
            "VIDEO" => Ok(Self::Video),
            "AUDIO" => Ok(Self::Audio),
            "FILE" => Ok(Self::File),
            other => Err(AppealsError::Validation(format!(
                "unknown attachment kind: {other}"
            ))),
        }
    }
}

/// A stored attachment reference.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// Primary key
    pub id: AttachmentId,
    /// Owning message
    pub message_id: MessageId,
    /// Opaque storage key
    pub storage_key: String,
    /// Original file name
    pub file_name: String,
    /// Media kind
    pub kind: AttachmentKind,
}

/// Input for recording an attachment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewAttachment {
    /// Opaque storage key returned by the storage backend
    pub storage_key: String,
    /// Original file name
    pub file_name: String,
    /// Media kind
    pub kind: AttachmentKind,
}

// ═══════════════════════════════════════════════════════════════════════
// Directory
// ═══════════════════════════════════════════════════════════════════════

/// Display identity of an employee.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// User id
    pub id: UserId,
    /// Display name
    pub display_name: String,
    /// Avatar URL
    pub avatar_url: Option<String>,
    /// Home department
    pub department_id: Option<DepartmentId>,
    /// Directory admin flag
    pub is_admin: bool,
    /// Directory manager flag (manager of the home department)
    pub is_manager: bool,
}

/// A department.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    /// Department id
    pub id: DepartmentId,
    /// Name
    pub name: String,
}
