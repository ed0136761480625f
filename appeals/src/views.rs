//! Response shapes shared by the HTTP API, the cache and real-time events.
//!
//! Views are hydrated: senders carry display identity and attachments carry
//! retrievable URLs instead of storage keys.

use appeals_core::thread::{Cursor, ThreadPage};
use appeals_core::{
    AttachmentId, AttachmentKind, Department, Message, MessageId, MessageKind, Priority,
    SystemEvent, Ticket, TicketSnapshot, TicketStatus, UserId, UserProfile,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Display identity of a user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    /// User id
    pub id: UserId,
    /// Display name
    pub name: String,
    /// Avatar URL
    pub avatar_url: Option<String>,
}

impl From<&UserProfile> for UserView {
    fn from(profile: &UserProfile) -> Self {
        Self {
            id: profile.id,
            name: profile.display_name.clone(),
            avatar_url: profile.avatar_url.clone(),
        }
    }
}

impl UserView {
    /// Placeholder for users the directory no longer knows.
    #[must_use]
    pub fn unknown(id: UserId) -> Self {
        Self {
            id,
            name: format!("User #{id}"),
            avatar_url: None,
        }
    }
}

/// An attachment with its URL.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentView {
    /// Attachment id
    pub id: AttachmentId,
    /// Original file name
    pub file_name: String,
    /// Media kind
    pub kind: AttachmentKind,
    /// Retrievable URL
    pub url: String,
}

/// A thread message as clients see it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    /// Message id
    pub id: MessageId,
    /// Owning ticket
    pub ticket_id: appeals_core::TicketId,
    /// Author, `None` for system messages
    pub sender: Option<UserView>,
    /// Body
    pub text: Option<String>,
    /// Kind
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Structured payload of system messages
    pub system_event: Option<SystemEvent>,
    /// Last edit time
    pub edited_at: Option<DateTime<Utc>>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Attached files
    pub attachments: Vec<AttachmentView>,
}

impl MessageView {
    /// Build a view from a message and already-resolved pieces.
    #[must_use]
    pub fn new(message: Message, sender: Option<UserView>, attachments: Vec<AttachmentView>) -> Self {
        Self {
            id: message.id,
            ticket_id: message.ticket_id,
            sender,
            text: message.text,
            kind: message.kind,
            system_event: message.system_event,
            edited_at: message.edited_at,
            created_at: message.created_at,
            attachments,
        }
    }
}

/// A page of a thread.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadPageView {
    /// Messages, oldest first
    pub messages: Vec<MessageView>,
    /// Older messages exist
    pub has_more_before: bool,
    /// Newer messages exist
    pub has_more_after: bool,
    /// Bootstrap anchor
    pub anchor_message_id: Option<MessageId>,
    /// Cursor of the oldest returned message
    pub prev_cursor: Option<String>,
    /// Cursor of the newest returned message
    pub next_cursor: Option<String>,
}

impl ThreadPageView {
    /// Combine a page with its hydrated messages.
    #[must_use]
    pub fn new(page: &ThreadPage, messages: Vec<MessageView>) -> Self {
        Self {
            messages,
            has_more_before: page.has_more_before,
            has_more_after: page.has_more_after,
            anchor_message_id: page.anchor_message_id,
            prev_cursor: page.prev_cursor().map(Cursor::encode),
            next_cursor: page.next_cursor().map(Cursor::encode),
        }
    }
}

/// Response to ticket creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedTicket {
    /// Ticket id
    pub id: appeals_core::TicketId,
    /// Human-readable number
    pub number: i64,
    /// Initial status
    pub status: TicketStatus,
    /// Priority
    pub priority: Priority,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl From<&Ticket> for CreatedTicket {
    fn from(ticket: &Ticket) -> Self {
        Self {
            id: ticket.id,
            number: ticket.number,
            status: ticket.status,
            priority: ticket.priority,
            created_at: ticket.created_at,
        }
    }
}

/// Viewer-independent ticket detail. This is what the detail cache stores.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketDetail {
    /// Ticket with assignee and watcher ids
    #[serde(flatten)]
    pub snapshot: TicketSnapshot,
    /// Author identity
    pub creator: UserView,
    /// Assignee identities
    pub assignee_profiles: Vec<UserView>,
    /// Watcher identities
    pub watcher_profiles: Vec<UserView>,
    /// Owning department
    pub department: Option<Department>,
    /// Originating department
    pub source_department: Option<Department>,
    /// Most recent messages, oldest first
    pub messages: Vec<MessageView>,
    /// Older messages exist beyond `messages`
    pub has_more_before: bool,
}

/// Ticket detail for one viewer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketDetailView {
    /// Shared detail
    #[serde(flatten)]
    pub detail: TicketDetail,
    /// Foreign messages the viewer has not read
    pub unread_count: i64,
}

/// Result of a ticket mutation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationResult {
    /// Ticket after the mutation
    pub ticket: TicketSnapshot,
    /// Whether anything was written
    pub changed: bool,
    /// System messages written, in order
    pub system_messages: Vec<MessageView>,
}
