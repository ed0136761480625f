//! Ports implemented by the imperative shell.
//!
//! Every trait is object safe and `Send + Sync` so the application can hold
//! `Arc<dyn ...>` handles and swap Postgres for in-memory adapters in tests.

use crate::capabilities::Capabilities;
use crate::error::Result;
use crate::ids::{DepartmentId, MessageId, TicketId, UserId};
use crate::machine::TicketEffect;
use crate::thread::{Anchor, WindowQuery};
use crate::types::{
    Attachment, Department, ExportFilter, Message, MessageKey, NewAttachment, NewMessage,
    NewTicket, StatusHistoryEntry, Ticket, TicketFilter, TicketSnapshot, TicketSummary,
    TicketViewer, UserProfile,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Identity directory (read only).
#[async_trait]
pub trait Directory: Send + Sync {
    /// Resolve a bearer token to its user. `None` for unknown tokens.
    async fn authenticate(&self, token: &str) -> Result<Option<UserProfile>>;

    /// Look up one user.
    async fn profile(&self, id: UserId) -> Result<Option<UserProfile>>;

    /// Look up many users; unknown ids are omitted.
    async fn profiles(&self, ids: &[UserId]) -> Result<Vec<UserProfile>>;

    /// Look up one department.
    async fn department(&self, id: DepartmentId) -> Result<Option<Department>>;

    /// Look up many departments; unknown ids are omitted.
    async fn departments(&self, ids: &[DepartmentId]) -> Result<Vec<Department>>;
}

/// Role and permission resolution.
#[async_trait]
pub trait PermissionAdapter: Send + Sync {
    /// Flatten the roles of `profile` into capabilities.
    async fn capabilities(&self, profile: &UserProfile) -> Result<Capabilities>;
}

/// Everything a locked ticket transaction must persist.
#[derive(Clone, Debug)]
pub struct CommitPlan {
    /// Post-reduction snapshot
    pub next: TicketSnapshot,
    /// Effects, applied in order
    pub effects: Vec<TicketEffect>,
    /// Acting user (history rows)
    pub actor: UserId,
    /// Mutation time
    pub at: DateTime<Utc>,
}

/// A ticket row held under `SELECT ... FOR UPDATE`.
///
/// Dropping a transaction without committing rolls it back.
#[async_trait]
pub trait TicketTransaction: Send {
    /// Snapshot read under the lock.
    fn snapshot(&self) -> &TicketSnapshot;

    /// Apply `plan` and commit. Returns the system messages written, in order.
    async fn commit(self: Box<Self>, plan: CommitPlan) -> Result<Vec<Message>>;
}

/// Ticket persistence.
#[async_trait]
pub trait TicketStore: Send + Sync {
    /// Insert a ticket and its first message in one transaction.
    async fn create_ticket(&self, ticket: NewTicket, first: NewMessage) -> Result<(Ticket, Message)>;

    /// Read a ticket with its assignees and watchers.
    async fn load(&self, id: TicketId) -> Result<Option<TicketSnapshot>>;

    /// Lock a ticket for mutation. `NOT_FOUND` when it does not exist.
    ///
    /// The transaction may pin a pooled connection until it commits or drops;
    /// do not call other adapters backed by the same pool while holding it.
    async fn lock(&self, id: TicketId) -> Result<Box<dyn TicketTransaction>>;

    /// List rows for `viewer`, newest activity first.
    async fn list(&self, viewer: &TicketViewer, filter: &TicketFilter) -> Result<Vec<TicketSummary>>;

    /// Rows for CSV export, ordered by number.
    async fn export(&self, filter: &ExportFilter) -> Result<Vec<Ticket>>;

    /// Status history, oldest first.
    async fn status_history(&self, id: TicketId) -> Result<Vec<StatusHistoryEntry>>;
}

/// Message thread persistence.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Append a message and bump the ticket's `updated_at`.
    async fn append(&self, message: NewMessage) -> Result<Message>;

    /// Record an attachment on a message.
    async fn add_attachment(&self, message_id: MessageId, attachment: NewAttachment) -> Result<Attachment>;

    /// Find a message, deleted or not, with its attachments.
    async fn find(&self, id: MessageId) -> Result<Option<Message>>;

    /// Replace the text and set `edited_at`.
    async fn edit(&self, id: MessageId, text: Option<String>, at: DateTime<Utc>) -> Result<Message>;

    /// Set the soft-delete flag.
    async fn soft_delete(&self, id: MessageId) -> Result<()>;

    /// Fetch a window of non-deleted messages in fetch order (see [`crate::thread::select_window`]).
    async fn window(&self, query: &WindowQuery) -> Result<Vec<Message>>;

    /// Key of the viewer's first or last unread foreign message.
    async fn unread_anchor(&self, ticket_id: TicketId, viewer: UserId, anchor: Anchor) -> Result<Option<MessageKey>>;

    /// Backfill read receipts up to the greatest valid requested message.
    ///
    /// Runs in one transaction per `(ticket, viewer)` and returns the ids newly marked.
    async fn mark_read(
        &self,
        ticket_id: TicketId,
        viewer: UserId,
        requested: &[MessageId],
        at: DateTime<Utc>,
    ) -> Result<Vec<MessageId>>;

    /// Unread foreign messages for the viewer.
    async fn unread_count(&self, ticket_id: TicketId, viewer: UserId) -> Result<i64>;
}

/// Deep-link payload of a message push.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushPayload {
    /// Ticket the message belongs to
    pub ticket_id: TicketId,
    /// Human-readable ticket number
    pub ticket_number: i64,
    /// The new message
    pub message_id: MessageId,
    /// Author of the message
    pub sender_id: Option<UserId>,
    /// Display name of the author
    pub sender_name: String,
}

/// A push notification addressed to one user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushNotification {
    /// Recipient
    pub user_id: UserId,
    /// Notification title
    pub title: String,
    /// Notification body (a text snippet)
    pub body: String,
    /// Deep-link data
    pub data: PushPayload,
}

/// Push notification provider.
#[async_trait]
pub trait PushNotifier: Send + Sync {
    /// Deliver one notification. Failures are reported, never retried here.
    async fn push(&self, notification: &PushNotification) -> Result<()>;
}

/// Binary storage for attachments, addressed by opaque keys.
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    /// Store `bytes` and return the key they can be retrieved by.
    async fn put(&self, ticket_id: TicketId, file_name: &str, bytes: &[u8]) -> Result<String>;

    /// Retrievable URL for a stored key.
    fn url(&self, storage_key: &str) -> String;
}
