//! Message thread algorithms.
//!
//! Messages are totally ordered by `(created_at, id)`. Pagination walks that
//! order with opaque cursors; bootstrap centers the first window on the viewer's
//! first or last unread message; read receipts are backfilled so the read set of
//! a viewer is always a prefix of the foreign-authored sequence.
//!
//! Storage backends fetch rows ([`select_window`] is the reference behavior);
//! everything else here is pure.

use crate::error::{AppealsError, Result};
use crate::ids::{MessageId, TicketId, UserId};
use crate::types::{Message, MessageKey};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Default number of messages around a bootstrap anchor.
pub const DEFAULT_BOOTSTRAP_SPAN: usize = 20;

// ═══════════════════════════════════════════════════════════════════════
// Cursor
// ═══════════════════════════════════════════════════════════════════════

/// Position in a thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cursor {
    /// Creation time of the message at this position
    pub timestamp: DateTime<Utc>,
    /// Id of the message at this position
    pub id: MessageId,
}

impl Cursor {
    /// Cursor pointing at `message`.
    #[must_use]
    pub const fn of(message: &Message) -> Self {
        Self {
            timestamp: message.created_at,
            id: message.id,
        }
    }

    /// Ordering key this cursor points at.
    #[must_use]
    pub const fn key(self) -> MessageKey {
        MessageKey {
            created_at: self.timestamp,
            id: self.id,
        }
    }

    /// Opaque URL-safe encoding.
    #[must_use]
    pub fn encode(self) -> String {
        URL_SAFE_NO_PAD.encode(format!("{}:{}", self.timestamp.timestamp_micros(), self.id))
    }

    /// Decode a cursor produced by [`Cursor::encode`].
    ///
    /// # Errors
    ///
    /// Returns [`AppealsError::Validation`] for anything that is not a valid cursor.
    pub fn decode(raw: &str) -> Result<Self> {
        let invalid = || AppealsError::Validation("invalid cursor".into());

        let bytes = URL_SAFE_NO_PAD.decode(raw.trim()).map_err(|_| invalid())?;
        let text = String::from_utf8(bytes).map_err(|_| invalid())?;
        let (micros, id) = text.split_once(':').ok_or_else(invalid)?;
        let micros: i64 = micros.parse().map_err(|_| invalid())?;
        let id: i64 = id.parse().map_err(|_| invalid())?;
        let timestamp = timestamp_from_micros(micros).ok_or_else(invalid)?;

        Ok(Self {
            timestamp,
            id: MessageId(id),
        })
    }
}

fn timestamp_from_micros(micros: i64) -> Option<DateTime<Utc>> {
    let secs = micros.div_euclid(1_000_000);
    let nanos = u32::try_from(micros.rem_euclid(1_000_000) * 1_000).ok()?;
    DateTime::from_timestamp(secs, nanos)
}

// ═══════════════════════════════════════════════════════════════════════
// Window queries
// ═══════════════════════════════════════════════════════════════════════

/// Paging direction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Older messages, fetched newest first
    #[default]
    Before,
    /// Newer messages, fetched oldest first
    After,
}

/// Where a window starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bound {
    /// From the newest (`Before`) or oldest (`After`) end
    Unbounded,
    /// Strictly past the key
    Exclusive(MessageKey),
    /// At or past the key
    Inclusive(MessageKey),
}

/// A contiguous run of non-deleted messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowQuery {
    /// Thread
    pub ticket_id: TicketId,
    /// Walk direction
    pub direction: Direction,
    /// Start
    pub bound: Bound,
    /// Maximum number of rows
    pub limit: usize,
}

impl WindowQuery {
    fn admits(&self, key: MessageKey) -> bool {
        match (self.direction, self.bound) {
            (_, Bound::Unbounded) => true,
            (Direction::Before, Bound::Exclusive(b)) => key < b,
            (Direction::Before, Bound::Inclusive(b)) => key <= b,
            (Direction::After, Bound::Exclusive(b)) => key > b,
            (Direction::After, Bound::Inclusive(b)) => key >= b,
        }
    }
}

/// Reference window selection over an in-memory thread.
///
/// Returns rows in fetch order: descending for [`Direction::Before`], ascending
/// for [`Direction::After`]. Deleted messages and other tickets are skipped.
#[must_use]
pub fn select_window(messages: &[Message], query: &WindowQuery) -> Vec<Message> {
    let mut rows: Vec<&Message> = messages
        .iter()
        .filter(|m| m.ticket_id == query.ticket_id && !m.deleted && query.admits(m.key()))
        .collect();

    rows.sort_by_key(|m| m.key());
    if query.direction == Direction::Before {
        rows.reverse();
    }

    rows.into_iter().take(query.limit).cloned().collect()
}

/// Clamp a requested page size into `1..=max`, using `default` when absent.
#[must_use]
pub fn clamp_limit(requested: Option<i64>, default: usize, max: usize) -> usize {
    let max = max.max(1);
    requested.map_or(default, |n| usize::try_from(n.max(1)).unwrap_or(max)).clamp(1, max)
}

// ═══════════════════════════════════════════════════════════════════════
// Pages
// ═══════════════════════════════════════════════════════════════════════

/// Which unread message a bootstrap centers on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Anchor {
    /// Oldest unread foreign message
    #[default]
    FirstUnread,
    /// Newest unread foreign message
    LastUnread,
}

/// A slice of a thread, oldest first.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ThreadPage {
    /// Messages, ascending
    pub messages: Vec<Message>,
    /// Older messages exist
    pub has_more_before: bool,
    /// Newer messages exist
    pub has_more_after: bool,
    /// Bootstrap anchor, if one was found
    pub anchor_message_id: Option<MessageId>,
}

impl ThreadPage {
    /// Cursor of the oldest returned message.
    #[must_use]
    pub fn prev_cursor(&self) -> Option<Cursor> {
        self.messages.first().map(Cursor::of)
    }

    /// Cursor of the newest returned message.
    #[must_use]
    pub fn next_cursor(&self) -> Option<Cursor> {
        self.messages.last().map(Cursor::of)
    }
}

/// Turn a `limit + 1` fetch into a page.
///
/// `rows` are in fetch order. The extra row, if present, only signals that more
/// messages exist in `direction`.
#[must_use]
pub fn assemble_page(direction: Direction, mut rows: Vec<Message>, limit: usize) -> ThreadPage {
    let has_more = rows.len() > limit;
    rows.truncate(limit);
    if direction == Direction::Before {
        rows.reverse();
    }

    ThreadPage {
        messages: rows,
        has_more_before: has_more && direction == Direction::Before,
        has_more_after: has_more && direction == Direction::After,
        anchor_message_id: None,
    }
}

/// Merge the two fetches around a bootstrap anchor.
///
/// `older` holds up to `before + 1` rows strictly before the anchor, newest first.
/// `newer` holds up to `after + 2` rows from the anchor onward, oldest first: the
/// anchor itself, `after` rows, and one probe row.
#[must_use]
pub fn assemble_bootstrap(
    anchor: MessageId,
    mut older: Vec<Message>,
    mut newer: Vec<Message>,
    before: usize,
    after: usize,
) -> ThreadPage {
    let has_more_before = older.len() > before;
    older.truncate(before);
    older.reverse();

    let has_more_after = newer.len() > after + 1;
    newer.truncate(after + 1);

    older.extend(newer);
    ThreadPage {
        messages: older,
        has_more_before,
        has_more_after,
        anchor_message_id: Some(anchor),
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Read receipts
// ═══════════════════════════════════════════════════════════════════════

fn is_unread_candidate(message: &Message, viewer: UserId, read: &HashSet<MessageId>) -> bool {
    !message.deleted && message.is_foreign_to(viewer) && !read.contains(&message.id)
}

/// Key of the bootstrap anchor: the earliest or latest unread foreign message.
#[must_use]
pub fn unread_anchor(
    messages: &[Message],
    viewer: UserId,
    read: &HashSet<MessageId>,
    anchor: Anchor,
) -> Option<MessageKey> {
    let unread = messages
        .iter()
        .filter(|m| is_unread_candidate(m, viewer, read))
        .map(Message::key);

    match anchor {
        Anchor::FirstUnread => unread.min(),
        Anchor::LastUnread => unread.max(),
    }
}

/// Number of unread foreign messages.
#[must_use]
pub fn count_unread(messages: &[Message], viewer: UserId, read: &HashSet<MessageId>) -> usize {
    messages
        .iter()
        .filter(|m| is_unread_candidate(m, viewer, read))
        .count()
}

/// Messages to mark read when `viewer` reports `requested` as read.
///
/// Requested ids are narrowed to existing, non-deleted, foreign messages of the
/// thread; their greatest key is the boundary. Every unread foreign message at or
/// before the boundary is returned, ascending. Empty when nothing valid was requested.
#[must_use]
pub fn backfill_targets(
    messages: &[Message],
    viewer: UserId,
    requested: &[MessageId],
    read: &HashSet<MessageId>,
) -> Vec<MessageId> {
    let requested: HashSet<MessageId> = requested.iter().copied().collect();

    let Some(boundary) = messages
        .iter()
        .filter(|m| requested.contains(&m.id) && !m.deleted && m.is_foreign_to(viewer))
        .map(Message::key)
        .max()
    else {
        return Vec::new();
    };

    let mut targets: Vec<&Message> = messages
        .iter()
        .filter(|m| m.key() <= boundary && is_unread_candidate(m, viewer, read))
        .collect();
    targets.sort_by_key(|m| m.key());
    targets.into_iter().map(|m| m.id).collect()
}
