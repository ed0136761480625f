//! Ticket and message persistence.

use crate::rows::{
    hydrate, AttachmentRow, HistoryRow, MessageRow, TicketListRow, TicketRow, MESSAGE_COLUMNS,
    TICKET_COLUMNS,
};
use crate::storage;
use appeals_core::machine::TicketEffect;
use appeals_core::ports::{CommitPlan, MessageStore, TicketStore, TicketTransaction};
use appeals_core::thread::{Anchor, Bound, Direction, WindowQuery};
use appeals_core::{
    AppealsError, Attachment, ExportFilter, Message, MessageId, MessageKey, NewAttachment,
    NewMessage, NewTicket, Result, StatusHistoryEntry, Ticket, TicketFilter, TicketId,
    TicketSnapshot, TicketSummary, TicketViewer, UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use std::collections::{BTreeSet, HashMap};

/// `PostgreSQL` implementation of [`TicketStore`] and [`MessageStore`].
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn raw_ids<T>(ids: impl IntoIterator<Item = T>, raw: impl Fn(T) -> i64) -> Vec<i64> {
    ids.into_iter().map(raw).collect()
}

async fn read_snapshot(
    conn: &mut PgConnection,
    id: TicketId,
    for_update: bool,
) -> Result<Option<TicketSnapshot>> {
    let lock = if for_update { "FOR UPDATE" } else { "" };
    let sql = format!("SELECT {TICKET_COLUMNS} FROM tickets t WHERE t.id = $1 {lock}");

    let Some(row) = sqlx::query_as::<_, TicketRow>(&sql)
        .bind(id.0)
        .fetch_optional(&mut *conn)
        .await
        .map_err(storage("Failed to load ticket"))?
    else {
        return Ok(None);
    };

    let assignees: Vec<(i64,)> =
        sqlx::query_as("SELECT user_id FROM ticket_assignees WHERE ticket_id = $1")
            .bind(id.0)
            .fetch_all(&mut *conn)
            .await
            .map_err(storage("Failed to load assignees"))?;

    let watchers: Vec<(i64,)> =
        sqlx::query_as("SELECT user_id FROM ticket_watchers WHERE ticket_id = $1")
            .bind(id.0)
            .fetch_all(&mut *conn)
            .await
            .map_err(storage("Failed to load watchers"))?;

    Ok(Some(TicketSnapshot {
        ticket: Ticket::try_from(row)?,
        assignees: assignees.into_iter().map(|(id,)| UserId(id)).collect(),
        watchers: watchers.into_iter().map(|(id,)| UserId(id)).collect(),
    }))
}

async fn load_attachments(conn: &mut PgConnection, message_ids: &[i64]) -> Result<Vec<AttachmentRow>> {
    if message_ids.is_empty() {
        return Ok(Vec::new());
    }

    sqlx::query_as(
        "SELECT id, message_id, storage_key, file_name, kind
         FROM message_attachments
         WHERE message_id = ANY($1)
         ORDER BY id",
    )
    .bind(message_ids)
    .fetch_all(&mut *conn)
    .await
    .map_err(storage("Failed to load attachments"))
}

async fn hydrate_rows(conn: &mut PgConnection, rows: Vec<MessageRow>) -> Result<Vec<Message>> {
    let ids: Vec<i64> = rows.iter().map(|row| row.id).collect();
    let attachments = load_attachments(conn, &ids).await?;
    hydrate(rows, attachments)
}

async fn insert_message(conn: &mut PgConnection, message: &NewMessage) -> Result<Message> {
    let sql = format!(
        "INSERT INTO messages AS m (ticket_id, sender_id, text, kind, system_event, created_at)
         VALUES ($1, $2, $3, $4, $5, $6)
         RETURNING {MESSAGE_COLUMNS}"
    );

    let row: MessageRow = sqlx::query_as(&sql)
        .bind(message.ticket_id.0)
        .bind(message.sender_id.map(|id| id.0))
        .bind(message.text.as_deref())
        .bind(message.kind.as_str())
        .bind(message.system_event.as_ref().map(Json))
        .bind(message.created_at)
        .fetch_one(&mut *conn)
        .await
        .map_err(storage("Failed to insert message"))?;

    row.into_message(Vec::new())
}

async fn replace_assignees(
    conn: &mut PgConnection,
    ticket_id: TicketId,
    assignees: &BTreeSet<UserId>,
    at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query("DELETE FROM ticket_assignees WHERE ticket_id = $1")
        .bind(ticket_id.0)
        .execute(&mut *conn)
        .await
        .map_err(storage("Failed to clear assignees"))?;

    sqlx::query(
        "INSERT INTO ticket_assignees (ticket_id, user_id, assigned_at)
         SELECT $1, user_id, $3 FROM UNNEST($2::bigint[]) AS user_id",
    )
    .bind(ticket_id.0)
    .bind(raw_ids(assignees.iter().copied(), UserId::get))
    .bind(at)
    .execute(&mut *conn)
    .await
    .map_err(storage("Failed to insert assignees"))?;

    Ok(())
}

async fn replace_watchers(
    conn: &mut PgConnection,
    ticket_id: TicketId,
    watchers: &BTreeSet<UserId>,
) -> Result<()> {
    sqlx::query("DELETE FROM ticket_watchers WHERE ticket_id = $1")
        .bind(ticket_id.0)
        .execute(&mut *conn)
        .await
        .map_err(storage("Failed to clear watchers"))?;

    sqlx::query(
        "INSERT INTO ticket_watchers (ticket_id, user_id)
         SELECT $1, user_id FROM UNNEST($2::bigint[]) AS user_id",
    )
    .bind(ticket_id.0)
    .bind(raw_ids(watchers.iter().copied(), UserId::get))
    .execute(&mut *conn)
    .await
    .map_err(storage("Failed to insert watchers"))?;

    Ok(())
}

/// A ticket row locked for the lifetime of the transaction.
struct PgTicketTransaction {
    tx: Transaction<'static, Postgres>,
    snapshot: TicketSnapshot,
}

#[async_trait]
impl TicketTransaction for PgTicketTransaction {
    fn snapshot(&self) -> &TicketSnapshot {
        &self.snapshot
    }

    async fn commit(self: Box<Self>, plan: CommitPlan) -> Result<Vec<Message>> {
        let Self { mut tx, snapshot } = *self;
        let ticket_id = snapshot.ticket.id;
        let mut written = Vec::new();

        for effect in &plan.effects {
            match effect {
                TicketEffect::RecordStatus { from, to } => {
                    sqlx::query(
                        "INSERT INTO ticket_status_history
                             (ticket_id, old_status, new_status, changed_by, changed_at)
                         VALUES ($1, $2, $3, $4, $5)",
                    )
                    .bind(ticket_id.0)
                    .bind(from.as_str())
                    .bind(to.as_str())
                    .bind(plan.actor.0)
                    .bind(plan.at)
                    .execute(&mut *tx)
                    .await
                    .map_err(storage("Failed to record status history"))?;
                }
                TicketEffect::ReplaceAssignees { assignees } => {
                    replace_assignees(&mut tx, ticket_id, assignees, plan.at).await?;
                }
                TicketEffect::ReplaceWatchers { watchers } => {
                    replace_watchers(&mut tx, ticket_id, watchers).await?;
                }
                TicketEffect::MoveDepartment { .. } => {
                    // Written with the ticket row below.
                }
                TicketEffect::AppendSystemMessage(event) => {
                    let message = NewMessage::system(ticket_id, event.clone(), plan.at);
                    written.push(insert_message(&mut tx, &message).await?);
                }
            }
        }

        sqlx::query(
            "UPDATE tickets
             SET status = $2, to_department_id = $3, updated_at = $4
             WHERE id = $1",
        )
        .bind(ticket_id.0)
        .bind(plan.next.ticket.status.as_str())
        .bind(plan.next.ticket.to_department.0)
        .bind(plan.at)
        .execute(&mut *tx)
        .await
        .map_err(storage("Failed to update ticket"))?;

        tx.commit()
            .await
            .map_err(storage("Failed to commit ticket transaction"))?;

        tracing::debug!(
            ticket_id = %ticket_id,
            effects = plan.effects.len(),
            system_messages = written.len(),
            "Ticket transaction committed"
        );

        Ok(written)
    }
}

#[async_trait]
impl TicketStore for PgStore {
    async fn create_ticket(&self, ticket: NewTicket, first: NewMessage) -> Result<(Ticket, Message)> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(storage("Failed to start transaction"))?;

        let sql = format!(
            "INSERT INTO tickets AS t
                 (from_department_id, to_department_id, created_by, status, priority,
                  title, deadline, created_at, updated_at)
             VALUES ($1, $2, $3, 'OPEN', $4, $5, $6, $7, $7)
             RETURNING {TICKET_COLUMNS}"
        );

        let row: TicketRow = sqlx::query_as(&sql)
            .bind(ticket.from_department.map(|id| id.0))
            .bind(ticket.to_department.0)
            .bind(ticket.created_by.0)
            .bind(ticket.priority.as_str())
            .bind(&ticket.title)
            .bind(ticket.deadline)
            .bind(ticket.created_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(storage("Failed to insert ticket"))?;
        let created = Ticket::try_from(row)?;

        let first = NewMessage {
            ticket_id: created.id,
            ..first
        };
        let message = insert_message(&mut tx, &first).await?;

        tx.commit()
            .await
            .map_err(storage("Failed to commit ticket creation"))?;

        Ok((created, message))
    }

    async fn load(&self, id: TicketId) -> Result<Option<TicketSnapshot>> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(storage("Failed to acquire connection"))?;
        read_snapshot(&mut conn, id, false).await
    }

    async fn lock(&self, id: TicketId) -> Result<Box<dyn TicketTransaction>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(storage("Failed to start transaction"))?;

        let snapshot = read_snapshot(&mut tx, id, true)
            .await?
            .ok_or_else(|| AppealsError::not_found("Ticket", id))?;

        Ok(Box::new(PgTicketTransaction { tx, snapshot }))
    }

    async fn list(&self, viewer: &TicketViewer, filter: &TicketFilter) -> Result<Vec<TicketSummary>> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(storage("Failed to acquire connection"))?;

        let sql = format!(
            "SELECT {TICKET_COLUMNS},
                COALESCE(
                    (SELECT array_agg(a.user_id ORDER BY a.user_id)
                     FROM ticket_assignees a WHERE a.ticket_id = t.id),
                    '{{}}'::bigint[]
                ) AS assignees,
                (SELECT COUNT(*)
                 FROM messages m
                 WHERE m.ticket_id = t.id
                   AND NOT m.deleted
                   AND m.sender_id IS DISTINCT FROM $1
                   AND NOT EXISTS (
                       SELECT 1 FROM message_reads r
                       WHERE r.message_id = m.id AND r.user_id = $1
                   )
                ) AS unread_count
             FROM tickets t
             WHERE CASE $2
                     WHEN 'my' THEN t.created_by = $1
                     WHEN 'assigned' THEN EXISTS (
                         SELECT 1 FROM ticket_assignees a
                         WHERE a.ticket_id = t.id AND a.user_id = $1
                     )
                     ELSE ($3 OR t.to_department_id = ANY($4))
                   END
               AND ($5::text IS NULL OR t.status = $5)
               AND ($6::text IS NULL OR t.priority = $6)
             ORDER BY t.updated_at DESC, t.id DESC
             LIMIT $7 OFFSET $8"
        );

        let rows: Vec<TicketListRow> = sqlx::query_as(&sql)
            .bind(viewer.user_id.0)
            .bind(filter.scope.as_str())
            .bind(viewer.admin)
            .bind(raw_ids(viewer.departments.iter().copied(), |id| id.0))
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.priority.map(|p| p.as_str()))
            .bind(filter.limit)
            .bind(filter.offset)
            .fetch_all(&mut *conn)
            .await
            .map_err(storage("Failed to list tickets"))?;

        let ticket_ids: Vec<i64> = rows.iter().map(|row| row.ticket.id).collect();
        let last_sql = format!(
            "SELECT DISTINCT ON (m.ticket_id) {MESSAGE_COLUMNS}
             FROM messages m
             WHERE m.ticket_id = ANY($1) AND NOT m.deleted
             ORDER BY m.ticket_id, m.created_at DESC, m.id DESC"
        );
        let last_rows: Vec<MessageRow> = sqlx::query_as(&last_sql)
            .bind(&ticket_ids)
            .fetch_all(&mut *conn)
            .await
            .map_err(storage("Failed to load last messages"))?;
        let mut last: HashMap<TicketId, Message> = hydrate_rows(&mut conn, last_rows)
            .await?
            .into_iter()
            .map(|message| (message.ticket_id, message))
            .collect();

        rows.into_iter()
            .map(|row| {
                let ticket = Ticket::try_from(row.ticket)?;
                Ok(TicketSummary {
                    last_message: last.remove(&ticket.id),
                    assignees: row.assignees.into_iter().map(UserId).collect(),
                    unread_count: row.unread_count,
                    ticket,
                })
            })
            .collect()
    }

    async fn export(&self, filter: &ExportFilter) -> Result<Vec<Ticket>> {
        let sql = format!(
            "SELECT {TICKET_COLUMNS}
             FROM tickets t
             WHERE ($1::text IS NULL OR t.status = $1)
               AND ($2::text IS NULL OR t.priority = $2)
               AND ($3::bigint IS NULL OR t.to_department_id = $3)
               AND ($4::timestamptz IS NULL OR t.created_at >= $4)
               AND ($5::timestamptz IS NULL OR t.created_at < $5)
             ORDER BY t.number"
        );

        let rows: Vec<TicketRow> = sqlx::query_as(&sql)
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.priority.map(|p| p.as_str()))
            .bind(filter.to_department.map(|id| id.0))
            .bind(filter.created_from)
            .bind(filter.created_to)
            .fetch_all(&self.pool)
            .await
            .map_err(storage("Failed to export tickets"))?;

        rows.into_iter().map(Ticket::try_from).collect()
    }

    async fn status_history(&self, id: TicketId) -> Result<Vec<StatusHistoryEntry>> {
        let rows: Vec<HistoryRow> = sqlx::query_as(
            "SELECT ticket_id, old_status, new_status, changed_by, changed_at
             FROM ticket_status_history
             WHERE ticket_id = $1
             ORDER BY id",
        )
        .bind(id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(storage("Failed to load status history"))?;

        rows.into_iter().map(StatusHistoryEntry::try_from).collect()
    }
}

/// SQL fragments for a window walk: comparison, key and sort order.
fn window_clause(direction: Direction, bound: Bound) -> (Option<(&'static str, MessageKey)>, &'static str) {
    let order = match direction {
        Direction::Before => "DESC",
        Direction::After => "ASC",
    };
    let comparison = match (direction, bound) {
        (_, Bound::Unbounded) => None,
        (Direction::Before, Bound::Exclusive(key)) => Some(("<", key)),
        (Direction::Before, Bound::Inclusive(key)) => Some(("<=", key)),
        (Direction::After, Bound::Exclusive(key)) => Some((">", key)),
        (Direction::After, Bound::Inclusive(key)) => Some((">=", key)),
    };
    (comparison, order)
}

#[async_trait]
impl MessageStore for PgStore {
    async fn append(&self, message: NewMessage) -> Result<Message> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(storage("Failed to start transaction"))?;

        let stored = insert_message(&mut tx, &message).await?;

        sqlx::query("UPDATE tickets SET updated_at = $2 WHERE id = $1")
            .bind(message.ticket_id.0)
            .bind(message.created_at)
            .execute(&mut *tx)
            .await
            .map_err(storage("Failed to touch ticket"))?;

        tx.commit()
            .await
            .map_err(storage("Failed to commit message"))?;
        Ok(stored)
    }

    async fn add_attachment(&self, message_id: MessageId, attachment: NewAttachment) -> Result<Attachment> {
        let row: AttachmentRow = sqlx::query_as(
            "INSERT INTO message_attachments (message_id, storage_key, file_name, kind)
             VALUES ($1, $2, $3, $4)
             RETURNING id, message_id, storage_key, file_name, kind",
        )
        .bind(message_id.0)
        .bind(&attachment.storage_key)
        .bind(&attachment.file_name)
        .bind(attachment.kind.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(storage("Failed to insert attachment"))?;

        Attachment::try_from(row)
    }

    async fn find(&self, id: MessageId) -> Result<Option<Message>> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(storage("Failed to acquire connection"))?;

        let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages m WHERE m.id = $1");
        let Some(row) = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(id.0)
            .fetch_optional(&mut *conn)
            .await
            .map_err(storage("Failed to load message"))?
        else {
            return Ok(None);
        };

        Ok(hydrate_rows(&mut conn, vec![row]).await?.pop())
    }

    async fn edit(&self, id: MessageId, text: Option<String>, at: DateTime<Utc>) -> Result<Message> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(storage("Failed to acquire connection"))?;

        let sql = format!(
            "UPDATE messages AS m SET text = $2, edited_at = $3
             WHERE m.id = $1
             RETURNING {MESSAGE_COLUMNS}"
        );
        let row: MessageRow = sqlx::query_as(&sql)
            .bind(id.0)
            .bind(text)
            .bind(at)
            .fetch_optional(&mut *conn)
            .await
            .map_err(storage("Failed to edit message"))?
            .ok_or_else(|| AppealsError::not_found("Message", id))?;

        hydrate_rows(&mut conn, vec![row])
            .await?
            .pop()
            .ok_or_else(|| AppealsError::Internal("edited message vanished".into()))
    }

    async fn soft_delete(&self, id: MessageId) -> Result<()> {
        let result = sqlx::query("UPDATE messages SET deleted = TRUE WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(storage("Failed to delete message"))?;

        if result.rows_affected() == 0 {
            return Err(AppealsError::not_found("Message", id));
        }
        Ok(())
    }

    async fn window(&self, query: &WindowQuery) -> Result<Vec<Message>> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(storage("Failed to acquire connection"))?;

        let (comparison, order) = window_clause(query.direction, query.bound);
        let condition = comparison
            .map(|(op, _)| format!("AND (m.created_at, m.id) {op} ($3, $4)"))
            .unwrap_or_default();
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS}
             FROM messages m
             WHERE m.ticket_id = $1 AND NOT m.deleted {condition}
             ORDER BY m.created_at {order}, m.id {order}
             LIMIT $2"
        );

        let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);
        let mut statement = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(query.ticket_id.0)
            .bind(limit);
        if let Some((_, key)) = comparison {
            statement = statement.bind(key.created_at).bind(key.id.0);
        }

        let rows = statement
            .fetch_all(&mut *conn)
            .await
            .map_err(storage("Failed to load messages"))?;

        hydrate_rows(&mut conn, rows).await
    }

    async fn unread_anchor(&self, ticket_id: TicketId, viewer: UserId, anchor: Anchor) -> Result<Option<MessageKey>> {
        let order = match anchor {
            Anchor::FirstUnread => "ASC",
            Anchor::LastUnread => "DESC",
        };
        let sql = format!(
            "SELECT m.created_at, m.id
             FROM messages m
             WHERE m.ticket_id = $1
               AND NOT m.deleted
               AND m.sender_id IS DISTINCT FROM $2
               AND NOT EXISTS (
                   SELECT 1 FROM message_reads r
                   WHERE r.message_id = m.id AND r.user_id = $2
               )
             ORDER BY m.created_at {order}, m.id {order}
             LIMIT 1"
        );

        let row: Option<(DateTime<Utc>, i64)> = sqlx::query_as(&sql)
            .bind(ticket_id.0)
            .bind(viewer.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage("Failed to find unread anchor"))?;

        Ok(row.map(|(created_at, id)| MessageKey {
            created_at,
            id: MessageId(id),
        }))
    }

    async fn mark_read(
        &self,
        ticket_id: TicketId,
        viewer: UserId,
        requested: &[MessageId],
        at: DateTime<Utc>,
    ) -> Result<Vec<MessageId>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(storage("Failed to start transaction"))?;

        let boundary: Option<(DateTime<Utc>, i64)> = sqlx::query_as(
            "SELECT m.created_at, m.id
             FROM messages m
             WHERE m.ticket_id = $1
               AND m.id = ANY($3)
               AND NOT m.deleted
               AND m.sender_id IS DISTINCT FROM $2
             ORDER BY m.created_at DESC, m.id DESC
             LIMIT 1",
        )
        .bind(ticket_id.0)
        .bind(viewer.0)
        .bind(raw_ids(requested.iter().copied(), MessageId::get))
        .fetch_optional(&mut *tx)
        .await
        .map_err(storage("Failed to resolve read boundary"))?;

        let Some((boundary_at, boundary_id)) = boundary else {
            return Ok(Vec::new());
        };

        let inserted: Vec<(i64,)> = sqlx::query_as(
            "INSERT INTO message_reads (message_id, user_id, read_at)
             SELECT m.id, $2, $5
             FROM messages m
             WHERE m.ticket_id = $1
               AND NOT m.deleted
               AND m.sender_id IS DISTINCT FROM $2
               AND (m.created_at, m.id) <= ($3, $4)
             ON CONFLICT (message_id, user_id) DO NOTHING
             RETURNING message_id",
        )
        .bind(ticket_id.0)
        .bind(viewer.0)
        .bind(boundary_at)
        .bind(boundary_id)
        .bind(at)
        .fetch_all(&mut *tx)
        .await
        .map_err(storage("Failed to insert read receipts"))?;

        tx.commit()
            .await
            .map_err(storage("Failed to commit read receipts"))?;

        let mut marked: Vec<MessageId> = inserted.into_iter().map(|(id,)| MessageId(id)).collect();
        marked.sort_unstable();
        Ok(marked)
    }

    async fn unread_count(&self, ticket_id: TicketId, viewer: UserId) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*)
             FROM messages m
             WHERE m.ticket_id = $1
               AND NOT m.deleted
               AND m.sender_id IS DISTINCT FROM $2
               AND NOT EXISTS (
                   SELECT 1 FROM message_reads r
                   WHERE r.message_id = m.id AND r.user_id = $2
               )",
        )
        .bind(ticket_id.0)
        .bind(viewer.0)
        .fetch_one(&self.pool)
        .await
        .map_err(storage("Failed to count unread messages"))?;

        Ok(count)
    }
}
