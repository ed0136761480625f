//! In-memory ticket and message store.

use appeals_core::machine::TicketEffect;
use appeals_core::ports::{CommitPlan, MessageStore, TicketStore, TicketTransaction};
use appeals_core::thread::{self, Anchor, WindowQuery};
use appeals_core::{
    AppealsError, Attachment, AttachmentId, ExportFilter, Message, MessageId, MessageKey,
    NewAttachment, NewMessage, NewTicket, Result, StatusHistoryEntry, Ticket, TicketFilter,
    TicketId, TicketScope, TicketSnapshot, TicketStatus, TicketSummary, TicketViewer, UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

const FIRST_TICKET_NUMBER: i64 = 1000;

#[derive(Debug, Default)]
struct State {
    tickets: BTreeMap<TicketId, TicketSnapshot>,
    history: Vec<StatusHistoryEntry>,
    messages: Vec<Message>,
    reads: HashMap<(MessageId, UserId), DateTime<Utc>>,
    last_ticket: i64,
    last_message: i64,
    last_attachment: i64,
}

impl State {
    fn insert_message(&mut self, message: NewMessage) -> Message {
        self.last_message += 1;
        let message = Message {
            id: MessageId(self.last_message),
            ticket_id: message.ticket_id,
            sender_id: message.sender_id,
            text: message.text,
            kind: message.kind,
            system_event: message.system_event,
            edited_at: None,
            deleted: false,
            created_at: message.created_at,
            attachments: Vec::new(),
        };
        self.messages.push(message.clone());
        message
    }

    fn message_mut(&mut self, id: MessageId) -> Result<&mut Message> {
        self.messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| AppealsError::not_found("Message", id))
    }

    fn thread(&self, ticket_id: TicketId) -> Vec<Message> {
        self.messages
            .iter()
            .filter(|m| m.ticket_id == ticket_id)
            .cloned()
            .collect()
    }

    fn read_set(&self, viewer: UserId) -> HashSet<MessageId> {
        self.reads
            .keys()
            .filter(|(_, user)| *user == viewer)
            .map(|(message, _)| *message)
            .collect()
    }

    fn visible_in_scope(snapshot: &TicketSnapshot, viewer: &TicketViewer, scope: TicketScope) -> bool {
        match scope {
            TicketScope::My => snapshot.ticket.created_by == viewer.user_id,
            TicketScope::Assigned => snapshot.assignees.contains(&viewer.user_id),
            TicketScope::Department => {
                viewer.admin || viewer.departments.contains(&snapshot.ticket.to_department)
            }
        }
    }
}

/// In-memory implementation of [`TicketStore`] and [`MessageStore`].
///
/// A single async mutex guards all data. [`TicketStore::lock`] holds it until
/// the transaction commits or is dropped, which serializes ticket mutations the
/// way a row lock would. Do not call the store from inside a held transaction.
#[derive(Clone, Debug, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
    fail_commits: Arc<AtomicBool>,
}

impl InMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following ticket commit fail with a storage error.
    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Whether a ticket transaction currently holds the store.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.state.try_lock().is_err()
    }

    /// All messages of a ticket, deleted ones included, in insertion order.
    pub async fn messages(&self, ticket_id: TicketId) -> Vec<Message> {
        self.state.lock().await.thread(ticket_id)
    }

    /// Ids of the messages `viewer` has read.
    pub async fn read_ids(&self, viewer: UserId) -> HashSet<MessageId> {
        self.state.lock().await.read_set(viewer)
    }
}

/// Transaction holding the store lock.
struct MemoryTransaction {
    guard: OwnedMutexGuard<State>,
    snapshot: TicketSnapshot,
    fail: bool,
}

#[async_trait]
impl TicketTransaction for MemoryTransaction {
    fn snapshot(&self) -> &TicketSnapshot {
        &self.snapshot
    }

    async fn commit(self: Box<Self>, plan: CommitPlan) -> Result<Vec<Message>> {
        if self.fail {
            return Err(AppealsError::Storage("commit failed (injected)".into()));
        }

        let Self {
            mut guard,
            snapshot,
            ..
        } = *self;
        let ticket_id = snapshot.ticket.id;
        let mut written = Vec::new();

        for effect in &plan.effects {
            match effect {
                TicketEffect::RecordStatus { from, to } => guard.history.push(StatusHistoryEntry {
                    ticket_id,
                    old_status: *from,
                    new_status: *to,
                    changed_by: plan.actor,
                    changed_at: plan.at,
                }),
                TicketEffect::AppendSystemMessage(event) => {
                    let message = NewMessage::system(ticket_id, event.clone(), plan.at);
                    written.push(guard.insert_message(message));
                }
                TicketEffect::ReplaceAssignees { .. }
                | TicketEffect::ReplaceWatchers { .. }
                | TicketEffect::MoveDepartment { .. } => {}
            }
        }

        let mut next = plan.next;
        next.ticket.updated_at = plan.at;
        guard.tickets.insert(ticket_id, next);

        tracing::debug!(
            ticket_id = %ticket_id,
            effects = plan.effects.len(),
            "In-memory ticket transaction committed"
        );

        Ok(written)
    }
}

#[async_trait]
impl TicketStore for InMemoryStore {
    async fn create_ticket(&self, ticket: NewTicket, first: NewMessage) -> Result<(Ticket, Message)> {
        let mut state = self.state.lock().await;
        state.last_ticket += 1;
        let id = TicketId(state.last_ticket);

        let created = Ticket {
            id,
            number: FIRST_TICKET_NUMBER + state.last_ticket - 1,
            from_department: ticket.from_department,
            to_department: ticket.to_department,
            created_by: ticket.created_by,
            status: TicketStatus::Open,
            priority: ticket.priority,
            title: ticket.title,
            deadline: ticket.deadline,
            created_at: ticket.created_at,
            updated_at: ticket.created_at,
        };
        state.tickets.insert(id, TicketSnapshot::new(created.clone()));

        let message = state.insert_message(NewMessage {
            ticket_id: id,
            ..first
        });
        Ok((created, message))
    }

    async fn load(&self, id: TicketId) -> Result<Option<TicketSnapshot>> {
        Ok(self.state.lock().await.tickets.get(&id).cloned())
    }

    async fn lock(&self, id: TicketId) -> Result<Box<dyn TicketTransaction>> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let snapshot = guard
            .tickets
            .get(&id)
            .cloned()
            .ok_or_else(|| AppealsError::not_found("Ticket", id))?;

        Ok(Box::new(MemoryTransaction {
            guard,
            snapshot,
            fail: self.fail_commits.load(Ordering::SeqCst),
        }))
    }

    async fn list(&self, viewer: &TicketViewer, filter: &TicketFilter) -> Result<Vec<TicketSummary>> {
        let state = self.state.lock().await;
        let read = state.read_set(viewer.user_id);

        let mut rows: Vec<&TicketSnapshot> = state
            .tickets
            .values()
            .filter(|s| State::visible_in_scope(s, viewer, filter.scope))
            .filter(|s| filter.status.is_none_or(|status| s.ticket.status == status))
            .filter(|s| filter.priority.is_none_or(|priority| s.ticket.priority == priority))
            .collect();
        rows.sort_by(|a, b| {
            (b.ticket.updated_at, b.ticket.id).cmp(&(a.ticket.updated_at, a.ticket.id))
        });

        let offset = usize::try_from(filter.offset).unwrap_or(0);
        let limit = usize::try_from(filter.limit).unwrap_or(0);

        Ok(rows
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|snapshot| {
                let thread = state.thread(snapshot.ticket.id);
                let last_message = thread
                    .iter()
                    .filter(|m| !m.deleted)
                    .max_by_key(|m| m.key())
                    .cloned();
                let unread = thread::count_unread(&thread, viewer.user_id, &read);

                TicketSummary {
                    ticket: snapshot.ticket.clone(),
                    assignees: snapshot.assignees.iter().copied().collect(),
                    last_message,
                    unread_count: i64::try_from(unread).unwrap_or(i64::MAX),
                }
            })
            .collect())
    }

    async fn export(&self, filter: &ExportFilter) -> Result<Vec<Ticket>> {
        let state = self.state.lock().await;
        let mut rows: Vec<Ticket> = state
            .tickets
            .values()
            .map(|s| &s.ticket)
            .filter(|t| filter.status.is_none_or(|status| t.status == status))
            .filter(|t| filter.priority.is_none_or(|priority| t.priority == priority))
            .filter(|t| filter.to_department.is_none_or(|d| t.to_department == d))
            .filter(|t| filter.created_from.is_none_or(|from| t.created_at >= from))
            .filter(|t| filter.created_to.is_none_or(|to| t.created_at < to))
            .cloned()
            .collect();
        rows.sort_by_key(|t| t.number);
        Ok(rows)
    }

    async fn status_history(&self, id: TicketId) -> Result<Vec<StatusHistoryEntry>> {
        let state = self.state.lock().await;
        Ok(state
            .history
            .iter()
            .filter(|entry| entry.ticket_id == id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl MessageStore for InMemoryStore {
    async fn append(&self, message: NewMessage) -> Result<Message> {
        let mut state = self.state.lock().await;
        let at = message.created_at;
        let snapshot = state
            .tickets
            .get_mut(&message.ticket_id)
            .ok_or_else(|| AppealsError::not_found("Ticket", message.ticket_id))?;
        snapshot.ticket.updated_at = at;

        Ok(state.insert_message(message))
    }

    async fn add_attachment(&self, message_id: MessageId, attachment: NewAttachment) -> Result<Attachment> {
        let mut state = self.state.lock().await;
        state.last_attachment += 1;
        let attachment = Attachment {
            id: AttachmentId(state.last_attachment),
            message_id,
            storage_key: attachment.storage_key,
            file_name: attachment.file_name,
            kind: attachment.kind,
        };

        state
            .message_mut(message_id)?
            .attachments
            .push(attachment.clone());
        Ok(attachment)
    }

    async fn find(&self, id: MessageId) -> Result<Option<Message>> {
        let state = self.state.lock().await;
        Ok(state.messages.iter().find(|m| m.id == id).cloned())
    }

    async fn edit(&self, id: MessageId, text: Option<String>, at: DateTime<Utc>) -> Result<Message> {
        let mut state = self.state.lock().await;
        let message = state.message_mut(id)?;
        message.text = text;
        message.edited_at = Some(at);
        Ok(message.clone())
    }

    async fn soft_delete(&self, id: MessageId) -> Result<()> {
        let mut state = self.state.lock().await;
        state.message_mut(id)?.deleted = true;
        Ok(())
    }

    async fn window(&self, query: &WindowQuery) -> Result<Vec<Message>> {
        let state = self.state.lock().await;
        Ok(thread::select_window(&state.messages, query))
    }

    async fn unread_anchor(&self, ticket_id: TicketId, viewer: UserId, anchor: Anchor) -> Result<Option<MessageKey>> {
        let state = self.state.lock().await;
        let thread = state.thread(ticket_id);
        Ok(thread::unread_anchor(&thread, viewer, &state.read_set(viewer), anchor))
    }

    async fn mark_read(
        &self,
        ticket_id: TicketId,
        viewer: UserId,
        requested: &[MessageId],
        at: DateTime<Utc>,
    ) -> Result<Vec<MessageId>> {
        let mut state = self.state.lock().await;
        let thread = state.thread(ticket_id);
        let targets = thread::backfill_targets(&thread, viewer, requested, &state.read_set(viewer));

        for id in &targets {
            state.reads.entry((*id, viewer)).or_insert(at);
        }
        Ok(targets)
    }

    async fn unread_count(&self, ticket_id: TicketId, viewer: UserId) -> Result<i64> {
        let state = self.state.lock().await;
        let thread = state.thread(ticket_id);
        let unread = thread::count_unread(&thread, viewer, &state.read_set(viewer));
        Ok(i64::try_from(unread).unwrap_or(i64::MAX))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::fixtures::{ANN, BOB, SALES, SUPPORT};
    use crate::mocks::ticking_clock;
    use appeals_core::environment::Clock;
    use appeals_core::thread::{Bound, Direction};
    use appeals_core::Priority;

    async fn seeded() -> (InMemoryStore, Ticket) {
        let store = InMemoryStore::new();
        let clock = ticking_clock();
        let at = clock.now();
        let (ticket, _) = store
            .create_ticket(
                NewTicket {
                    from_department: Some(SALES),
                    to_department: SUPPORT,
                    created_by: ANN,
                    priority: Priority::Medium,
                    title: "Printer".into(),
                    deadline: None,
                    created_at: at,
                },
                NewMessage::user(TicketId(0), ANN, Some("Printer jammed".into()), at),
            )
            .await
            .unwrap();

        for i in 1..=3 {
            store
                .append(NewMessage::user(ticket.id, ANN, Some(format!("ping {i}")), clock.now()))
                .await
                .unwrap();
        }
        (store, ticket)
    }

    #[tokio::test]
    async fn test_numbers_start_at_one_thousand() {
        let (_, ticket) = seeded().await;
        assert_eq!(ticket.number, 1000);
        assert_eq!(ticket.status, TicketStatus::Open);
    }

    #[tokio::test]
    async fn test_dropped_transaction_changes_nothing() {
        let (store, ticket) = seeded().await;
        {
            let tx = store.lock(ticket.id).await.unwrap();
            assert_eq!(tx.snapshot().ticket.id, ticket.id);
            assert!(store.is_locked());
        }
        assert!(!store.is_locked());
        let snapshot = store.load(ticket.id).await.unwrap().unwrap();
        assert_eq!(snapshot.ticket.status, TicketStatus::Open);
        assert!(store.status_history(ticket.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lock_missing_ticket_is_not_found() {
        let store = InMemoryStore::new();
        let err = store.lock(TicketId(42)).await.err().expect("missing ticket");
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_mark_read_backfills_earlier_messages() {
        let (store, ticket) = seeded().await;
        let thread = store.messages(ticket.id).await;
        let newest = thread.last().unwrap().id;

        let marked = store
            .mark_read(ticket.id, BOB, &[newest], ticking_clock().now())
            .await
            .unwrap();
        assert_eq!(marked.len(), 4);
        assert_eq!(store.unread_count(ticket.id, BOB).await.unwrap(), 0);
        assert_eq!(store.unread_count(ticket.id, ANN).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_window_skips_deleted() {
        let (store, ticket) = seeded().await;
        let thread = store.messages(ticket.id).await;
        store.soft_delete(thread[1].id).await.unwrap();

        let rows = store
            .window(&WindowQuery {
                ticket_id: ticket.id,
                direction: Direction::After,
                bound: Bound::Unbounded,
                limit: 10,
            })
            .await
            .unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|m| m.id != thread[1].id));
    }
}
