//! Post-commit event emission.
//!
//! Services enqueue [`Outbound`] items after their transaction commits. A
//! single [`EmitterWorker`] drains the queue: it publishes each event to its
//! channels on the [`FanoutHub`] and, for new user messages, dispatches push
//! notifications to recipients who are not currently viewing the ticket.
//!
//! ```text
//! service ──commit──▶ EventEmitter ──mpsc──▶ EmitterWorker ──▶ FanoutHub ──▶ websockets
//!                                                  │
//!                                                  └──▶ spawned push tasks ──▶ PushNotifier
//!                                                       (skips live viewers)
//! ```
//!
//! Publishing and push failures are logged and dropped; they never reach the
//! request that caused them.

use crate::metrics::{record_fanout, record_push};
use crate::views::MessageView;
use appeals_core::ports::{PushNotification, PushNotifier, PushPayload};
use appeals_core::{
    Channel, DepartmentId, MessageId, Priority, Ticket, TicketId, TicketStatus, UserId,
};
use appeals_web::FanoutHub;
use serde::Serialize;
use futures::future::join_all;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Characters of message text included in a push body.
pub const PUSH_SNIPPET_CHARS: usize = 100;

const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// Real-time event kinds, tagged `type` in kebab case on the wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum RealtimeEvent {
    /// A ticket was created
    TicketCreated {
        /// The new ticket
        ticket: Ticket,
    },
    /// Summary of a ticket after any change
    TicketUpdated {
        /// Ticket id
        ticket_id: TicketId,
        /// Current status
        status: TicketStatus,
        /// Current priority
        priority: Priority,
        /// Owning department
        department_id: DepartmentId,
        /// Current assignees
        assignees: Vec<UserId>,
        /// Snippet of the latest message
        last_message: Option<String>,
    },
    /// Assignee set replaced
    AssigneesUpdated {
        /// Ticket id
        ticket_id: TicketId,
        /// New assignee set
        assignees: Vec<UserId>,
    },
    /// Status transition
    StatusUpdated {
        /// Ticket id
        ticket_id: TicketId,
        /// Previous status
        from: TicketStatus,
        /// New status
        to: TicketStatus,
    },
    /// Ticket moved between departments
    DepartmentChanged {
        /// Ticket id
        ticket_id: TicketId,
        /// Previous owner
        from: DepartmentId,
        /// New owner
        to: DepartmentId,
    },
    /// A message was appended (user or system)
    MessageAdded {
        /// The message
        message: MessageView,
    },
    /// A message text was edited
    MessageEdited {
        /// The message after the edit
        message: MessageView,
    },
    /// A message was soft-deleted
    MessageDeleted {
        /// Ticket id
        ticket_id: TicketId,
        /// Deleted message
        message_id: MessageId,
    },
    /// A user read messages
    MessageRead {
        /// Ticket id
        ticket_id: TicketId,
        /// Reader
        user_id: UserId,
        /// Messages newly marked read
        message_ids: Vec<MessageId>,
    },
    /// Watcher set replaced
    WatchersUpdated {
        /// Ticket id
        ticket_id: TicketId,
        /// New watcher set
        watchers: Vec<UserId>,
    },
}

impl RealtimeEvent {
    /// Wire name of the event kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::TicketCreated { .. } => "ticket-created",
            Self::TicketUpdated { .. } => "ticket-updated",
            Self::AssigneesUpdated { .. } => "assignees-updated",
            Self::StatusUpdated { .. } => "status-updated",
            Self::DepartmentChanged { .. } => "department-changed",
            Self::MessageAdded { .. } => "message-added",
            Self::MessageEdited { .. } => "message-edited",
            Self::MessageDeleted { .. } => "message-deleted",
            Self::MessageRead { .. } => "message-read",
            Self::WatchersUpdated { .. } => "watchers-updated",
        }
    }
}

/// Push notifications owed for a new user message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessagePush {
    /// Ticket the message was posted to
    pub ticket_id: TicketId,
    /// Human-readable ticket number
    pub ticket_number: i64,
    /// The message
    pub message_id: MessageId,
    /// Author
    pub sender_id: Option<UserId>,
    /// Author display name
    pub sender_name: String,
    /// Body snippet
    pub snippet: String,
    /// Candidate recipients before suppression
    pub recipients: BTreeSet<UserId>,
}

/// One queued unit of work.
#[derive(Clone, Debug)]
pub struct Outbound {
    /// Channels the event goes to
    pub channels: Vec<Channel>,
    /// The event
    pub event: RealtimeEvent,
    /// Pushes to dispatch after publishing
    pub push: Option<MessagePush>,
}

/// Cut `text` to [`PUSH_SNIPPET_CHARS`] characters, appending an ellipsis when cut.
#[must_use]
pub fn snippet(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() <= PUSH_SNIPPET_CHARS {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(PUSH_SNIPPET_CHARS).collect();
    cut.push('…');
    cut
}

/// Producer side of the outbound queue.
#[derive(Clone, Debug)]
pub struct EventEmitter {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl EventEmitter {
    /// Create an emitter and the worker that drains it.
    #[must_use]
    pub fn channel(
        hub: FanoutHub<RealtimeEvent>,
        notifier: Arc<dyn PushNotifier>,
        push_timeout: Duration,
    ) -> (Self, EmitterWorker) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self { tx },
            EmitterWorker {
                rx,
                hub,
                notifier,
                push_timeout,
                pushes: JoinSet::new(),
            },
        )
    }

    /// Queue `event` for `channels`.
    pub fn emit(&self, channels: Vec<Channel>, event: RealtimeEvent) {
        self.enqueue(Outbound {
            channels,
            event,
            push: None,
        });
    }

    /// Queue `event` for `channels`, followed by message pushes.
    pub fn emit_with_push(&self, channels: Vec<Channel>, event: RealtimeEvent, push: MessagePush) {
        self.enqueue(Outbound {
            channels,
            event,
            push: Some(push),
        });
    }

    fn enqueue(&self, outbound: Outbound) {
        let kind = outbound.event.kind();
        if self.tx.send(outbound).is_err() {
            warn!(event = kind, "Emitter worker is gone, dropping event");
        }
    }
}

/// Consumer side of the outbound queue.
///
/// Publishing happens inline, in queue order. Pushes run on spawned tasks so a
/// slow provider never holds back the next event.
pub struct EmitterWorker {
    rx: mpsc::UnboundedReceiver<Outbound>,
    hub: FanoutHub<RealtimeEvent>,
    notifier: Arc<dyn PushNotifier>,
    push_timeout: Duration,
    pushes: JoinSet<()>,
}

impl EmitterWorker {
    /// Process queued items until every emitter is dropped or shutdown is signalled.
    ///
    /// Items already queued when shutdown arrives are still dispatched, and
    /// in-flight pushes are awaited.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!("Event emitter worker started");
        let mut prune = tokio::time::interval(PRUNE_INTERVAL);

        loop {
            tokio::select! {
                next = self.rx.recv() => match next {
                    Some(outbound) => self.dispatch(outbound).await,
                    None => break,
                },
                Some(joined) = self.pushes.join_next(), if !self.pushes.is_empty() => {
                    if let Err(e) = joined {
                        warn!(error = %e, "Push task failed");
                    }
                },
                _ = prune.tick() => {
                    let removed = self.hub.prune().await;
                    if removed > 0 {
                        debug!(removed, "Pruned idle fan-out channels");
                    }
                },
                _ = shutdown.recv() => {
                    let drained = self.drain().await;
                    info!(drained, "Event emitter worker received shutdown signal");
                    break;
                },
            }
        }

        self.settle_pushes().await;
        info!("Event emitter worker stopped");
    }

    /// Dispatch everything currently queued and wait for the pushes it started.
    pub async fn drain(&mut self) -> usize {
        let mut count = 0;
        while let Ok(outbound) = self.rx.try_recv() {
            self.dispatch(outbound).await;
            count += 1;
        }
        self.settle_pushes().await;
        count
    }

    async fn settle_pushes(&mut self) {
        while let Some(joined) = self.pushes.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Push task failed");
            }
        }
    }

    async fn dispatch(&mut self, outbound: Outbound) {
        let kind = outbound.event.kind();
        let mut delivered = 0;
        for channel in &outbound.channels {
            delivered += self.hub.publish(*channel, outbound.event.clone()).await;
        }
        record_fanout(delivered);
        debug!(event = kind, channels = outbound.channels.len(), delivered, "Published event");

        if let Some(push) = outbound.push {
            // Presence is read now so suppression matches what was just published.
            let viewing = self.hub.subscribers(Channel::Ticket(push.ticket_id));
            let notifications = notifications(&push, &viewing);
            if notifications.is_empty() {
                return;
            }
            self.pushes.spawn(deliver(
                Arc::clone(&self.notifier),
                notifications,
                self.push_timeout,
            ));
        }
    }
}

/// Notifications owed for `push`, minus the sender and anyone in `viewing`.
fn notifications(push: &MessagePush, viewing: &HashSet<UserId>) -> Vec<PushNotification> {
    push.recipients
        .iter()
        .copied()
        .filter(|user_id| Some(*user_id) != push.sender_id)
        .filter(|user_id| {
            let live = viewing.contains(user_id);
            if live {
                record_push("suppressed");
                debug!(user_id = %user_id, ticket_id = %push.ticket_id, "Push suppressed, user is viewing the ticket");
            }
            !live
        })
        .map(|user_id| PushNotification {
            user_id,
            title: format!("#{} {}", push.ticket_number, push.sender_name),
            body: push.snippet.clone(),
            data: PushPayload {
                ticket_id: push.ticket_id,
                ticket_number: push.ticket_number,
                message_id: push.message_id,
                sender_id: push.sender_id,
                sender_name: push.sender_name.clone(),
            },
        })
        .collect()
}

/// Send every notification concurrently, each bounded by `timeout`.
async fn deliver(notifier: Arc<dyn PushNotifier>, notifications: Vec<PushNotification>, timeout: Duration) {
    let sends = notifications.iter().map(|notification| {
        let notifier = Arc::clone(&notifier);
        async move {
            let user_id = notification.user_id;
            match tokio::time::timeout(timeout, notifier.push(notification)).await {
                Ok(Ok(())) => record_push("sent"),
                Ok(Err(e)) => {
                    record_push("failed");
                    warn!(user_id = %user_id, error = %e, "Push notification failed");
                }
                Err(_) => {
                    record_push("failed");
                    warn!(user_id = %user_id, timeout_ms = timeout.as_millis(), "Push notification timed out");
                }
            }
        }
    });
    join_all(sends).await;
}
