//! Thread operations: post, edit, delete, paging, bootstrap and read receipts.

use super::tickets::ticket_updated;
use super::AppealsService;
use crate::emitter::{snippet, MessagePush, RealtimeEvent};
use crate::metrics::record_message_posted;
use crate::views::{MessageView, ThreadPageView};
use appeals_core::events::{audience, recipients};
use appeals_core::thread::{
    assemble_bootstrap, assemble_page, clamp_limit, Anchor, Bound, Cursor, Direction, ThreadPage,
    WindowQuery, DEFAULT_BOOTSTRAP_SPAN,
};
use appeals_core::{
    AppealsError, AttachmentKind, Message, MessageId, MessageKind, NewAttachment, NewMessage,
    RequestContext, Result, TicketId, TicketSnapshot,
};
use tracing::{debug, info, warn};

/// A file uploaded with a message.
#[derive(Clone, Debug)]
pub struct Upload {
    /// Original file name
    pub file_name: String,
    /// Content
    pub bytes: Vec<u8>,
    /// Media kind; guessed from the extension when absent
    pub kind: Option<AttachmentKind>,
}

/// A new user message.
#[derive(Clone, Debug, Default)]
pub struct PostMessage {
    /// Body
    pub text: Option<String>,
    /// Attached files
    pub attachments: Vec<Upload>,
}

/// How a thread read is positioned.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ThreadMode {
    /// Walk from a cursor
    #[default]
    Page,
    /// Center on the caller's unread anchor
    Bootstrap,
}

/// Thread read request.
#[derive(Clone, Debug, Default)]
pub struct ThreadQuery {
    /// Positioning mode
    pub mode: ThreadMode,
    /// Page size (page mode, and bootstrap without an anchor)
    pub limit: Option<i64>,
    /// Encoded cursor (page mode)
    pub cursor: Option<String>,
    /// Walk direction (page mode)
    pub direction: Direction,
    /// Which unread message to center on (bootstrap)
    pub anchor: Anchor,
    /// Messages before the anchor (bootstrap)
    pub before: Option<i64>,
    /// Messages after the anchor (bootstrap)
    pub after: Option<i64>,
}

fn non_blank(text: Option<&str>) -> Option<String> {
    text.map(str::trim)
        .filter(|t| !t.is_empty())
        .map(ToString::to_string)
}

impl AppealsService {
    /// Append a user message and notify participants.
    ///
    /// # Errors
    ///
    /// - `VALIDATION` when neither text nor attachments are given
    /// - `NOT_FOUND` / `FORBIDDEN` when the caller cannot post to the ticket
    #[tracing::instrument(skip(self, ctx, input), fields(user_id = %ctx.user_id()))]
    pub async fn post_message(&self, ctx: &RequestContext, ticket_id: TicketId, input: PostMessage) -> Result<MessageView> {
        let deps = self.deps();
        let text = non_blank(input.text.as_deref());
        if text.is_none() && input.attachments.is_empty() {
            return Err(AppealsError::Validation("message needs text or attachments".into()));
        }

        let snapshot = self.viewable(ctx, ticket_id).await?;
        if !ctx.authority(&snapshot).can_post() {
            return Err(AppealsError::Forbidden("not allowed to post to this ticket".into()));
        }

        let appended = deps
            .messages
            .append(NewMessage::user(ticket_id, ctx.user_id(), text, deps.clock.now()))
            .await?;
        let stored = self.attach(ticket_id, appended.id, &input.attachments).await;

        let message = if stored > 0 {
            deps.messages
                .find(appended.id)
                .await?
                .ok_or_else(|| AppealsError::not_found("Message", appended.id))?
        } else {
            appended
        };
        let view = self.hydrate_one(message).await?;
        record_message_posted();
        debug!(message_id = %view.id, attachments = stored, "Message posted");

        deps.cache.invalidate_ticket(ticket_id).await;

        let channels = audience(&snapshot, &snapshot, ctx.user_id());
        let body = view.text.as_deref().map_or_else(
            || view.attachments.first().map(|a| a.file_name.clone()).unwrap_or_default(),
            snippet,
        );
        let push = MessagePush {
            ticket_id,
            ticket_number: snapshot.ticket.number,
            message_id: view.id,
            sender_id: Some(ctx.user_id()),
            sender_name: ctx.user.display_name.clone(),
            snippet: body.clone(),
            recipients: recipients(&snapshot, &snapshot),
        };
        deps.emitter.emit_with_push(
            channels.clone(),
            RealtimeEvent::MessageAdded {
                message: view.clone(),
            },
            push,
        );
        deps.emitter.emit(channels, ticket_updated(&snapshot, Some(&body)));

        Ok(view)
    }

    /// Replace the text of one's own message.
    ///
    /// # Errors
    ///
    /// - `NOT_FOUND` for unknown or deleted messages
    /// - `FORBIDDEN` for system messages and other users' messages
    /// - `VALIDATION` for blank text on a message without attachments
    #[tracing::instrument(skip(self, ctx, text), fields(user_id = %ctx.user_id()))]
    pub async fn edit_message(&self, ctx: &RequestContext, message_id: MessageId, text: Option<String>) -> Result<MessageView> {
        let deps = self.deps();
        let (message, snapshot) = self.own_message(ctx, message_id).await?;

        let text = non_blank(text.as_deref());
        if text.is_none() && message.attachments.is_empty() {
            return Err(AppealsError::Validation("edited message cannot be empty".into()));
        }

        let edited = deps.messages.edit(message_id, text, deps.clock.now()).await?;
        let view = self.hydrate_one(edited).await?;

        deps.cache.invalidate_ticket(message.ticket_id).await;
        deps.emitter.emit(
            audience(&snapshot, &snapshot, ctx.user_id()),
            RealtimeEvent::MessageEdited {
                message: view.clone(),
            },
        );
        Ok(view)
    }

    /// Soft-delete one's own message.
    ///
    /// # Errors
    ///
    /// Same as [`AppealsService::edit_message`] minus the text check.
    #[tracing::instrument(skip(self, ctx), fields(user_id = %ctx.user_id()))]
    pub async fn delete_message(&self, ctx: &RequestContext, message_id: MessageId) -> Result<()> {
        let deps = self.deps();
        let (message, snapshot) = self.own_message(ctx, message_id).await?;

        deps.messages.soft_delete(message_id).await?;
        info!(message_id = %message_id, ticket_id = %message.ticket_id, "Message deleted");

        deps.cache.invalidate_ticket(message.ticket_id).await;
        deps.emitter.emit(
            audience(&snapshot, &snapshot, ctx.user_id()),
            RealtimeEvent::MessageDeleted {
                ticket_id: message.ticket_id,
                message_id,
            },
        );
        Ok(())
    }

    async fn own_message(&self, ctx: &RequestContext, message_id: MessageId) -> Result<(Message, TicketSnapshot)> {
        let message = self
            .deps()
            .messages
            .find(message_id)
            .await?
            .filter(|m| !m.deleted)
            .ok_or_else(|| AppealsError::not_found("Message", message_id))?;

        let snapshot = self.viewable(ctx, message.ticket_id).await?;
        if message.kind == MessageKind::System {
            return Err(AppealsError::Forbidden("system messages cannot be changed".into()));
        }
        if message.sender_id != Some(ctx.user_id()) {
            return Err(AppealsError::Forbidden("only the sender can change a message".into()));
        }
        Ok((message, snapshot))
    }

    /// Read a slice of a thread.
    ///
    /// # Errors
    ///
    /// `VALIDATION` for malformed cursors; `NOT_FOUND` / `FORBIDDEN` for tickets
    /// the caller cannot view.
    #[tracing::instrument(skip(self, ctx), fields(user_id = %ctx.user_id()))]
    pub async fn messages(&self, ctx: &RequestContext, ticket_id: TicketId, query: &ThreadQuery) -> Result<ThreadPageView> {
        self.viewable(ctx, ticket_id).await?;

        let page = match query.mode {
            ThreadMode::Page => self.page(ticket_id, query).await?,
            ThreadMode::Bootstrap => self.bootstrap(ctx, ticket_id, query).await?,
        };

        let messages = self.hydrate(page.messages.clone()).await?;
        Ok(ThreadPageView::new(&page, messages))
    }

    async fn page(&self, ticket_id: TicketId, query: &ThreadQuery) -> Result<ThreadPage> {
        let deps = self.deps();
        let limit = clamp_limit(query.limit, deps.thread.default_limit, deps.thread.max_limit);
        let bound = match query.cursor.as_deref().filter(|c| !c.trim().is_empty()) {
            Some(raw) => Bound::Exclusive(Cursor::decode(raw)?.key()),
            None => Bound::Unbounded,
        };

        let rows = deps
            .messages
            .window(&WindowQuery {
                ticket_id,
                direction: query.direction,
                bound,
                limit: limit + 1,
            })
            .await?;
        Ok(assemble_page(query.direction, rows, limit))
    }

    async fn bootstrap(&self, ctx: &RequestContext, ticket_id: TicketId, query: &ThreadQuery) -> Result<ThreadPage> {
        let deps = self.deps();
        let Some(anchor) = deps
            .messages
            .unread_anchor(ticket_id, ctx.user_id(), query.anchor)
            .await?
        else {
            // Nothing unread: the newest page.
            return self
                .page(
                    ticket_id,
                    &ThreadQuery {
                        cursor: None,
                        direction: Direction::Before,
                        ..query.clone()
                    },
                )
                .await;
        };

        let before = clamp_limit(query.before, DEFAULT_BOOTSTRAP_SPAN, deps.thread.max_limit);
        let after = clamp_limit(query.after, DEFAULT_BOOTSTRAP_SPAN, deps.thread.max_limit);

        let older = deps
            .messages
            .window(&WindowQuery {
                ticket_id,
                direction: Direction::Before,
                bound: Bound::Exclusive(anchor),
                limit: before + 1,
            })
            .await?;
        let newer = deps
            .messages
            .window(&WindowQuery {
                ticket_id,
                direction: Direction::After,
                bound: Bound::Inclusive(anchor),
                limit: after + 2,
            })
            .await?;

        Ok(assemble_bootstrap(anchor.id, older, newer, before, after))
    }

    /// Mark messages read, backfilling every earlier unread foreign message.
    ///
    /// Returns the ids newly marked, ascending.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND` / `FORBIDDEN` for tickets the caller cannot view.
    #[tracing::instrument(skip(self, ctx, message_ids), fields(user_id = %ctx.user_id(), requested = message_ids.len()))]
    pub async fn mark_read(&self, ctx: &RequestContext, ticket_id: TicketId, message_ids: &[MessageId]) -> Result<Vec<MessageId>> {
        let deps = self.deps();
        let snapshot = self.viewable(ctx, ticket_id).await?;

        let marked = deps
            .messages
            .mark_read(ticket_id, ctx.user_id(), message_ids, deps.clock.now())
            .await?;
        if marked.is_empty() {
            return Ok(marked);
        }

        debug!(marked = marked.len(), "Read receipts recorded");
        deps.cache.invalidate_lists().await;
        deps.emitter.emit(
            audience(&snapshot, &snapshot, ctx.user_id()),
            RealtimeEvent::MessageRead {
                ticket_id,
                user_id: ctx.user_id(),
                message_ids: marked.clone(),
            },
        );
        Ok(marked)
    }

    /// Mark one message read (with backfill).
    ///
    /// # Errors
    ///
    /// `NOT_FOUND` when the message is not part of the ticket.
    pub async fn mark_one_read(&self, ctx: &RequestContext, ticket_id: TicketId, message_id: MessageId) -> Result<Vec<MessageId>> {
        let belongs = self
            .deps()
            .messages
            .find(message_id)
            .await?
            .is_some_and(|m| m.ticket_id == ticket_id && !m.deleted);
        if !belongs {
            return Err(AppealsError::not_found("Message", message_id));
        }
        self.mark_read(ctx, ticket_id, &[message_id]).await
    }

    /// Store uploads and record them on `message_id`. Failed files are logged and skipped.
    pub(crate) async fn attach(&self, ticket_id: TicketId, message_id: MessageId, uploads: &[Upload]) -> usize {
        let deps = self.deps();
        let mut stored = 0;

        for upload in uploads {
            let storage_key = match deps.attachments.put(ticket_id, &upload.file_name, &upload.bytes).await {
                Ok(key) => key,
                Err(e) => {
                    warn!(file_name = %upload.file_name, error = %e, "Attachment upload failed, skipping");
                    continue;
                }
            };

            let attachment = NewAttachment {
                storage_key,
                file_name: upload.file_name.clone(),
                kind: upload
                    .kind
                    .unwrap_or_else(|| AttachmentKind::from_file_name(&upload.file_name)),
            };
            match deps.messages.add_attachment(message_id, attachment).await {
                Ok(_) => stored += 1,
                Err(e) => warn!(file_name = %upload.file_name, error = %e, "Failed to record attachment, skipping"),
            }
        }
        stored
    }
}
