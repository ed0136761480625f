//! Application services - the imperative shell around the pure core.
//!
//! Every operation follows the same order:
//! 1. Authorize against the request's capabilities
//! 2. Apply the change transactionally (ticket mutations lock the ticket row
//!    and run [`appeals_core::machine::TicketReducer`])
//! 3. Invalidate cache entries after commit
//! 4. Enqueue real-time events and pushes
//!
//! Failures before or during commit abort the operation and emit nothing.

mod thread;
mod tickets;

pub use thread::{PostMessage, ThreadQuery, ThreadMode, Upload};
pub use tickets::{CreateTicket, ListQuery};

use crate::cache::TicketCache;
use crate::config::ThreadConfig;
use crate::emitter::EventEmitter;
use crate::views::{AttachmentView, MessageView, UserView};
use appeals_core::environment::Clock;
use appeals_core::ports::{AttachmentStore, Directory, MessageStore, PermissionAdapter, TicketStore};
use appeals_core::{
    AppealsError, Channel, Message, RequestContext, Result, TicketId, TicketSnapshot, UserId,
};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Collaborators of [`AppealsService`].
#[derive(Clone)]
pub struct ServiceDeps {
    /// Ticket persistence
    pub tickets: Arc<dyn TicketStore>,
    /// Thread persistence
    pub messages: Arc<dyn MessageStore>,
    /// Identity directory
    pub directory: Arc<dyn Directory>,
    /// Role resolution
    pub permissions: Arc<dyn PermissionAdapter>,
    /// Attachment binaries
    pub attachments: Arc<dyn AttachmentStore>,
    /// List and detail cache
    pub cache: TicketCache,
    /// Post-commit event queue
    pub emitter: EventEmitter,
    /// Time source
    pub clock: Arc<dyn Clock>,
    /// Thread paging limits
    pub thread: ThreadConfig,
}

/// Ticket and thread operations.
///
/// Cloning is cheap; clones share every collaborator.
#[derive(Clone)]
pub struct AppealsService {
    deps: Arc<ServiceDeps>,
}

impl AppealsService {
    /// Create the service.
    #[must_use]
    pub fn new(deps: ServiceDeps) -> Self {
        Self {
            deps: Arc::new(deps),
        }
    }

    /// Collaborators.
    #[must_use]
    pub fn deps(&self) -> &ServiceDeps {
        &self.deps
    }

    /// Resolve a bearer token into a request context.
    ///
    /// # Errors
    ///
    /// - `UNAUTHORIZED` for unknown or expired tokens
    /// - `FORBIDDEN` when the user may not use the appeals module
    #[tracing::instrument(skip(self, token))]
    pub async fn authenticate(&self, token: &str, correlation_id: Uuid) -> Result<RequestContext> {
        let user = self
            .deps
            .directory
            .authenticate(token)
            .await?
            .ok_or_else(|| AppealsError::Unauthorized("invalid or expired token".into()))?;

        let capabilities = self.deps.permissions.capabilities(&user).await?;
        if !capabilities.can_access() {
            return Err(AppealsError::Forbidden("appeals access is not granted".into()));
        }

        Ok(RequestContext::new(user, capabilities, correlation_id))
    }

    /// Check that `ctx` may subscribe to `channel`.
    ///
    /// Personal channels are for their owner, department channels for members,
    /// managers and admins, ticket channels for anyone who can view the ticket.
    ///
    /// # Errors
    ///
    /// `FORBIDDEN` when not allowed, `NOT_FOUND` for unknown tickets.
    pub async fn authorize_channel(&self, ctx: &RequestContext, channel: Channel) -> Result<()> {
        let caps = &ctx.capabilities;
        let allowed = match channel {
            Channel::User(user) => user == ctx.user_id(),
            Channel::Department(department) => {
                caps.belongs_to(department) || caps.supervises(department)
            }
            Channel::Ticket(ticket_id) => {
                self.viewable(ctx, ticket_id).await?;
                true
            }
        };

        if allowed {
            Ok(())
        } else {
            Err(AppealsError::Forbidden(format!("cannot subscribe to {channel}")))
        }
    }

    /// Load a ticket the caller can view.
    pub(crate) async fn viewable(&self, ctx: &RequestContext, ticket_id: TicketId) -> Result<TicketSnapshot> {
        let snapshot = self
            .deps
            .tickets
            .load(ticket_id)
            .await?
            .ok_or_else(|| AppealsError::not_found("Ticket", ticket_id))?;

        if !ctx.authority(&snapshot).can_view() {
            return Err(AppealsError::Forbidden("not allowed to view this ticket".into()));
        }
        Ok(snapshot)
    }

    /// Display identities of `ids`, unknown users get a placeholder.
    pub(crate) async fn user_views(&self, ids: &[UserId]) -> Result<HashMap<UserId, UserView>> {
        let profiles = self.deps.directory.profiles(ids).await?;
        let mut views: HashMap<UserId, UserView> =
            profiles.iter().map(|p| (p.id, UserView::from(p))).collect();
        for id in ids {
            views.entry(*id).or_insert_with(|| UserView::unknown(*id));
        }
        Ok(views)
    }

    /// Hydrate messages with sender identities and attachment URLs.
    pub(crate) async fn hydrate(&self, messages: Vec<Message>) -> Result<Vec<MessageView>> {
        let mut senders: Vec<UserId> = messages.iter().filter_map(|m| m.sender_id).collect();
        senders.sort_unstable();
        senders.dedup();
        let users = self.user_views(&senders).await?;

        Ok(messages
            .into_iter()
            .map(|message| {
                let sender = message.sender_id.and_then(|id| users.get(&id).cloned());
                let attachments = message
                    .attachments
                    .iter()
                    .map(|a| AttachmentView {
                        id: a.id,
                        file_name: a.file_name.clone(),
                        kind: a.kind,
                        url: self.deps.attachments.url(&a.storage_key),
                    })
                    .collect();
                MessageView::new(message, sender, attachments)
            })
            .collect())
    }

    /// Hydrate a single message.
    pub(crate) async fn hydrate_one(&self, message: Message) -> Result<MessageView> {
        let id = message.id;
        self.hydrate(vec![message])
            .await?
            .pop()
            .ok_or_else(|| AppealsError::Internal(format!("message {id} vanished during hydration")))
    }
}
