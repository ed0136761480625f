//! Shared harness: the service wired to in-memory adapters.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use appeals::cache::{MemoryCache, TicketCache};
use appeals::config::ThreadConfig;
use appeals::services::{CreateTicket, PostMessage};
use appeals::views::CreatedTicket;
use appeals::{AppState, AppealsService, EmitterWorker, EventEmitter, RealtimeEvent, ServiceDeps};
use appeals_core::ports::Directory;
use appeals_core::{DepartmentId, MessageId, Priority, RequestContext, TicketId};
use appeals_testing::{
    fixtures, init_test_tracing, ticking_clock, InMemoryStore, MemoryAttachmentStore,
    RecordingPushNotifier,
};
use appeals_web::FanoutHub;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub struct Harness {
    pub service: AppealsService,
    pub store: Arc<InMemoryStore>,
    pub hub: FanoutHub<RealtimeEvent>,
    pub worker: EmitterWorker,
    pub push: RecordingPushNotifier,
    pub cache: Arc<MemoryCache>,
    pub attachments: MemoryAttachmentStore,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_attachments(MemoryAttachmentStore::new())
    }

    pub fn with_attachments(attachments: MemoryAttachmentStore) -> Self {
        Self::build(attachments, |_| Arc::new(fixtures::directory()))
    }

    /// Wire a custom directory; the closure sees the store the service will use.
    pub fn with_directory(directory: impl FnOnce(&Arc<InMemoryStore>) -> Arc<dyn Directory>) -> Self {
        Self::build(MemoryAttachmentStore::new(), directory)
    }

    fn build(
        attachments: MemoryAttachmentStore,
        directory: impl FnOnce(&Arc<InMemoryStore>) -> Arc<dyn Directory>,
    ) -> Self {
        init_test_tracing();

        let store = Arc::new(InMemoryStore::new());
        let directory = directory(&store);
        let hub = FanoutHub::new();
        let push = RecordingPushNotifier::new();
        let cache = Arc::new(MemoryCache::new());
        let (emitter, worker) =
            EventEmitter::channel(hub.clone(), Arc::new(push.clone()), Duration::from_secs(1));

        let service = AppealsService::new(ServiceDeps {
            tickets: store.clone(),
            messages: store.clone(),
            directory,
            permissions: Arc::new(fixtures::permissions()),
            attachments: Arc::new(attachments.clone()),
            cache: TicketCache::new(cache.clone(), Duration::from_secs(60)),
            emitter,
            clock: Arc::new(ticking_clock()),
            thread: ThreadConfig::default(),
        });

        Self {
            service,
            store,
            hub,
            worker,
            push,
            cache,
            attachments,
        }
    }

    pub fn state(&self) -> AppState {
        AppState::new(self.service.clone(), self.hub.clone())
    }

    /// Authenticate a fixture user by token name, e.g. `"ann"`.
    pub async fn login(&self, name: &str) -> RequestContext {
        self.service
            .authenticate(&format!("{name}-token"), Uuid::new_v4())
            .await
            .unwrap()
    }

    /// Ann files a Support ticket with one opening message.
    pub async fn support_ticket(&self, text: &str) -> CreatedTicket {
        let ann = self.login("ann").await;
        self.service
            .create_ticket(&ann, create(fixtures::SUPPORT, text))
            .await
            .unwrap()
    }

    pub async fn post(&self, ctx: &RequestContext, ticket_id: TicketId, text: &str) -> MessageId {
        self.service
            .post_message(
                ctx,
                ticket_id,
                PostMessage {
                    text: Some(text.into()),
                    attachments: Vec::new(),
                },
            )
            .await
            .unwrap()
            .id
    }

    /// Publish every queued event and push.
    pub async fn flush(&mut self) -> usize {
        self.worker.drain().await
    }
}

pub fn create(to: DepartmentId, text: &str) -> CreateTicket {
    CreateTicket {
        to_department: to,
        from_department: None,
        priority: Some(Priority::Medium),
        title: None,
        text: Some(text.into()),
        deadline: None,
        attachments: Vec::new(),
    }
}
