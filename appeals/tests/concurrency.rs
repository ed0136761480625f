//! Ticket mutations under contention.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use appeals_core::ports::Directory;
use appeals_core::{
    Department, DepartmentId, MessageKind, Result, TicketStatus, UserId, UserProfile,
};
use appeals_testing::fixtures::{self, BOB, IT, MIA, ZED};
use appeals_testing::{InMemoryDirectory, InMemoryStore};
use async_trait::async_trait;
use common::Harness;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Directory that counts lookups made while a ticket transaction is open.
struct LockWatchingDirectory {
    inner: InMemoryDirectory,
    store: Arc<InMemoryStore>,
    lookups_under_lock: Arc<AtomicUsize>,
}

impl LockWatchingDirectory {
    fn observe(&self) {
        if self.store.is_locked() {
            self.lookups_under_lock.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl Directory for LockWatchingDirectory {
    async fn authenticate(&self, token: &str) -> Result<Option<UserProfile>> {
        self.inner.authenticate(token).await
    }

    async fn profile(&self, id: UserId) -> Result<Option<UserProfile>> {
        self.observe();
        self.inner.profile(id).await
    }

    async fn profiles(&self, ids: &[UserId]) -> Result<Vec<UserProfile>> {
        self.observe();
        self.inner.profiles(ids).await
    }

    async fn department(&self, id: DepartmentId) -> Result<Option<Department>> {
        self.observe();
        self.inner.department(id).await
    }

    async fn departments(&self, ids: &[DepartmentId]) -> Result<Vec<Department>> {
        self.observe();
        self.inner.departments(ids).await
    }
}

#[tokio::test]
async fn test_directory_is_never_consulted_while_a_ticket_is_locked() {
    let lookups_under_lock = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&lookups_under_lock);
    let harness = Harness::with_directory(move |store| {
        Arc::new(LockWatchingDirectory {
            inner: fixtures::directory(),
            store: Arc::clone(store),
            lookups_under_lock: counter,
        })
    });

    let created = harness.support_ticket("Dock is flickering").await;
    let bob = harness.login("bob").await;
    let mia = harness.login("mia").await;
    let ann = harness.login("ann").await;

    harness.service.claim(&bob, created.id).await.unwrap();
    harness
        .service
        .assign(&mia, created.id, vec![BOB, MIA])
        .await
        .unwrap();
    harness
        .service
        .set_watchers(&ann, created.id, vec![ZED])
        .await
        .unwrap();
    let moved = harness
        .service
        .change_department(&mia, created.id, IT)
        .await
        .unwrap();

    assert_eq!(moved.ticket.ticket.to_department, IT);
    assert!(moved
        .system_messages
        .iter()
        .any(|m| m.text.as_deref() == Some("Department changed from Support to IT")));
    assert_eq!(lookups_under_lock.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_concurrent_claim_and_assign_apply_once() {
    let harness = Harness::new();
    let created = harness.support_ticket("Two hands on one ticket").await;
    let bob = harness.login("bob").await;
    let mia = harness.login("mia").await;

    let (claimed, assigned) = tokio::join!(
        harness.service.claim(&bob, created.id),
        harness.service.assign(&mia, created.id, vec![BOB]),
    );
    let (claimed, assigned) = (claimed.unwrap(), assigned.unwrap());

    // Whichever ran second saw the first one's result and changed nothing.
    assert_eq!(
        [claimed.changed, assigned.changed].iter().filter(|c| **c).count(),
        1
    );
    for result in [&claimed, &assigned] {
        assert_eq!(result.ticket.assignees, BTreeSet::from([BOB]));
        assert_eq!(result.ticket.ticket.status, TicketStatus::InProgress);
    }

    let ann = harness.login("ann").await;
    let history = harness.service.history(&ann, created.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].old_status, TicketStatus::Open);
    assert_eq!(history[0].new_status, TicketStatus::InProgress);

    let system = harness
        .store
        .messages(created.id)
        .await
        .into_iter()
        .filter(|m| m.kind == MessageKind::System)
        .count();
    assert_eq!(system, 2);
    assert!(!harness.store.is_locked());
}
