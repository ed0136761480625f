//! Real-time fan-out and push suppression.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use appeals::emitter::RealtimeEvent;
use appeals_core::{Channel, TicketStatus};
use appeals_testing::fixtures::{ANN, BOB, IT, SUPPORT, ZED};
use appeals_web::Published;
use common::Harness;
use tokio::sync::broadcast;

fn drain_events(rx: &mut broadcast::Receiver<Published<RealtimeEvent>>) -> Vec<RealtimeEvent> {
    let mut events = Vec::new();
    while let Ok(published) = rx.try_recv() {
        events.push(published.event);
    }
    events
}

fn kinds(events: &[RealtimeEvent]) -> Vec<&'static str> {
    events.iter().map(RealtimeEvent::kind).collect()
}

#[tokio::test]
async fn test_ticket_created_reaches_department_and_creator() {
    let mut harness = Harness::new();
    let mut department = harness.hub.subscribe(Channel::Department(SUPPORT)).await;
    let mut creator = harness.hub.subscribe(Channel::User(ANN)).await;

    let created = harness.support_ticket("New chair").await;
    harness.flush().await;

    let events = drain_events(&mut department);
    assert_eq!(kinds(&events), vec!["ticket-created"]);
    match &events[0] {
        RealtimeEvent::TicketCreated { ticket } => assert_eq!(ticket.id, created.id),
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(kinds(&drain_events(&mut creator)), vec!["ticket-created"]);
}

#[tokio::test]
async fn test_claim_publishes_mutation_events_after_commit() {
    let mut harness = Harness::new();
    let created = harness.support_ticket("Broken keyboard").await;
    harness.flush().await;

    let mut ticket = harness.hub.subscribe(Channel::Ticket(created.id)).await;
    let mut creator = harness.hub.subscribe(Channel::User(ANN)).await;

    let bob = harness.login("bob").await;
    harness.service.claim(&bob, created.id).await.unwrap();
    harness.flush().await;

    let events = drain_events(&mut ticket);
    let kinds = kinds(&events);
    assert_eq!(kinds.len(), 5);
    assert_eq!(kinds.iter().filter(|k| **k == "message-added").count(), 2);
    assert!(kinds.contains(&"assignees-updated"));
    assert!(kinds.contains(&"status-updated"));
    assert_eq!(kinds.last(), Some(&"ticket-updated"));

    match events.last() {
        Some(RealtimeEvent::TicketUpdated {
            status, assignees, ..
        }) => {
            assert_eq!(*status, TicketStatus::InProgress);
            assert_eq!(assignees, &vec![BOB]);
        }
        other => panic!("unexpected event {other:?}"),
    }

    // The creator's personal feed sees the same sequence, system messages included.
    let personal = drain_events(&mut creator);
    assert_eq!(personal, events);
}

#[tokio::test]
async fn test_thread_changes_reach_department_and_participants() {
    let mut harness = Harness::new();
    let created = harness.support_ticket("Label printer jams").await;
    let bob = harness.login("bob").await;
    let ann = harness.login("ann").await;
    harness.service.claim(&bob, created.id).await.unwrap();
    let posted = harness.post(&ann, created.id, "Still jamming").await;
    harness.flush().await;

    let mut department = harness.hub.subscribe(Channel::Department(SUPPORT)).await;
    let mut assignee = harness.hub.subscribe(Channel::User(BOB)).await;
    let mut creator = harness.hub.subscribe(Channel::User(ANN)).await;

    harness
        .service
        .edit_message(&ann, posted, Some("Still jamming on tray 2".into()))
        .await
        .unwrap();
    harness.service.mark_read(&bob, created.id, &[posted]).await.unwrap();
    harness.service.delete_message(&ann, posted).await.unwrap();
    harness.flush().await;

    let expected = vec!["message-edited", "message-read", "message-deleted"];
    assert_eq!(kinds(&drain_events(&mut department)), expected);
    assert_eq!(kinds(&drain_events(&mut assignee)), expected);
    assert_eq!(kinds(&drain_events(&mut creator)), expected);
}

#[tokio::test]
async fn test_department_move_reaches_the_old_department() {
    let mut harness = Harness::new();
    let created = harness.support_ticket("Wrong queue").await;
    harness.flush().await;

    let mut old = harness.hub.subscribe(Channel::Department(SUPPORT)).await;
    let mut new = harness.hub.subscribe(Channel::Department(IT)).await;
    let mia = harness.login("mia").await;
    harness
        .service
        .change_department(&mia, created.id, IT)
        .await
        .unwrap();
    harness.flush().await;

    for rx in [&mut old, &mut new] {
        let events = drain_events(rx);
        assert!(events.iter().any(|e| matches!(
            e,
            RealtimeEvent::MessageAdded { message }
                if message.text.as_deref() == Some("Department changed from Support to IT")
        )));
        assert!(kinds(&events).contains(&"department-changed"));
    }
}

#[tokio::test]
async fn test_rejected_mutation_emits_nothing() {
    let mut harness = Harness::new();
    let created = harness.support_ticket("Nothing to see").await;
    harness.flush().await;

    let mut ticket = harness.hub.subscribe(Channel::Ticket(created.id)).await;
    harness.store.fail_commits(true);
    let bob = harness.login("bob").await;
    assert!(harness.service.claim(&bob, created.id).await.is_err());

    assert_eq!(harness.flush().await, 0);
    assert!(drain_events(&mut ticket).is_empty());
}

#[tokio::test]
async fn test_push_is_suppressed_for_live_viewers() {
    let mut harness = Harness::new();
    let created = harness.support_ticket("Need a new badge").await;
    let bob = harness.login("bob").await;
    let ann = harness.login("ann").await;
    harness.service.claim(&bob, created.id).await.unwrap();
    harness.flush().await;

    // Bob has the ticket open.
    let (mut rx, presence) = harness
        .hub
        .subscribe_as(Channel::Ticket(created.id), BOB)
        .await;
    harness.post(&ann, created.id, "Any update?").await;
    harness.flush().await;

    assert!(harness.push.sent().is_empty());
    assert_eq!(kinds(&drain_events(&mut rx)), vec!["message-added", "ticket-updated"]);

    // Once Bob leaves, he is notified again; the sender never is.
    drop(presence);
    harness.post(&ann, created.id, "Hello?").await;
    harness.flush().await;

    let sent = harness.push.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].user_id, BOB);
    assert_eq!(sent[0].title, "#1000 Ann");
    assert_eq!(sent[0].body, "Hello?");
    assert_eq!(sent[0].data.ticket_id, created.id);
}

#[tokio::test]
async fn test_push_failures_do_not_fail_the_post() {
    let mut harness = Harness::new();
    let created = harness.support_ticket("Push outage").await;
    let ann = harness.login("ann").await;
    let bob = harness.login("bob").await;
    harness
        .service
        .set_watchers(&ann, created.id, vec![BOB, ZED])
        .await
        .unwrap();

    harness.push.set_failing(true);
    let posted = harness.post(&bob, created.id, "Looking into it").await;
    harness.flush().await;

    assert!(harness.push.sent().is_empty());
    assert!(harness
        .store
        .messages(created.id)
        .await
        .iter()
        .any(|m| m.id == posted));
}

#[tokio::test]
async fn test_read_receipts_reach_the_reader() {
    let mut harness = Harness::new();
    let created = harness.support_ticket("Read me").await;
    let bob = harness.login("bob").await;
    let reply = harness.post(&bob, created.id, "Reply").await;
    harness.flush().await;

    let mut personal = harness.hub.subscribe(Channel::User(ANN)).await;
    let ann = harness.login("ann").await;
    harness.service.mark_read(&ann, created.id, &[reply]).await.unwrap();
    harness.flush().await;

    let events = drain_events(&mut personal);
    assert_eq!(
        events,
        vec![RealtimeEvent::MessageRead {
            ticket_id: created.id,
            user_id: ANN,
            message_ids: vec![reply],
        }]
    );

    // Nothing new to mark, nothing published.
    harness.service.mark_read(&ann, created.id, &[reply]).await.unwrap();
    assert_eq!(harness.flush().await, 0);
}

#[tokio::test]
async fn test_channel_authorization() {
    let harness = Harness::new();
    let created = harness.support_ticket("Channels").await;
    let ann = harness.login("ann").await;
    let zed = harness.login("zed").await;

    assert!(harness
        .service
        .authorize_channel(&ann, Channel::Ticket(created.id))
        .await
        .is_ok());
    assert!(harness
        .service
        .authorize_channel(&ann, Channel::User(ANN))
        .await
        .is_ok());
    assert_eq!(
        harness
            .service
            .authorize_channel(&ann, Channel::User(BOB))
            .await
            .unwrap_err()
            .code(),
        "FORBIDDEN"
    );
    assert_eq!(
        harness
            .service
            .authorize_channel(&zed, Channel::Department(SUPPORT))
            .await
            .unwrap_err()
            .code(),
        "FORBIDDEN"
    );
    assert_eq!(
        harness
            .service
            .authorize_channel(&zed, Channel::Ticket(created.id))
            .await
            .unwrap_err()
            .code(),
        "FORBIDDEN"
    );
}
