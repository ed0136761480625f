//! Ticket state machine driven with fixture users.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use appeals_core::machine::{
    status_transition, system_events, Actor, TicketAction, TicketCommand, TicketEnvironment,
    TicketReducer,
};
use appeals_core::{
    Department, Priority, SystemEvent, Ticket, TicketId, TicketSnapshot, TicketStatus, UserId,
};
use appeals_testing::fixtures::{self, ADA, ANN, BOB, IT, MIA, SALES, SUPPORT, ZED};
use appeals_testing::ReducerTest;
use chrono::{TimeZone, Utc};
use std::collections::BTreeSet;

fn ticket(status: TicketStatus, assignees: &[UserId]) -> TicketSnapshot {
    let at = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
    let mut snapshot = TicketSnapshot::new(Ticket {
        id: TicketId(7),
        number: 1006,
        from_department: Some(SALES),
        to_department: SUPPORT,
        created_by: ANN,
        status,
        priority: Priority::Low,
        title: "Monitor arm".into(),
        deadline: None,
        created_at: at,
        updated_at: at,
    });
    snapshot.assignees = assignees.iter().copied().collect();
    snapshot
}

fn env() -> TicketEnvironment {
    TicketEnvironment {
        user_names: [ANN, BOB, MIA, ZED, ADA]
            .into_iter()
            .map(|id| (id, fixtures::profile(id).display_name))
            .collect(),
        department_names: [(SUPPORT, "Support".to_string()), (IT, "IT".to_string())]
            .into_iter()
            .collect(),
    }
}

fn by(user: UserId, command: TicketCommand) -> TicketAction {
    TicketAction {
        actor: Actor::new(fixtures::capabilities(user)),
        command,
    }
}

fn count_messages(effects: &[appeals_core::machine::TicketEffect]) -> usize {
    system_events(effects).count()
}

#[test]
fn test_member_claim_on_open_ticket() {
    ReducerTest::new(TicketReducer)
        .with_env(env())
        .given_state(ticket(TicketStatus::Open, &[]))
        .when_action(by(BOB, TicketCommand::Claim))
        .then_state(|state| {
            assert_eq!(state.ticket.status, TicketStatus::InProgress);
            assert_eq!(state.assignees, BTreeSet::from([BOB]));
        })
        .then_effects(|effects| {
            assert_eq!(count_messages(effects), 2);
            assert_eq!(
                status_transition(effects),
                Some((TicketStatus::Open, TicketStatus::InProgress))
            );
        })
        .run();
}

#[test]
fn test_creator_cannot_claim_outside_target_department() {
    ReducerTest::new(TicketReducer)
        .with_env(env())
        .given_state(ticket(TicketStatus::Open, &[]))
        .when_action(by(ANN, TicketCommand::Claim))
        .then_error(|err| assert_eq!(err.code(), "FORBIDDEN"))
        .run();
}

#[test]
fn test_admin_may_decline() {
    ReducerTest::new(TicketReducer)
        .with_env(env())
        .given_state(ticket(TicketStatus::InProgress, &[BOB]))
        .when_action(by(
            ADA,
            TicketCommand::ChangeStatus {
                status: TicketStatus::Declined,
            },
        ))
        .then_state(|state| assert_eq!(state.ticket.status, TicketStatus::Declined))
        .then_effects(|effects| assert_eq!(count_messages(effects), 1))
        .run();
}

#[test]
fn test_assignee_resolves() {
    ReducerTest::new(TicketReducer)
        .with_env(env())
        .given_state(ticket(TicketStatus::InProgress, &[BOB]))
        .when_action(by(
            BOB,
            TicketCommand::ChangeStatus {
                status: TicketStatus::Resolved,
            },
        ))
        .then_state(|state| {
            assert_eq!(state.ticket.status, TicketStatus::Resolved);
            assert_eq!(state.assignees, BTreeSet::from([BOB]));
        })
        .run();
}

#[test]
fn test_manager_moves_ticket_to_it() {
    ReducerTest::new(TicketReducer)
        .with_env(env())
        .given_state(ticket(TicketStatus::InProgress, &[BOB]))
        .when_action(by(
            MIA,
            TicketCommand::ChangeDepartment {
                department: Department {
                    id: IT,
                    name: "IT".into(),
                },
            },
        ))
        .then_state(|state| {
            assert_eq!(state.ticket.to_department, IT);
            assert_eq!(state.ticket.status, TicketStatus::Open);
            assert!(state.assignees.is_empty());
        })
        .then_effects(|effects| {
            assert!(system_events(effects)
                .any(|event| matches!(event, SystemEvent::DepartmentChanged { .. })));
        })
        .run();
}

#[test]
fn test_it_member_cannot_move_support_ticket() {
    ReducerTest::new(TicketReducer)
        .with_env(env())
        .given_state(ticket(TicketStatus::Open, &[]))
        .when_action(by(
            ZED,
            TicketCommand::ChangeDepartment {
                department: Department {
                    id: IT,
                    name: "IT".into(),
                },
            },
        ))
        .then_error(|err| assert_eq!(err.code(), "FORBIDDEN"))
        .run();
}

#[test]
fn test_creator_replaces_watchers_silently() {
    ReducerTest::new(TicketReducer)
        .with_env(env())
        .given_state(ticket(TicketStatus::Open, &[]))
        .when_action(by(
            ANN,
            TicketCommand::SetWatchers {
                watchers: BTreeSet::from([ZED]),
            },
        ))
        .then_state(|state| assert_eq!(state.watchers, BTreeSet::from([ZED])))
        .then_effects(|effects| {
            assert_eq!(effects.len(), 1);
            assert_eq!(count_messages(effects), 0);
        })
        .run();
}
