//! Ticket state machine.
//!
//! States: `OPEN → IN_PROGRESS → {RESOLVED, COMPLETED, DECLINED}`, with
//! `RESOLVED → IN_PROGRESS` (reopen) and `RESOLVED → COMPLETED`.
//!
//! The reducer is pure: given the locked snapshot, a command and display names,
//! it validates the actor's authority, rewrites the snapshot in place and returns
//! the effects the shell must persist in the same transaction. An empty effect
//! list is an accepted no-op: nothing is written and nothing is published.
//!
//! Authority:
//!
//! | Actor | Allowed |
//! |---|---|
//! | admin, manager of the target department | any status, any assignment, department moves |
//! | creator | `COMPLETED` from anywhere, `RESOLVED → IN_PROGRESS` |
//! | current assignee | `RESOLVED` |
//! | target-department member | claim |
//! | anyone else | nothing (`FORBIDDEN`) |

use crate::access::Authority;
use crate::capabilities::Capabilities;
use crate::error::{AppealsError, Result};
use crate::ids::{DepartmentId, UserId};
use crate::reducer::Reducer;
use crate::types::{Department, DepartmentRef, SystemEvent, TicketSnapshot, TicketStatus, UserRef};
use smallvec::SmallVec;
use std::collections::{BTreeSet, HashMap};

/// Who performs a command.
#[derive(Clone, Debug)]
pub struct Actor {
    /// Acting user
    pub user_id: UserId,
    /// Their flattened capabilities
    pub capabilities: Capabilities,
}

impl Actor {
    /// Actor from capabilities.
    #[must_use]
    pub const fn new(capabilities: Capabilities) -> Self {
        Self {
            user_id: capabilities.user_id,
            capabilities,
        }
    }
}

/// Commands accepted by the ticket state machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TicketCommand {
    /// Replace the assignee set
    Assign {
        /// Requested assignee set
        assignees: BTreeSet<UserId>,
    },
    /// Self-assign
    Claim,
    /// Move to another status
    ChangeStatus {
        /// Requested status
        status: TicketStatus,
    },
    /// Move to another department
    ChangeDepartment {
        /// New owner
        department: Department,
    },
    /// Replace the watcher set
    SetWatchers {
        /// Requested watcher set
        watchers: BTreeSet<UserId>,
    },
}

impl TicketCommand {
    /// Short name used in logs and metrics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Assign { .. } => "assign",
            Self::Claim => "claim",
            Self::ChangeStatus { .. } => "change_status",
            Self::ChangeDepartment { .. } => "change_department",
            Self::SetWatchers { .. } => "set_watchers",
        }
    }
}

/// A command together with its actor.
#[derive(Clone, Debug)]
pub struct TicketAction {
    /// Who
    pub actor: Actor,
    /// What
    pub command: TicketCommand,
}

/// Display names the reducer writes into system messages.
#[derive(Clone, Debug, Default)]
pub struct TicketEnvironment {
    /// User display names
    pub user_names: HashMap<UserId, String>,
    /// Department names
    pub department_names: HashMap<DepartmentId, String>,
}

impl TicketEnvironment {
    fn user_ref(&self, id: UserId) -> UserRef {
        UserRef {
            id,
            name: self
                .user_names
                .get(&id)
                .cloned()
                .unwrap_or_else(|| format!("User #{id}")),
        }
    }

    fn department_ref(&self, id: DepartmentId) -> DepartmentRef {
        DepartmentRef {
            id,
            name: self
                .department_names
                .get(&id)
                .cloned()
                .unwrap_or_else(|| format!("Department #{id}")),
        }
    }

    fn user_refs<'a>(&self, ids: impl IntoIterator<Item = &'a UserId>) -> Vec<UserRef> {
        ids.into_iter().map(|id| self.user_ref(*id)).collect()
    }
}

/// Writes the shell performs, in order, inside the ticket transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TicketEffect {
    /// Update the status column and append a history row
    RecordStatus {
        /// Previous status
        from: TicketStatus,
        /// New status
        to: TicketStatus,
    },
    /// Replace the assignee rows
    ReplaceAssignees {
        /// New assignee set
        assignees: BTreeSet<UserId>,
    },
    /// Update the owning department
    MoveDepartment {
        /// Previous owner
        from: DepartmentId,
        /// New owner
        to: DepartmentId,
    },
    /// Replace the watcher rows
    ReplaceWatchers {
        /// New watcher set
        watchers: BTreeSet<UserId>,
    },
    /// Append a system message to the thread
    AppendSystemMessage(SystemEvent),
}

/// Effect list returned by the reducer.
pub type TicketEffects = SmallVec<[TicketEffect; 4]>;

/// The ticket reducer.
#[derive(Clone, Copy, Debug, Default)]
pub struct TicketReducer;

impl Reducer for TicketReducer {
    type State = TicketSnapshot;
    type Action = TicketAction;
    type Environment = TicketEnvironment;
    type Effect = TicketEffect;
    type Error = AppealsError;

    fn reduce(
        &self,
        state: &mut TicketSnapshot,
        action: TicketAction,
        env: &TicketEnvironment,
    ) -> Result<TicketEffects> {
        let authority = Authority::resolve(&action.actor.capabilities, state);

        match action.command {
            TicketCommand::Assign { assignees } => assign(state, &authority, assignees, env),
            TicketCommand::Claim => claim(state, &authority, action.actor.user_id, env),
            TicketCommand::ChangeStatus { status } => change_status(state, &authority, status, env),
            TicketCommand::ChangeDepartment { department } => {
                change_department(state, &authority, &department, env)
            }
            TicketCommand::SetWatchers { watchers } => set_watchers(state, &authority, watchers),
        }
    }
}

fn forbidden(what: &str) -> AppealsError {
    AppealsError::Forbidden(format!("not allowed to {what} this ticket"))
}

/// Effects for replacing assignees `prev → next` and moving status `from → to`.
///
/// Order: writes first, then `assignees_changed`, then `status_changed`.
fn assignment_effects(
    prev: &BTreeSet<UserId>,
    next: &BTreeSet<UserId>,
    from: TicketStatus,
    to: TicketStatus,
    env: &TicketEnvironment,
) -> TicketEffects {
    let added = env.user_refs(next.difference(prev));
    let removed = env.user_refs(prev.difference(next));
    let set_changed = !added.is_empty() || !removed.is_empty();

    let mut effects = TicketEffects::new();
    if set_changed {
        effects.push(TicketEffect::ReplaceAssignees {
            assignees: next.clone(),
        });
    }
    if from != to {
        effects.push(TicketEffect::RecordStatus { from, to });
    }
    if set_changed {
        effects.push(TicketEffect::AppendSystemMessage(SystemEvent::AssigneesChanged {
            added,
            removed,
        }));
    }
    if from != to {
        effects.push(TicketEffect::AppendSystemMessage(SystemEvent::StatusChanged {
            from,
            to,
        }));
    }
    effects
}

fn assign(
    state: &mut TicketSnapshot,
    authority: &Authority,
    requested: BTreeSet<UserId>,
    env: &TicketEnvironment,
) -> Result<TicketEffects> {
    if !authority.supervisor {
        return Err(forbidden("assign"));
    }

    let from = state.ticket.status;
    let set_changed = requested != state.assignees;
    let to = if requested.is_empty() {
        if from == TicketStatus::InProgress {
            TicketStatus::Open
        } else {
            from
        }
    } else if set_changed || from == TicketStatus::Open {
        TicketStatus::InProgress
    } else {
        from
    };

    let effects = assignment_effects(&state.assignees, &requested, from, to, env);
    state.assignees = requested;
    state.ticket.status = to;
    Ok(effects)
}

fn claim(
    state: &mut TicketSnapshot,
    authority: &Authority,
    actor: UserId,
    env: &TicketEnvironment,
) -> Result<TicketEffects> {
    if !authority.can_claim() {
        return Err(forbidden("claim"));
    }

    if state.assignees.contains(&actor) {
        // Already assigned: nothing to add, and status only moves for new claims.
        return Ok(TicketEffects::new());
    }

    let from = state.ticket.status;
    let to = TicketStatus::InProgress;
    let mut next = state.assignees.clone();
    next.insert(actor);

    let effects = assignment_effects(&state.assignees, &next, from, to, env);
    state.assignees = next;
    state.ticket.status = to;
    Ok(effects)
}

fn status_allowed(authority: &Authority, from: TicketStatus, to: TicketStatus) -> bool {
    if authority.supervisor {
        return true;
    }
    let by_creator = authority.creator
        && (to == TicketStatus::Completed
            || (from == TicketStatus::Resolved && to == TicketStatus::InProgress));
    let by_assignee = authority.assignee && to == TicketStatus::Resolved;
    by_creator || by_assignee
}

fn change_status(
    state: &mut TicketSnapshot,
    authority: &Authority,
    to: TicketStatus,
    env: &TicketEnvironment,
) -> Result<TicketEffects> {
    let from = state.ticket.status;

    if from == to {
        return if authority.can_mutate() {
            Ok(TicketEffects::new())
        } else {
            Err(forbidden("change the status of"))
        };
    }

    if !status_allowed(authority, from, to) {
        return Err(AppealsError::Forbidden(format!(
            "transition {from} -> {to} is not allowed for this user"
        )));
    }

    if to == TicketStatus::InProgress && state.assignees.is_empty() {
        return Err(AppealsError::Validation(
            "a ticket needs at least one assignee to be in progress".into(),
        ));
    }

    let next = if to == TicketStatus::Open {
        BTreeSet::new()
    } else {
        state.assignees.clone()
    };

    let effects = assignment_effects(&state.assignees, &next, from, to, env);
    state.assignees = next;
    state.ticket.status = to;
    Ok(effects)
}

fn change_department(
    state: &mut TicketSnapshot,
    authority: &Authority,
    department: &Department,
    env: &TicketEnvironment,
) -> Result<TicketEffects> {
    if !authority.supervisor {
        return Err(forbidden("move"));
    }

    let from_department = state.ticket.to_department;
    if department.id == from_department {
        return Ok(TicketEffects::new());
    }

    let from = state.ticket.status;
    let to = TicketStatus::Open;
    let cleared = BTreeSet::new();

    let mut effects = TicketEffects::new();
    effects.push(TicketEffect::MoveDepartment {
        from: from_department,
        to: department.id,
    });
    effects.push(TicketEffect::AppendSystemMessage(SystemEvent::DepartmentChanged {
        from: env.department_ref(from_department),
        to: DepartmentRef {
            id: department.id,
            name: department.name.clone(),
        },
    }));
    effects.extend(assignment_effects(&state.assignees, &cleared, from, to, env));

    state.ticket.to_department = department.id;
    state.assignees = cleared;
    state.ticket.status = to;
    Ok(effects)
}

fn set_watchers(
    state: &mut TicketSnapshot,
    authority: &Authority,
    watchers: BTreeSet<UserId>,
) -> Result<TicketEffects> {
    if !authority.can_manage_watchers() {
        return Err(forbidden("manage watchers of"));
    }

    if watchers == state.watchers {
        return Ok(TicketEffects::new());
    }

    state.watchers = watchers.clone();
    Ok(smallvec::smallvec![TicketEffect::ReplaceWatchers { watchers }])
}

/// System events carried by an effect list, in order.
pub fn system_events(effects: &[TicketEffect]) -> impl Iterator<Item = &SystemEvent> {
    effects.iter().filter_map(|effect| match effect {
        TicketEffect::AppendSystemMessage(event) => Some(event),
        _ => None,
    })
}

/// The status transition carried by an effect list, if any.
#[must_use]
pub fn status_transition(effects: &[TicketEffect]) -> Option<(TicketStatus, TicketStatus)> {
    effects.iter().find_map(|effect| match effect {
        TicketEffect::RecordStatus { from, to } => Some((*from, *to)),
        _ => None,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::capabilities::permissions;
    use crate::ids::TicketId;
    use crate::types::{Priority, Ticket};
    use chrono::Utc;

    const CREATOR: UserId = UserId(1);
    const MEMBER_B: UserId = UserId(2);
    const MEMBER_C: UserId = UserId(3);
    const MANAGER: UserId = UserId(4);
    const STRANGER: UserId = UserId(5);
    const SUPPORT: DepartmentId = DepartmentId(10);
    const FACILITIES: DepartmentId = DepartmentId(20);
    const SALES: DepartmentId = DepartmentId(30);

    fn ticket(status: TicketStatus) -> TicketSnapshot {
        let now = Utc::now();
        TicketSnapshot::new(Ticket {
            id: TicketId(1),
            number: 1001,
            from_department: Some(SALES),
            to_department: SUPPORT,
            created_by: CREATOR,
            status,
            priority: Priority::Medium,
            title: "Printer jam".into(),
            deadline: None,
            created_at: now,
            updated_at: now,
        })
    }

    fn env() -> TicketEnvironment {
        TicketEnvironment {
            user_names: [
                (CREATOR, "Ann".to_string()),
                (MEMBER_B, "Bob".to_string()),
                (MEMBER_C, "Cid".to_string()),
            ]
            .into_iter()
            .collect(),
            department_names: [(SUPPORT, "Support".to_string())].into_iter().collect(),
        }
    }

    fn creator() -> Actor {
        Actor::new(Capabilities::new(CREATOR, Some(SALES)))
    }

    fn member(id: UserId) -> Actor {
        Actor::new(Capabilities::new(id, Some(SUPPORT)))
    }

    fn manager() -> Actor {
        Actor::new(Capabilities::new(MANAGER, Some(SUPPORT)).managing(SUPPORT))
    }

    fn admin() -> Actor {
        Actor::new(Capabilities::new(UserId(99), None).with_permission(permissions::ADMIN))
    }

    fn stranger() -> Actor {
        Actor::new(Capabilities::new(STRANGER, Some(SALES)))
    }

    fn run(state: &mut TicketSnapshot, actor: Actor, command: TicketCommand) -> Result<TicketEffects> {
        TicketReducer.reduce(state, TicketAction { actor, command }, &env())
    }

    fn set(ids: &[UserId]) -> BTreeSet<UserId> {
        ids.iter().copied().collect()
    }

    fn event_types(effects: &[TicketEffect]) -> Vec<&'static str> {
        system_events(effects)
            .map(|event| match event {
                SystemEvent::StatusChanged { .. } => "status_changed",
                SystemEvent::AssigneesChanged { .. } => "assignees_changed",
                SystemEvent::DepartmentChanged { .. } => "department_changed",
            })
            .collect()
    }

    #[test]
    fn test_assign_non_empty_moves_to_in_progress() {
        let mut state = ticket(TicketStatus::Open);
        let effects = run(
            &mut state,
            manager(),
            TicketCommand::Assign {
                assignees: set(&[MEMBER_B, MEMBER_C]),
            },
        )
        .unwrap();

        assert_eq!(state.ticket.status, TicketStatus::InProgress);
        assert_eq!(state.assignees, set(&[MEMBER_B, MEMBER_C]));
        assert_eq!(event_types(&effects), vec!["assignees_changed", "status_changed"]);
        assert_eq!(
            status_transition(&effects),
            Some((TicketStatus::Open, TicketStatus::InProgress))
        );
    }

    #[test]
    fn test_assign_empty_after_assign_reverts_to_open() {
        let mut state = ticket(TicketStatus::Open);
        run(
            &mut state,
            manager(),
            TicketCommand::Assign {
                assignees: set(&[MEMBER_B]),
            },
        )
        .unwrap();

        let effects = run(
            &mut state,
            manager(),
            TicketCommand::Assign {
                assignees: BTreeSet::new(),
            },
        )
        .unwrap();

        assert_eq!(state.ticket.status, TicketStatus::Open);
        assert!(state.assignees.is_empty());
        let SystemEvent::AssigneesChanged { added, removed } =
            system_events(&effects).next().unwrap()
        else {
            panic!("expected assignees_changed first");
        };
        assert!(added.is_empty());
        assert_eq!(removed[0].name, "Bob");
    }

    #[test]
    fn test_assign_same_set_is_noop() {
        let mut state = ticket(TicketStatus::InProgress);
        state.assignees = set(&[MEMBER_B]);

        let effects = run(
            &mut state,
            admin(),
            TicketCommand::Assign {
                assignees: set(&[MEMBER_B]),
            },
        )
        .unwrap();
        assert!(effects.is_empty());
    }

    #[test]
    fn test_assign_requires_supervisor() {
        let mut state = ticket(TicketStatus::Open);
        let err = run(
            &mut state,
            creator(),
            TicketCommand::Assign {
                assignees: set(&[MEMBER_B]),
            },
        )
        .unwrap_err();
        assert_eq!(err.code(), "FORBIDDEN");
        assert_eq!(state, ticket(TicketStatus::Open).with_times_of(&state));
    }

    #[test]
    fn test_claim_on_open_emits_two_system_messages() {
        let mut state = ticket(TicketStatus::Open);
        let effects = run(&mut state, member(MEMBER_B), TicketCommand::Claim).unwrap();

        assert_eq!(state.ticket.status, TicketStatus::InProgress);
        assert_eq!(state.assignees, set(&[MEMBER_B]));
        assert_eq!(event_types(&effects), vec!["assignees_changed", "status_changed"]);
    }

    #[test]
    fn test_claim_is_idempotent() {
        let mut state = ticket(TicketStatus::Open);
        run(&mut state, member(MEMBER_B), TicketCommand::Claim).unwrap();
        let effects = run(&mut state, member(MEMBER_B), TicketCommand::Claim).unwrap();
        assert!(effects.is_empty());
        assert_eq!(state.assignees, set(&[MEMBER_B]));
    }

    #[test]
    fn test_second_claimer_joins_without_status_message() {
        let mut state = ticket(TicketStatus::Open);
        run(&mut state, member(MEMBER_B), TicketCommand::Claim).unwrap();
        let effects = run(&mut state, member(MEMBER_C), TicketCommand::Claim).unwrap();
        assert_eq!(event_types(&effects), vec!["assignees_changed"]);
        assert_eq!(state.assignees, set(&[MEMBER_B, MEMBER_C]));
    }

    #[test]
    fn test_claim_forbidden_outside_target_department() {
        let mut state = ticket(TicketStatus::Open);
        let err = run(&mut state, stranger(), TicketCommand::Claim).unwrap_err();
        assert_eq!(err.code(), "FORBIDDEN");
    }

    #[test]
    fn test_same_status_is_accepted_noop() {
        let mut state = ticket(TicketStatus::Open);
        let effects = run(
            &mut state,
            creator(),
            TicketCommand::ChangeStatus {
                status: TicketStatus::Open,
            },
        )
        .unwrap();
        assert!(effects.is_empty());
    }

    #[test]
    fn test_creator_may_complete_from_anywhere() {
        let mut state = ticket(TicketStatus::Open);
        let effects = run(
            &mut state,
            creator(),
            TicketCommand::ChangeStatus {
                status: TicketStatus::Completed,
            },
        )
        .unwrap();
        assert_eq!(state.ticket.status, TicketStatus::Completed);
        assert_eq!(event_types(&effects), vec!["status_changed"]);
    }

    #[test]
    fn test_creator_may_reopen_resolved_but_not_resolve() {
        let mut state = ticket(TicketStatus::Resolved);
        state.assignees = set(&[MEMBER_B]);
        run(
            &mut state,
            creator(),
            TicketCommand::ChangeStatus {
                status: TicketStatus::InProgress,
            },
        )
        .unwrap();
        assert_eq!(state.ticket.status, TicketStatus::InProgress);

        let err = run(
            &mut state,
            creator(),
            TicketCommand::ChangeStatus {
                status: TicketStatus::Resolved,
            },
        )
        .unwrap_err();
        assert_eq!(err.code(), "FORBIDDEN");
    }

    #[test]
    fn test_assignee_may_only_resolve() {
        let mut state = ticket(TicketStatus::InProgress);
        state.assignees = set(&[MEMBER_B]);

        let err = run(
            &mut state,
            member(MEMBER_B),
            TicketCommand::ChangeStatus {
                status: TicketStatus::Completed,
            },
        )
        .unwrap_err();
        assert_eq!(err.code(), "FORBIDDEN");

        run(
            &mut state,
            member(MEMBER_B),
            TicketCommand::ChangeStatus {
                status: TicketStatus::Resolved,
            },
        )
        .unwrap();
        assert_eq!(state.ticket.status, TicketStatus::Resolved);
        assert_eq!(state.assignees, set(&[MEMBER_B]));
    }

    #[test]
    fn test_declined_is_reachable_by_manager_and_admin() {
        for actor in [manager(), admin()] {
            let mut state = ticket(TicketStatus::Open);
            let effects = run(
                &mut state,
                actor,
                TicketCommand::ChangeStatus {
                    status: TicketStatus::Declined,
                },
            )
            .unwrap();
            assert_eq!(state.ticket.status, TicketStatus::Declined);
            assert_eq!(
                status_transition(&effects),
                Some((TicketStatus::Open, TicketStatus::Declined))
            );
        }
    }

    #[test]
    fn test_in_progress_without_assignees_is_rejected() {
        let mut state = ticket(TicketStatus::Open);
        let err = run(
            &mut state,
            admin(),
            TicketCommand::ChangeStatus {
                status: TicketStatus::InProgress,
            },
        )
        .unwrap_err();
        assert_eq!(err.code(), "VALIDATION");
        assert_eq!(state.ticket.status, TicketStatus::Open);
    }

    #[test]
    fn test_reopen_to_open_clears_assignees() {
        let mut state = ticket(TicketStatus::InProgress);
        state.assignees = set(&[MEMBER_B]);
        let effects = run(
            &mut state,
            manager(),
            TicketCommand::ChangeStatus {
                status: TicketStatus::Open,
            },
        )
        .unwrap();
        assert!(state.assignees.is_empty());
        assert_eq!(event_types(&effects), vec!["assignees_changed", "status_changed"]);
    }

    #[test]
    fn test_stranger_gets_forbidden_for_every_mutation() {
        let commands = [
            TicketCommand::Assign {
                assignees: set(&[STRANGER]),
            },
            TicketCommand::Claim,
            TicketCommand::ChangeStatus {
                status: TicketStatus::Completed,
            },
            TicketCommand::ChangeStatus {
                status: TicketStatus::Open,
            },
            TicketCommand::ChangeDepartment {
                department: Department {
                    id: FACILITIES,
                    name: "Facilities".into(),
                },
            },
            TicketCommand::SetWatchers {
                watchers: set(&[STRANGER]),
            },
        ];

        for command in commands {
            let mut state = ticket(TicketStatus::Open);
            let err = run(&mut state, stranger(), command).unwrap_err();
            assert_eq!(err.code(), "FORBIDDEN");
        }
    }

    #[test]
    fn test_department_change_clears_assignees_and_opens() {
        let mut state = ticket(TicketStatus::InProgress);
        state.assignees = set(&[MEMBER_B]);

        let effects = run(
            &mut state,
            manager(),
            TicketCommand::ChangeDepartment {
                department: Department {
                    id: FACILITIES,
                    name: "Facilities".into(),
                },
            },
        )
        .unwrap();

        assert_eq!(state.ticket.to_department, FACILITIES);
        assert!(state.assignees.is_empty());
        assert_eq!(state.ticket.status, TicketStatus::Open);
        assert_eq!(
            event_types(&effects),
            vec!["department_changed", "assignees_changed", "status_changed"]
        );
        assert_eq!(
            effects[0],
            TicketEffect::MoveDepartment {
                from: SUPPORT,
                to: FACILITIES
            }
        );
    }

    #[test]
    fn test_department_change_on_open_ticket_writes_one_message() {
        let mut state = ticket(TicketStatus::Open);
        let effects = run(
            &mut state,
            admin(),
            TicketCommand::ChangeDepartment {
                department: Department {
                    id: FACILITIES,
                    name: "Facilities".into(),
                },
            },
        )
        .unwrap();
        assert_eq!(event_types(&effects), vec!["department_changed"]);
    }

    #[test]
    fn test_manager_of_other_department_cannot_move() {
        let mut state = ticket(TicketStatus::Open);
        let other_manager =
            Actor::new(Capabilities::new(MANAGER, Some(FACILITIES)).managing(FACILITIES));
        let err = run(
            &mut state,
            other_manager,
            TicketCommand::ChangeDepartment {
                department: Department {
                    id: FACILITIES,
                    name: "Facilities".into(),
                },
            },
        )
        .unwrap_err();
        assert_eq!(err.code(), "FORBIDDEN");
    }

    #[test]
    fn test_watchers_replace_without_system_message() {
        let mut state = ticket(TicketStatus::Open);
        let effects = run(
            &mut state,
            creator(),
            TicketCommand::SetWatchers {
                watchers: set(&[MEMBER_C]),
            },
        )
        .unwrap();
        assert_eq!(system_events(&effects).count(), 0);
        assert_eq!(state.watchers, set(&[MEMBER_C]));
    }

    impl TicketSnapshot {
        fn with_times_of(mut self, other: &Self) -> Self {
            self.ticket.created_at = other.ticket.created_at;
            self.ticket.updated_at = other.ticket.updated_at;
            self
        }
    }
}
