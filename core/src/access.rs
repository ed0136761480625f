//! Per-ticket authority of an actor.

use crate::capabilities::Capabilities;
use crate::types::TicketSnapshot;

/// How an actor relates to one ticket.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct Authority {
    /// Admin, or manager of the ticket's target department
    pub supervisor: bool,
    /// Author of the ticket
    pub creator: bool,
    /// Currently assigned
    pub assignee: bool,
    /// Currently watching
    pub watcher: bool,
    /// Member of the target department
    pub member: bool,
    /// Member or manager of the originating department
    pub origin: bool,
}

impl Authority {
    /// Resolve the authority of `caps` over `snapshot`.
    #[must_use]
    pub fn resolve(caps: &Capabilities, snapshot: &TicketSnapshot) -> Self {
        let ticket = &snapshot.ticket;
        Self {
            supervisor: caps.supervises(ticket.to_department),
            creator: ticket.created_by == caps.user_id,
            assignee: snapshot.assignees.contains(&caps.user_id),
            watcher: snapshot.watchers.contains(&caps.user_id),
            member: caps.belongs_to(ticket.to_department),
            origin: ticket
                .from_department
                .is_some_and(|from| caps.belongs_to(from) || caps.is_manager_of(from)),
        }
    }

    /// May read the ticket and its thread.
    #[must_use]
    pub const fn can_view(&self) -> bool {
        self.supervisor || self.creator || self.assignee || self.watcher || self.member || self.origin
    }

    /// May post to the thread.
    #[must_use]
    pub const fn can_post(&self) -> bool {
        self.can_view()
    }

    /// Has any mutation right at all (used for no-op acceptance).
    #[must_use]
    pub const fn can_mutate(&self) -> bool {
        self.supervisor || self.creator || self.assignee
    }

    /// May replace the watcher set.
    #[must_use]
    pub const fn can_manage_watchers(&self) -> bool {
        self.can_mutate()
    }

    /// May self-assign.
    #[must_use]
    pub const fn can_claim(&self) -> bool {
        self.supervisor || self.member
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::permissions;
    use crate::ids::{DepartmentId, TicketId, UserId};
    use crate::types::{Priority, Ticket, TicketStatus};
    use chrono::Utc;

    fn snapshot() -> TicketSnapshot {
        let now = Utc::now();
        let mut snapshot = TicketSnapshot::new(Ticket {
            id: TicketId(1),
            number: 1,
            from_department: Some(DepartmentId(1)),
            to_department: DepartmentId(2),
            created_by: UserId(10),
            status: TicketStatus::Open,
            priority: Priority::Medium,
            title: "t".into(),
            deadline: None,
            created_at: now,
            updated_at: now,
        });
        snapshot.assignees.insert(UserId(20));
        snapshot.watchers.insert(UserId(30));
        snapshot
    }

    #[test]
    fn test_roles_over_ticket() {
        let snapshot = snapshot();

        let creator = Authority::resolve(&Capabilities::new(UserId(10), None), &snapshot);
        assert!(creator.creator && creator.can_view() && creator.can_mutate());
        assert!(!creator.can_claim());

        let assignee = Authority::resolve(&Capabilities::new(UserId(20), None), &snapshot);
        assert!(assignee.assignee && assignee.can_mutate());

        let watcher = Authority::resolve(&Capabilities::new(UserId(30), None), &snapshot);
        assert!(watcher.can_view() && !watcher.can_mutate());

        let member = Authority::resolve(
            &Capabilities::new(UserId(40), Some(DepartmentId(2))),
            &snapshot,
        );
        assert!(member.can_claim() && !member.can_mutate());

        let origin = Authority::resolve(
            &Capabilities::new(UserId(50), Some(DepartmentId(1))),
            &snapshot,
        );
        assert!(origin.can_view() && !origin.can_claim());

        let stranger = Authority::resolve(
            &Capabilities::new(UserId(60), Some(DepartmentId(9))),
            &snapshot,
        );
        assert!(!stranger.can_view());

        let admin = Authority::resolve(
            &Capabilities::new(UserId(70), None).with_permission(permissions::ADMIN),
            &snapshot,
        );
        assert!(admin.supervisor && admin.can_claim());
    }
}
