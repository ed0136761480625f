//! Real-time channel addressing and audiences.

use crate::error::AppealsError;
use crate::ids::{DepartmentId, TicketId, UserId};
use crate::types::TicketSnapshot;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// An addressable real-time channel.
///
/// String form is the stable wire contract: `ticket:<id>`, `department:<id>`, `user:<id>`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Channel {
    /// Everyone viewing a ticket
    Ticket(TicketId),
    /// Everyone following a department's queue
    Department(DepartmentId),
    /// One user's personal feed
    User(UserId),
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ticket(id) => write!(f, "ticket:{id}"),
            Self::Department(id) => write!(f, "department:{id}"),
            Self::User(id) => write!(f, "user:{id}"),
        }
    }
}

impl FromStr for Channel {
    type Err = AppealsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AppealsError::Validation(format!("invalid channel: {s}"));
        let (kind, id) = s.split_once(':').ok_or_else(invalid)?;
        let id: i64 = id.parse().map_err(|_| invalid())?;
        match kind {
            "ticket" => Ok(Self::Ticket(TicketId(id))),
            "department" => Ok(Self::Department(DepartmentId(id))),
            "user" => Ok(Self::User(UserId(id))),
            _ => Err(invalid()),
        }
    }
}

/// Users who hear about a ticket mutation: creator, assignees before and after,
/// watchers before and after.
#[must_use]
pub fn recipients(before: &TicketSnapshot, after: &TicketSnapshot) -> BTreeSet<UserId> {
    let mut users = BTreeSet::from([before.ticket.created_by]);
    users.extend(before.assignees.iter().copied());
    users.extend(after.assignees.iter().copied());
    users.extend(before.watchers.iter().copied());
    users.extend(after.watchers.iter().copied());
    users
}

/// Channels a ticket event is published to: the ticket, its owning department
/// (both when it moved), and every recipient's personal channel.
#[must_use]
pub fn audience(before: &TicketSnapshot, after: &TicketSnapshot, actor: UserId) -> Vec<Channel> {
    let mut channels = BTreeSet::from([
        Channel::Ticket(after.ticket.id),
        Channel::Department(before.ticket.to_department),
        Channel::Department(after.ticket.to_department),
        Channel::User(actor),
    ]);
    channels.extend(recipients(before, after).into_iter().map(Channel::User));
    channels.into_iter().collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{Priority, Ticket, TicketStatus};
    use chrono::Utc;

    #[test]
    fn test_channel_names() {
        assert_eq!(Channel::Ticket(TicketId(5)).to_string(), "ticket:5");
        assert_eq!("department:3".parse::<Channel>().unwrap(), Channel::Department(DepartmentId(3)));
        assert_eq!("user:9".parse::<Channel>().unwrap(), Channel::User(UserId(9)));
        assert!("room:1".parse::<Channel>().is_err());
        assert!("ticket:x".parse::<Channel>().is_err());
    }

    #[test]
    fn test_audience_covers_both_departments_and_old_assignees() {
        let now = Utc::now();
        let mut before = TicketSnapshot::new(Ticket {
            id: TicketId(1),
            number: 1,
            from_department: None,
            to_department: DepartmentId(10),
            created_by: UserId(1),
            status: TicketStatus::InProgress,
            priority: Priority::High,
            title: "t".into(),
            deadline: None,
            created_at: now,
            updated_at: now,
        });
        before.assignees.insert(UserId(2));
        before.watchers.insert(UserId(3));

        let mut after = before.clone();
        after.assignees.clear();
        after.ticket.to_department = DepartmentId(20);

        let channels = audience(&before, &after, UserId(4));
        for expected in [
            Channel::Ticket(TicketId(1)),
            Channel::Department(DepartmentId(10)),
            Channel::Department(DepartmentId(20)),
            Channel::User(UserId(1)),
            Channel::User(UserId(2)),
            Channel::User(UserId(3)),
            Channel::User(UserId(4)),
        ] {
            assert!(channels.contains(&expected), "missing {expected}");
        }
        assert_eq!(channels.len(), 7);
    }
}
