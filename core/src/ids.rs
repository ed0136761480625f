//! Identifiers.
//!
//! All identifiers are database-assigned `i64` keys wrapped in newtypes so a
//! `TicketId` can never be passed where a `MessageId` is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Wrap a raw key.
            #[must_use]
            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            /// The raw key.
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse().map(Self)
            }
        }

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }
    };
}

define_id!(
    /// Unique identifier for a ticket
    TicketId
);
define_id!(
    /// Unique identifier for a thread message
    MessageId
);
define_id!(
    /// Unique identifier for an attachment row
    AttachmentId
);
define_id!(
    /// Unique identifier for an employee
    UserId
);
define_id!(
    /// Unique identifier for a department
    DepartmentId
);
define_id!(
    /// Unique identifier for a role
    RoleId
);
