//! # Appeals Core
//!
//! Domain types and pure business logic for the appeals (internal ticketing) service.
//!
//! This crate holds everything that can be decided without I/O:
//!
//! - **Types**: tickets, messages, attachments, read receipts, directory records
//! - **State machine**: role-gated status transitions coupled to assignment changes,
//!   expressed as a reducer that returns effect descriptions
//! - **Thread algorithms**: cursors, page assembly, unread anchors, read backfill
//! - **Capabilities**: role hierarchy flattening and access rules
//! - **Ports**: the traits the imperative shell implements (stores, directory, permissions)
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────┐
//! │  Imperative shell (appeals)  │  HTTP, transactions, cache, fan-out, push
//! ├──────────────────────────────┤
//! │  Functional core (this)      │  (snapshot, command, env) → (snapshot', effects)
//! └──────────────────────────────┘
//! ```
//!
//! The shell locks a ticket, hands its snapshot to [`machine::TicketReducer`], persists
//! the returned effects in the same transaction and only then publishes events.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod access;
pub mod capabilities;
pub mod context;
pub mod environment;
pub mod error;
pub mod events;
pub mod ids;
pub mod machine;
pub mod ports;
pub mod thread;
pub mod types;

pub use capabilities::{Capabilities, RoleGraph};
pub use context::RequestContext;
pub use error::{AppealsError, Result};
pub use events::Channel;
pub use ids::{AttachmentId, DepartmentId, MessageId, RoleId, TicketId, UserId};
pub use types::*;

// Re-exported for reducer signatures
pub use smallvec::{smallvec, SmallVec};

/// Reducer module - the shape of all pure decision logic in this crate.
pub mod reducer {
    use smallvec::SmallVec;

    /// A reducer decides how an action changes a state and which effects follow.
    ///
    /// `reduce` mutates `state` into the post-action state and returns effect
    /// descriptions for the shell to persist. It never performs I/O. Rejections are
    /// returned as errors before any mutation happens, so a failed call leaves `state`
    /// untouched.
    pub trait Reducer {
        /// The state this reducer operates on
        type State;

        /// The input processed by this reducer
        type Action;

        /// Read-only context the reducer needs (display names, lookups)
        type Environment;

        /// Effect descriptions produced for the shell
        type Effect;

        /// Rejection type
        type Error;

        /// Reduce an action into state changes and effects.
        ///
        /// # Errors
        ///
        /// Returns an error when the action is not permitted or invalid for `state`.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> Result<SmallVec<[Self::Effect; 4]>, Self::Error>;
    }
}
