//! Request context passed explicitly through every service call.

use crate::access::Authority;
use crate::capabilities::Capabilities;
use crate::ids::UserId;
use crate::types::{TicketSnapshot, UserProfile};
use uuid::Uuid;

/// Who is acting, with what authority, under which correlation id.
#[derive(Clone, Debug)]
pub struct RequestContext {
    /// Acting user
    pub user: UserProfile,
    /// Flattened capabilities of the acting user
    pub capabilities: Capabilities,
    /// Correlation id of the inbound request
    pub correlation_id: Uuid,
}

impl RequestContext {
    /// Create a context.
    #[must_use]
    pub const fn new(user: UserProfile, capabilities: Capabilities, correlation_id: Uuid) -> Self {
        Self {
            user,
            capabilities,
            correlation_id,
        }
    }

    /// Acting user id.
    #[must_use]
    pub const fn user_id(&self) -> UserId {
        self.user.id
    }

    /// Authority of the acting user over `snapshot`.
    #[must_use]
    pub fn authority(&self, snapshot: &TicketSnapshot) -> Authority {
        Authority::resolve(&self.capabilities, snapshot)
    }
}
