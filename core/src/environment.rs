//! Injected dependencies of the pure core.

use chrono::{DateTime, SubsecRound, Utc};

/// Clock trait - abstracts time operations for testability.
///
/// Timestamps are truncated to microseconds, the precision Postgres stores, so
/// message ordering keys read back identical to the ones that were written.
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now().trunc_subsecs(6)
    }
}
