//! # Appeals Testing
//!
//! In-memory adapters and helpers for exercising the appeals service without
//! Postgres, Redis or a push provider.
//!
//! - [`InMemoryStore`]: ticket and message store with row-lock semantics
//! - [`InMemoryDirectory`] / [`InMemoryPermissions`]: identity and role adapters
//! - [`RecordingPushNotifier`] / [`MemoryAttachmentStore`]: outbound collaborators
//! - [`fixtures`]: a small organisation (departments, users, roles, tokens)
//! - [`ReducerTest`]: Given-When-Then harness for reducers
//!
//! ## Example
//!
//! ```ignore
//! use appeals_testing::{fixtures, InMemoryStore};
//!
//! #[tokio::test]
//! async fn test_claim() {
//!     let store = InMemoryStore::new();
//!     let directory = fixtures::directory();
//!     // ...
//! }
//! ```

#![allow(clippy::module_name_repetitions)]

mod directory;
pub mod fixtures;
mod outbound;
pub mod reducer_test;
mod store;

pub use directory::{InMemoryDirectory, InMemoryPermissions};
pub use outbound::{MemoryAttachmentStore, RecordingPushNotifier};
pub use reducer_test::ReducerTest;
pub use store::InMemoryStore;

/// Mock implementations of environment traits.
pub mod mocks {
    use appeals_core::environment::Clock;
    use chrono::{DateTime, Duration, Utc};
    use std::sync::{Arc, Mutex, PoisonError};

    /// Deterministic clock for tests.
    ///
    /// A plain fixed clock always returns the same instant. A stepping clock
    /// returns its current instant and then advances by `step`, so consecutive
    /// writes get strictly increasing timestamps.
    ///
    /// # Example
    ///
    /// ```
    /// use appeals_testing::mocks::FixedClock;
    /// use appeals_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: Arc<Mutex<DateTime<Utc>>>,
        step: Duration,
    }

    impl FixedClock {
        /// Create a clock frozen at `time`.
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self::stepping(time, Duration::zero())
        }

        /// Create a clock that advances by `step` after every reading.
        #[must_use]
        pub fn stepping(time: DateTime<Utc>, step: Duration) -> Self {
            Self {
                time: Arc::new(Mutex::new(time)),
                step,
            }
        }

        /// Move the clock forward.
        pub fn advance(&self, by: Duration) {
            let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            *time += by;
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            let now = *time;
            *time += self.step;
            now
        }
    }

    /// Default fixed clock for tests (2025-01-01 00:00:00 UTC).
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(epoch())
    }

    /// Clock starting at 2025-01-01 that ticks one second per reading.
    #[must_use]
    pub fn ticking_clock() -> FixedClock {
        FixedClock::stepping(epoch(), Duration::seconds(1))
    }

    fn epoch() -> DateTime<Utc> {
        DateTime::from_timestamp(1_735_689_600, 0).unwrap_or_default()
    }
}

pub use mocks::{test_clock, ticking_clock, FixedClock};

/// Install a test-friendly tracing subscriber once per process.
///
/// Honors `RUST_LOG`; output goes through the test harness writer so it is
/// only shown for failing tests.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
