//! # Booking Engine Testing
//!
//! Testing utilities for the booking engine.
//!
//! This crate provides:
//! - A settable [`FixedClock`]
//! - In-memory implementations of every port ([`InMemoryBookingStore`],
//!   [`InMemoryScheduleSource`], [`StaticProviderDirectory`])
//! - Recording and failing event consumers
//! - Fixtures and proptest strategies for domain values
//! - [`BookingHarness`]: a service wired to all of the above
//!
//! ## Example
//!
//! ```ignore
//! use booking_engine_testing::{BookingHarness, fixtures::{hm, test_date}};
//!
//! #[tokio::test]
//! async fn test_double_booking_is_rejected() {
//!     let harness = BookingHarness::new();
//!     harness.book(test_date(), hm(10, 0), hm(11, 0)).await.unwrap();
//!
//!     let second = harness.book(test_date(), hm(10, 30), hm(11, 30)).await;
//!     assert!(matches!(second, Err(BookingError::SlotConflict { .. })));
//! }
//! ```

use booking_engine_core::environment::Clock;
use chrono::{DateTime, Utc};

pub mod collaborators;
pub mod fixtures;
pub mod harness;
pub mod store;

/// Mock implementations of Environment traits.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::{Arc, PoisonError, RwLock};

    /// Deterministic clock for tests.
    ///
    /// Returns the same time until moved with [`set`](Self::set) or
    /// [`advance`](Self::advance). Clones share the reading.
    ///
    /// # Example
    ///
    /// ```
    /// use booking_engine_testing::mocks::FixedClock;
    /// use booking_engine_core::environment::Clock;
    /// use chrono::{Duration, Utc};
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// assert_eq!(clock.now(), time1);
    ///
    /// clock.advance(Duration::hours(1));
    /// assert_eq!(clock.now() - time1, Duration::hours(1));
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: Arc<RwLock<DateTime<Utc>>>,
    }

    impl FixedClock {
        /// Create a clock reading `time`
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(RwLock::new(time)),
            }
        }

        /// Jump to `time`
        pub fn set(&self, time: DateTime<Utc>) {
            *self.time.write().unwrap_or_else(PoisonError::into_inner) = time;
        }

        /// Move forward by `by`
        pub fn advance(&self, by: chrono::Duration) {
            *self.time.write().unwrap_or_else(PoisonError::into_inner) += by;
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.read().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Property-based testing strategies for domain values.
pub mod properties {
    use booking_engine_core::{TimeOfDay, TimeRange};
    use proptest::prelude::*;

    /// A non-empty range of at most `max_len` minutes, aligned to `grain` minutes
    pub fn arb_time_range(grain: u16, max_len: u16) -> impl Strategy<Value = TimeRange> {
        let grain = grain.max(1);
        let slots = 1440 / grain;
        (0..slots, 1..=(max_len / grain).max(1)).prop_filter_map("range past midnight", move |(start, len)| {
            let start = TimeOfDay::from_minutes(start * grain)?;
            let end = TimeOfDay::from_minutes(start.minutes().checked_add(len * grain)?)?;
            TimeRange::new(start, end).ok()
        })
    }
}

/// Installs a test-friendly `tracing` subscriber once per process.
///
/// Honors `RUST_LOG`; defaults to `booking_engine=debug`. Later calls are no-ops.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("booking_engine=debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use collaborators::{
    FailingNotifier, FailingRatingRecalculator, InMemoryScheduleSource, RecordingNotifier,
    RecordingRatingRecalculator, StaticProviderDirectory,
};
pub use harness::BookingHarness;
pub use mocks::{FixedClock, test_clock};
pub use store::InMemoryBookingStore;
