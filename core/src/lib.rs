//! # Booking Engine Core
//!
//! Domain types and pure logic for the booking scheduling and lifecycle engine.
//!
//! This crate has no I/O. It provides:
//!
//! - **Value objects**: [`TimeOfDay`](types::TimeOfDay), [`TimeRange`](types::TimeRange),
//!   [`WorkingWindow`](types::WorkingWindow), [`Slot`](types::Slot), [`Money`](types::Money)
//! - **Aggregate**: [`Booking`](types::Booking)
//! - **Lifecycle**: [`BookingStatus`](lifecycle::BookingStatus) and the guarded
//!   [`BookingStateMachine`](lifecycle::BookingStateMachine)
//! - **Slot calculation**: [`compute_slots`](slots::compute_slots)
//! - **Ports**: the traits the orchestrating service talks to ([`ports`])
//! - **Events**: typed lifecycle events handed to collaborators ([`event`])
//! - **History**: the per-booking audit trail stores keep with every write ([`history`])
//! - **Errors**: the [`BookingError`](error::BookingError) taxonomy
//!
//! ## Data flow
//!
//! ```text
//! ScheduleSource ──┐
//!                  ├──► compute_slots ──► Vec<Slot>
//! BookingStore ────┘
//!
//! command ──► BookingStateMachine::guarded_transition ──► BookingStore::update_status
//!                                                              │
//!                                                              ▼
//!                                                        BookingEvent
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, NaiveDate, Utc};

pub mod error;
pub mod event;
pub mod history;
pub mod lifecycle;
pub mod ports;
pub mod slots;
pub mod types;

/// Environment module - time abstraction
///
/// All "now" comparisons in the engine go through [`Clock`](environment::Clock) so that
/// past-time and completion guards can be tested deterministically.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use booking_engine_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let before = clock.now();
    /// assert!(clock.now() >= before);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

pub use error::{BookingError, ErrorKind};
pub use event::{BookingEvent, BookingEventKind};
pub use history::{HistoryAction, HistoryEntry};
pub use lifecycle::{Actor, BookingStateMachine, BookingStatus, Transition, TransitionError};
pub use ports::{
    BookingStore, CollaboratorError, NotificationDispatcher, ProviderDirectory, RatingRecalculator,
    RescheduleUpdate, ScheduleSource, StatusUpdate, StoreError,
};
pub use slots::{
    SlotRequest, compute_slots, free_intervals, normalize_windows, retain_starting_from,
};
pub use types::{
    AdminId, Booking, BookingId, ClientId, Money, NewBooking, ProviderDay, ProviderId, ServiceId, Slot,
    TimeOfDay, TimeRange, WorkingWindow,
};
