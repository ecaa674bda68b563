//! Ports: the collaborators the booking engine depends on.
//!
//! Each port is a dyn-compatible trait injected as `Arc<dyn Port>`. Methods return
//! `Pin<Box<dyn Future>>` rather than `async fn` so the traits stay object safe.
//!
//! | Port | Direction | Implementations |
//! |------|-----------|-----------------|
//! | [`ScheduleSource`] | read | `InMemoryScheduleSource` (testing) |
//! | [`BookingStore`] | read/write | `InMemoryBookingStore` (testing), `PostgresBookingStore` |
//! | [`ProviderDirectory`] | read | `StaticProviderDirectory` (testing) |
//! | [`NotificationDispatcher`] | event sink | `RecordingNotifier`, `LoggingNotifier` |
//! | [`RatingRecalculator`] | event sink | `RecordingRatingRecalculator` |

use chrono::{DateTime, NaiveDate, Utc};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

use crate::event::BookingEvent;
use crate::history::HistoryEntry;
use crate::lifecycle::{Actor, BookingStatus, TimestampField, Transition};
use crate::types::{Booking, BookingId, ProviderId, TimeRange, WorkingWindow};

/// Boxed future returned by port methods.
pub type PortFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

// ============================================================================
// Errors
// ============================================================================

/// Errors raised by a [`BookingStore`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A booking with this id already exists
    #[error("Booking {0} already exists")]
    DuplicateId(BookingId),

    /// The write would overlap an active booking of the same provider and date
    #[error("Booking would overlap an active booking of provider {provider_id} on {date}")]
    Overlap {
        /// Provider
        provider_id: ProviderId,
        /// Date
        date: NaiveDate,
    },

    /// Compare-and-set failed: the stored status is not the expected one
    #[error("Booking {id} is {actual}, expected {expected}")]
    StaleStatus {
        /// Booking
        id: BookingId,
        /// Status the caller read
        expected: BookingStatus,
        /// Status actually stored
        actual: BookingStatus,
    },

    /// Unknown booking
    #[error("Booking {0} not found")]
    NotFound(BookingId),

    /// Backend unreachable or failed
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// A stored row could not be decoded
    #[error("Stored booking is invalid: {0}")]
    Corrupt(String),
}

/// Errors raised by read-only and event-consuming collaborators.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    /// Collaborator unreachable
    #[error("{collaborator} unavailable: {reason}")]
    Unavailable {
        /// Which collaborator
        collaborator: &'static str,
        /// Why
        reason: String,
    },

    /// Collaborator refused the request
    #[error("{collaborator} rejected the request: {reason}")]
    Rejected {
        /// Which collaborator
        collaborator: &'static str,
        /// Why
        reason: String,
    },
}

// ============================================================================
// Write descriptions
// ============================================================================

/// A compare-and-set status write.
///
/// The store applies it only if the booking is still in `expected`; the timestamp
/// column for `target` (see [`BookingStatus::timestamp_field`]) and the matching
/// [`HistoryEntry::status_change`] are written in the same atomic operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusUpdate {
    /// Status the caller validated against
    pub expected: BookingStatus,
    /// New status
    pub target: BookingStatus,
    /// Who requested the change
    pub actor: Actor,
    /// Value for the target's timestamp column
    pub at: DateTime<Utc>,
    /// Stored only for `Cancelled`
    pub cancellation_reason: Option<String>,
    /// Recorded in the history only
    pub notes: Option<String>,
}

impl StatusUpdate {
    /// Builds the write for an approved transition
    #[must_use]
    pub const fn from_transition(transition: &Transition, actor: Actor, at: DateTime<Utc>) -> Self {
        Self {
            expected: transition.from,
            target: transition.to,
            actor,
            at,
            cancellation_reason: None,
            notes: None,
        }
    }

    /// Attaches a cancellation reason
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.cancellation_reason = Some(reason.into());
        self
    }

    /// Attaches history notes
    #[must_use]
    pub fn with_notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes;
        self
    }

    /// Timestamp column written with this update
    #[must_use]
    pub const fn timestamp_field(&self) -> Option<TimestampField> {
        self.target.timestamp_field()
    }
}

/// A compare-and-set move of a booking to a new interval.
///
/// Stored together with a [`HistoryEntry::rescheduled`] describing the old interval.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RescheduleUpdate {
    /// Status the caller validated against
    pub expected: BookingStatus,
    /// New date
    pub date: NaiveDate,
    /// New interval
    pub time: TimeRange,
    /// Who requested the move
    pub actor: Actor,
    /// When the move was requested
    pub at: DateTime<Utc>,
}

// ============================================================================
// Ports
// ============================================================================

/// Read-only provider working hours.
pub trait ScheduleSource: Send + Sync {
    /// Working windows of `provider_id` on `date`; empty for a day off.
    ///
    /// Windows are expected to be disjoint; callers normalise them regardless.
    fn working_windows(
        &self,
        provider_id: ProviderId,
        date: NaiveDate,
    ) -> PortFuture<'_, Vec<WorkingWindow>, CollaboratorError>;
}

/// Booking persistence.
///
/// # Atomicity
///
/// - [`insert`](BookingStore::insert) rejects, atomically, a booking overlapping an
///   active booking of the same provider and date ([`StoreError::Overlap`]).
/// - [`update_status`](BookingStore::update_status) and
///   [`reschedule`](BookingStore::reschedule) are compare-and-set on the expected status
///   ([`StoreError::StaleStatus`]).
///
/// Together these keep the overlap invariant even when two processes race past the
/// service's in-process lock. Each successful write also appends its [`HistoryEntry`]
/// in the same atomic operation.
pub trait BookingStore: Send + Sync {
    /// Loads a booking by id
    fn find_by_id(&self, id: BookingId) -> PortFuture<'_, Option<Booking>, StoreError>;

    /// Pending and confirmed bookings of a provider on a date, ordered by start.
    fn find_non_terminal_for_provider_date(
        &self,
        provider_id: ProviderId,
        date: NaiveDate,
    ) -> PortFuture<'_, Vec<Booking>, StoreError>;

    /// Persists a new booking.
    fn insert(&self, booking: Booking) -> PortFuture<'_, (), StoreError>;

    /// Writes a status change and its timestamp; returns the updated booking.
    fn update_status(
        &self,
        id: BookingId,
        update: StatusUpdate,
    ) -> PortFuture<'_, Booking, StoreError>;

    /// Moves a booking to a new date/interval and bumps its reschedule count.
    fn reschedule(
        &self,
        id: BookingId,
        update: RescheduleUpdate,
    ) -> PortFuture<'_, Booking, StoreError>;

    /// Recorded actions of a booking, oldest first; empty for an unknown id.
    fn history(&self, id: BookingId) -> PortFuture<'_, Vec<HistoryEntry>, StoreError>;
}

/// Provider account status.
pub trait ProviderDirectory: Send + Sync {
    /// Whether the provider currently accepts bookings
    fn is_active(&self, provider_id: ProviderId) -> PortFuture<'_, bool, CollaboratorError>;
}

/// Delivers booking notifications (e-mail, push, messenger...).
pub trait NotificationDispatcher: Send + Sync {
    /// Sends whatever notifications `event` warrants
    fn send_booking_notifications(
        &self,
        event: BookingEvent,
    ) -> PortFuture<'_, (), CollaboratorError>;
}

/// Recomputes a provider's rating after a completed booking.
pub trait RatingRecalculator: Send + Sync {
    /// Recalculates the rating of `provider_id`
    fn recalculate(&self, provider_id: ProviderId) -> PortFuture<'_, (), CollaboratorError>;
}
