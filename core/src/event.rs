//! Booking lifecycle events.
//!
//! Emitted after a write commits and handed to collaborators
//! ([`NotificationDispatcher`](crate::ports::NotificationDispatcher),
//! [`RatingRecalculator`](crate::ports::RatingRecalculator)). Events are facts: a
//! collaborator failing to process one never affects the booking.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::lifecycle::Actor;
use crate::types::{Booking, BookingId, ClientId, ProviderId, TimeRange};

/// A booking lifecycle event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingEvent {
    /// Booking concerned
    pub booking_id: BookingId,
    /// Its provider
    pub provider_id: ProviderId,
    /// Its client
    pub client_id: ClientId,
    /// When the change was committed
    pub occurred_at: DateTime<Utc>,
    /// What happened
    pub kind: BookingEventKind,
}

/// What happened to the booking.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BookingEventKind {
    /// A booking was requested
    Created {
        /// Date
        date: NaiveDate,
        /// Interval
        time: TimeRange,
    },
    /// The provider accepted
    Confirmed,
    /// The booking was called off
    Cancelled {
        /// Who cancelled
        cancelled_by: Actor,
        /// Stated reason
        reason: String,
    },
    /// The service was delivered
    Completed {
        /// Who recorded completion
        completed_by: Actor,
        /// Free-form completion notes
        notes: Option<String>,
    },
    /// The client did not show up
    NoShow,
    /// The booking moved to another interval
    Rescheduled {
        /// Previous date
        from_date: NaiveDate,
        /// Previous interval
        from_time: TimeRange,
        /// New date
        to_date: NaiveDate,
        /// New interval
        to_time: TimeRange,
        /// Who moved it
        rescheduled_by: Actor,
    },
}

impl BookingEvent {
    /// Builds an event for `booking`
    #[must_use]
    pub const fn new(booking: &Booking, kind: BookingEventKind, occurred_at: DateTime<Utc>) -> Self {
        Self {
            booking_id: booking.id,
            provider_id: booking.provider_id,
            client_id: booking.client_id,
            occurred_at,
            kind,
        }
    }

    /// Event name, e.g. `BookingConfirmed`
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self.kind {
            BookingEventKind::Created { .. } => "BookingCreated",
            BookingEventKind::Confirmed => "BookingConfirmed",
            BookingEventKind::Cancelled { .. } => "BookingCancelled",
            BookingEventKind::Completed { .. } => "BookingCompleted",
            BookingEventKind::NoShow => "BookingNoShow",
            BookingEventKind::Rescheduled { .. } => "BookingRescheduled",
        }
    }

    /// Whether the provider's rating should be recalculated
    #[must_use]
    pub const fn affects_rating(&self) -> bool {
        matches!(self.kind, BookingEventKind::Completed { .. })
    }
}
