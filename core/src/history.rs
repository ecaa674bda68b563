//! Audit trail of booking lifecycle actions.
//!
//! Every committed write (creation, status change, reschedule) leaves one
//! [`HistoryEntry`]. Stores derive the entry from the write description they are given
//! and persist it in the same atomic operation, so the trail never disagrees with the
//! booking row.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::lifecycle::{Actor, BookingStatus};
use crate::ports::{RescheduleUpdate, StatusUpdate};
use crate::types::{Booking, BookingId, TimeRange};

/// What happened to the booking.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    /// Booking requested
    Created,
    /// Provider accepted
    Confirmed,
    /// Called off
    Cancelled,
    /// Service delivered
    Completed,
    /// Client did not show up
    NoShow,
    /// Moved to another interval
    Rescheduled,
}

impl HistoryAction {
    /// Every action
    pub const ALL: [Self; 6] = [
        Self::Created,
        Self::Confirmed,
        Self::Cancelled,
        Self::Completed,
        Self::NoShow,
        Self::Rescheduled,
    ];

    /// The action recorded for a change into `status`
    #[must_use]
    pub const fn entering(status: BookingStatus) -> Self {
        match status {
            BookingStatus::Pending => Self::Created,
            BookingStatus::Confirmed => Self::Confirmed,
            BookingStatus::Cancelled => Self::Cancelled,
            BookingStatus::Completed => Self::Completed,
            BookingStatus::NoShow => Self::NoShow,
        }
    }

    /// Stable storage code
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
            Self::NoShow => "no_show",
            Self::Rescheduled => "rescheduled",
        }
    }

    /// Parses a storage code produced by [`HistoryAction::as_str`].
    #[must_use]
    pub fn parse(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|action| action.as_str() == code)
    }
}

impl fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded lifecycle action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Booking acted on
    pub booking_id: BookingId,
    /// What happened
    pub action: HistoryAction,
    /// Who did it
    pub actor: Actor,
    /// Status before the action; `None` on creation
    pub previous_status: Option<BookingStatus>,
    /// Status after the action
    pub new_status: BookingStatus,
    /// Date before a reschedule
    pub previous_date: Option<NaiveDate>,
    /// Interval before a reschedule
    pub previous_time: Option<TimeRange>,
    /// Cancellation reason
    pub reason: Option<String>,
    /// Free-text notes (e.g. from a completion)
    pub notes: Option<String>,
    /// When the action was committed
    pub at: DateTime<Utc>,
}

impl HistoryEntry {
    /// Creation of `booking`; requests are placed by the client.
    #[must_use]
    pub fn created(booking: &Booking) -> Self {
        Self {
            booking_id: booking.id,
            action: HistoryAction::Created,
            actor: Actor::Client(booking.client_id),
            previous_status: None,
            new_status: booking.status,
            previous_date: None,
            previous_time: None,
            reason: None,
            notes: None,
            at: booking.created_at,
        }
    }

    /// A committed status write.
    #[must_use]
    pub fn status_change(booking_id: BookingId, update: &StatusUpdate) -> Self {
        Self {
            booking_id,
            action: HistoryAction::entering(update.target),
            actor: update.actor,
            previous_status: Some(update.expected),
            new_status: update.target,
            previous_date: None,
            previous_time: None,
            reason: update.cancellation_reason.clone(),
            notes: update.notes.clone(),
            at: update.at,
        }
    }

    /// A committed move of `before` to the interval in `update`.
    #[must_use]
    pub fn rescheduled(before: &Booking, update: &RescheduleUpdate) -> Self {
        Self {
            booking_id: before.id,
            action: HistoryAction::Rescheduled,
            actor: update.actor,
            previous_status: Some(before.status),
            new_status: before.status,
            previous_date: Some(before.date),
            previous_time: Some(before.time),
            reason: None,
            notes: None,
            at: update.at,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::lifecycle::Transition;
    use crate::types::{ClientId, Money, NewBooking, ProviderId, ServiceId, TimeOfDay};
    use std::collections::BTreeSet;

    fn booking() -> Booking {
        let request = NewBooking {
            provider_id: ProviderId::new(),
            client_id: ClientId::new(),
            service_ids: BTreeSet::from([ServiceId::new()]),
            date: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            time_start: TimeOfDay::from_hm(10, 0).unwrap(),
            time_end: TimeOfDay::from_hm(11, 0).unwrap(),
            total_price: Money::from_cents(3000),
        };
        Booking::pending(BookingId::new(), request, Utc::now()).unwrap()
    }

    #[test]
    fn test_action_codes_round_trip() {
        for action in HistoryAction::ALL {
            assert_eq!(HistoryAction::parse(action.as_str()), Some(action));
        }
        assert_eq!(HistoryAction::parse("updated"), None);
    }

    #[test]
    fn test_created_entry_names_the_client() {
        let booking = booking();
        let entry = HistoryEntry::created(&booking);

        assert_eq!(entry.actor, Actor::Client(booking.client_id));
        assert_eq!(entry.previous_status, None);
        assert_eq!(entry.new_status, BookingStatus::Pending);
        assert_eq!(entry.at, booking.created_at);
    }

    #[test]
    fn test_status_change_carries_reason_and_actor() {
        let booking = booking();
        let actor = Actor::Provider(booking.provider_id);
        let update = StatusUpdate::from_transition(
            &Transition {
                booking_id: booking.id,
                from: BookingStatus::Pending,
                to: BookingStatus::Cancelled,
            },
            actor,
            Utc::now(),
        )
        .with_reason("sick");

        let entry = HistoryEntry::status_change(booking.id, &update);
        assert_eq!(entry.action, HistoryAction::Cancelled);
        assert_eq!(entry.actor, actor);
        assert_eq!(entry.previous_status, Some(BookingStatus::Pending));
        assert_eq!(entry.reason.as_deref(), Some("sick"));
    }

    #[test]
    fn test_reschedule_entry_keeps_the_old_interval() {
        let booking = booking();
        let update = RescheduleUpdate {
            expected: booking.status,
            date: booking.date,
            time: TimeRange::starting_at(TimeOfDay::from_hm(14, 0).unwrap(), 60).unwrap(),
            actor: Actor::System,
            at: Utc::now(),
        };

        let entry = HistoryEntry::rescheduled(&booking, &update);
        assert_eq!(entry.action, HistoryAction::Rescheduled);
        assert_eq!(entry.previous_time, Some(booking.time));
        assert_eq!(entry.previous_date, Some(booking.date));
    }
}
