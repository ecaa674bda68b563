//! Builders for common test values.
//!
//! Dates are chosen relative to [`test_clock`](crate::test_clock) (2025-01-01 00:00 UTC):
//! [`test_date`] is the following day, so fixtures start in the future by default.

#![allow(clippy::unwrap_used)] // Fixtures are built from hardcoded valid values
#![allow(clippy::missing_panics_doc)]

use booking_engine_core::{
    Booking, BookingId, BookingStatus, ClientId, Money, NaiveDate, NewBooking, ProviderId, ServiceId,
    TimeOfDay, TimeRange, Utc,
};
use std::collections::BTreeSet;

/// `hour:minute`
#[must_use]
pub fn hm(hour: u16, minute: u16) -> TimeOfDay {
    TimeOfDay::from_hm(hour, minute).unwrap()
}

/// `[start, end)`
#[must_use]
pub fn range(start: TimeOfDay, end: TimeOfDay) -> TimeRange {
    TimeRange::new(start, end).unwrap()
}

/// 2025-01-02, the day after the test clock
#[must_use]
pub fn test_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 2).unwrap()
}

/// A booking request for one service at 50.00
#[must_use]
pub fn new_booking(
    provider_id: ProviderId,
    client_id: ClientId,
    date: NaiveDate,
    start: TimeOfDay,
    end: TimeOfDay,
) -> NewBooking {
    NewBooking {
        provider_id,
        client_id,
        service_ids: BTreeSet::from([ServiceId::new()]),
        date,
        time_start: start,
        time_end: end,
        total_price: Money::from_cents(5_000),
    }
}

/// A pending booking on [`test_date`] for fresh provider and client ids
#[must_use]
pub fn booking_at(start: TimeOfDay, end: TimeOfDay) -> Booking {
    let request = new_booking(ProviderId::new(), ClientId::new(), test_date(), start, end);
    Booking::pending(BookingId::new(), request, Utc::now()).unwrap()
}

/// The same booking moved into `status`, with its timestamp set
#[must_use]
pub fn with_status(mut booking: Booking, status: BookingStatus) -> Booking {
    if status == BookingStatus::Cancelled {
        booking.apply_status(status, Utc::now(), Some("fixture".into()));
    } else {
        booking.apply_status(status, Utc::now(), None);
    }
    booking
}
