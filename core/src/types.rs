//! Domain types for the booking engine.
//!
//! Value objects ([`TimeOfDay`], [`TimeRange`], [`WorkingWindow`], [`Slot`], [`Money`]),
//! identifiers, and the [`Booking`] aggregate. Everything here is plain data plus pure
//! invariant checks; persistence and orchestration live behind the [`ports`](crate::ports).

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::error::BookingError;
use crate::lifecycle::BookingStatus;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Creates a new random `", stringify!($name), "`")]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[doc = concat!("Create a `", stringify!($name), "` from a `Uuid`")]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_identifier!(
    /// Unique identifier for a booking
    BookingId
);
uuid_identifier!(
    /// Unique identifier for a service provider ("master")
    ProviderId
);
uuid_identifier!(
    /// Unique identifier for a client
    ClientId
);
uuid_identifier!(
    /// Unique identifier for a bookable service
    ServiceId
);
uuid_identifier!(
    /// Unique identifier for an administrator account
    AdminId
);

// ============================================================================
// Time of day
// ============================================================================

/// Number of minutes in a calendar day.
pub const MINUTES_PER_DAY: u16 = 1440;

/// A minute of day is outside `0..=1440`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Minute of day {0} is outside 0..=1440")]
pub struct InvalidTimeOfDay(pub u32);

/// Wall-clock time on a provider's calendar, at minute resolution.
///
/// Stored as minutes since midnight in `0..=1440`; `24:00` is representable so a
/// working window may run until the end of the day. Times are provider-local and
/// already normalized by the collaborator that produced them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct TimeOfDay(u16);

impl TimeOfDay {
    /// `00:00`
    pub const MIDNIGHT: Self = Self(0);

    /// `24:00`, the exclusive end of a day
    pub const END_OF_DAY: Self = Self(MINUTES_PER_DAY);

    /// Creates a time from minutes since midnight.
    #[must_use]
    pub const fn from_minutes(minutes: u16) -> Option<Self> {
        if minutes <= MINUTES_PER_DAY {
            Some(Self(minutes))
        } else {
            None
        }
    }

    /// Creates a time from hours and minutes (`from_hm(24, 0)` is the end of day).
    #[must_use]
    pub const fn from_hm(hour: u16, minute: u16) -> Option<Self> {
        if minute >= 60 {
            return None;
        }
        match hour.checked_mul(60) {
            Some(hours) => match hours.checked_add(minute) {
                Some(total) => Self::from_minutes(total),
                None => None,
            },
            None => None,
        }
    }

    /// Minutes since midnight
    #[must_use]
    pub const fn minutes(self) -> u16 {
        self.0
    }

    /// Hour component (`24` only for [`TimeOfDay::END_OF_DAY`])
    #[must_use]
    pub const fn hour(self) -> u16 {
        self.0 / 60
    }

    /// Minute component
    #[must_use]
    pub const fn minute(self) -> u16 {
        self.0 % 60
    }

    /// Adds minutes, returning `None` past the end of the day.
    #[must_use]
    pub fn checked_add_minutes(self, minutes: u32) -> Option<Self> {
        let total = u32::from(self.0).checked_add(minutes)?;
        u16::try_from(total).ok().and_then(Self::from_minutes)
    }

    /// Converts to a `NaiveTime`; `None` for `24:00`.
    #[must_use]
    pub fn to_naive_time(self) -> Option<NaiveTime> {
        NaiveTime::from_hms_opt(u32::from(self.hour()), u32::from(self.minute()), 0)
    }

    /// The moment this time falls on `date` (`24:00` maps to the next midnight).
    #[must_use]
    pub fn on(self, date: NaiveDate) -> NaiveDateTime {
        date.and_time(NaiveTime::MIN) + Duration::minutes(i64::from(self.0))
    }
}

impl From<NaiveTime> for TimeOfDay {
    fn from(time: NaiveTime) -> Self {
        // hour() < 24, so the product always fits
        let minutes = time.hour() * 60 + time.minute();
        Self(u16::try_from(minutes).unwrap_or(MINUTES_PER_DAY - 1))
    }
}

impl TryFrom<u16> for TimeOfDay {
    type Error = InvalidTimeOfDay;

    fn try_from(minutes: u16) -> Result<Self, Self::Error> {
        Self::from_minutes(minutes).ok_or(InvalidTimeOfDay(u32::from(minutes)))
    }
}

impl From<TimeOfDay> for u16 {
    fn from(time: TimeOfDay) -> Self {
        time.0
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

// ============================================================================
// Time range
// ============================================================================

/// A time range whose end is not after its start.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Time range end {end} must be after start {start}")]
pub struct InvalidTimeRange {
    /// Offending start
    pub start: TimeOfDay,
    /// Offending end
    pub end: TimeOfDay,
}

/// Half-open interval `[start, end)` within one day, with `end > start`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "TimeRangeParts", into = "TimeRangeParts")]
pub struct TimeRange {
    start: TimeOfDay,
    end: TimeOfDay,
}

#[derive(Clone, Copy, Serialize, Deserialize)]
struct TimeRangeParts {
    start: TimeOfDay,
    end: TimeOfDay,
}

impl TryFrom<TimeRangeParts> for TimeRange {
    type Error = InvalidTimeRange;

    fn try_from(parts: TimeRangeParts) -> Result<Self, Self::Error> {
        Self::new(parts.start, parts.end)
    }
}

impl From<TimeRange> for TimeRangeParts {
    fn from(range: TimeRange) -> Self {
        Self {
            start: range.start,
            end: range.end,
        }
    }
}

impl TimeRange {
    /// Creates a range.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTimeRange`] unless `end > start`.
    pub const fn new(start: TimeOfDay, end: TimeOfDay) -> Result<Self, InvalidTimeRange> {
        if end.0 > start.0 {
            Ok(Self { start, end })
        } else {
            Err(InvalidTimeRange { start, end })
        }
    }

    /// Creates a range of `duration_minutes` starting at `start`.
    ///
    /// Returns `None` for a zero duration or when the range would run past `24:00`.
    #[must_use]
    pub fn starting_at(start: TimeOfDay, duration_minutes: u32) -> Option<Self> {
        let end = start.checked_add_minutes(duration_minutes)?;
        Self::new(start, end).ok()
    }

    /// Inclusive start
    #[must_use]
    pub const fn start(&self) -> TimeOfDay {
        self.start
    }

    /// Exclusive end
    #[must_use]
    pub const fn end(&self) -> TimeOfDay {
        self.end
    }

    /// Length in minutes (always positive)
    #[must_use]
    pub const fn duration_minutes(&self) -> u32 {
        (self.end.0 - self.start.0) as u32
    }

    /// Whether the two half-open ranges share at least one minute.
    ///
    /// Abutting ranges (`10:00-11:00` and `11:00-12:00`) do not overlap.
    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        self.start.0 < other.end.0 && other.start.0 < self.end.0
    }

    /// Whether `other` lies entirely within `self`.
    #[must_use]
    pub const fn contains(&self, other: &Self) -> bool {
        self.start.0 <= other.start.0 && other.end.0 <= self.end.0
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

// ============================================================================
// Schedule values
// ============================================================================

/// A contiguous interval on a date during which a provider accepts bookings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingWindow {
    /// Calendar date (provider-local)
    pub date: NaiveDate,
    /// Open interval
    pub range: TimeRange,
}

impl WorkingWindow {
    /// Creates a working window
    #[must_use]
    pub const fn new(date: NaiveDate, range: TimeRange) -> Self {
        Self { date, range }
    }
}

/// A computed, not yet reserved candidate interval.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slot {
    /// Slot start
    pub start: TimeOfDay,
    /// Slot end (exclusive)
    pub end: TimeOfDay,
    /// `end - start` in minutes
    pub duration_minutes: u32,
}

impl Slot {
    /// Creates a slot covering `range`
    #[must_use]
    pub const fn from_range(range: TimeRange) -> Self {
        Self {
            start: range.start,
            end: range.end,
            duration_minutes: range.duration_minutes(),
        }
    }

    /// The slot as a time range
    #[must_use]
    pub const fn range(&self) -> TimeRange {
        TimeRange {
            start: self.start,
            end: self.end,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// The `(provider, date)` pair that scopes locks, cache entries and the overlap invariant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProviderDay {
    /// Provider
    pub provider_id: ProviderId,
    /// Calendar date
    pub date: NaiveDate,
}

impl ProviderDay {
    /// Creates a provider day
    #[must_use]
    pub const fn new(provider_id: ProviderId, date: NaiveDate) -> Self {
        Self { provider_id, date }
    }

    /// The provider day a booking currently occupies
    #[must_use]
    pub const fn of(booking: &Booking) -> Self {
        Self {
            provider_id: booking.provider_id,
            date: booking.date,
        }
    }
}

impl fmt::Display for ProviderDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.provider_id, self.date)
    }
}

// ============================================================================
// Money
// ============================================================================

/// Amount in minor currency units; non-negative by construction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(u64);

impl Money {
    /// Creates a `Money` value from minor units
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Returns the amount in minor units
    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

// ============================================================================
// Booking aggregate
// ============================================================================

/// Input for a new booking, as received from the client.
///
/// `time_end - time_start` is expected to equal the summed duration of `service_ids`;
/// that figure comes from the service catalogue and is trusted here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBooking {
    /// Provider being booked
    pub provider_id: ProviderId,
    /// Client making the request
    pub client_id: ClientId,
    /// Services requested (must be non-empty)
    pub service_ids: BTreeSet<ServiceId>,
    /// Calendar date
    pub date: NaiveDate,
    /// Start time
    pub time_start: TimeOfDay,
    /// End time (exclusive)
    pub time_end: TimeOfDay,
    /// Total price
    pub total_price: Money,
}

impl NewBooking {
    /// The requested interval.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Validation`] if `time_end <= time_start`.
    pub fn time_range(&self) -> Result<TimeRange, BookingError> {
        Ok(TimeRange::new(self.time_start, self.time_end)?)
    }

    /// The provider day this request targets
    #[must_use]
    pub const fn provider_day(&self) -> ProviderDay {
        ProviderDay::new(self.provider_id, self.date)
    }
}

/// A reserved appointment and its lifecycle state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    /// Unique booking identifier
    pub id: BookingId,
    /// Provider performing the service
    pub provider_id: ProviderId,
    /// Client who booked
    pub client_id: ClientId,
    /// Booked services (non-empty)
    pub service_ids: BTreeSet<ServiceId>,
    /// Calendar date (provider-local)
    pub date: NaiveDate,
    /// Reserved interval
    pub time: TimeRange,
    /// Total price
    pub total_price: Money,
    /// Current lifecycle status
    pub status: BookingStatus,
    /// Present only when `status` is `Cancelled`
    pub cancellation_reason: Option<String>,
    /// When the provider confirmed
    pub confirmed_at: Option<DateTime<Utc>>,
    /// When the booking was completed
    pub completed_at: Option<DateTime<Utc>>,
    /// When the booking was cancelled
    pub cancelled_at: Option<DateTime<Utc>>,
    /// When the client was marked as a no-show
    pub no_show_at: Option<DateTime<Utc>>,
    /// How many times the booking has been moved
    pub reschedule_count: u32,
    /// When the booking was created
    pub created_at: DateTime<Utc>,
}

impl Booking {
    /// Builds a `Pending` booking from a request.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Validation`] if no services are given or the
    /// interval is empty or inverted.
    pub fn pending(
        id: BookingId,
        request: NewBooking,
        created_at: DateTime<Utc>,
    ) -> Result<Self, BookingError> {
        if request.service_ids.is_empty() {
            return Err(BookingError::validation("At least one service is required"));
        }
        let time = request.time_range()?;

        Ok(Self {
            id,
            provider_id: request.provider_id,
            client_id: request.client_id,
            service_ids: request.service_ids,
            date: request.date,
            time,
            total_price: request.total_price,
            status: BookingStatus::Pending,
            cancellation_reason: None,
            confirmed_at: None,
            completed_at: None,
            cancelled_at: None,
            no_show_at: None,
            reschedule_count: 0,
            created_at,
        })
    }

    /// Start time
    #[must_use]
    pub const fn time_start(&self) -> TimeOfDay {
        self.time.start
    }

    /// End time (exclusive)
    #[must_use]
    pub const fn time_end(&self) -> TimeOfDay {
        self.time.end
    }

    /// Local date-time the appointment starts
    #[must_use]
    pub fn starts_at(&self) -> NaiveDateTime {
        self.time.start.on(self.date)
    }

    /// Local date-time the appointment ends
    #[must_use]
    pub fn ends_at(&self) -> NaiveDateTime {
        self.time.end.on(self.date)
    }

    /// Whether the booking still holds its interval (`Pending` or `Confirmed`)
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Whether this booking blocks `range` on `date` for its provider.
    #[must_use]
    pub fn blocks(&self, date: NaiveDate, range: &TimeRange) -> bool {
        self.is_active() && self.date == date && self.time.overlaps(range)
    }

    /// The timestamp recorded when the booking entered `status`, if any.
    #[must_use]
    pub const fn timestamp_for(&self, status: BookingStatus) -> Option<DateTime<Utc>> {
        match status {
            BookingStatus::Pending => Some(self.created_at),
            BookingStatus::Confirmed => self.confirmed_at,
            BookingStatus::Completed => self.completed_at,
            BookingStatus::Cancelled => self.cancelled_at,
            BookingStatus::NoShow => self.no_show_at,
        }
    }

    /// Writes a status change and its timestamp together.
    ///
    /// Callers validate the transition first; this only records it. The cancellation
    /// reason is kept only for `Cancelled`.
    pub fn apply_status(
        &mut self,
        target: BookingStatus,
        at: DateTime<Utc>,
        cancellation_reason: Option<String>,
    ) {
        self.status = target;
        match target {
            BookingStatus::Pending => {}
            BookingStatus::Confirmed => self.confirmed_at = Some(at),
            BookingStatus::Completed => self.completed_at = Some(at),
            BookingStatus::Cancelled => {
                self.cancelled_at = Some(at);
                self.cancellation_reason = cancellation_reason;
            }
            BookingStatus::NoShow => self.no_show_at = Some(at),
        }
    }

    /// Moves the booking to a new date and interval.
    pub fn apply_reschedule(&mut self, date: NaiveDate, time: TimeRange) {
        self.date = date;
        self.time = time;
        self.reschedule_count += 1;
    }
}
