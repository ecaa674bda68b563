//! Error taxonomy for booking operations.
//!
//! Every expected business failure is a [`BookingError`] value returned through
//! `Result`; callers branch on [`BookingError::kind`]. Only
//! [`BookingError::LockTimeout`] is transient.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::lifecycle::{Actor, BookingStatus, TransitionError};
use crate::ports::{CollaboratorError, StoreError};
use crate::types::{BookingId, InvalidTimeRange, ProviderId, TimeOfDay, TimeRange};

/// Stable, machine-readable failure category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed input
    Validation,
    /// Requested start is not in the future
    PastTime,
    /// Provider is not accepting bookings
    ProviderUnavailable,
    /// Requested interval overlaps an active booking
    SlotConflict,
    /// Unknown booking
    NotFound,
    /// Actor not permitted
    Unauthorized,
    /// Status graph violation
    InvalidTransition,
    /// Lock not acquired in time (retryable)
    LockTimeout,
    /// Infrastructure failure behind a port
    Storage,
}

impl ErrorKind {
    /// Stable code
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::PastTime => "past_time",
            Self::ProviderUnavailable => "provider_unavailable",
            Self::SlotConflict => "slot_conflict",
            Self::NotFound => "not_found",
            Self::Unauthorized => "unauthorized",
            Self::InvalidTransition => "invalid_transition",
            Self::LockTimeout => "lock_timeout",
            Self::Storage => "storage",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a booking operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BookingError {
    /// Malformed input: non-positive duration, inverted interval, empty service list...
    #[error("Validation failed: {reason}")]
    Validation {
        /// Human-readable explanation
        reason: String,
    },

    /// Requested start is not strictly after now (plus any lead time).
    ///
    /// Distinct from [`BookingError::SlotConflict`]: the client should pick a later
    /// time rather than re-query the same day.
    #[error("Requested start {date} {start} is not in the future")]
    PastTime {
        /// Requested date
        date: NaiveDate,
        /// Requested start
        start: TimeOfDay,
    },

    /// Provider is inactive
    #[error("Provider {0} is not accepting bookings")]
    ProviderUnavailable(ProviderId),

    /// Requested interval overlaps a pending or confirmed booking.
    ///
    /// The client should re-query available slots.
    #[error("Provider {provider_id} already has a booking overlapping {date} {range}")]
    SlotConflict {
        /// Provider
        provider_id: ProviderId,
        /// Date
        date: NaiveDate,
        /// Requested interval
        range: TimeRange,
    },

    /// Unknown booking
    #[error("Booking {0} not found")]
    NotFound(BookingId),

    /// Actor not permitted to perform the operation
    #[error("{actor} may not {operation} booking {booking_id}")]
    Unauthorized {
        /// Booking concerned
        booking_id: BookingId,
        /// Who asked
        actor: Actor,
        /// What they asked for
        operation: &'static str,
    },

    /// Status graph violation
    #[error("Booking {booking_id} cannot move from {from} to {to}")]
    InvalidTransition {
        /// Booking concerned
        booking_id: BookingId,
        /// Current status
        from: BookingStatus,
        /// Requested status
        to: BookingStatus,
    },

    /// The provider-day lock was not acquired in time
    #[error("Timed out waiting for the schedule lock of provider {provider_id} on {date}")]
    LockTimeout {
        /// Provider
        provider_id: ProviderId,
        /// Date
        date: NaiveDate,
    },

    /// Infrastructure failure behind a port
    #[error("Storage failure: {0}")]
    Storage(String),
}

impl BookingError {
    /// Shorthand for [`BookingError::Validation`]
    #[must_use]
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// Stable category of this failure
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::PastTime { .. } => ErrorKind::PastTime,
            Self::ProviderUnavailable(_) => ErrorKind::ProviderUnavailable,
            Self::SlotConflict { .. } => ErrorKind::SlotConflict,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::LockTimeout { .. } => ErrorKind::LockTimeout,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Whether retrying the same call may succeed
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::LockTimeout { .. })
    }
}

impl From<TransitionError> for BookingError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::Unauthorized {
                booking_id,
                actor,
                operation,
            } => Self::Unauthorized {
                booking_id,
                actor,
                operation,
            },
            TransitionError::InvalidTransition {
                booking_id,
                from,
                to,
            } => Self::InvalidTransition {
                booking_id,
                from,
                to,
            },
        }
    }
}

impl From<InvalidTimeRange> for BookingError {
    fn from(err: InvalidTimeRange) -> Self {
        Self::validation(err.to_string())
    }
}

impl From<StoreError> for BookingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Self::NotFound(id),
            other => Self::Storage(other.to_string()),
        }
    }
}

impl From<CollaboratorError> for BookingError {
    fn from(err: CollaboratorError) -> Self {
        Self::Storage(err.to_string())
    }
}
