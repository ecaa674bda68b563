//! Booking status state machine.
//!
//! ```text
//!             ┌────────────┐
//!             │  Pending   │
//!             └─────┬──────┘
//!          confirm  │  cancel
//!        ┌──────────┴──────────┐
//!        ▼                     ▼
//! ┌────────────┐        ┌────────────┐
//! │ Confirmed  │──────► │ Cancelled  │
//! └─────┬──────┘ cancel └────────────┘
//!       │
//!       ├── complete ──► Completed
//!       └── no-show ───► NoShow
//! ```
//!
//! [`BookingStatus::can_transition_to`] is the bare table. [`BookingStateMachine`]
//! layers actor authorization on top of it; every rejected change is an error, never a
//! silent no-op.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::types::{AdminId, Booking, BookingId, ClientId, ProviderId};

/// Lifecycle status of a booking.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    /// Requested by the client, awaiting the provider
    Pending,
    /// Accepted by the provider
    Confirmed,
    /// Service delivered (terminal)
    Completed,
    /// Called off by a participant or an administrator (terminal)
    Cancelled,
    /// Client did not show up (terminal)
    NoShow,
}

const FROM_PENDING: &[BookingStatus] = &[BookingStatus::Confirmed, BookingStatus::Cancelled];
const FROM_CONFIRMED: &[BookingStatus] = &[
    BookingStatus::Completed,
    BookingStatus::Cancelled,
    BookingStatus::NoShow,
];
const FROM_TERMINAL: &[BookingStatus] = &[];

impl BookingStatus {
    /// Every status, in lifecycle order
    pub const ALL: [Self; 5] = [
        Self::Pending,
        Self::Confirmed,
        Self::Completed,
        Self::Cancelled,
        Self::NoShow,
    ];

    /// Statuses reachable in one step from `self`
    #[must_use]
    pub const fn allowed_targets(self) -> &'static [Self] {
        match self {
            Self::Pending => FROM_PENDING,
            Self::Confirmed => FROM_CONFIRMED,
            Self::Completed | Self::Cancelled | Self::NoShow => FROM_TERMINAL,
        }
    }

    /// Table lookup: may a booking move from `self` to `target`?
    #[must_use]
    pub fn can_transition_to(self, target: Self) -> bool {
        self.allowed_targets().contains(&target)
    }

    /// No outgoing transitions
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::NoShow)
    }

    /// Holds its interval against other bookings
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed)
    }

    /// Stable storage code
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::NoShow => "no_show",
        }
    }

    /// Parses a storage code produced by [`BookingStatus::as_str`].
    #[must_use]
    pub fn parse(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == code)
    }

    /// The timestamp column written together with a transition into this status.
    #[must_use]
    pub const fn timestamp_field(self) -> Option<TimestampField> {
        match self {
            Self::Pending => None,
            Self::Confirmed => Some(TimestampField::ConfirmedAt),
            Self::Completed => Some(TimestampField::CompletedAt),
            Self::Cancelled => Some(TimestampField::CancelledAt),
            Self::NoShow => Some(TimestampField::NoShowAt),
        }
    }

    /// Name of the operation that moves a booking into this status.
    #[must_use]
    pub const fn operation(self) -> &'static str {
        match self {
            Self::Pending => "create",
            Self::Confirmed => "confirm",
            Self::Completed => "complete",
            Self::Cancelled => "cancel",
            Self::NoShow => "mark_no_show",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Table lookup: may a booking move from `from` to `to`?
#[must_use]
pub fn can_transition(from: BookingStatus, to: BookingStatus) -> bool {
    from.can_transition_to(to)
}

/// Timestamp recorded alongside a status change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimestampField {
    /// `confirmed_at`
    ConfirmedAt,
    /// `completed_at`
    CompletedAt,
    /// `cancelled_at`
    CancelledAt,
    /// `no_show_at`
    NoShowAt,
}

impl TimestampField {
    /// Column name in persistent storage
    #[must_use]
    pub const fn column(self) -> &'static str {
        match self {
            Self::ConfirmedAt => "confirmed_at",
            Self::CompletedAt => "completed_at",
            Self::CancelledAt => "cancelled_at",
            Self::NoShowAt => "no_show_at",
        }
    }
}

/// Who is asking for a change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "role", content = "id", rename_all = "snake_case")]
pub enum Actor {
    /// A service provider
    Provider(ProviderId),
    /// A client
    Client(ClientId),
    /// A marketplace administrator
    Administrator(AdminId),
    /// The platform itself (scheduled jobs)
    System,
}

impl Actor {
    /// Administrators bypass participant-only time limits
    #[must_use]
    pub const fn is_administrator(&self) -> bool {
        matches!(self, Self::Administrator(_))
    }

    /// Whether the actor is the booking's provider
    #[must_use]
    pub fn is_provider_of(&self, booking: &Booking) -> bool {
        matches!(self, Self::Provider(id) if *id == booking.provider_id)
    }

    /// Whether the actor is the booking's client
    #[must_use]
    pub fn is_client_of(&self, booking: &Booking) -> bool {
        matches!(self, Self::Client(id) if *id == booking.client_id)
    }

    /// Provider or client of the booking
    #[must_use]
    pub fn participates_in(&self, booking: &Booking) -> bool {
        self.is_provider_of(booking) || self.is_client_of(booking)
    }

    /// Stable storage code of the actor's role
    #[must_use]
    pub const fn role(&self) -> &'static str {
        match self {
            Self::Provider(_) => "provider",
            Self::Client(_) => "client",
            Self::Administrator(_) => "administrator",
            Self::System => "system",
        }
    }

    /// Account id behind the actor; `None` for [`Actor::System`]
    #[must_use]
    pub const fn subject(&self) -> Option<Uuid> {
        match self {
            Self::Provider(id) => Some(*id.as_uuid()),
            Self::Client(id) => Some(*id.as_uuid()),
            Self::Administrator(id) => Some(*id.as_uuid()),
            Self::System => None,
        }
    }

    /// Rebuilds an actor from [`role`](Self::role) and [`subject`](Self::subject).
    #[must_use]
    pub fn from_parts(role: &str, subject: Option<Uuid>) -> Option<Self> {
        match (role, subject) {
            ("provider", Some(id)) => Some(Self::Provider(ProviderId::from_uuid(id))),
            ("client", Some(id)) => Some(Self::Client(ClientId::from_uuid(id))),
            ("administrator", Some(id)) => Some(Self::Administrator(AdminId::from_uuid(id))),
            ("system", None) => Some(Self::System),
            _ => None,
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Provider(id) => write!(f, "provider {id}"),
            Self::Client(id) => write!(f, "client {id}"),
            Self::Administrator(id) => write!(f, "administrator {id}"),
            Self::System => f.write_str("system"),
        }
    }
}

/// An approved status change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    /// Booking being changed
    pub booking_id: BookingId,
    /// Status it is leaving
    pub from: BookingStatus,
    /// Status it is entering
    pub to: BookingStatus,
}

/// Why a guarded transition was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// The actor has no right to perform this change on this booking
    #[error("{actor} may not {operation} booking {booking_id}")]
    Unauthorized {
        /// Booking concerned
        booking_id: BookingId,
        /// Who asked
        actor: Actor,
        /// What they asked for
        operation: &'static str,
    },

    /// The status graph has no such edge
    #[error("Booking {booking_id} cannot move from {from} to {to}")]
    InvalidTransition {
        /// Booking concerned
        booking_id: BookingId,
        /// Current status
        from: BookingStatus,
        /// Requested status
        to: BookingStatus,
    },
}

/// Transition table plus actor authorization.
///
/// | target    | allowed actors                                        |
/// |-----------|-------------------------------------------------------|
/// | Confirmed | the booking's provider                                |
/// | Cancelled | the booking's provider or client, any administrator   |
/// | Completed | the booking's provider, any administrator, `System`*  |
/// | NoShow    | the booking's provider                                |
///
/// \* only when automatic completion is enabled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BookingStateMachine {
    allow_system_completion: bool,
}

impl BookingStateMachine {
    /// Creates a state machine
    #[must_use]
    pub const fn new(allow_system_completion: bool) -> Self {
        Self {
            allow_system_completion,
        }
    }

    /// Pure table lookup
    #[must_use]
    pub fn can_transition(&self, from: BookingStatus, to: BookingStatus) -> bool {
        from.can_transition_to(to)
    }

    /// Whether `actor` may move `booking` into `target`, ignoring its current status.
    #[must_use]
    pub fn is_authorized(&self, booking: &Booking, target: BookingStatus, actor: &Actor) -> bool {
        match target {
            BookingStatus::Pending => false,
            BookingStatus::Confirmed | BookingStatus::NoShow => actor.is_provider_of(booking),
            BookingStatus::Cancelled => {
                actor.is_administrator() || actor.participates_in(booking)
            }
            BookingStatus::Completed => match actor {
                Actor::Administrator(_) => true,
                Actor::System => self.allow_system_completion,
                Actor::Provider(_) => actor.is_provider_of(booking),
                Actor::Client(_) => false,
            },
        }
    }

    /// Authorizes `actor`, then checks the table.
    ///
    /// # Errors
    ///
    /// [`TransitionError::Unauthorized`] if the actor may not request `target`;
    /// [`TransitionError::InvalidTransition`] if the current status has no edge to it.
    pub fn guarded_transition(
        &self,
        booking: &Booking,
        target: BookingStatus,
        actor: &Actor,
    ) -> Result<Transition, TransitionError> {
        if !self.is_authorized(booking, target, actor) {
            return Err(TransitionError::Unauthorized {
                booking_id: booking.id,
                actor: *actor,
                operation: target.operation(),
            });
        }

        if !booking.status.can_transition_to(target) {
            return Err(TransitionError::InvalidTransition {
                booking_id: booking.id,
                from: booking.status,
                to: target,
            });
        }

        Ok(Transition {
            booking_id: booking.id,
            from: booking.status,
            to: target,
        })
    }
}

impl Default for BookingStateMachine {
    fn default() -> Self {
        Self::new(true)
    }
}
