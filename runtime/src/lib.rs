//! # Booking Engine Runtime
//!
//! Orchestration layer of the booking engine.
//!
//! This crate provides the [`BookingService`] that enforces booking invariants on top
//! of the ports defined in `booking-engine-core`.
//!
//! ## Core Components
//!
//! - **BookingService**: public API (slots, create, confirm, cancel, complete, no-show,
//!   reschedule, next-available search)
//! - **Provider-day locks**: per-(provider, date) pessimistic locking with timeouts
//! - **Slot cache**: short-lived cache invalidated on every write to a provider day
//! - **Event dispatcher**: ordered, best-effort delivery of lifecycle events
//! - **Retry**: bounded backoff for lock timeouts
//! - **Metrics / Config**: Prometheus metrics and environment-driven configuration
//!
//! ## Example
//!
//! ```ignore
//! use booking_engine_runtime::{BookingConfig, BookingEnvironment, BookingService};
//!
//! let service = BookingService::new(environment, BookingConfig::from_env())?;
//!
//! let slots = service.get_available_slots(provider_id, date, 60).await?;
//! let booking = service.create_booking(request).await?;
//! service.confirm_booking(booking.id, Actor::Provider(provider_id)).await?;
//! ```

/// Retry logic with exponential backoff
pub mod retry;

/// Prometheus metrics for observability
pub mod metrics;

/// Environment-driven configuration
pub mod config;

/// Per-(provider, date) locks
pub mod locks;

/// Slot list cache
pub mod cache;

/// Lifecycle event delivery
pub mod dispatch;

/// The booking service
pub mod service;

pub use cache::{SlotCache, SlotCacheKey};
pub use config::{BookingConfig, ConfigError};
pub use dispatch::{EventDispatcher, LoggingNotifier};
pub use locks::{ProviderDayGuard, ProviderDayLocks};
pub use metrics::{BookingMetrics, MetricsServer};
pub use retry::RetryPolicy;
pub use service::{BookingEnvironment, BookingService, CompletionData, DatedSlot, DaySlots};
