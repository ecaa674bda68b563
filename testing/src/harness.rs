//! A fully wired [`BookingService`] over in-memory collaborators.
//!
//! ```ignore
//! let harness = BookingHarness::new();
//! let booking = harness.book(test_date(), hm(10, 0), hm(11, 0)).await?;
//! harness.service.confirm_booking(booking.id, harness.provider()).await?;
//! harness.service.flush_events().await;
//! assert_eq!(harness.notifier.event_types(), ["BookingCreated", "BookingConfirmed"]);
//! ```

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use booking_engine_core::{
    Actor, AdminId, Booking, BookingError, ClientId, NaiveDate, NewBooking, NotificationDispatcher,
    ProviderId, RatingRecalculator, TimeOfDay, Utc,
};
use booking_engine_runtime::{BookingConfig, BookingEnvironment, BookingService};
use std::sync::Arc;

use crate::collaborators::{
    InMemoryScheduleSource, RecordingNotifier, RecordingRatingRecalculator, StaticProviderDirectory,
};
use crate::fixtures::{hm, new_booking, range};
use crate::mocks::{FixedClock, test_clock};
use crate::store::InMemoryBookingStore;

/// Service plus handles on every in-memory collaborator.
///
/// One active provider works 10:00-18:00 every day; the clock reads
/// 2025-01-01 00:00 UTC.
pub struct BookingHarness {
    /// The service under test
    pub service: BookingService,
    /// Settable clock
    pub clock: FixedClock,
    /// Booking storage
    pub store: InMemoryBookingStore,
    /// Working hours
    pub schedule: InMemoryScheduleSource,
    /// Active providers
    pub providers: StaticProviderDirectory,
    /// Received notifications
    pub notifier: RecordingNotifier,
    /// Received rating recalculations
    pub ratings: RecordingRatingRecalculator,
    /// The provider
    pub provider_id: ProviderId,
    /// A client
    pub client_id: ClientId,
    /// An administrator
    pub admin_id: AdminId,
}

impl BookingHarness {
    /// Harness with the default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(BookingConfig::default())
    }

    /// Harness with a custom configuration
    #[must_use]
    pub fn with_config(config: BookingConfig) -> Self {
        let notifier = RecordingNotifier::new();
        let ratings = RecordingRatingRecalculator::new();
        Self::build(
            config,
            notifier.clone(),
            ratings.clone(),
            Arc::new(notifier),
            Arc::new(ratings),
        )
    }

    /// Harness whose events go to the given collaborators instead of the recorders
    #[must_use]
    pub fn with_event_consumers(
        config: BookingConfig,
        notifier: Arc<dyn NotificationDispatcher>,
        ratings: Arc<dyn RatingRecalculator>,
    ) -> Self {
        Self::build(
            config,
            RecordingNotifier::new(),
            RecordingRatingRecalculator::new(),
            notifier,
            ratings,
        )
    }

    fn build(
        config: BookingConfig,
        notifier: RecordingNotifier,
        ratings: RecordingRatingRecalculator,
        notifier_port: Arc<dyn NotificationDispatcher>,
        ratings_port: Arc<dyn RatingRecalculator>,
    ) -> Self {
        let provider_id = ProviderId::new();
        let clock = test_clock();
        let store = InMemoryBookingStore::new();
        let schedule = InMemoryScheduleSource::new();
        schedule.set_every_day(provider_id, vec![range(hm(10, 0), hm(18, 0))]);
        let providers = StaticProviderDirectory::with_active([provider_id]);

        let env = BookingEnvironment {
            clock: Arc::new(clock.clone()),
            schedule: Arc::new(schedule.clone()),
            store: Arc::new(store.clone()),
            providers: Arc::new(providers.clone()),
            notifier: notifier_port,
            ratings: ratings_port,
        };
        let service = BookingService::new(env, config).unwrap();

        Self {
            service,
            clock,
            store,
            schedule,
            providers,
            notifier,
            ratings,
            provider_id,
            client_id: ClientId::new(),
            admin_id: AdminId::new(),
        }
    }

    /// The provider as an actor
    #[must_use]
    pub const fn provider(&self) -> Actor {
        Actor::Provider(self.provider_id)
    }

    /// The client as an actor
    #[must_use]
    pub const fn client(&self) -> Actor {
        Actor::Client(self.client_id)
    }

    /// The administrator as an actor
    #[must_use]
    pub const fn admin(&self) -> Actor {
        Actor::Administrator(self.admin_id)
    }

    /// Booking request from the harness client to the harness provider
    #[must_use]
    pub fn request(&self, date: NaiveDate, start: TimeOfDay, end: TimeOfDay) -> NewBooking {
        new_booking(self.provider_id, self.client_id, date, start, end)
    }

    /// Creates a booking through the service.
    ///
    /// # Errors
    ///
    /// Whatever [`BookingService::create_booking`] returns.
    pub async fn book(
        &self,
        date: NaiveDate,
        start: TimeOfDay,
        end: TimeOfDay,
    ) -> Result<Booking, BookingError> {
        self.service.create_booking(self.request(date, start, end)).await
    }

    /// Sets the clock to `time` on `date`, read as UTC.
    pub fn set_now(&self, date: NaiveDate, time: TimeOfDay) {
        self.clock.set(time.on(date).and_utc());
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: chrono::Duration) {
        self.clock.advance(by);
    }

    /// Current clock reading
    #[must_use]
    pub fn now(&self) -> chrono::DateTime<Utc> {
        use booking_engine_core::environment::Clock;
        self.clock.now()
    }
}

impl Default for BookingHarness {
    fn default() -> Self {
        Self::new()
    }
}
