//! In-memory schedule, provider directory and event consumers.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on a poisoned lock

use booking_engine_core::ports::{CollaboratorError, PortFuture};
use booking_engine_core::{
    BookingEvent, NaiveDate, NotificationDispatcher, ProviderDirectory, ProviderId,
    RatingRecalculator, ScheduleSource, TimeRange, WorkingWindow,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

// ============================================================================
// Schedule
// ============================================================================

/// Working hours keyed by provider and date, with optional weekly defaults.
///
/// A date with explicit windows ignores the default; a date set to an empty list is a
/// day off.
#[derive(Clone, Debug, Default)]
pub struct InMemoryScheduleSource {
    dated: Arc<RwLock<HashMap<(ProviderId, NaiveDate), Vec<TimeRange>>>>,
    every_day: Arc<RwLock<HashMap<ProviderId, Vec<TimeRange>>>>,
}

impl InMemoryScheduleSource {
    /// Create a schedule with no working hours
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the windows of one date (empty = day off)
    pub fn set_windows(&self, provider_id: ProviderId, date: NaiveDate, windows: Vec<TimeRange>) {
        self.dated.write().unwrap().insert((provider_id, date), windows);
    }

    /// Set windows used for every date without explicit windows
    pub fn set_every_day(&self, provider_id: ProviderId, windows: Vec<TimeRange>) {
        self.every_day.write().unwrap().insert(provider_id, windows);
    }

    fn windows_for(&self, provider_id: ProviderId, date: NaiveDate) -> Vec<WorkingWindow> {
        let ranges = self
            .dated
            .read()
            .unwrap()
            .get(&(provider_id, date))
            .cloned()
            .or_else(|| self.every_day.read().unwrap().get(&provider_id).cloned())
            .unwrap_or_default();
        ranges
            .into_iter()
            .map(|range| WorkingWindow::new(date, range))
            .collect()
    }
}

impl ScheduleSource for InMemoryScheduleSource {
    fn working_windows(
        &self,
        provider_id: ProviderId,
        date: NaiveDate,
    ) -> PortFuture<'_, Vec<WorkingWindow>, CollaboratorError> {
        Box::pin(async move { Ok(self.windows_for(provider_id, date)) })
    }
}

// ============================================================================
// Provider directory
// ============================================================================

/// Provider directory backed by a set of active providers.
#[derive(Clone, Debug, Default)]
pub struct StaticProviderDirectory {
    active: Arc<RwLock<HashSet<ProviderId>>>,
}

impl StaticProviderDirectory {
    /// Directory where exactly `providers` are active
    #[must_use]
    pub fn with_active(providers: impl IntoIterator<Item = ProviderId>) -> Self {
        Self {
            active: Arc::new(RwLock::new(providers.into_iter().collect())),
        }
    }

    /// Activate or deactivate a provider
    pub fn set_active(&self, provider_id: ProviderId, active: bool) {
        let mut providers = self.active.write().unwrap();
        if active {
            providers.insert(provider_id);
        } else {
            providers.remove(&provider_id);
        }
    }
}

impl ProviderDirectory for StaticProviderDirectory {
    fn is_active(&self, provider_id: ProviderId) -> PortFuture<'_, bool, CollaboratorError> {
        Box::pin(async move { Ok(self.active.read().unwrap().contains(&provider_id)) })
    }
}

// ============================================================================
// Event consumers
// ============================================================================

/// Notification dispatcher that records every event it receives.
#[derive(Clone, Debug, Default)]
pub struct RecordingNotifier {
    events: Arc<RwLock<Vec<BookingEvent>>>,
}

impl RecordingNotifier {
    /// Create an empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Events received so far, in delivery order
    #[must_use]
    pub fn events(&self) -> Vec<BookingEvent> {
        self.events.read().unwrap().clone()
    }

    /// Event type names received so far, e.g. `["BookingCreated"]`
    #[must_use]
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events.read().unwrap().iter().map(BookingEvent::event_type).collect()
    }

    /// Forget recorded events
    pub fn clear(&self) {
        self.events.write().unwrap().clear();
    }
}

impl NotificationDispatcher for RecordingNotifier {
    fn send_booking_notifications(&self, event: BookingEvent) -> PortFuture<'_, (), CollaboratorError> {
        Box::pin(async move {
            self.events.write().unwrap().push(event);
            Ok(())
        })
    }
}

/// Rating recalculator that records which providers it was asked about.
#[derive(Clone, Debug, Default)]
pub struct RecordingRatingRecalculator {
    providers: Arc<RwLock<Vec<ProviderId>>>,
}

impl RecordingRatingRecalculator {
    /// Create an empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Providers recalculated so far, in call order
    #[must_use]
    pub fn recalculated(&self) -> Vec<ProviderId> {
        self.providers.read().unwrap().clone()
    }
}

impl RatingRecalculator for RecordingRatingRecalculator {
    fn recalculate(&self, provider_id: ProviderId) -> PortFuture<'_, (), CollaboratorError> {
        Box::pin(async move {
            self.providers.write().unwrap().push(provider_id);
            Ok(())
        })
    }
}

/// Notification dispatcher that always fails, counting the attempts.
#[derive(Clone, Debug, Default)]
pub struct FailingNotifier {
    attempts: Arc<RwLock<usize>>,
}

impl FailingNotifier {
    /// Create a failing notifier
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// How many deliveries were attempted
    #[must_use]
    pub fn attempts(&self) -> usize {
        *self.attempts.read().unwrap()
    }
}

impl NotificationDispatcher for FailingNotifier {
    fn send_booking_notifications(&self, _event: BookingEvent) -> PortFuture<'_, (), CollaboratorError> {
        Box::pin(async move {
            *self.attempts.write().unwrap() += 1;
            Err(CollaboratorError::Unavailable {
                collaborator: "notifier",
                reason: "notification gateway down".into(),
            })
        })
    }
}

/// Rating recalculator that always fails.
#[derive(Clone, Copy, Debug, Default)]
pub struct FailingRatingRecalculator;

impl RatingRecalculator for FailingRatingRecalculator {
    fn recalculate(&self, _provider_id: ProviderId) -> PortFuture<'_, (), CollaboratorError> {
        Box::pin(async move {
            Err(CollaboratorError::Rejected {
                collaborator: "rating_recalculator",
                reason: "ratings service rejected the request".into(),
            })
        })
    }
}
