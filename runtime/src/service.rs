//! The booking service: public API of the engine.
//!
//! Every method returns `Result<_, BookingError>`. Writes follow one pattern:
//!
//! 1. Validate what can be validated without a lock (input shape, provider status,
//!    past time, working hours).
//! 2. Under the provider-day lock, re-read the current state, re-check the invariants
//!    that depend on it, and commit through the store's atomic write.
//! 3. Release the lock, invalidate cached slots for the day, and enqueue the event.
//!
//! Lock timeouts are retried with backoff; every other failure goes straight back to
//! the caller.

use booking_engine_core::environment::Clock;
use booking_engine_core::lifecycle::Transition;
use booking_engine_core::ports::StatusUpdate;
use booking_engine_core::{
    Actor, Booking, BookingError, BookingEvent, BookingEventKind, BookingId, BookingStateMachine,
    BookingStatus, BookingStore, HistoryEntry, NaiveDate, NewBooking, NotificationDispatcher,
    ProviderDay, ProviderDirectory, ProviderId, RatingRecalculator, RescheduleUpdate,
    ScheduleSource, Slot, SlotRequest, StoreError, TimeOfDay, TimeRange, WorkingWindow,
    compute_slots, retain_starting_from,
};
use chrono::{Duration as ChronoDuration, FixedOffset, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use crate::cache::{SlotCache, SlotCacheKey};
use crate::config::{BookingConfig, ConfigError};
use crate::dispatch::EventDispatcher;
use crate::locks::ProviderDayLocks;
use crate::metrics::BookingMetrics;
use crate::retry::{RetryPolicy, retry_with_predicate};

/// How often a write re-reads a booking that moved to another day while it waited.
const MAX_RELOCATIONS: usize = 3;

/// Free text stored with a status change.
#[derive(Clone, Debug, Default)]
struct Annotations {
    reason: Option<String>,
    notes: Option<String>,
}

/// Collaborators the service talks to.
#[derive(Clone)]
pub struct BookingEnvironment {
    /// Source of "now"
    pub clock: Arc<dyn Clock>,
    /// Provider working hours
    pub schedule: Arc<dyn ScheduleSource>,
    /// Booking persistence
    pub store: Arc<dyn BookingStore>,
    /// Provider account status
    pub providers: Arc<dyn ProviderDirectory>,
    /// Notification channel
    pub notifier: Arc<dyn NotificationDispatcher>,
    /// Rating recomputation
    pub ratings: Arc<dyn RatingRecalculator>,
}

/// Input of [`BookingService::complete_booking`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionData {
    /// Who records completion (provider, administrator, or `System`)
    pub completed_by: Actor,
    /// Free-form notes carried on the event
    pub notes: Option<String>,
}

impl CompletionData {
    /// Completion by `actor` without notes
    #[must_use]
    pub const fn by(actor: Actor) -> Self {
        Self {
            completed_by: actor,
            notes: None,
        }
    }
}

/// A slot on a specific date.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatedSlot {
    /// Date of the slot
    pub date: NaiveDate,
    /// The slot
    pub slot: Slot,
}

/// Free slots of one date.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySlots {
    /// Date
    pub date: NaiveDate,
    /// Slots in start order (never empty)
    pub slots: Vec<Slot>,
}

/// Booking scheduling and lifecycle service.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct BookingService {
    env: BookingEnvironment,
    config: BookingConfig,
    machine: BookingStateMachine,
    locks: ProviderDayLocks,
    cache: SlotCache,
    events: EventDispatcher,
    retry: RetryPolicy,
    offset: FixedOffset,
}

impl std::fmt::Debug for BookingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BookingService")
            .field("config", &self.config)
            .field("locked_days", &self.locks.len())
            .finish_non_exhaustive()
    }
}

impl BookingService {
    /// Creates the service and spawns its event worker.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `config` fails validation.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn new(env: BookingEnvironment, config: BookingConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let events = EventDispatcher::spawn(
            Arc::clone(&env.notifier),
            Arc::clone(&env.ratings),
            config.collaborator_timeout(),
        );

        Ok(Self {
            machine: BookingStateMachine::new(config.auto_completion),
            locks: ProviderDayLocks::new(),
            cache: SlotCache::new(config.slot_cache_ttl()),
            retry: config.lock_retry_policy(),
            offset: config.utc_offset(),
            events,
            env,
            config,
        })
    }

    /// Active configuration
    #[must_use]
    pub const fn config(&self) -> &BookingConfig {
        &self.config
    }

    /// Waits until every event emitted so far reached its collaborators.
    pub async fn flush_events(&self) {
        self.events.flush().await;
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Loads a booking.
    ///
    /// # Errors
    ///
    /// [`BookingError::NotFound`] for an unknown id, [`BookingError::Storage`] if the
    /// store fails.
    pub async fn get_booking(&self, booking_id: BookingId) -> Result<Booking, BookingError> {
        self.load(booking_id).await
    }

    /// Every recorded action on a booking, oldest first.
    ///
    /// # Errors
    ///
    /// [`BookingError::NotFound`] for an unknown id, [`BookingError::Storage`] if the
    /// store fails.
    pub async fn get_booking_history(
        &self,
        booking_id: BookingId,
    ) -> Result<Vec<HistoryEntry>, BookingError> {
        self.load(booking_id).await?;
        Ok(self.env.store.history(booking_id).await?)
    }

    /// Free slots of `duration_minutes` on the configured grid step.
    ///
    /// # Errors
    ///
    /// [`BookingError::Validation`] for a zero duration, [`BookingError::Storage`] if a
    /// collaborator fails.
    pub async fn get_available_slots(
        &self,
        provider_id: ProviderId,
        date: NaiveDate,
        duration_minutes: u32,
    ) -> Result<Vec<Slot>, BookingError> {
        self.get_available_slots_with_step(
            provider_id,
            date,
            duration_minutes,
            self.config.slot_step_minutes,
        )
        .await
    }

    /// Free slots of `duration_minutes`, starting every `step_minutes`.
    ///
    /// Past dates have no slots; today's slots start after now plus the lead time.
    ///
    /// # Errors
    ///
    /// [`BookingError::Validation`] for a zero duration or step, [`BookingError::Storage`]
    /// if a collaborator fails.
    #[tracing::instrument(skip_all, fields(provider_id = %provider_id, date = %date))]
    pub async fn get_available_slots_with_step(
        &self,
        provider_id: ProviderId,
        date: NaiveDate,
        duration_minutes: u32,
        step_minutes: u32,
    ) -> Result<Vec<Slot>, BookingError> {
        self.observe("get_available_slots", async {
            let request = SlotRequest::new(duration_minutes, step_minutes)?;

            let cutoff = self.booking_cutoff();
            if date < cutoff.date() {
                return Ok(Vec::new());
            }

            let day = ProviderDay::new(provider_id, date);
            let key = SlotCacheKey {
                day,
                duration_minutes,
                step_minutes,
            };

            let mut slots = if let Some(slots) = self.cache.get(&key) {
                slots
            } else {
                let generation = self.cache.generation();
                let windows = self.working_windows(day).await?;
                let busy = self.busy_intervals(day, None).await?;
                let slots = compute_slots(&windows, &busy, &request);
                self.cache.put(key, generation, slots.clone());
                slots
            };

            if date == cutoff.date() {
                // A slot may not start at the cutoff minute itself
                let earliest = TimeOfDay::from(cutoff.time())
                    .checked_add_minutes(1)
                    .unwrap_or(TimeOfDay::END_OF_DAY);
                retain_starting_from(&mut slots, earliest);
            }
            Ok(slots)
        })
        .await
    }

    /// First free slot on or after `from`, scanning the configured horizon.
    ///
    /// # Errors
    ///
    /// As [`get_available_slots`](Self::get_available_slots).
    #[tracing::instrument(skip_all, fields(provider_id = %provider_id))]
    pub async fn find_next_available_slot(
        &self,
        provider_id: ProviderId,
        duration_minutes: u32,
        from: NaiveDate,
    ) -> Result<Option<DatedSlot>, BookingError> {
        let start = from.max(self.booking_cutoff().date());
        for date in start.iter_days().take(self.horizon_days()) {
            let slots = self
                .get_available_slots(provider_id, date, duration_minutes)
                .await?;
            if let Some(slot) = slots.first() {
                return Ok(Some(DatedSlot { date, slot: *slot }));
            }
        }
        Ok(None)
    }

    /// Per-date slots for `days` consecutive dates from `from`, omitting dates without
    /// slots.
    ///
    /// # Errors
    ///
    /// [`BookingError::Validation`] if `days` is zero or exceeds the search horizon;
    /// otherwise as [`get_available_slots`](Self::get_available_slots).
    #[tracing::instrument(skip_all, fields(provider_id = %provider_id))]
    pub async fn available_days(
        &self,
        provider_id: ProviderId,
        from: NaiveDate,
        days: u32,
        duration_minutes: u32,
    ) -> Result<Vec<DaySlots>, BookingError> {
        if days == 0 || days > self.config.search_horizon_days {
            return Err(BookingError::validation(format!(
                "Day count must be between 1 and {}",
                self.config.search_horizon_days
            )));
        }

        let mut calendar = Vec::new();
        for date in from.iter_days().take(usize::try_from(days).unwrap_or(usize::MAX)) {
            let slots = self
                .get_available_slots(provider_id, date, duration_minutes)
                .await?;
            if !slots.is_empty() {
                calendar.push(DaySlots { date, slots });
            }
        }
        Ok(calendar)
    }

    // ========================================================================
    // Creation
    // ========================================================================

    /// Creates a `Pending` booking in a free interval.
    ///
    /// # Errors
    ///
    /// - [`BookingError::Validation`]: no services, empty or inverted interval, duration
    ///   outside the configured bounds, interval outside working hours
    /// - [`BookingError::ProviderUnavailable`]: provider inactive
    /// - [`BookingError::PastTime`]: start not strictly after now plus the lead time
    /// - [`BookingError::SlotConflict`]: interval overlaps a pending or confirmed booking
    /// - [`BookingError::LockTimeout`]: provider day stayed contended through every retry
    #[tracing::instrument(
        skip_all,
        fields(provider_id = %request.provider_id, date = %request.date)
    )]
    pub async fn create_booking(&self, request: NewBooking) -> Result<Booking, BookingError> {
        self.observe("create", async {
            let booking = Booking::pending(BookingId::new(), request, self.env.clock.now())?;
            self.check_duration(booking.time.duration_minutes())?;

            if !self.env.providers.is_active(booking.provider_id).await? {
                return Err(BookingError::ProviderUnavailable(booking.provider_id));
            }
            self.check_future(booking.date, booking.time_start())?;

            let day = ProviderDay::of(&booking);
            self.check_within_working_hours(day, &booking.time).await?;

            let pending = &booking;
            self.with_provider_days(&[day], move || {
                let booking = pending.clone();
                async move {
                    self.ensure_free(day, &booking.time, None).await?;
                    self.env
                        .store
                        .insert(booking.clone())
                        .await
                        .map_err(|err| conflict_or_storage(err, day, booking.time))?;
                    Ok(booking)
                }
            })
            .await?;

            self.cache.invalidate(day);
            tracing::info!(
                booking_id = %booking.id,
                time = %booking.time,
                "Booking created"
            );
            self.events.emit(BookingEvent::new(
                &booking,
                BookingEventKind::Created {
                    date: booking.date,
                    time: booking.time,
                },
                booking.created_at,
            ));
            Ok(booking)
        })
        .await
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    /// Provider accepts a pending booking.
    ///
    /// # Errors
    ///
    /// [`BookingError::NotFound`], [`BookingError::Unauthorized`] (not the booking's
    /// provider), [`BookingError::InvalidTransition`] (not pending),
    /// [`BookingError::PastTime`] (start already passed).
    #[tracing::instrument(skip_all, fields(booking_id = %booking_id))]
    pub async fn confirm_booking(
        &self,
        booking_id: BookingId,
        actor: Actor,
    ) -> Result<Booking, BookingError> {
        self.observe("confirm", async {
            let booking = self
                .transition(
                    booking_id,
                    BookingStatus::Confirmed,
                    actor,
                    Annotations::default(),
                    |booking, now| {
                        if booking.starts_at() <= now {
                            return Err(BookingError::PastTime {
                                date: booking.date,
                                start: booking.time_start(),
                            });
                        }
                        Ok(())
                    },
                )
                .await?;

            self.emit_at(&booking, BookingEventKind::Confirmed, booking.confirmed_at);
            Ok(booking)
        })
        .await
    }

    /// Calls a booking off.
    ///
    /// Participants cannot cancel within the configured cutoff before the start;
    /// administrators can.
    ///
    /// # Errors
    ///
    /// [`BookingError::NotFound`], [`BookingError::Unauthorized`] (not a participant or
    /// administrator), [`BookingError::InvalidTransition`] (already terminal),
    /// [`BookingError::Validation`] (inside the cutoff).
    #[tracing::instrument(skip_all, fields(booking_id = %booking_id))]
    pub async fn cancel_booking(
        &self,
        booking_id: BookingId,
        actor: Actor,
        reason: impl Into<String>,
    ) -> Result<Booking, BookingError> {
        let reason = reason.into();
        let cutoff = minutes(self.config.cancellation_cutoff_minutes);

        self.observe("cancel", async {
            let booking = self
                .transition(
                    booking_id,
                    BookingStatus::Cancelled,
                    actor,
                    Annotations {
                        reason: Some(reason.clone()),
                        notes: None,
                    },
                    |booking, now| {
                        if !actor.is_administrator() && booking.starts_at() - now < cutoff {
                            return Err(BookingError::validation(format!(
                                "Bookings cannot be cancelled less than {} minutes before the start",
                                cutoff.num_minutes()
                            )));
                        }
                        Ok(())
                    },
                )
                .await?;

            self.emit_at(
                &booking,
                BookingEventKind::Cancelled {
                    cancelled_by: actor,
                    reason: reason.clone(),
                },
                booking.cancelled_at,
            );
            Ok(booking)
        })
        .await
    }

    /// Records that a confirmed booking took place.
    ///
    /// # Errors
    ///
    /// [`BookingError::NotFound`], [`BookingError::Unauthorized`],
    /// [`BookingError::InvalidTransition`] (not confirmed), [`BookingError::Validation`]
    /// (the booking has not ended yet).
    #[tracing::instrument(skip_all, fields(booking_id = %booking_id))]
    pub async fn complete_booking(
        &self,
        booking_id: BookingId,
        completion: CompletionData,
    ) -> Result<Booking, BookingError> {
        self.observe("complete", async {
            let booking = self
                .transition(
                    booking_id,
                    BookingStatus::Completed,
                    completion.completed_by,
                    Annotations {
                        reason: None,
                        notes: completion.notes.clone(),
                    },
                    |booking, now| ensure_ended(booking, now, "completed"),
                )
                .await?;

            self.emit_at(
                &booking,
                BookingEventKind::Completed {
                    completed_by: completion.completed_by,
                    notes: completion.notes.clone(),
                },
                booking.completed_at,
            );
            Ok(booking)
        })
        .await
    }

    /// Provider records that the client did not show up.
    ///
    /// # Errors
    ///
    /// [`BookingError::NotFound`], [`BookingError::Unauthorized`] (not the booking's
    /// provider), [`BookingError::InvalidTransition`] (not confirmed),
    /// [`BookingError::Validation`] (the booking has not ended yet).
    #[tracing::instrument(skip_all, fields(booking_id = %booking_id))]
    pub async fn mark_no_show(
        &self,
        booking_id: BookingId,
        actor: Actor,
    ) -> Result<Booking, BookingError> {
        self.observe("mark_no_show", async {
            let booking = self
                .transition(
                    booking_id,
                    BookingStatus::NoShow,
                    actor,
                    Annotations::default(),
                    |booking, now| ensure_ended(booking, now, "marked as a no-show"),
                )
                .await?;

            self.emit_at(&booking, BookingEventKind::NoShow, booking.no_show_at);
            Ok(booking)
        })
        .await
    }

    /// Moves an active booking to `new_start` on `new_date`, keeping its duration.
    ///
    /// Participants are bound by the reschedule cutoff and limit; administrators are not.
    ///
    /// # Errors
    ///
    /// - [`BookingError::NotFound`]
    /// - [`BookingError::Unauthorized`]: not a participant or administrator
    /// - [`BookingError::Validation`]: booking terminal, cutoff or limit reached, same
    ///   interval, new interval past midnight or outside working hours
    /// - [`BookingError::PastTime`]: new start not strictly after now plus the lead time
    /// - [`BookingError::SlotConflict`]: new interval overlaps another active booking
    #[tracing::instrument(skip_all, fields(booking_id = %booking_id, new_date = %new_date))]
    pub async fn reschedule_booking(
        &self,
        booking_id: BookingId,
        actor: Actor,
        new_date: NaiveDate,
        new_start: TimeOfDay,
    ) -> Result<Booking, BookingError> {
        self.observe("reschedule", async {
            for _ in 0..MAX_RELOCATIONS {
                let current = self.load(booking_id).await?;
                let old_day = ProviderDay::of(&current);
                let new_day = ProviderDay::new(current.provider_id, new_date);

                let new_time = self.check_reschedule(&current, &actor, new_date, new_start)?;
                self.check_within_working_hours(new_day, &new_time).await?;

                let moved = self
                    .with_provider_days(&[old_day, new_day], move || async move {
                        let booking = self.load(booking_id).await?;
                        if ProviderDay::of(&booking) != old_day {
                            return Ok(None);
                        }
                        self.check_reschedule(&booking, &actor, new_date, new_start)?;
                        self.ensure_free(new_day, &new_time, Some(booking_id)).await?;

                        let update = RescheduleUpdate {
                            expected: booking.status,
                            date: new_date,
                            time: new_time,
                            actor,
                            at: self.env.clock.now(),
                        };
                        let updated = self
                            .env
                            .store
                            .reschedule(booking_id, update)
                            .await
                            .map_err(|err| match err {
                                StoreError::StaleStatus { actual, .. } => {
                                    BookingError::validation(format!(
                                        "Booking is {actual} and can no longer be rescheduled"
                                    ))
                                }
                                other => conflict_or_storage(other, new_day, new_time),
                            })?;
                        Ok(Some((booking, updated)))
                    })
                    .await?;

                let Some((before, after)) = moved else {
                    continue;
                };

                self.cache.invalidate(old_day);
                self.cache.invalidate(new_day);
                tracing::info!(
                    from_date = %before.date,
                    from_time = %before.time,
                    to_date = %after.date,
                    to_time = %after.time,
                    reschedule_count = after.reschedule_count,
                    "Booking rescheduled"
                );
                self.events.emit(BookingEvent::new(
                    &after,
                    BookingEventKind::Rescheduled {
                        from_date: before.date,
                        from_time: before.time,
                        to_date: after.date,
                        to_time: after.time,
                        rescheduled_by: actor,
                    },
                    self.env.clock.now(),
                ));
                return Ok(after);
            }

            Err(self.relocation_exhausted(booking_id).await)
        })
        .await
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Guarded status change under the booking's provider-day lock.
    ///
    /// `check` runs after authorization and the transition table, against the freshly
    /// read booking and the provider-local now.
    async fn transition<C>(
        &self,
        booking_id: BookingId,
        target: BookingStatus,
        actor: Actor,
        annotations: Annotations,
        check: C,
    ) -> Result<Booking, BookingError>
    where
        C: Fn(&Booking, NaiveDateTime) -> Result<(), BookingError>,
    {
        let check = &check;
        let annotations = &annotations;
        for _ in 0..MAX_RELOCATIONS {
            let day = ProviderDay::of(&self.load(booking_id).await?);

            let committed = self
                .with_provider_days(&[day], move || {
                    let Annotations { reason, notes } = annotations.clone();
                    async move {
                        let booking = self.load(booking_id).await?;
                        if ProviderDay::of(&booking) != day {
                            return Ok(None);
                        }

                        let transition = self.machine.guarded_transition(&booking, target, &actor)?;
                        check(&booking, self.local_now())?;

                        let mut update =
                            StatusUpdate::from_transition(&transition, actor, self.env.clock.now())
                                .with_notes(notes);
                        if let Some(reason) = reason {
                            update = update.with_reason(reason);
                        }
                        let updated = self
                            .env
                            .store
                            .update_status(booking_id, update)
                            .await
                            .map_err(|err| stale_as_invalid(err, &transition))?;
                        Ok(Some(updated))
                    }
                })
                .await?;

            if let Some(booking) = committed {
                self.cache.invalidate(day);
                tracing::info!(
                    booking_id = %booking.id,
                    %actor,
                    status = %booking.status,
                    "Booking status changed"
                );
                return Ok(booking);
            }
        }

        Err(self.relocation_exhausted(booking_id).await)
    }

    /// Runs `work` while holding every provider day in `days`, retrying lock timeouts.
    async fn with_provider_days<T, F, Fut>(
        &self,
        days: &[ProviderDay],
        mut work: F,
    ) -> Result<T, BookingError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BookingError>>,
    {
        let timeout = self.config.lock_timeout();
        retry_with_predicate(
            &self.retry,
            "provider_day_lock",
            move || {
                let attempt = work();
                async move {
                    let _guards = self.locks.acquire_many(days, timeout).await?;
                    attempt.await
                }
            },
            BookingError::is_retryable,
        )
        .await
    }

    async fn load(&self, booking_id: BookingId) -> Result<Booking, BookingError> {
        self.env
            .store
            .find_by_id(booking_id)
            .await?
            .ok_or(BookingError::NotFound(booking_id))
    }

    async fn working_windows(&self, day: ProviderDay) -> Result<Vec<WorkingWindow>, BookingError> {
        let windows = self
            .env
            .schedule
            .working_windows(day.provider_id, day.date)
            .await?;
        Ok(windows.into_iter().filter(|window| window.date == day.date).collect())
    }

    /// Intervals of active bookings on `day`, optionally ignoring one booking.
    async fn busy_intervals(
        &self,
        day: ProviderDay,
        except: Option<BookingId>,
    ) -> Result<Vec<TimeRange>, BookingError> {
        let bookings = self
            .env
            .store
            .find_non_terminal_for_provider_date(day.provider_id, day.date)
            .await?;
        Ok(bookings
            .into_iter()
            .filter(|booking| booking.is_active() && Some(booking.id) != except)
            .map(|booking| booking.time)
            .collect())
    }

    /// Overlap check against the current state of `day`; call under its lock.
    async fn ensure_free(
        &self,
        day: ProviderDay,
        range: &TimeRange,
        except: Option<BookingId>,
    ) -> Result<(), BookingError> {
        let busy = self.busy_intervals(day, except).await?;
        if busy.iter().any(|taken| taken.overlaps(range)) {
            return Err(BookingError::SlotConflict {
                provider_id: day.provider_id,
                date: day.date,
                range: *range,
            });
        }
        Ok(())
    }

    async fn check_within_working_hours(
        &self,
        day: ProviderDay,
        range: &TimeRange,
    ) -> Result<(), BookingError> {
        let windows = self.working_windows(day).await?;
        if windows.iter().any(|window| window.range.contains(range)) {
            Ok(())
        } else {
            Err(BookingError::validation(format!(
                "{} {range} is outside the provider's working hours",
                day.date
            )))
        }
    }

    fn check_duration(&self, duration_minutes: u32) -> Result<(), BookingError> {
        let (min, max) = (
            self.config.min_duration_minutes,
            self.config.max_duration_minutes,
        );
        if duration_minutes < min || duration_minutes > max {
            return Err(BookingError::validation(format!(
                "Duration of {duration_minutes} minutes is outside {min}..={max}"
            )));
        }
        Ok(())
    }

    fn check_future(&self, date: NaiveDate, start: TimeOfDay) -> Result<(), BookingError> {
        if start.on(date) <= self.booking_cutoff() {
            return Err(BookingError::PastTime { date, start });
        }
        Ok(())
    }

    /// Policy checks for moving `booking`; returns the new interval.
    fn check_reschedule(
        &self,
        booking: &Booking,
        actor: &Actor,
        new_date: NaiveDate,
        new_start: TimeOfDay,
    ) -> Result<TimeRange, BookingError> {
        if !actor.is_administrator() && !actor.participates_in(booking) {
            return Err(BookingError::Unauthorized {
                booking_id: booking.id,
                actor: *actor,
                operation: "reschedule",
            });
        }
        if !booking.is_active() {
            return Err(BookingError::validation(format!(
                "Booking is {} and can no longer be rescheduled",
                booking.status
            )));
        }

        if !actor.is_administrator() {
            if booking.reschedule_count >= self.config.max_reschedules {
                return Err(BookingError::validation(format!(
                    "Booking was already rescheduled {} times",
                    booking.reschedule_count
                )));
            }
            let cutoff = minutes(self.config.reschedule_cutoff_minutes);
            if booking.starts_at() - self.local_now() < cutoff {
                return Err(BookingError::validation(format!(
                    "Bookings cannot be rescheduled less than {} minutes before the start",
                    cutoff.num_minutes()
                )));
            }
        }

        let new_time = TimeRange::starting_at(new_start, booking.time.duration_minutes())
            .ok_or_else(|| BookingError::validation("New interval must end by midnight"))?;
        if new_date == booking.date && new_time == booking.time {
            return Err(BookingError::validation("Booking is already at that time"));
        }
        self.check_future(new_date, new_start)?;
        Ok(new_time)
    }

    /// Error for a booking that kept moving while a write waited for its lock.
    async fn relocation_exhausted(&self, booking_id: BookingId) -> BookingError {
        match self.load(booking_id).await {
            Ok(booking) => BookingError::LockTimeout {
                provider_id: booking.provider_id,
                date: booking.date,
            },
            Err(err) => err,
        }
    }

    fn emit_at(
        &self,
        booking: &Booking,
        kind: BookingEventKind,
        at: Option<chrono::DateTime<chrono::Utc>>,
    ) {
        let occurred_at = at.unwrap_or_else(|| self.env.clock.now());
        self.events.emit(BookingEvent::new(booking, kind, occurred_at));
    }

    /// Now, in the provider-local frame
    fn local_now(&self) -> NaiveDateTime {
        self.env.clock.now().with_timezone(&self.offset).naive_local()
    }

    /// Bookings must start strictly after this local moment
    fn booking_cutoff(&self) -> NaiveDateTime {
        self.local_now() + minutes(self.config.min_advance_minutes)
    }

    fn horizon_days(&self) -> usize {
        usize::try_from(self.config.search_horizon_days).unwrap_or(usize::MAX)
    }

    /// Times an operation and records its outcome.
    async fn observe<T>(
        &self,
        operation: &'static str,
        work: impl Future<Output = Result<T, BookingError>>,
    ) -> Result<T, BookingError> {
        let started = Instant::now();
        let result = work.await;
        let outcome = match &result {
            Ok(_) => "ok",
            Err(err) => {
                tracing::debug!(operation, kind = err.kind().as_str(), error = %err, "Booking operation rejected");
                err.kind().as_str()
            }
        };
        BookingMetrics::record_operation(operation, outcome, started.elapsed());
        result
    }
}

fn minutes(value: u32) -> ChronoDuration {
    ChronoDuration::minutes(i64::from(value))
}

fn ensure_ended(booking: &Booking, now: NaiveDateTime, verb: &str) -> Result<(), BookingError> {
    if booking.ends_at() > now {
        return Err(BookingError::validation(format!(
            "Booking ending at {} {} cannot be {verb} before it ends",
            booking.date,
            booking.time_end()
        )));
    }
    Ok(())
}

fn conflict_or_storage(err: StoreError, day: ProviderDay, range: TimeRange) -> BookingError {
    match err {
        StoreError::Overlap { .. } => BookingError::SlotConflict {
            provider_id: day.provider_id,
            date: day.date,
            range,
        },
        other => other.into(),
    }
}

fn stale_as_invalid(err: StoreError, transition: &Transition) -> BookingError {
    match err {
        StoreError::StaleStatus { actual, .. } => BookingError::InvalidTransition {
            booking_id: transition.booking_id,
            from: actual,
            to: transition.to,
        },
        other => other.into(),
    }
}
