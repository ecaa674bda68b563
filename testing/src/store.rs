//! In-memory [`BookingStore`] for fast, deterministic tests.
//!
//! Honors the store contract: `insert` rejects overlap with an active booking of the
//! same provider day, `update_status` and `reschedule` are compare-and-set on the
//! expected status. Each write, together with its history entry, happens under one
//! write lock, so the checks are atomic even when the service's provider-day lock is
//! bypassed.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on a poisoned lock

use booking_engine_core::ports::{PortFuture, RescheduleUpdate, StatusUpdate, StoreError};
use booking_engine_core::{Booking, BookingId, BookingStore, HistoryEntry, NaiveDate, ProviderId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

/// In-memory booking store.
///
/// # Example
///
/// ```
/// use booking_engine_testing::InMemoryBookingStore;
///
/// let store = InMemoryBookingStore::new();
/// assert!(store.is_empty());
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryBookingStore {
    records: Arc<RwLock<Records>>,
    writes: Arc<AtomicUsize>,
    unavailable: Arc<AtomicBool>,
}

#[derive(Debug, Default)]
struct Records {
    bookings: HashMap<BookingId, Booking>,
    history: HashMap<BookingId, Vec<HistoryEntry>>,
}

impl InMemoryBookingStore {
    /// Create a new empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a booking as-is, bypassing every check and the history (fixtures for any
    /// status).
    pub fn seed(&self, booking: Booking) {
        self.records.write().unwrap().bookings.insert(booking.id, booking);
    }

    /// Snapshot of a stored booking
    #[must_use]
    pub fn get(&self, id: BookingId) -> Option<Booking> {
        self.records.read().unwrap().bookings.get(&id).cloned()
    }

    /// Recorded history of a booking, oldest first
    #[must_use]
    pub fn history_of(&self, id: BookingId) -> Vec<HistoryEntry> {
        self.records.read().unwrap().history.get(&id).cloned().unwrap_or_default()
    }

    /// Every stored booking, ordered by date then start
    #[must_use]
    pub fn all(&self) -> Vec<Booking> {
        let mut bookings: Vec<Booking> = self.records.read().unwrap().bookings.values().cloned().collect();
        bookings.sort_by_key(|booking| (booking.date, booking.time));
        bookings
    }

    /// Number of stored bookings
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().unwrap().bookings.len()
    }

    /// Whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of successful writes (insert, status update, reschedule)
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make every call fail with [`StoreError::Unavailable`] (or recover).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store switched off".into()));
        }
        Ok(())
    }

    fn insert_now(&self, booking: Booking) -> Result<(), StoreError> {
        self.check_available()?;
        let mut records = self.records.write().unwrap();
        let Records { bookings, history } = &mut *records;
        if bookings.contains_key(&booking.id) {
            return Err(StoreError::DuplicateId(booking.id));
        }
        if bookings
            .values()
            .any(|other| other.provider_id == booking.provider_id && other.blocks(booking.date, &booking.time))
        {
            return Err(StoreError::Overlap {
                provider_id: booking.provider_id,
                date: booking.date,
            });
        }
        history.entry(booking.id).or_default().push(HistoryEntry::created(&booking));
        bookings.insert(booking.id, booking);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn update_status_now(&self, id: BookingId, update: StatusUpdate) -> Result<Booking, StoreError> {
        self.check_available()?;
        let mut records = self.records.write().unwrap();
        let Records { bookings, history } = &mut *records;
        let booking = bookings.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if booking.status != update.expected {
            return Err(StoreError::StaleStatus {
                id,
                expected: update.expected,
                actual: booking.status,
            });
        }
        history.entry(id).or_default().push(HistoryEntry::status_change(id, &update));
        booking.apply_status(update.target, update.at, update.cancellation_reason);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(booking.clone())
    }

    fn reschedule_now(&self, id: BookingId, update: RescheduleUpdate) -> Result<Booking, StoreError> {
        self.check_available()?;
        let mut records = self.records.write().unwrap();
        let Records { bookings, history } = &mut *records;
        let current = bookings.get(&id).ok_or(StoreError::NotFound(id))?;
        if current.status != update.expected {
            return Err(StoreError::StaleStatus {
                id,
                expected: update.expected,
                actual: current.status,
            });
        }
        let provider_id = current.provider_id;
        if bookings.values().any(|other| {
            other.id != id && other.provider_id == provider_id && other.blocks(update.date, &update.time)
        }) {
            return Err(StoreError::Overlap {
                provider_id,
                date: update.date,
            });
        }

        let booking = bookings.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        history.entry(id).or_default().push(HistoryEntry::rescheduled(booking, &update));
        booking.apply_reschedule(update.date, update.time);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(booking.clone())
    }

    fn non_terminal_for(&self, provider_id: ProviderId, date: NaiveDate) -> Result<Vec<Booking>, StoreError> {
        self.check_available()?;
        let mut bookings: Vec<Booking> = self
            .records
            .read()
            .unwrap()
            .bookings
            .values()
            .filter(|booking| booking.provider_id == provider_id && booking.date == date && booking.is_active())
            .cloned()
            .collect();
        bookings.sort_by_key(|booking| booking.time);
        Ok(bookings)
    }
}

impl BookingStore for InMemoryBookingStore {
    fn find_by_id(&self, id: BookingId) -> PortFuture<'_, Option<Booking>, StoreError> {
        Box::pin(async move {
            self.check_available()?;
            Ok(self.get(id))
        })
    }

    fn find_non_terminal_for_provider_date(
        &self,
        provider_id: ProviderId,
        date: NaiveDate,
    ) -> PortFuture<'_, Vec<Booking>, StoreError> {
        Box::pin(async move { self.non_terminal_for(provider_id, date) })
    }

    fn insert(&self, booking: Booking) -> PortFuture<'_, (), StoreError> {
        Box::pin(async move { self.insert_now(booking) })
    }

    fn update_status(&self, id: BookingId, update: StatusUpdate) -> PortFuture<'_, Booking, StoreError> {
        Box::pin(async move { self.update_status_now(id, update) })
    }

    fn reschedule(&self, id: BookingId, update: RescheduleUpdate) -> PortFuture<'_, Booking, StoreError> {
        Box::pin(async move { self.reschedule_now(id, update) })
    }

    fn history(&self, id: BookingId) -> PortFuture<'_, Vec<HistoryEntry>, StoreError> {
        Box::pin(async move {
            self.check_available()?;
            Ok(self.history_of(id))
        })
    }
}
