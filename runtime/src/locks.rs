//! Per-(provider, date) pessimistic locks.
//!
//! Every write that can change a provider's occupancy on a date runs while holding that
//! provider day's lock, so the overlap check and the insert are atomic with respect to
//! other writers in this process. Slot reads take no lock.
//!
//! Locks are created on first use and dropped again when the last guard or waiter goes
//! away, so the map only holds provider days with activity in flight.

use booking_engine_core::{BookingError, ProviderDay};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::metrics::BookingMetrics;

type LockMap = HashMap<ProviderDay, Arc<AsyncMutex<()>>>;

/// Registry of provider-day locks.
#[derive(Debug, Default, Clone)]
pub struct ProviderDayLocks {
    locks: Arc<Mutex<LockMap>>,
}

/// Holds one provider day's lock; released on drop.
#[derive(Debug)]
pub struct ProviderDayGuard {
    key: ProviderDay,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<Mutex<LockMap>>,
}

impl ProviderDayGuard {
    /// The locked provider day
    #[must_use]
    pub const fn key(&self) -> ProviderDay {
        self.key
    }
}

impl Drop for ProviderDayGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        prune(&self.locks, self.key);
    }
}

/// Removes `key` if nobody but the map references its mutex.
fn prune(locks: &Mutex<LockMap>, key: ProviderDay) {
    let mut map = locks.lock().unwrap_or_else(PoisonError::into_inner);
    if map.get(&key).is_some_and(|entry| Arc::strong_count(entry) == 1) {
        map.remove(&key);
    }
}

impl ProviderDayLocks {
    /// Creates an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits up to `timeout` for the lock of `key`.
    ///
    /// # Errors
    ///
    /// [`BookingError::LockTimeout`] if the lock is still held when `timeout` elapses.
    pub async fn acquire(
        &self,
        key: ProviderDay,
        timeout: Duration,
    ) -> Result<ProviderDayGuard, BookingError> {
        let mutex = {
            let mut map = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(map.entry(key).or_default())
        };

        if let Ok(guard) = tokio::time::timeout(timeout, mutex.lock_owned()).await {
            Ok(ProviderDayGuard {
                key,
                guard: Some(guard),
                locks: Arc::clone(&self.locks),
            })
        } else {
            prune(&self.locks, key);
            BookingMetrics::record_lock_timeout();
            tracing::debug!(provider_id = %key.provider_id, date = %key.date, "Provider-day lock timed out");
            Err(BookingError::LockTimeout {
                provider_id: key.provider_id,
                date: key.date,
            })
        }
    }

    /// Acquires several provider days in key order.
    ///
    /// Keys are sorted and de-duplicated first, so two callers locking the same pair of
    /// days from opposite ends cannot deadlock. On failure, locks already taken are
    /// released.
    ///
    /// # Errors
    ///
    /// [`BookingError::LockTimeout`] for the first key not acquired in time.
    pub async fn acquire_many(
        &self,
        keys: &[ProviderDay],
        timeout: Duration,
    ) -> Result<Vec<ProviderDayGuard>, BookingError> {
        let mut ordered = keys.to_vec();
        ordered.sort();
        ordered.dedup();

        let mut guards = Vec::with_capacity(ordered.len());
        for key in ordered {
            guards.push(self.acquire(key, timeout).await?);
        }
        Ok(guards)
    }

    /// Number of provider days currently tracked
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no provider day is locked or awaited
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
