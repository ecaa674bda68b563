//! Short-lived cache of computed slot lists.
//!
//! Entries are keyed by provider day, duration and step, expire after a TTL, and are
//! dropped whenever a booking write touches their provider day. Expired entries are swept
//! on every `put`, so the map only holds provider days with live entries.
//!
//! A read that misses computes slots without holding any lock, so a write can commit
//! between that read's fetch and its `put`. [`SlotCache::invalidate`] bumps a cache-wide
//! generation; `put` is ignored when the generation observed before the fetch is no
//! longer current.

use booking_engine_core::{ProviderDay, Slot};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use crate::metrics::BookingMetrics;

/// Cache key for one slot query.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SlotCacheKey {
    /// Provider and date
    pub day: ProviderDay,
    /// Slot length
    pub duration_minutes: u32,
    /// Grid step
    pub step_minutes: u32,
}

/// Cache generation, read before computing slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Generation(u64);

#[derive(Debug)]
struct CachedSlots {
    slots: Vec<Slot>,
    stored_at: Instant,
}

#[derive(Debug, Default)]
struct CacheState {
    generation: u64,
    days: HashMap<ProviderDay, HashMap<(u32, u32), CachedSlots>>,
}

/// TTL cache of slot lists with per-provider-day invalidation.
#[derive(Debug)]
pub struct SlotCache {
    ttl: Duration,
    state: Mutex<CacheState>,
}

impl SlotCache {
    /// Creates a cache; a zero `ttl` disables it
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Whether entries are stored at all
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    /// Current generation
    #[must_use]
    pub fn generation(&self) -> Generation {
        Generation(self.state.lock().unwrap_or_else(PoisonError::into_inner).generation)
    }

    /// Fresh slots for `key`, if cached.
    #[must_use]
    pub fn get(&self, key: &SlotCacheKey) -> Option<Vec<Slot>> {
        if !self.is_enabled() {
            return None;
        }

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(queries) = state.days.get_mut(&key.day) else {
            BookingMetrics::record_cache_miss();
            return None;
        };
        let query = (key.duration_minutes, key.step_minutes);

        if let Some(cached) = queries.get(&query) {
            if cached.stored_at.elapsed() < self.ttl {
                BookingMetrics::record_cache_hit();
                return Some(cached.slots.clone());
            }
        }
        queries.remove(&query);
        if queries.is_empty() {
            state.days.remove(&key.day);
        }
        BookingMetrics::record_cache_miss();
        None
    }

    /// Stores `slots` unless the cache was invalidated since `observed` was read.
    pub fn put(&self, key: SlotCacheKey, observed: Generation, slots: Vec<Slot>) {
        if !self.is_enabled() {
            return;
        }

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.generation != observed.0 {
            tracing::debug!(day = %key.day, "Discarding slots computed before an invalidation");
            return;
        }

        let ttl = self.ttl;
        state.days.retain(|_, queries| {
            queries.retain(|_, cached| cached.stored_at.elapsed() < ttl);
            !queries.is_empty()
        });
        state.days.entry(key.day).or_default().insert(
            (key.duration_minutes, key.step_minutes),
            CachedSlots {
                slots,
                stored_at: Instant::now(),
            },
        );
    }

    /// Drops every entry of `day` and bumps the generation.
    pub fn invalidate(&self, day: ProviderDay) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.generation += 1;
        state.days.remove(&day);
    }

    /// Number of provider days with cached entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).days.len()
    }

    /// Whether nothing is cached
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use booking_engine_core::{NaiveDate, ProviderId, TimeOfDay, TimeRange};

    fn key(day: ProviderDay) -> SlotCacheKey {
        SlotCacheKey {
            day,
            duration_minutes: 60,
            step_minutes: 30,
        }
    }

    fn day() -> ProviderDay {
        ProviderDay::new(ProviderId::new(), NaiveDate::from_ymd_opt(2025, 3, 10).unwrap())
    }

    fn slots() -> Vec<Slot> {
        let range = TimeRange::starting_at(TimeOfDay::from_hm(10, 0).unwrap(), 60).unwrap();
        vec![Slot::from_range(range)]
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let cache = SlotCache::new(Duration::from_secs(30));
        let day = day();
        cache.put(key(day), cache.generation(), slots());
        assert_eq!(cache.get(&key(day)), Some(slots()));
    }

    #[tokio::test]
    async fn test_invalidate_drops_entries() {
        let cache = SlotCache::new(Duration::from_secs(30));
        let day = day();
        cache.put(key(day), cache.generation(), slots());
        cache.invalidate(day);
        assert_eq!(cache.get(&key(day)), None);
    }

    #[tokio::test]
    async fn test_stale_put_is_ignored() {
        let cache = SlotCache::new(Duration::from_secs(30));
        let day = day();
        let observed = cache.generation();
        cache.invalidate(day);
        cache.put(key(day), observed, slots());
        assert_eq!(cache.get(&key(day)), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let cache = SlotCache::new(Duration::from_secs(30));
        let day = day();
        cache.put(key(day), cache.generation(), slots());

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(cache.get(&key(day)), None);
    }

    #[tokio::test]
    async fn test_invalidation_leaves_no_entries_behind() {
        let cache = SlotCache::new(Duration::from_secs(30));
        for _ in 0..10_000 {
            cache.invalidate(day());
        }
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_put_sweeps_expired_days() {
        let cache = SlotCache::new(Duration::from_secs(30));
        for _ in 0..100 {
            let day = day();
            cache.put(key(day), cache.generation(), slots());
        }
        assert_eq!(cache.len(), 100);

        tokio::time::advance(Duration::from_secs(31)).await;
        let fresh = day();
        cache.put(key(fresh), cache.generation(), slots());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&key(fresh)), Some(slots()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_get_drops_the_day() {
        let cache = SlotCache::new(Duration::from_secs(30));
        let day = day();
        cache.put(key(day), cache.generation(), slots());

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(cache.get(&key(day)), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_zero_ttl_disables_cache() {
        let cache = SlotCache::new(Duration::ZERO);
        let day = day();
        cache.put(key(day), cache.generation(), slots());
        assert_eq!(cache.get(&key(day)), None);
    }
}
