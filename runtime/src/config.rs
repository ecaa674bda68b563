//! Booking engine configuration.
//!
//! Loads from `BOOKING_*` environment variables with defaults matching the marketplace's
//! production settings. Tests build a config with [`BookingConfig::default`] and the
//! `with_*` setters.

use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::retry::RetryPolicy;

/// A configuration value outside its allowed range.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid configuration for {field}: {reason}")]
pub struct ConfigError {
    /// Offending field
    pub field: &'static str,
    /// What is wrong with it
    pub reason: String,
}

impl ConfigError {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Booking engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingConfig {
    /// Grid step between candidate slot starts (default: 30)
    pub slot_step_minutes: u32,
    /// Shortest bookable duration (default: 30)
    pub min_duration_minutes: u32,
    /// Longest bookable duration (default: 480)
    pub max_duration_minutes: u32,
    /// Lead time: bookings must start at least this far in the future (default: 0)
    pub min_advance_minutes: u32,
    /// Participants cannot cancel closer than this to the start (default: 120)
    pub cancellation_cutoff_minutes: u32,
    /// Participants cannot reschedule closer than this to the start (default: 240)
    pub reschedule_cutoff_minutes: u32,
    /// How many times a participant may move one booking (default: 2)
    pub max_reschedules: u32,
    /// Days scanned by the next-available-slot search (default: 14)
    pub search_horizon_days: u32,
    /// Slot cache entry lifetime in milliseconds, 0 disables the cache (default: 30000)
    pub slot_cache_ttl_ms: u64,
    /// Provider-day lock wait in milliseconds (default: 2000)
    pub lock_timeout_ms: u64,
    /// Retries after a lock timeout (default: 3)
    pub lock_retries: usize,
    /// Initial backoff between lock retries in milliseconds (default: 50)
    pub lock_retry_delay_ms: u64,
    /// Whether the `System` actor may complete bookings (default: true)
    pub auto_completion: bool,
    /// Deadline for each notification or rating call in milliseconds (default: 5000)
    pub collaborator_timeout_ms: u64,
    /// Offset of the provider-local frame from UTC, in minutes (default: 0)
    pub utc_offset_minutes: i32,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            slot_step_minutes: 30,
            min_duration_minutes: 30,
            max_duration_minutes: 480,
            min_advance_minutes: 0,
            cancellation_cutoff_minutes: 120,
            reschedule_cutoff_minutes: 240,
            max_reschedules: 2,
            search_horizon_days: 14,
            slot_cache_ttl_ms: 30_000,
            lock_timeout_ms: 2_000,
            lock_retries: 3,
            lock_retry_delay_ms: 50,
            auto_completion: true,
            collaborator_timeout_ms: 5_000,
            utc_offset_minutes: 0,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl BookingConfig {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable variables fall back to their defaults; call
    /// [`validate`](Self::validate) on the result.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            slot_step_minutes: env_or("BOOKING_SLOT_STEP_MINUTES", defaults.slot_step_minutes),
            min_duration_minutes: env_or(
                "BOOKING_MIN_DURATION_MINUTES",
                defaults.min_duration_minutes,
            ),
            max_duration_minutes: env_or(
                "BOOKING_MAX_DURATION_MINUTES",
                defaults.max_duration_minutes,
            ),
            min_advance_minutes: env_or("BOOKING_MIN_ADVANCE_MINUTES", defaults.min_advance_minutes),
            cancellation_cutoff_minutes: env_or(
                "BOOKING_CANCELLATION_CUTOFF_MINUTES",
                defaults.cancellation_cutoff_minutes,
            ),
            reschedule_cutoff_minutes: env_or(
                "BOOKING_RESCHEDULE_CUTOFF_MINUTES",
                defaults.reschedule_cutoff_minutes,
            ),
            max_reschedules: env_or("BOOKING_MAX_RESCHEDULES", defaults.max_reschedules),
            search_horizon_days: env_or("BOOKING_SEARCH_HORIZON_DAYS", defaults.search_horizon_days),
            slot_cache_ttl_ms: env_or("BOOKING_SLOT_CACHE_TTL_MS", defaults.slot_cache_ttl_ms),
            lock_timeout_ms: env_or("BOOKING_LOCK_TIMEOUT_MS", defaults.lock_timeout_ms),
            lock_retries: env_or("BOOKING_LOCK_RETRIES", defaults.lock_retries),
            lock_retry_delay_ms: env_or("BOOKING_LOCK_RETRY_DELAY_MS", defaults.lock_retry_delay_ms),
            auto_completion: env_or("BOOKING_AUTO_COMPLETION", defaults.auto_completion),
            collaborator_timeout_ms: env_or(
                "BOOKING_COLLABORATOR_TIMEOUT_MS",
                defaults.collaborator_timeout_ms,
            ),
            utc_offset_minutes: env_or("BOOKING_UTC_OFFSET_MINUTES", defaults.utc_offset_minutes),
        }
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for a zero step or one longer than a day, zero or inverted
    /// duration bounds, durations longer than a day, a zero search horizon, a zero lock
    /// timeout or an offset of a day or more.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.slot_step_minutes == 0 {
            return Err(ConfigError::new("slot_step_minutes", "must be positive"));
        }
        if self.slot_step_minutes > 1440 {
            return Err(ConfigError::new("slot_step_minutes", "must not exceed a day"));
        }
        if self.min_duration_minutes == 0 {
            return Err(ConfigError::new("min_duration_minutes", "must be positive"));
        }
        if self.min_duration_minutes > self.max_duration_minutes {
            return Err(ConfigError::new(
                "max_duration_minutes",
                format!(
                    "{} is below min_duration_minutes {}",
                    self.max_duration_minutes, self.min_duration_minutes
                ),
            ));
        }
        if self.max_duration_minutes > 1440 {
            return Err(ConfigError::new("max_duration_minutes", "must not exceed a day"));
        }
        if self.search_horizon_days == 0 {
            return Err(ConfigError::new("search_horizon_days", "must be positive"));
        }
        if self.lock_timeout_ms == 0 {
            return Err(ConfigError::new("lock_timeout_ms", "must be positive"));
        }
        if self.utc_offset_minutes.abs() >= 1440 {
            return Err(ConfigError::new("utc_offset_minutes", "must be less than a day"));
        }
        Ok(())
    }

    /// Set the slot grid step
    #[must_use]
    pub const fn with_slot_step_minutes(mut self, minutes: u32) -> Self {
        self.slot_step_minutes = minutes;
        self
    }

    /// Set the allowed booking duration range
    #[must_use]
    pub const fn with_duration_bounds(mut self, min_minutes: u32, max_minutes: u32) -> Self {
        self.min_duration_minutes = min_minutes;
        self.max_duration_minutes = max_minutes;
        self
    }

    /// Set the booking lead time
    #[must_use]
    pub const fn with_min_advance_minutes(mut self, minutes: u32) -> Self {
        self.min_advance_minutes = minutes;
        self
    }

    /// Set the participant cancellation cutoff
    #[must_use]
    pub const fn with_cancellation_cutoff_minutes(mut self, minutes: u32) -> Self {
        self.cancellation_cutoff_minutes = minutes;
        self
    }

    /// Set the participant reschedule cutoff and limit
    #[must_use]
    pub const fn with_reschedule_policy(mut self, cutoff_minutes: u32, max_reschedules: u32) -> Self {
        self.reschedule_cutoff_minutes = cutoff_minutes;
        self.max_reschedules = max_reschedules;
        self
    }

    /// Set the next-available search horizon
    #[must_use]
    pub const fn with_search_horizon_days(mut self, days: u32) -> Self {
        self.search_horizon_days = days;
        self
    }

    /// Set the slot cache TTL (0 disables caching)
    #[must_use]
    pub const fn with_slot_cache_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.slot_cache_ttl_ms = ttl_ms;
        self
    }

    /// Set lock timeout and retry behaviour
    #[must_use]
    pub const fn with_lock_policy(mut self, timeout_ms: u64, retries: usize, retry_delay_ms: u64) -> Self {
        self.lock_timeout_ms = timeout_ms;
        self.lock_retries = retries;
        self.lock_retry_delay_ms = retry_delay_ms;
        self
    }

    /// Allow or forbid automatic completion by the `System` actor
    #[must_use]
    pub const fn with_auto_completion(mut self, enabled: bool) -> Self {
        self.auto_completion = enabled;
        self
    }

    /// Set the per-call deadline for event consumers
    #[must_use]
    pub const fn with_collaborator_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.collaborator_timeout_ms = timeout_ms;
        self
    }

    /// Set the provider-local UTC offset
    #[must_use]
    pub const fn with_utc_offset_minutes(mut self, minutes: i32) -> Self {
        self.utc_offset_minutes = minutes;
        self
    }

    /// Slot cache TTL as a `Duration`
    #[must_use]
    pub const fn slot_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.slot_cache_ttl_ms)
    }

    /// Lock wait as a `Duration`
    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Event consumer deadline as a `Duration`
    #[must_use]
    pub const fn collaborator_timeout(&self) -> Duration {
        Duration::from_millis(self.collaborator_timeout_ms)
    }

    /// Backoff policy for lock timeouts
    #[must_use]
    pub fn lock_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::builder()
            .max_retries(self.lock_retries)
            .initial_delay(Duration::from_millis(self.lock_retry_delay_ms))
            .max_delay(self.lock_timeout())
            .build()
    }

    /// The provider-local offset; UTC if out of range
    #[must_use]
    pub fn utc_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes.saturating_mul(60)).unwrap_or_else(|| Utc.fix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = BookingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.slot_step_minutes, 30);
        assert_eq!(config.cancellation_cutoff_minutes, 120);
        assert_eq!(config.lock_timeout(), Duration::from_secs(2));
        assert_eq!(config.utc_offset(), Utc.fix());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let zero_step = BookingConfig::default().with_slot_step_minutes(0);
        assert_eq!(zero_step.validate().map_err(|e| e.field), Err("slot_step_minutes"));

        let huge_step = BookingConfig::default().with_slot_step_minutes(u32::MAX);
        assert_eq!(huge_step.validate().map_err(|e| e.field), Err("slot_step_minutes"));

        let inverted = BookingConfig::default().with_duration_bounds(120, 60);
        assert_eq!(inverted.validate().map_err(|e| e.field), Err("max_duration_minutes"));

        let offset = BookingConfig::default().with_utc_offset_minutes(24 * 60);
        assert!(offset.validate().is_err());
    }

    #[test]
    fn test_offset_and_retry_policy() {
        let config = BookingConfig::default()
            .with_utc_offset_minutes(180)
            .with_lock_policy(500, 5, 10);
        assert_eq!(config.utc_offset().local_minus_utc(), 180 * 60);

        let policy = config.lock_retry_policy();
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.initial_delay, Duration::from_millis(10));
        assert_eq!(policy.max_delay, Duration::from_millis(500));
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let config = BookingConfig::default().with_min_advance_minutes(60);
        let json = serde_json::to_string(&config).ok();
        let back = json.and_then(|json| serde_json::from_str::<BookingConfig>(&json).ok());
        assert_eq!(back, Some(config));
    }
}
