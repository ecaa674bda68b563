//! Prometheus metrics for the booking engine.
//!
//! Operations record through [`BookingMetrics`]; with no recorder installed the calls
//! are no-ops. A binary installs the Prometheus recorder with [`MetricsServer`].
//!
//! # Example
//!
//! ```rust,no_run
//! use booking_engine_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//! # Ok(())
//! # }
//! ```

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics recorder with a scrape address.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server for `addr`.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Install the Prometheus recorder, then register metric descriptions with it.
    ///
    /// A second installation in the same process (tests) is tolerated: the first
    /// recorder keeps collecting and [`render`](Self::render) returns `None`.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError`] if the exporter cannot be built or installed.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                // Descriptions only reach a recorder that is already installed
                register_metrics();
                tracing::info!(addr = %self.addr, "Metrics recorder installed");
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Address the exporter is meant to be scraped on
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Render current metrics in Prometheus text format.
    ///
    /// Returns `None` if this instance did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(
        "booking_operations_total",
        "Booking service operations by operation and outcome"
    );
    describe_histogram!(
        "booking_operation_duration_seconds",
        "Time taken by booking service operations"
    );
    describe_counter!(
        "booking_slot_cache_hits_total",
        "Slot queries answered from the cache"
    );
    describe_counter!(
        "booking_slot_cache_misses_total",
        "Slot queries computed from the schedule and store"
    );
    describe_counter!(
        "booking_lock_timeouts_total",
        "Provider-day lock acquisitions that timed out"
    );
    describe_counter!(
        "booking_retries_total",
        "Retries after a transient failure"
    );
    describe_counter!(
        "booking_retries_exhausted_total",
        "Operations that failed after the last retry"
    );
    describe_counter!(
        "booking_events_delivered_total",
        "Lifecycle events handed to every collaborator"
    );
    describe_counter!(
        "booking_event_delivery_failures_total",
        "Collaborator calls that failed or timed out"
    );
    describe_counter!(
        "booking_store_overlap_rejected_total",
        "Store writes refused because they overlap an active booking"
    );
}

/// Booking engine metrics recorder.
pub struct BookingMetrics;

impl BookingMetrics {
    /// Record a finished service operation; `outcome` is `ok` or an error kind code.
    pub fn record_operation(operation: &'static str, outcome: &'static str, duration: Duration) {
        counter!("booking_operations_total", "operation" => operation, "outcome" => outcome)
            .increment(1);
        histogram!("booking_operation_duration_seconds", "operation" => operation)
            .record(duration.as_secs_f64());
    }

    /// Record a slot cache hit.
    pub fn record_cache_hit() {
        counter!("booking_slot_cache_hits_total").increment(1);
    }

    /// Record a slot cache miss.
    pub fn record_cache_miss() {
        counter!("booking_slot_cache_misses_total").increment(1);
    }

    /// Record a lock timeout.
    pub fn record_lock_timeout() {
        counter!("booking_lock_timeouts_total").increment(1);
    }

    /// Record a retry.
    pub fn record_retry(operation: &'static str) {
        counter!("booking_retries_total", "operation" => operation).increment(1);
    }

    /// Record exhausted retries.
    pub fn record_retries_exhausted(operation: &'static str) {
        counter!("booking_retries_exhausted_total", "operation" => operation).increment(1);
    }

    /// Record an event handed to its collaborators.
    pub fn record_event_delivered(event_type: &'static str) {
        counter!("booking_events_delivered_total", "event" => event_type).increment(1);
    }

    /// Record a failed collaborator call.
    pub fn record_delivery_failure(collaborator: &'static str) {
        counter!("booking_event_delivery_failures_total", "collaborator" => collaborator)
            .increment(1);
    }
}
