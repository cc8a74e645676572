//! Watch metrics tracking using OpenTelemetry.

use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};
use std::time::Instant;

/// Metrics collector for watchers and the config reloader.
///
/// Cheap to clone; clones record into the same instruments.
///
/// # Examples
///
/// ```rust,no_run
/// use hotswap_watch::metrics::WatchMetrics;
/// use opentelemetry::global;
///
/// let metrics = WatchMetrics::new(global::meter("hotswap-watch"));
///
/// let timer = metrics.start_reload();
/// // ... read and apply a file ...
/// metrics.record_reload_success(timer);
/// ```
#[derive(Clone)]
pub struct WatchMetrics {
    events_delivered: Counter<u64>,
    delivery_failures: Counter<u64>,
    events_dropped: Counter<u64>,
    resubscriptions: Counter<u64>,
    clock_changes: Counter<u64>,
    reload_success: Counter<u64>,
    reload_failures: Counter<u64>,
    reload_duration: Histogram<f64>,
    active_watches: Gauge<i64>,
}

impl WatchMetrics {
    /// Create a new metrics collector with the provided meter.
    pub fn new(meter: Meter) -> Self {
        let events_delivered = meter
            .u64_counter("hotswap_watch.events.delivered")
            .with_description("Events handed to observers")
            .build();

        let delivery_failures = meter
            .u64_counter("hotswap_watch.events.failures")
            .with_description("Events an observer returned an error for")
            .build();

        let events_dropped = meter
            .u64_counter("hotswap_watch.events.dropped")
            .with_description("Unclassified events and events for dropped observers")
            .build();

        let resubscriptions = meter
            .u64_counter("hotswap_watch.resubscriptions")
            .with_description("Watches re-established after their path was removed")
            .build();

        let clock_changes = meter
            .u64_counter("hotswap_watch.clock.changes")
            .with_description("Detected wall-clock discontinuities")
            .build();

        let reload_success = meter
            .u64_counter("hotswap_watch.reload.success")
            .with_description("Configuration files applied successfully")
            .build();

        let reload_failures = meter
            .u64_counter("hotswap_watch.reload.failures")
            .with_description("Configuration files that failed to read or apply")
            .build();

        let reload_duration = meter
            .f64_histogram("hotswap_watch.reload.duration")
            .with_description("Duration of read-and-apply in seconds")
            .with_unit("s")
            .build();

        let active_watches = meter
            .i64_gauge("hotswap_watch.watches.active")
            .with_description("Number of registered file watches")
            .build();

        Self {
            events_delivered,
            delivery_failures,
            events_dropped,
            resubscriptions,
            clock_changes,
            reload_success,
            reload_failures,
            reload_duration,
            active_watches,
        }
    }

    /// Record one delivery attempt and whether the observer accepted it.
    pub fn record_delivery(&self, ok: bool) {
        if ok {
            self.events_delivered.add(1, &[]);
        } else {
            self.delivery_failures.add(1, &[]);
        }
    }

    /// Record an event that was not delivered to anyone.
    pub fn record_dropped(&self) {
        self.events_dropped.add(1, &[]);
    }

    /// Record a successful resubscription.
    pub fn record_resubscription(&self) {
        self.resubscriptions.add(1, &[]);
    }

    /// Record a detected clock change.
    pub fn record_clock_change(&self) {
        self.clock_changes.add(1, &[]);
    }

    /// Start timing a reload.
    pub fn start_reload(&self) -> Instant {
        Instant::now()
    }

    /// Record a successful reload started at `start`.
    pub fn record_reload_success(&self, start: Instant) {
        self.reload_success.add(1, &[]);
        self.reload_duration.record(start.elapsed().as_secs_f64(), &[]);
    }

    /// Record a failed reload started at `start`.
    pub fn record_reload_failure(&self, start: Instant) {
        self.reload_failures.add(1, &[]);
        self.reload_duration.record(start.elapsed().as_secs_f64(), &[]);
    }

    /// Update the number of registered file watches.
    pub fn update_watch_count(&self, count: usize) {
        self.active_watches.record(count as i64, &[]);
    }
}
