//! Property store metrics using OpenTelemetry.

use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};
use std::time::Instant;

/// Metrics collector for property store operations.
///
/// Tracks reload attempts and their outcomes, reload latency, applied and
/// vetoed changes, and registered listeners.
///
/// # Examples
///
/// ```rust,no_run
/// use hotprops::metrics::StoreMetrics;
/// use opentelemetry::global;
///
/// let meter = global::meter("hotprops");
/// let metrics = StoreMetrics::new(meter);
///
/// // Track a reload operation
/// let timer = metrics.start_reload();
/// // ... perform reload ...
/// metrics.record_reload_success(timer);
/// ```
#[derive(Clone)]
pub struct StoreMetrics {
    reload_attempts: Counter<u64>,
    reload_success: Counter<u64>,
    reload_failures: Counter<u64>,
    reload_rollbacks: Counter<u64>,
    reload_duration: Histogram<f64>,
    changes_applied: Counter<u64>,
    changes_vetoed: Counter<u64>,
    active_listeners: Gauge<i64>,
}

impl StoreMetrics {
    /// Create a new metrics collector with the provided meter.
    pub fn new(meter: Meter) -> Self {
        let reload_attempts = meter
            .u64_counter("hotprops.reload.attempts")
            .with_description("Total number of reload attempts")
            .build();

        let reload_success = meter
            .u64_counter("hotprops.reload.success")
            .with_description("Number of reloads that were applied")
            .build();

        let reload_failures = meter
            .u64_counter("hotprops.reload.failures")
            .with_description("Number of reloads that failed with an error")
            .build();

        let reload_rollbacks = meter
            .u64_counter("hotprops.reload.rollbacks")
            .with_description("Number of reloads vetoed by a listener")
            .build();

        let reload_duration = meter
            .f64_histogram("hotprops.reload.duration")
            .with_description("Duration of reload operations in seconds")
            .with_unit("s")
            .build();

        let changes_applied = meter
            .u64_counter("hotprops.changes.applied")
            .with_description("Number of property changes applied")
            .build();

        let changes_vetoed = meter
            .u64_counter("hotprops.changes.vetoed")
            .with_description("Number of property changes vetoed by a listener")
            .build();

        let active_listeners = meter
            .i64_gauge("hotprops.listeners.active")
            .with_description("Number of registered listeners")
            .build();

        Self {
            reload_attempts,
            reload_success,
            reload_failures,
            reload_rollbacks,
            reload_duration,
            changes_applied,
            changes_vetoed,
            active_listeners,
        }
    }

    /// Start a reload operation timer.
    ///
    /// Pass the returned `Instant` to one of the `record_reload_*` methods.
    pub fn start_reload(&self) -> Instant {
        self.reload_attempts.add(1, &[]);
        Instant::now()
    }

    /// Record a reload that was applied.
    pub fn record_reload_success(&self, start: Instant) {
        self.reload_success.add(1, &[]);
        self.reload_duration.record(start.elapsed().as_secs_f64(), &[]);
    }

    /// Record a reload that failed with an error.
    pub fn record_reload_failure(&self, start: Instant) {
        self.reload_failures.add(1, &[]);
        self.reload_duration.record(start.elapsed().as_secs_f64(), &[]);
    }

    /// Record a reload vetoed as a whole.
    pub fn record_reload_rollback(&self, start: Instant) {
        self.reload_rollbacks.add(1, &[]);
        self.reload_duration.record(start.elapsed().as_secs_f64(), &[]);
    }

    /// Record applied property changes.
    pub fn record_changes_applied(&self, count: usize) {
        self.changes_applied.add(count as u64, &[]);
    }

    /// Record a single vetoed property change.
    pub fn record_change_vetoed(&self) {
        self.changes_vetoed.add(1, &[]);
    }

    /// Update the number of registered listeners.
    pub fn update_listener_count(&self, count: usize) {
        self.active_listeners.record(count as i64, &[]);
    }
}
