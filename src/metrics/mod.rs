//! Performance Metrics and Algorithm Events
//!
//! The queue algorithms never perform I/O. Interesting moments inside a
//! push or pop (helping a lagging tail, losing a CAS, finding a deleted
//! insertion point) are reported as [`QueueEvent`]s. Each event is
//!
//! - emitted as a `tracing` event at `TRACE` level,
//! - counted in [`AtomicMetrics`] when metrics are enabled,
//! - forwarded to an optional [`QueueObserver`].

use core::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Something that happened inside a queue operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueEvent {
    /// A thread advanced `tail` on behalf of another thread's push.
    TailHelped,
    /// A CAS lost a race and the operation went round its loop again.
    CasRetry,
    /// A push spliced its node in after the node that won the tail race.
    LocalInsert,
    /// The splice point turned out to be deleted; push restarts from the tail.
    DeletedInsertionPoint,
    /// Every local splice attempt failed; push restarts from the tail.
    LocalInsertExhausted,
    /// A pop found a consumed node behind `head` and moved `head` past it.
    StaleHeadSkipped,
    /// A pop found nothing to return.
    EmptyPop,
}

impl QueueEvent {
    /// Stable snake_case name, used as the `event` field in traces.
    pub const fn as_str(self) -> &'static str {
        match self {
            QueueEvent::TailHelped => "tail_helped",
            QueueEvent::CasRetry => "cas_retry",
            QueueEvent::LocalInsert => "local_insert",
            QueueEvent::DeletedInsertionPoint => "deleted_insertion_point",
            QueueEvent::LocalInsertExhausted => "local_insert_exhausted",
            QueueEvent::StaleHeadSkipped => "stale_head_skipped",
            QueueEvent::EmptyPop => "empty_pop",
        }
    }
}

impl fmt::Display for QueueEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives algorithm events from a queue.
///
/// Called on the hot path of the thread that observed the event, so
/// implementations should be cheap and must not touch the queue.
pub trait QueueObserver: Send + Sync + fmt::Debug {
    /// Handle one event.
    fn on_event(&self, event: QueueEvent);
}

/// Observer that logs every event through `tracing` at a chosen level.
#[derive(Debug, Clone, Copy)]
pub struct TracingObserver {
    level: tracing::Level,
}

impl TracingObserver {
    /// Log events at `level`.
    pub const fn new(level: tracing::Level) -> Self {
        Self { level }
    }
}

impl Default for TracingObserver {
    fn default() -> Self {
        Self::new(tracing::Level::DEBUG)
    }
}

impl QueueObserver for TracingObserver {
    fn on_event(&self, event: QueueEvent) {
        let name = event.as_str();
        match self.level {
            tracing::Level::ERROR => tracing::error!(event = name, "queue event"),
            tracing::Level::WARN => tracing::warn!(event = name, "queue event"),
            tracing::Level::INFO => tracing::info!(event = name, "queue event"),
            tracing::Level::DEBUG => tracing::debug!(event = name, "queue event"),
            _ => tracing::trace!(event = name, "queue event"),
        }
    }
}

/// Snapshot of a queue's performance counters
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PerformanceMetrics {
    /// Total number of push and pop calls
    pub total_operations: u64,
    /// Pushes plus pops that returned a value
    pub successful_operations: u64,
    /// Pops that found the queue empty
    pub failed_operations: u64,
    /// CAS rounds lost to another thread
    pub contended_operations: u64,
    /// Average operation time in nanoseconds
    pub avg_operation_time_ns: u64,
    /// Maximum operation time in nanoseconds
    pub max_operation_time_ns: u64,
    /// Times a thread advanced `tail` for someone else
    pub tail_helps: u64,
    /// Pushes completed by splicing after the tail-race winner
    pub local_inserts: u64,
    /// Splice attempts abandoned because the insertion point was deleted
    pub deleted_insertion_points: u64,
    /// Splice loops that ran out of attempts
    pub local_insert_exhaustions: u64,
    /// Consumed nodes skipped while advancing `head`
    pub stale_heads_skipped: u64,
}

impl PerformanceMetrics {
    /// Calculate success rate as percentage
    pub fn success_rate(&self) -> f64 {
        Self::percent(self.successful_operations, self.total_operations)
    }

    /// Calculate contention rate as percentage
    pub fn contention_rate(&self) -> f64 {
        Self::percent(self.contended_operations, self.total_operations)
    }

    /// Calculate failure rate as percentage
    pub fn failure_rate(&self) -> f64 {
        Self::percent(self.failed_operations, self.total_operations)
    }

    /// Get average operation time as Duration
    pub fn avg_operation_time(&self) -> Duration {
        Duration::from_nanos(self.avg_operation_time_ns)
    }

    /// Get maximum operation time as Duration
    pub fn max_operation_time(&self) -> Duration {
        Duration::from_nanos(self.max_operation_time_ns)
    }

    fn percent(part: u64, total: u64) -> f64 {
        if total == 0 {
            0.0
        } else {
            (part as f64 / total as f64) * 100.0
        }
    }
}

/// Internal atomic metrics collection
#[derive(Debug, Default)]
pub struct AtomicMetrics {
    total_operations: AtomicU64,
    successful_operations: AtomicU64,
    failed_operations: AtomicU64,
    contended_operations: AtomicU64,
    total_time_ns: AtomicU64,
    max_time_ns: AtomicU64,
    tail_helps: AtomicU64,
    local_inserts: AtomicU64,
    deleted_insertion_points: AtomicU64,
    local_insert_exhaustions: AtomicU64,
    stale_heads_skipped: AtomicU64,
}

impl AtomicMetrics {
    /// Record a successful operation with its duration
    pub fn record_success(&self, duration: Duration) {
        let duration_ns = duration.as_nanos() as u64;

        self.total_operations.fetch_add(1, Ordering::Relaxed);
        self.successful_operations.fetch_add(1, Ordering::Relaxed);
        self.total_time_ns.fetch_add(duration_ns, Ordering::Relaxed);
        self.max_time_ns.fetch_max(duration_ns, Ordering::Relaxed);
    }

    /// Record a pop that found nothing
    pub fn record_failure(&self) {
        self.total_operations.fetch_add(1, Ordering::Relaxed);
        self.failed_operations.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one algorithm event
    pub fn record_event(&self, event: QueueEvent) {
        let counter = match event {
            QueueEvent::TailHelped => &self.tail_helps,
            QueueEvent::CasRetry => &self.contended_operations,
            QueueEvent::LocalInsert => &self.local_inserts,
            QueueEvent::DeletedInsertionPoint => &self.deleted_insertion_points,
            QueueEvent::LocalInsertExhausted => &self.local_insert_exhaustions,
            QueueEvent::StaleHeadSkipped => &self.stale_heads_skipped,
            // counted by record_failure
            QueueEvent::EmptyPop => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> PerformanceMetrics {
        let total_ops = self.total_operations.load(Ordering::Relaxed);
        let successful_ops = self.successful_operations.load(Ordering::Relaxed);
        let total_time = self.total_time_ns.load(Ordering::Relaxed);

        PerformanceMetrics {
            total_operations: total_ops,
            successful_operations: successful_ops,
            failed_operations: self.failed_operations.load(Ordering::Relaxed),
            contended_operations: self.contended_operations.load(Ordering::Relaxed),
            avg_operation_time_ns: if successful_ops > 0 { total_time / successful_ops } else { 0 },
            max_operation_time_ns: self.max_time_ns.load(Ordering::Relaxed),
            tail_helps: self.tail_helps.load(Ordering::Relaxed),
            local_inserts: self.local_inserts.load(Ordering::Relaxed),
            deleted_insertion_points: self.deleted_insertion_points.load(Ordering::Relaxed),
            local_insert_exhaustions: self.local_insert_exhaustions.load(Ordering::Relaxed),
            stale_heads_skipped: self.stale_heads_skipped.load(Ordering::Relaxed),
        }
    }

    /// Reset all metrics
    pub fn reset(&self) {
        for counter in [
            &self.total_operations,
            &self.successful_operations,
            &self.failed_operations,
            &self.contended_operations,
            &self.total_time_ns,
            &self.max_time_ns,
            &self.tail_helps,
            &self.local_inserts,
            &self.deleted_insertion_points,
            &self.local_insert_exhaustions,
            &self.stale_heads_skipped,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Trait for data structures that support performance metrics
pub trait MetricsCollector {
    /// Get current performance metrics
    fn metrics(&self) -> PerformanceMetrics;

    /// Reset all metrics
    fn reset_metrics(&self);

    /// Enable or disable metrics collection
    fn set_metrics_enabled(&self, enabled: bool);

    /// Check if metrics collection is enabled
    fn is_metrics_enabled(&self) -> bool;
}

/// Everything a queue needs to report on itself: counters, the enable flag
/// and the user's observer.
#[derive(Debug)]
pub(crate) struct Instrumentation {
    metrics: AtomicMetrics,
    enabled: AtomicBool,
    observer: Option<Arc<dyn QueueObserver>>,
}

impl Instrumentation {
    pub(crate) fn new(enabled: bool) -> Self {
        Self {
            metrics: AtomicMetrics::default(),
            enabled: AtomicBool::new(enabled),
            observer: None,
        }
    }

    pub(crate) fn set_observer(&mut self, observer: Arc<dyn QueueObserver>) {
        self.observer = Some(observer);
    }

    #[inline]
    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Start timing an operation; `None` when metrics are off.
    #[inline]
    pub(crate) fn start(&self) -> Option<Instant> {
        self.is_enabled().then(Instant::now)
    }

    #[inline]
    pub(crate) fn success(&self, started: Option<Instant>) {
        if let Some(started) = started {
            self.metrics.record_success(started.elapsed());
        }
    }

    #[inline]
    pub(crate) fn empty(&self, started: Option<Instant>) {
        if started.is_some() {
            self.metrics.record_failure();
        }
        self.emit(QueueEvent::EmptyPop);
    }

    #[inline]
    pub(crate) fn emit(&self, event: QueueEvent) {
        tracing::trace!(target: "splice_queue::queue", event = event.as_str());
        if self.is_enabled() {
            self.metrics.record_event(event);
        }
        if let Some(observer) = &self.observer {
            observer.on_event(event);
        }
    }
}

impl MetricsCollector for Instrumentation {
    fn metrics(&self) -> PerformanceMetrics {
        self.metrics.snapshot()
    }

    fn reset_metrics(&self) {
        self.metrics.reset();
    }

    fn set_metrics_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    fn is_metrics_enabled(&self) -> bool {
        self.is_enabled()
    }
}
