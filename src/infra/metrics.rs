//! Lock-free metrics collection and periodic reporting
//!
//! Counter updates are lock-free atomics; only `report()` touches the
//! mutex-guarded report clock.
//!
//! NOTE: All atomics use Relaxed ordering intentionally—these are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Exponential bucket boundaries for run duration (microseconds)
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
const BUCKET_BOUNDS: [u64; 10] = [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
pub const METRICS_NUM_BUCKETS: usize = 11;

/// Compute bucket index for a duration using binary search
#[inline]
fn bucket_index(duration_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < duration_us)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Swap all buckets to zero and return their values
#[inline]
fn swap_buckets(buckets: &[AtomicU64; METRICS_NUM_BUCKETS]) -> [u64; METRICS_NUM_BUCKETS] {
    let mut result = [0u64; METRICS_NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; METRICS_NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = ((total as f64 * percentile).ceil() as u64).max(1);
    let mut cumulative = 0u64;

    // Upper bounds for each bucket (last bucket uses 2x the previous bound)
    const BUCKET_UPPER_BOUNDS: [u64; METRICS_NUM_BUCKETS] =
        [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200, 102400];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[METRICS_NUM_BUCKETS - 1]
}

/// Lock-free metrics collector
pub struct Metrics {
    /// Completed runs (monotonic)
    runs_total: AtomicU64,
    /// Visitor decisions made (monotonic)
    decisions_total: AtomicU64,
    /// Decisions that enrolled the visitor (monotonic)
    enrolled_total: AtomicU64,
    /// Decisions that turned the feature on (monotonic)
    enabled_total: AtomicU64,
    /// Audit records dropped due to channel full (monotonic)
    audit_dropped: AtomicU64,
    /// Snapshots installed (monotonic)
    snapshot_updates: AtomicU64,
    /// Snapshot refreshes that failed or were rejected (monotonic)
    snapshot_failures: AtomicU64,
    /// Runs since last report (reset on report)
    runs_since_report: AtomicU64,
    /// Run duration histogram (reset on report)
    run_duration_buckets: [AtomicU64; METRICS_NUM_BUCKETS],
    /// Sum of run durations (reset on report)
    run_duration_sum_us: AtomicU64,
    /// Max run duration (reset on report)
    run_duration_max_us: AtomicU64,
    /// Last report time (only accessed from reporter)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            runs_total: AtomicU64::new(0),
            decisions_total: AtomicU64::new(0),
            enrolled_total: AtomicU64::new(0),
            enabled_total: AtomicU64::new(0),
            audit_dropped: AtomicU64::new(0),
            snapshot_updates: AtomicU64::new(0),
            snapshot_failures: AtomicU64::new(0),
            runs_since_report: AtomicU64::new(0),
            run_duration_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            run_duration_sum_us: AtomicU64::new(0),
            run_duration_max_us: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Record a completed run (lock-free)
    #[inline]
    pub fn record_run(&self, decisions: u64, enrolled: u64, enabled: u64, duration_us: u64) {
        self.runs_total.fetch_add(1, Ordering::Relaxed);
        self.runs_since_report.fetch_add(1, Ordering::Relaxed);
        self.decisions_total.fetch_add(decisions, Ordering::Relaxed);
        self.enrolled_total.fetch_add(enrolled, Ordering::Relaxed);
        self.enabled_total.fetch_add(enabled, Ordering::Relaxed);

        self.run_duration_buckets[bucket_index(duration_us)].fetch_add(1, Ordering::Relaxed);
        self.run_duration_sum_us.fetch_add(duration_us, Ordering::Relaxed);
        update_atomic_max(&self.run_duration_max_us, duration_us);
    }

    #[inline]
    pub fn record_audit_dropped(&self) {
        self.audit_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_snapshot_update(&self) {
        self.snapshot_updates.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_snapshot_failure(&self) {
        self.snapshot_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn runs_total(&self) -> u64 {
        self.runs_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn decisions_total(&self) -> u64 {
        self.decisions_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn audit_dropped(&self) -> u64 {
        self.audit_dropped.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn snapshot_failures(&self) -> u64 {
        self.snapshot_failures.load(Ordering::Relaxed)
    }

    /// Calculate and return metrics summary, then reset periodic counters
    pub fn report(&self) -> MetricsSummary {
        let runs_count = self.runs_since_report.swap(0, Ordering::Relaxed);
        let duration_sum = self.run_duration_sum_us.swap(0, Ordering::Relaxed);
        let duration_max = self.run_duration_max_us.swap(0, Ordering::Relaxed);
        let duration_buckets = swap_buckets(&self.run_duration_buckets);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let decisions_total = self.decisions_total.load(Ordering::Relaxed);
        let enrolled_total = self.enrolled_total.load(Ordering::Relaxed);

        MetricsSummary {
            runs_total: self.runs_total.load(Ordering::Relaxed),
            runs_since_report: runs_count,
            elapsed_secs: elapsed.as_secs_f64(),
            decisions_total,
            enrolled_total,
            enabled_total: self.enabled_total.load(Ordering::Relaxed),
            enrolled_pct: if decisions_total > 0 {
                enrolled_total as f64 / decisions_total as f64 * 100.0
            } else {
                0.0
            },
            audit_dropped: self.audit_dropped.load(Ordering::Relaxed),
            snapshot_updates: self.snapshot_updates.load(Ordering::Relaxed),
            snapshot_failures: self.snapshot_failures.load(Ordering::Relaxed),
            run_duration_buckets: duration_buckets,
            run_avg_us: if runs_count > 0 { duration_sum / runs_count } else { 0 },
            run_max_us: duration_max,
            run_p99_us: percentile_from_buckets(&duration_buckets, 0.99),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub runs_total: u64,
    pub runs_since_report: u64,
    pub elapsed_secs: f64,
    pub decisions_total: u64,
    pub enrolled_total: u64,
    pub enabled_total: u64,
    pub enrolled_pct: f64,
    pub audit_dropped: u64,
    pub snapshot_updates: u64,
    pub snapshot_failures: u64,
    /// Run duration histogram buckets (µs)
    pub run_duration_buckets: [u64; METRICS_NUM_BUCKETS],
    pub run_avg_us: u64,
    pub run_max_us: u64,
    pub run_p99_us: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            runs_total = %self.runs_total,
            runs = %self.runs_since_report,
            decisions_total = %self.decisions_total,
            enrolled_total = %self.enrolled_total,
            enabled_total = %self.enabled_total,
            enrolled_pct = format!("{:.1}", self.enrolled_pct),
            audit_dropped = %self.audit_dropped,
            snapshot_updates = %self.snapshot_updates,
            snapshot_failures = %self.snapshot_failures,
            run_avg_us = %self.run_avg_us,
            run_max_us = %self.run_max_us,
            run_p99_us = %self.run_p99_us,
            "metrics"
        );
    }
}
