//! Worker statistics
//!
//! Each worker tracks how many tasks it ran, how many of those failed, and
//! the execution latency of every attempt. The coordinator never sees these
//! numbers; they are printed by the worker itself when it stops.

use hdrhistogram::Histogram;
use std::time::Duration;

use crate::util::time::format_duration;

/// Latency histogram wrapper
///
/// Wraps HdrHistogram with a convenient interface for recording and querying
/// task execution latencies. The histogram tracks values from 1 nanosecond to
/// 1 hour with 3 significant digits of precision, which keeps recording and
/// percentile queries O(1) at roughly 2KB of memory per histogram.
///
/// # Example
///
/// ```
/// use taskfarm::stats::LatencyHistogram;
/// use std::time::Duration;
///
/// let mut hist = LatencyHistogram::new();
/// hist.record(Duration::from_micros(100));
/// hist.record(Duration::from_micros(200));
///
/// if let Some(p99) = hist.percentile(99.0) {
///     println!("p99 latency: {:?}", p99);
/// }
/// ```
#[derive(Debug)]
pub struct LatencyHistogram {
    histogram: Histogram<u64>,
}

impl LatencyHistogram {
    /// Create a new latency histogram
    pub fn new() -> Self {
        // 1ns to 1 hour, 3 significant digits
        let histogram = Histogram::new_with_bounds(1, 3_600_000_000_000, 3)
            .expect("Failed to create histogram with valid bounds");

        Self { histogram }
    }

    /// Record a latency sample
    ///
    /// Values outside the histogram's range are clamped to the nearest valid
    /// value.
    #[inline]
    pub fn record(&mut self, latency: Duration) {
        let nanos = latency.as_nanos() as u64;
        let value = nanos.clamp(1, 3_600_000_000_000);
        let _ = self.histogram.record(value);
    }

    /// Get the value at a specific percentile (0.0 - 100.0)
    ///
    /// Returns None if the histogram is empty.
    pub fn percentile(&self, percentile: f64) -> Option<Duration> {
        if self.histogram.len() == 0 {
            return None;
        }

        let value = self.histogram.value_at_percentile(percentile);
        Some(Duration::from_nanos(value))
    }

    /// Get the minimum recorded latency, or None if empty
    pub fn min(&self) -> Option<Duration> {
        if self.histogram.len() == 0 {
            return None;
        }
        Some(Duration::from_nanos(self.histogram.min()))
    }

    /// Get the maximum recorded latency, or None if empty
    pub fn max(&self) -> Option<Duration> {
        if self.histogram.len() == 0 {
            return None;
        }
        Some(Duration::from_nanos(self.histogram.max()))
    }

    /// Get the mean latency, or None if empty
    pub fn mean(&self) -> Option<Duration> {
        if self.histogram.len() == 0 {
            return None;
        }
        Some(Duration::from_nanos(self.histogram.mean() as u64))
    }

    /// Get the number of samples recorded
    pub fn len(&self) -> u64 {
        self.histogram.len()
    }

    /// Check if the histogram is empty
    pub fn is_empty(&self) -> bool {
        self.histogram.len() == 0
    }
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-worker run statistics
///
/// Counts every task attempt regardless of outcome. A failed execution is
/// still an attempt; the worker keeps requesting work after it.
#[derive(Debug, Default)]
pub struct WorkerStats {
    tasks: u64,
    failures: u64,
    latency: LatencyHistogram,
}

impl WorkerStats {
    /// Create empty statistics
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successfully executed task
    pub fn record_success(&mut self, latency: Duration) {
        self.tasks += 1;
        self.latency.record(latency);
    }

    /// Record a failed task execution
    pub fn record_failure(&mut self, latency: Duration) {
        self.tasks += 1;
        self.failures += 1;
        self.latency.record(latency);
    }

    /// Total task attempts (successes and failures)
    pub fn tasks(&self) -> u64 {
        self.tasks
    }

    /// Failed attempts
    pub fn failures(&self) -> u64 {
        self.failures
    }

    /// Successful attempts
    pub fn successes(&self) -> u64 {
        self.tasks - self.failures
    }

    /// Execution latency histogram across all attempts
    pub fn latency(&self) -> &LatencyHistogram {
        &self.latency
    }

    /// One-line tally for the worker's shutdown message
    pub fn summary(&self) -> String {
        if self.tasks == 0 {
            return "0 tasks".to_string();
        }

        let mut line = format!("{} tasks", self.tasks);
        if self.failures > 0 {
            line.push_str(&format!(" ({} failed)", self.failures));
        }
        if let (Some(mean), Some(p99)) = (self.latency.mean(), self.latency.percentile(99.0)) {
            line.push_str(&format!(
                ", mean {}, p99 {}",
                format_duration(mean),
                format_duration(p99)
            ));
        }
        line
    }
}
