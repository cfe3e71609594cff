//! Interval-based progress logging for record streams.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use log::info;

use crate::logging::{format_count, format_duration};

/// Logs a line each time the record count crosses a multiple of the interval.
///
/// Counts are added a batch at a time, so a single call may cross several
/// boundaries; each one is logged. Safe to share between threads.
///
/// ```
/// use parbam_lib::progress::ProgressTracker;
///
/// let tracker = ProgressTracker::new("Decoded records").with_interval(100);
/// tracker.add(250); // logs at 100 and 200
/// tracker.log_final(); // logs 250 (complete)
/// assert_eq!(tracker.count(), 250);
/// ```
pub struct ProgressTracker {
    interval: u64,
    message: String,
    count: AtomicU64,
    start: Instant,
}

impl ProgressTracker {
    /// Create a tracker with the default interval of 1,000,000 records.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            interval: 1_000_000,
            message: message.into(),
            count: AtomicU64::new(0),
            start: Instant::now(),
        }
    }

    /// Set the logging interval. Zero disables interval logging.
    #[must_use]
    pub fn with_interval(mut self, interval: u64) -> Self {
        self.interval = interval;
        self
    }

    /// Add `additional` records, logging every interval boundary crossed.
    ///
    /// Returns `true` if the new count lies exactly on a boundary.
    pub fn add(&self, additional: u64) -> bool {
        if self.interval == 0 {
            self.count.fetch_add(additional, Ordering::Relaxed);
            return false;
        }

        let prev = self.count.fetch_add(additional, Ordering::Relaxed);
        let count = prev + additional;
        for i in (prev / self.interval + 1)..=(count / self.interval) {
            info!(
                "{} {} (elapsed {})",
                self.message,
                format_count(i * self.interval),
                format_duration(self.start.elapsed())
            );
        }
        count > 0 && count.is_multiple_of(self.interval)
    }

    /// Log the final count unless the last `add` already logged it.
    pub fn log_final(&self) {
        let count = self.count();
        if count == 0 || (self.interval > 0 && count.is_multiple_of(self.interval)) {
            return;
        }
        info!(
            "{} {} (complete in {})",
            self.message,
            format_count(count),
            format_duration(self.start.elapsed())
        );
    }

    /// Get the current count.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let tracker = ProgressTracker::new("Records");
        assert_eq!(tracker.interval, 1_000_000);
        assert_eq!(tracker.count(), 0);
    }

    #[test]
    fn test_add_reports_boundaries() {
        let tracker = ProgressTracker::new("Records").with_interval(10);
        assert!(!tracker.add(5));
        assert!(tracker.add(5));
        assert!(!tracker.add(25));
        assert!(tracker.add(5));
        assert_eq!(tracker.count(), 40);
        tracker.log_final();
    }

    #[test]
    fn test_zero_interval() {
        let tracker = ProgressTracker::new("Records").with_interval(0);
        assert!(!tracker.add(100));
        assert_eq!(tracker.count(), 100);
        tracker.log_final();
    }

    #[test]
    fn test_shared_between_threads() {
        use std::sync::Arc;
        use std::thread;

        let tracker = Arc::new(ProgressTracker::new("Records").with_interval(1000));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                thread::spawn(move || {
                    for _ in 0..125 {
                        tracker.add(1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(tracker.count(), 1000);
    }
}
