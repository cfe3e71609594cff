//! Formatting helpers for log output and decode summaries.

use std::time::{Duration, Instant};

use log::info;

/// Formats a count with thousands separators.
///
/// ```
/// use parbam_lib::logging::format_count;
///
/// assert_eq!(format_count(1_234_567), "1,234,567");
/// assert_eq!(format_count(999), "999");
/// ```
#[must_use]
pub fn format_count(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Formats a byte count with a decimal unit.
///
/// ```
/// use parbam_lib::logging::format_bytes;
///
/// assert_eq!(format_bytes(512), "512 B");
/// assert_eq!(format_bytes(1_500_000), "1.5 MB");
/// ```
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    if bytes >= 1_000_000_000 {
        format!("{:.2} GB", bytes as f64 / 1_000_000_000.0)
    } else if bytes >= 1_000_000 {
        format!("{:.1} MB", bytes as f64 / 1_000_000.0)
    } else if bytes >= 1_000 {
        format!("{:.1} KB", bytes as f64 / 1_000.0)
    } else {
        format!("{bytes} B")
    }
}

/// Formats a duration in human-readable form.
///
/// ```
/// use parbam_lib::logging::format_duration;
/// use std::time::Duration;
///
/// assert_eq!(format_duration(Duration::from_millis(250)), "0.25s");
/// assert_eq!(format_duration(Duration::from_secs(135)), "2m 15s");
/// assert_eq!(format_duration(Duration::from_secs(5400)), "1h 30m");
/// ```
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 10 {
        format!("{:.2}s", duration.as_secs_f64())
    } else if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        let mins = secs / 60;
        let remaining_secs = secs % 60;
        if remaining_secs == 0 { format!("{mins}m") } else { format!("{mins}m {remaining_secs}s") }
    } else {
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        if mins == 0 { format!("{hours}h") } else { format!("{hours}h {mins}m") }
    }
}

/// Formats a rate of `unit`s per second.
///
/// ```
/// use parbam_lib::logging::format_rate;
/// use std::time::Duration;
///
/// assert_eq!(format_rate(1000, Duration::from_secs(1), "records"), "1,000 records/s");
/// assert_eq!(format_rate(30, Duration::from_secs(60), "blocks"), "30.0 blocks/min");
/// ```
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn format_rate(count: u64, duration: Duration, unit: &str) -> String {
    let secs = duration.as_secs_f64();
    if secs < 0.001 {
        return format!("{} {unit}/s", format_count(count));
    }

    let rate = count as f64 / secs;
    if rate >= 1.0 {
        format!("{} {unit}/s", format_count(rate as u64))
    } else {
        format!("{:.1} {unit}/min", count as f64 / (secs / 60.0))
    }
}

/// Totals collected while draining a decoder.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DecodeSummary {
    /// Compressed blocks read, including the EOF marker.
    pub blocks: u64,
    /// Batches handed to the consumer.
    pub batches: u64,
    /// Records decoded.
    pub records: u64,
    /// Record bytes, excluding length prefixes.
    pub record_bytes: u64,
}

impl DecodeSummary {
    /// Account for one batch.
    pub fn add_batch(&mut self, records: usize, record_bytes: usize) {
        self.batches += 1;
        self.records += records as u64;
        self.record_bytes += record_bytes as u64;
    }
}

/// Logs a formatted summary of a finished decode.
pub fn log_decode_summary(summary: &DecodeSummary, elapsed: Duration) {
    info!("Decode Summary:");
    info!("  Blocks: {}", format_count(summary.blocks));
    info!("  Batches: {}", format_count(summary.batches));
    info!("  Records: {}", format_count(summary.records));
    info!("  Record bytes: {}", format_bytes(summary.record_bytes));
    if summary.records > 0 {
        info!("  Mean record size: {:.1} B", summary.record_bytes as f64 / summary.records as f64);
    }
    info!("  Throughput: {}", format_rate(summary.records, elapsed, "records"));
}

/// Times an operation and logs its start and completion.
///
/// ```no_run
/// use parbam_lib::logging::OperationTimer;
///
/// let timer = OperationTimer::new("Decoding records");
/// // ... do work ...
/// timer.log_completion(10_000);
/// ```
pub struct OperationTimer {
    operation: String,
    start_time: Instant,
}

impl OperationTimer {
    /// Creates a new operation timer and logs the start.
    #[must_use]
    pub fn new(operation: &str) -> Self {
        info!("{operation} ...");
        Self { operation: operation.to_string(), start_time: Instant::now() }
    }

    /// Time since the timer was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Logs the completion with record count and rate.
    pub fn log_completion(&self, records: u64) {
        let duration = self.elapsed();
        info!(
            "{} completed: {} records in {} ({})",
            self.operation,
            format_count(records),
            format_duration(duration),
            format_rate(records, duration, "records")
        );
    }
}
