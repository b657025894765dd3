//! Progress tracking for blob downloads

use crate::logging::Logger;
use std::time::{Duration, Instant};

/// Callback interface for byte-level download progress
pub trait ProgressReporter: Send {
    /// A transfer named `name` is starting; `total` is 0 when unknown
    fn start(&mut self, name: &str, total: u64);

    /// `processed` is the running byte count for the current transfer
    fn advance(&mut self, processed: u64);

    fn finish(&mut self);
}

/// Discards all progress events
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn start(&mut self, _name: &str, _total: u64) {}

    fn advance(&mut self, _processed: u64) {}

    fn finish(&mut self) {}
}

/// Prints throttled percentage lines through a [`Logger`]
pub struct ProgressTracker {
    total_size: u64,
    start_time: Instant,
    last_update: Instant,
    last_reported: u64,
    processed: u64,
    output: Logger,
    operation_name: String,
}

impl ProgressTracker {
    pub fn new(output: Logger) -> Self {
        Self {
            total_size: 0,
            start_time: Instant::now(),
            last_update: Instant::now(),
            last_reported: 0,
            processed: 0,
            output,
            operation_name: String::new(),
        }
    }

    fn report(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.start_time).as_secs();
        let speed = if elapsed > 0 { self.processed / elapsed } else { 0 };

        let line = if self.total_size > 0 {
            let percent = (self.processed as f64 / self.total_size as f64 * 100.0).min(100.0);
            format!(
                "{}: {:.0}% ({}/{}) - {}/s",
                self.operation_name,
                percent,
                self.output.format_size(self.processed),
                self.output.format_size(self.total_size),
                self.output.format_size(speed)
            )
        } else {
            format!(
                "{}: {} - {}/s",
                self.operation_name,
                self.output.format_size(self.processed),
                self.output.format_size(speed)
            )
        };
        self.output.progress(&line);

        self.last_update = now;
        self.last_reported = self.processed;
    }
}

impl ProgressReporter for ProgressTracker {
    fn start(&mut self, name: &str, total: u64) {
        let now = Instant::now();
        self.operation_name = name.to_string();
        self.total_size = total;
        self.processed = 0;
        self.last_reported = 0;
        self.start_time = now;
        self.last_update = now;
        self.report(now);
    }

    fn advance(&mut self, processed: u64) {
        self.processed = processed;

        // Every 2 seconds, every 10MB, or every 5% of the total
        let size_threshold = if self.total_size > 0 {
            std::cmp::min(10 * 1024 * 1024, std::cmp::max(self.total_size / 20, 1))
        } else {
            10 * 1024 * 1024
        };

        let now = Instant::now();
        if now.duration_since(self.last_update) >= Duration::from_secs(2)
            || processed.saturating_sub(self.last_reported) >= size_threshold
        {
            self.report(now);
        }
    }

    fn finish(&mut self) {
        if self.total_size == 0 {
            self.total_size = self.processed;
        }
        self.report(Instant::now());
        self.output.progress_done();
    }
}
