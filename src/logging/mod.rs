//! Console output
//!
//! [`Logger`] prints leveled lines gated by the quiet and verbose switches.
//! Blob downloads report through the [`ProgressReporter`] seam.

pub mod progress;

pub use progress::{NoProgress, ProgressReporter, ProgressTracker};

use std::io::{self, Write};
use std::time::{Duration, Instant};

/// Logger responsible for all user-visible output
#[derive(Debug, Clone)]
pub struct Logger {
    pub verbose: bool,
    pub quiet: bool,
    pub start_time: Option<Instant>,
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(false)
    }
}

impl Logger {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            quiet: false,
            start_time: Some(Instant::now()),
        }
    }

    pub fn new_quiet() -> Self {
        Self {
            quiet: true,
            ..Self::new(false)
        }
    }

    fn emit(&self, marker: &str, message: &str) {
        if !self.quiet {
            println!("{}{}", marker, message);
        }
    }

    fn emit_verbose(&self, marker: &str, message: &str) {
        if self.verbose {
            self.emit(marker, message);
        }
    }

    /// One heading per image or command
    pub fn section(&self, title: &str) {
        self.emit("\n=== ", &format!("{} ===", title));
    }

    pub fn info(&self, message: &str) {
        self.emit("ℹ️  ", message);
    }

    pub fn step(&self, message: &str) {
        self.emit("▶️  ", message);
    }

    pub fn success(&self, message: &str) {
        self.emit("✅ ", message);
    }

    pub fn warning(&self, message: &str) {
        self.emit("⚠️  ", message);
    }

    /// Always shown, on stderr
    pub fn error(&self, message: &str) {
        eprintln!("❌ {}", message);
    }

    /// Verbose mode only
    pub fn detail(&self, message: &str) {
        self.emit_verbose("   ", message);
    }

    /// Verbose mode only, for wire-level details
    pub fn debug(&self, message: &str) {
        self.emit_verbose("   [debug] ", message);
    }

    /// Rewrites the current line; finish with [`Logger::progress_done`]
    pub fn progress(&self, message: &str) {
        if !self.quiet {
            print!("\r\x1b[K⏳ {}", message);
            let _ = io::stdout().flush();
        }
    }

    pub fn progress_done(&self) {
        self.emit("", "");
    }

    /// Titled block of `key: value` lines
    pub fn summary_kv(&self, title: &str, items: &[(&str, String)]) {
        self.emit("\n", &format!("{}:", title));
        for (key, value) in items {
            self.emit("  ", &format!("{:<16}{}", format!("{}:", key), value));
        }
    }

    /// Format file size in human-readable units
    pub fn format_size(&self, bytes: u64) -> String {
        if bytes < 1024 {
            format!("{} B", bytes)
        } else if bytes < 1024 * 1024 {
            format!("{:.1} KB", bytes as f64 / 1024.0)
        } else if bytes < 1024 * 1024 * 1024 {
            format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
        } else {
            format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
        }
    }

    /// Format duration in human-readable format
    pub fn format_duration(&self, duration: Duration) -> String {
        let secs = duration.as_secs();
        if secs < 60 {
            format!("{}s", secs)
        } else if secs < 3600 {
            format!("{}m{}s", secs / 60, secs % 60)
        } else {
            format!("{}h{}m{}s", secs / 3600, (secs % 3600) / 60, secs % 60)
        }
    }

    /// Time since the logger was created
    pub fn elapsed(&self) -> Duration {
        self.start_time
            .map(|start| start.elapsed())
            .unwrap_or_default()
    }
}
