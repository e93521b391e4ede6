//! Terminal rendering of session and transfer events

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use ecu_diag::EventSink;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Prints operator messages above a progress bar (transfers) or a capture
/// spinner (live logging)
pub struct ProgressSink {
    bar: ProgressBar,
    transfer: AtomicBool,
    errors: AtomicU64,
}

impl ProgressSink {
    pub fn new() -> Self {
        Self {
            bar: ProgressBar::hidden(),
            transfer: AtomicBool::new(false),
            errors: AtomicU64::new(0),
        }
    }

    /// Print a line without tearing the bar
    pub fn println(&self, line: impl AsRef<str>) {
        self.bar.suspend(|| println!("{}", line.as_ref()));
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }

    fn show(&self, style: ProgressStyle) {
        if self.bar.is_hidden() {
            self.bar.set_draw_target(ProgressDrawTarget::stderr());
        }
        self.bar.set_style(style);
    }
}

impl Default for ProgressSink {
    fn default() -> Self {
        Self::new()
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .map(|style| style.progress_chars("=>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

impl EventSink for ProgressSink {
    fn on_message(&self, message: &str) {
        self.println(message);
    }

    fn on_progress(&self, value: i64) {
        if value < 0 {
            self.transfer.store(true, Ordering::Relaxed);
            self.show(bar_style());
            self.bar.reset();
            self.bar.set_length(value.unsigned_abs());
        } else {
            self.bar.set_position(value as u64);
        }
    }

    fn set_capture_count(&self, count: u64) {
        if self.transfer.load(Ordering::Relaxed) {
            return;
        }
        self.show(spinner_style());
        self.bar.set_message(format!(
            "{} captures, {} errors",
            count,
            self.errors.load(Ordering::Relaxed)
        ));
        self.bar.tick();
    }

    fn set_error_count(&self, count: u64) {
        self.errors.store(count, Ordering::Relaxed);
    }
}
