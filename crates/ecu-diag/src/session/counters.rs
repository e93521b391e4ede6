//! Counters shared by the poll loop and the watchdog

use std::sync::atomic::{AtomicU64, Ordering};

/// Error and capture counters of a logging session
#[derive(Debug, Default)]
pub struct SessionCounters {
    errors: AtomicU64,
    errors_this_second: AtomicU64,
    captures: AtomicU64,
}

impl SessionCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one failed tick; returns the new total
    pub fn record_error(&self) -> u64 {
        self.errors_this_second.fetch_add(1, Ordering::Relaxed);
        self.errors.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Errors since the previous call, resetting the window
    pub fn take_errors_per_second(&self) -> u64 {
        self.errors_this_second.swap(0, Ordering::Relaxed)
    }

    /// Count one logged tick; returns the new total
    pub fn record_capture(&self) -> u64 {
        self.captures.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn captures(&self) -> u64 {
        self.captures.load(Ordering::Relaxed)
    }
}
