//! Outbound notifications to the embedding application
//!
//! A session or transfer reports operator messages, progress and counters
//! through an [`EventSink`]. `set_value` runs at bus frequency and must stay
//! cheap.

use tracing::{debug, info};

/// Receiver of session and transfer events
pub trait EventSink: Send + Sync {
    /// Human readable status line
    fn on_message(&self, message: &str);

    /// Progress report; a negative value begins an N-step sequence, then
    /// 0..=N report completed steps
    fn on_progress(&self, value: i64);

    /// A decoded signal value
    fn set_value(&self, _name: &str, _value: f64) {}

    /// Successful ticks so far
    fn set_capture_count(&self, _count: u64) {}

    /// Failed reads so far
    fn set_error_count(&self, _count: u64) {}

    /// Failed reads within the last second
    fn set_errors_per_second(&self, _count: u64) {}
}

/// Forwards everything to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn on_message(&self, message: &str) {
        info!("{}", message);
    }

    fn on_progress(&self, value: i64) {
        debug!(progress = value, "Progress");
    }

    fn set_capture_count(&self, count: u64) {
        debug!(count, "Captured");
    }

    fn set_error_count(&self, count: u64) {
        debug!(count, "Read errors");
    }

    fn set_errors_per_second(&self, count: u64) {
        if count > 0 {
            debug!(count, "Read errors in the last second");
        }
    }
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn on_message(&self, _message: &str) {}

    fn on_progress(&self, _value: i64) {}
}
