//! Supervised live logging sessions

mod counters;
mod listener;
mod retry;
mod supervisor;

pub use counters::SessionCounters;
pub use retry::RetryPolicy;
pub use supervisor::{LogSession, SessionConfig, StopHandle};
