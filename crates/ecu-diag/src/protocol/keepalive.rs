//! Tester present keepalive for GMLAN sessions

use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use super::DiagClient;

/// GMLAN TesterPresent, sent without expecting a response
const TESTER_PRESENT: [u8; 1] = [0x3E];

/// Background task keeping a diagnostic session alive
#[derive(Default)]
pub struct KeepAlive {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl KeepAlive {
    /// Start (or restart) sending tester present every `interval`
    pub fn start(&self, client: DiagClient, interval: Duration) {
        self.stop();

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                match client.send_only(&TESTER_PRESENT).await {
                    Ok(()) => debug!("Tester present sent"),
                    Err(e) => warn!(?e, "Tester present failed"),
                }
            }
        });

        *self.handle.lock() = Some(handle);
        debug!(interval_ms = interval.as_millis() as u64, "Keepalive started");
    }

    pub fn stop(&self) {
        if let Some(handle) = self.handle.lock().take() {
            handle.abort();
            debug!("Keepalive stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.lock().is_some()
    }
}

impl Drop for KeepAlive {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.get_mut().take() {
            handle.abort();
        }
    }
}
