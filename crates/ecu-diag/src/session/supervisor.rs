//! Live logging session supervisor
//!
//! One attempt runs the handshake, programs the register and then two tasks
//! under a shared cancellation scope:
//!
//! - the poll loop reads the register at the configured frequency, decodes
//!   it, publishes the values and appends a log line;
//! - the watchdog checks the per-second error count once a second.
//!
//! Whichever finishes first ends the attempt. The retry policy then decides
//! whether another attempt follows.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use ecu_vars::VariableRegistry;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::counters::SessionCounters;
use super::listener::spawn_broadcast_listener;
use super::retry::RetryPolicy;
use crate::config::{validate_frequency, EcuKind, FirmwareConfig, SupervisorConfig};
use crate::error::EcuError;
use crate::events::{EventSink, TracingSink};
use crate::logfile::LogWriter;
use crate::protocol::{create_driver, DriverOptions, EcuDriver};
use crate::signals::{SignalHub, SignalMap, SignalUpdate};
use crate::transport::CanTransport;

const WATCHDOG_PERIOD: Duration = Duration::from_secs(1);

/// Everything a logging session needs
#[derive(Clone)]
pub struct SessionConfig {
    pub kind: EcuKind,
    pub transport: Arc<dyn CanTransport>,
    pub variables: Arc<VariableRegistry>,
    pub frequency_hz: u32,
    pub log_dir: PathBuf,
    pub sink: Arc<dyn EventSink>,
    pub hub: SignalHub,
    pub supervisor: SupervisorConfig,
}

impl SessionConfig {
    pub fn new(
        kind: EcuKind,
        transport: Arc<dyn CanTransport>,
        variables: Arc<VariableRegistry>,
    ) -> Self {
        Self {
            kind,
            transport,
            variables,
            frequency_hz: 20,
            log_dir: PathBuf::from("logs"),
            sink: Arc::new(TracingSink),
            hub: SignalHub::new(),
            supervisor: SupervisorConfig::default(),
        }
    }
}

/// Requests a graceful stop of a running session
#[derive(Debug, Clone)]
pub struct StopHandle {
    token: CancellationToken,
}

impl StopHandle {
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }
}

enum AttemptFailure {
    /// The handshake failed
    Start(EcuError),
    /// The session was up and failed later
    Session(EcuError),
}

/// A live logging session
///
/// A session runs once: after a stop, `start` returns immediately.
pub struct LogSession {
    config: SessionConfig,
    driver: Arc<dyn EcuDriver>,
    stop: CancellationToken,
    counters: Arc<SessionCounters>,
    map: SignalMap,
}

impl LogSession {
    /// Session with the driver for `config.kind`
    pub fn new(config: SessionConfig) -> Result<Self, EcuError> {
        let options = DriverOptions::from_config(&config.supervisor, &FirmwareConfig::default());
        let driver = create_driver(config.kind, config.transport.clone(), options);
        Self::with_driver(config, driver)
    }

    pub fn with_driver(config: SessionConfig, driver: Arc<dyn EcuDriver>) -> Result<Self, EcuError> {
        validate_frequency(config.frequency_hz)?;
        if config.variables.is_empty() {
            return Err(EcuError::Configuration("no variables to log".to_string()));
        }
        let map = match driver.broadcast_decoder() {
            Some(decoder) => SignalMap::with_values(decoder.initial_signals()),
            None => SignalMap::new(),
        };
        Ok(Self {
            config,
            driver,
            stop: CancellationToken::new(),
            counters: Arc::new(SessionCounters::new()),
            map,
        })
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            token: self.stop.clone(),
        }
    }

    pub fn stop(&self) {
        self.stop.cancel();
    }

    pub fn counters(&self) -> &SessionCounters {
        &self.counters
    }

    pub fn signal_map(&self) -> &SignalMap {
        &self.map
    }

    pub fn driver(&self) -> &Arc<dyn EcuDriver> {
        &self.driver
    }

    /// Log until stopped or a failure the retry policy gives up on
    ///
    /// Returns `Ok` after a requested stop. Every task the session spawned
    /// has finished by the time this returns.
    pub async fn start(&self) -> Result<(), EcuError> {
        let writer = LogWriter::create(&self.config.log_dir, self.config.kind)?;
        let sink = &self.config.sink;
        sink.on_message(&format!("Logging to {}", writer.path().display()));
        let writer = Arc::new(Mutex::new(writer));

        let listener_scope = self.stop.child_token();
        let listener = self.driver.broadcast_decoder().map(|decoder| {
            spawn_broadcast_listener(
                &self.config.transport,
                decoder,
                self.map.clone(),
                self.config.hub.clone(),
                sink.clone(),
                listener_scope.clone(),
            )
        });

        let result = self.run_attempts(&writer).await;

        listener_scope.cancel();
        if let Some(handle) = listener {
            join_quietly(handle).await;
        }

        let synced = writer.lock().sync();
        match (&result, synced) {
            (Ok(()), Err(e)) => return Err(e),
            (Err(_), Err(e)) => warn!(error = %e, "Failed to sync log file"),
            _ => {}
        }
        info!(
            captures = self.counters.captures(),
            errors = self.counters.errors(),
            "Logging session finished"
        );
        result
    }

    async fn run_attempts(&self, writer: &Arc<Mutex<LogWriter>>) -> Result<(), EcuError> {
        let policy = RetryPolicy::from_config(&self.config.supervisor);
        let sink = &self.config.sink;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let failure = match self.run_attempt(writer).await {
                Ok(()) => {
                    sink.on_message("Stop logging...");
                    return Ok(());
                }
                Err(failure) => failure,
            };

            let (error, fatal) = match failure {
                AttemptFailure::Start(e) => (e, attempt == 1),
                AttemptFailure::Session(e) => (e, false),
            };

            if self.stop.is_cancelled() {
                debug!(error = %error, "Attempt failed while stopping");
                sink.on_message("Stop logging...");
                return Ok(());
            }
            if fatal || !policy.should_retry(attempt, &error) {
                return Err(error);
            }

            sink.on_message(&format!("Retry {}: {}", attempt, error));
            tokio::select! {
                biased;
                _ = self.stop.cancelled() => {
                    sink.on_message("Stop logging...");
                    return Ok(());
                }
                _ = tokio::time::sleep(policy.delay()) => {}
            }
        }
    }

    async fn run_attempt(&self, writer: &Arc<Mutex<LogWriter>>) -> Result<(), AttemptFailure> {
        let sink = &self.config.sink;

        let started = tokio::select! {
            biased;
            _ = self.stop.cancelled() => return Ok(()),
            r = self.driver.start_session() => r,
        };
        started.map_err(AttemptFailure::Start)?;
        sink.on_message("Connected to ECU");

        if let Err(e) = self.driver.configure_register(&self.config.variables).await {
            self.stop_session().await;
            return Err(AttemptFailure::Session(e));
        }
        sink.on_message("Configured dynamic register");
        sink.on_message(&format!("Live logging at {} fps", self.config.frequency_hz));

        let scope = self.stop.child_token();
        let _guard = scope.clone().drop_guard();

        // Failures of an earlier attempt belong to its own window
        self.counters.take_errors_per_second();

        let mut poll = tokio::spawn(poll_loop(PollContext {
            driver: self.driver.clone(),
            variables: self.config.variables.clone(),
            map: self.map.clone(),
            hub: self.config.hub.clone(),
            sink: sink.clone(),
            counters: self.counters.clone(),
            writer: writer.clone(),
            period: tick_period(self.config.frequency_hz),
            capture_report_interval: self.config.supervisor.capture_report_interval.max(1),
            scope: scope.clone(),
        }));
        let mut watchdog = tokio::spawn(watchdog(
            self.counters.clone(),
            sink.clone(),
            self.config.supervisor.max_errors_per_second,
            scope.clone(),
        ));

        let first = tokio::select! {
            r = &mut poll => Finished::Poll(r),
            r = &mut watchdog => Finished::Watchdog(r),
        };
        scope.cancel();
        let (poll_result, watchdog_result) = match first {
            Finished::Poll(r) => (r, watchdog.await),
            Finished::Watchdog(r) => (poll.await, r),
        };

        self.stop_session().await;

        unwrap_task(poll_result)
            .and(unwrap_task(watchdog_result))
            .map_err(AttemptFailure::Session)
    }

    async fn stop_session(&self) {
        if let Err(e) = self.driver.stop_session().await {
            debug!(error = %e, "Stop session failed");
        }
    }
}

enum Finished<T> {
    Poll(T),
    Watchdog(T),
}

type TaskResult = Result<Result<(), EcuError>, tokio::task::JoinError>;

/// Resume a task's panic on the supervising task
fn unwrap_task(result: TaskResult) -> Result<(), EcuError> {
    match result {
        Ok(r) => r,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(_) => Ok(()),
    }
}

async fn join_quietly(handle: JoinHandle<()>) {
    if let Err(e) = handle.await {
        if e.is_panic() {
            std::panic::resume_unwind(e.into_panic());
        }
    }
}

fn tick_period(frequency_hz: u32) -> Duration {
    Duration::from_micros(1_000_000 / u64::from(frequency_hz.max(1)))
}

async fn watchdog(
    counters: Arc<SessionCounters>,
    sink: Arc<dyn EventSink>,
    max_errors_per_second: u64,
    scope: CancellationToken,
) -> Result<(), EcuError> {
    let mut ticker = interval_at(Instant::now() + WATCHDOG_PERIOD, WATCHDOG_PERIOD);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = scope.cancelled() => return Ok(()),
            _ = ticker.tick() => {}
        }

        let count = counters.take_errors_per_second();
        sink.set_errors_per_second(count);
        if count > max_errors_per_second {
            warn!(count, "Too many read errors");
            return Err(EcuError::TooManyErrors { count });
        }
    }
}

struct PollContext {
    driver: Arc<dyn EcuDriver>,
    variables: Arc<VariableRegistry>,
    map: SignalMap,
    hub: SignalHub,
    sink: Arc<dyn EventSink>,
    counters: Arc<SessionCounters>,
    writer: Arc<Mutex<LogWriter>>,
    period: Duration,
    capture_report_interval: u64,
    scope: CancellationToken,
}

async fn poll_loop(ctx: PollContext) -> Result<(), EcuError> {
    let mut ticker = interval(ctx.period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = ctx.scope.cancelled() => return Ok(()),
            _ = ticker.tick() => {}
        }

        let stamp = Local::now();
        let read = tokio::select! {
            biased;
            _ = ctx.scope.cancelled() => return Ok(()),
            r = ctx.driver.read() => r,
        };

        match read {
            Ok(data) => ctx.handle_data(&stamp, &data)?,
            Err(e) => {
                let total = ctx.counters.record_error();
                ctx.sink.set_error_count(total);
                ctx.sink.on_message(&format!("Failed to read data: {}", e));
            }
        }
    }
}

impl PollContext {
    /// Decode, publish and log one register read, stamped with the time the
    /// read was issued
    ///
    /// Decode failures are counted and skip the log line; values decoded
    /// before the failure are still published.
    fn handle_data(&self, stamp: &DateTime<Local>, data: &[u8]) -> Result<(), EcuError> {
        let definitions = self.variables.definitions();
        let report = self.variables.decode(data);

        let mut polled = Vec::with_capacity(report.values.len());
        for value in &report.values {
            let text = definitions[value.index].format_value(value.value);
            self.map.set(value.name.clone(), text.clone());
            self.sink.set_value(&value.name, value.value);
            self.hub
                .publish(SignalUpdate::new(value.name.clone(), value.value));
            polled.push((value.name.clone(), text));
        }

        if let Some(err) = &report.error {
            let name = definitions
                .get(report.values.len())
                .map(|d| d.name.as_str())
                .unwrap_or("register");
            let total = self.counters.record_error();
            self.sink.set_error_count(total);
            self.sink
                .on_message(&format!("Failed to read {}: {}", name, err));
            return Ok(());
        }

        if !report.leftovers.is_empty() {
            self.sink.on_message(&format!(
                "Leftovers {}: {}",
                report.leftovers.len(),
                report.leftovers_hex()
            ));
        }

        let intrinsic: Vec<(String, String)> = self
            .map
            .snapshot()
            .into_iter()
            .filter(|(name, _)| self.variables.get(name).is_none())
            .collect();
        self.writer
            .lock()
            .write_line(stamp, &intrinsic, &polled)?;

        let captures = self.counters.record_capture();
        if captures % self.capture_report_interval == 0 {
            self.sink.set_capture_count(captures);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_period() {
        assert_eq!(tick_period(20), Duration::from_millis(50));
        assert_eq!(tick_period(1000), Duration::from_millis(1));
        assert_eq!(tick_period(3), Duration::from_micros(333_333));
    }
}
