//! Log command - live logging until Ctrl+C

use anyhow::{Context, Result};
use ecu_diag::ecu_vars::VariableRegistry;
use ecu_diag::{create_transport, LogSession, LoggerConfig, SessionConfig, SignalHub};
use std::sync::Arc;
use tracing::info;

use crate::progress::ProgressSink;

/// Poll the configured variables into a log file
pub async fn log(config: &LoggerConfig, watch: &[String]) -> Result<()> {
    let path = config
        .variables
        .as_ref()
        .context("No variable definitions given (use --variables or `variables` in the config)")?;
    let variables = VariableRegistry::from_file(path)
        .with_context(|| format!("Failed to load variables from {}", path.display()))?;
    info!(count = variables.len(), "Loaded variable definitions");

    let transport = create_transport(&config.transport)
        .await
        .context("Failed to open CAN transport")?;

    let sink = Arc::new(ProgressSink::new());
    let hub = SignalHub::new();
    let mut session_config = SessionConfig::new(config.ecu, transport, Arc::new(variables));
    session_config.frequency_hz = config.frequency_hz;
    session_config.log_dir = config.log_dir.clone();
    session_config.sink = sink.clone();
    session_config.hub = hub.clone();
    session_config.supervisor = config.supervisor.clone();

    let session = LogSession::new(session_config).context("Failed to set up logging session")?;
    sink.println("Press Ctrl+C to stop");

    let stop = session.stop_handle();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop.stop();
        }
    });

    let watcher = (!watch.is_empty()).then(|| {
        let mut subscription = hub.subscribe(watch.iter().cloned(), config.supervisor.observer_capacity);
        let sink = sink.clone();
        tokio::spawn(async move {
            while let Some(update) = subscription.recv().await {
                sink.println(format!("{:<32} {}", update.name, update.value));
            }
        })
    });

    let result = session.start().await;
    ctrl_c.abort();
    if let Some(watcher) = watcher {
        watcher.abort();
    }
    sink.finish();

    result.context("Logging failed")?;
    let counters = session.counters();
    println!(
        "Logged {} captures ({} read errors)",
        counters.captures(),
        counters.errors()
    );
    Ok(())
}
