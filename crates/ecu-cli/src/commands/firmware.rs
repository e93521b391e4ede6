//! Dump, flash and reset commands

use anyhow::{bail, Context, Result};
use ecu_diag::protocol::create_driver;
use ecu_diag::{create_transport, EcuDriver, FirmwareEngine, LoggerConfig, TransferContext};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::config::driver_options;
use crate::progress::ProgressSink;

/// Budget for leaving the loader after a transfer
const RESET_BUDGET: Duration = Duration::from_secs(30);

/// Transfer context bounded by the configured deadline and cancelled by Ctrl+C
fn transfer_context(config: &LoggerConfig, sink: &Arc<ProgressSink>) -> TransferContext {
    let ctx = TransferContext::new(config.firmware.deadline()).with_sink(sink.clone());
    let cancel = ctx.cancel_token().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });
    ctx
}

async fn open_driver(config: &LoggerConfig) -> Result<Arc<dyn EcuDriver>> {
    let options = driver_options(config)?;
    let transport = create_transport(&config.transport)
        .await
        .context("Failed to open CAN transport")?;
    Ok(create_driver(config.ecu, transport, options))
}

/// Leave the loader whatever the transfer's outcome
async fn leave_loader(driver: &dyn EcuDriver, sink: &Arc<ProgressSink>) {
    let ctx = TransferContext::new(RESET_BUDGET).with_sink(sink.clone());
    if let Err(e) = driver.reset(&ctx).await {
        warn!(error = %e, "ECU reset failed");
        sink.println(format!("Reset failed: {}", e));
    }
}

/// Read the complete firmware into `output`
pub async fn dump(config: &LoggerConfig, output: &Path) -> Result<()> {
    let driver = open_driver(config).await?;
    let sink = Arc::new(ProgressSink::new());
    let ctx = transfer_context(config, &sink);

    let result = driver.dump(&ctx).await;
    leave_loader(driver.as_ref(), &sink).await;
    sink.finish();

    let image = result.context("Dump failed")?;
    std::fs::write(output, &image)
        .with_context(|| format!("Failed to write firmware file: {}", output.display()))?;
    println!("Wrote {} bytes to {}", image.len(), output.display());
    Ok(())
}

/// Write the image in `file` to the ECU
pub async fn flash(config: &LoggerConfig, file: &Path) -> Result<()> {
    let image = std::fs::read(file)
        .with_context(|| format!("Failed to read firmware file: {}", file.display()))?;
    println!("Firmware size: {} bytes", image.len());

    let driver = open_driver(config).await?;
    let sink = Arc::new(ProgressSink::new());
    let ctx = transfer_context(config, &sink);

    let result = driver.flash(&ctx, &image).await;
    leave_loader(driver.as_ref(), &sink).await;
    sink.finish();

    result.context("Flash failed")?;
    println!("Firmware update completed successfully");
    Ok(())
}

/// Leave a loader that an interrupted transfer left running
pub async fn reset(config: &LoggerConfig) -> Result<()> {
    let options = driver_options(config)?;
    let transport = create_transport(&config.transport)
        .await
        .context("Failed to open CAN transport")?;
    let Some(engine) = FirmwareEngine::new(config.ecu, transport, &options) else {
        bail!("{} has no loader to reset", config.ecu);
    };

    let sink = Arc::new(ProgressSink::new());
    let ctx = transfer_context(config, &sink);
    let running = engine
        .loader()
        .probe(&ctx)
        .await
        .context("Failed to probe loader")?;
    if !running {
        println!("No loader running, nothing to reset");
        return Ok(());
    }

    engine.reset(&ctx).await.context("Reset failed")?;
    println!("ECU restarted");
    Ok(())
}
