//! Dump, flash and reset on top of the loader

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, instrument};

use super::layout::{md5, md5_hex, FirmwareLayout};
use super::loader::{Loader, LoaderCommand};
use super::TransferContext;
use crate::config::EcuKind;
use crate::error::EcuError;
use crate::protocol::{DriverOptions, ProtocolError};
use crate::transport::CanTransport;

/// Firmware operations of one Trionic 8 family ECU
pub struct FirmwareEngine {
    kind: EcuKind,
    layout: &'static FirmwareLayout,
    loader: Loader,
    reset_attempts: u32,
    reset_delay: std::time::Duration,
}

impl FirmwareEngine {
    /// `None` for ECUs without a supported loader
    pub fn new(
        kind: EcuKind,
        transport: Arc<dyn CanTransport>,
        options: &DriverOptions,
    ) -> Option<Self> {
        let layout = FirmwareLayout::for_kind(kind)?;
        Some(Self {
            kind,
            layout,
            loader: Loader::new(kind, transport, options),
            reset_attempts: options.firmware.reset_attempts.max(1),
            reset_delay: options.firmware.reset_delay(),
        })
    }

    pub fn layout(&self) -> &'static FirmwareLayout {
        self.layout
    }

    pub fn loader(&self) -> &Loader {
        &self.loader
    }

    fn md5_command(&self) -> LoaderCommand {
        match self.kind {
            EcuKind::Trionic8Mcp => LoaderCommand::GetTrionic8McpMd5,
            _ => LoaderCommand::GetTrionic8Md5,
        }
    }

    /// Read the whole device; the bytes are only returned if the ECU's MD5
    /// matches them
    #[instrument(skip(self, ctx), fields(kind = %self.kind))]
    pub async fn dump(&self, ctx: &TransferContext) -> Result<Vec<u8>, EcuError> {
        self.loader.bootstrap(ctx).await?;

        if self.kind == EcuKind::Trionic8Mcp {
            self.loader
                .demand(ctx, LoaderCommand::StartSecondaryBootloader, 0)
                .await
                .map_err(|e| {
                    ProtocolError::Loader(format!("failed to start secondary bootloader: {}", e))
                })?;
        }

        ctx.message(format!("Dumping {}", self.layout.name));
        let start = Instant::now();
        let image = self.loader.read_flash(ctx, self.layout).await?;

        ctx.message("Verifying md5..");
        let remote = self.loader.get_md5(ctx, self.md5_command(), 0).await?;
        self.verify(ctx, "image", &remote, &md5(&image))?;

        ctx.message(format!("Done, took: {:?}", start.elapsed()));
        Ok(image)
    }

    /// Write a complete image and verify it
    ///
    /// Partition digests are compared before the write for the operator's
    /// benefit only; the whole-image digest afterwards decides the outcome.
    #[instrument(skip(self, ctx, image), fields(kind = %self.kind, bytes = image.len()))]
    pub async fn flash(&self, ctx: &TransferContext, image: &[u8]) -> Result<(), EcuError> {
        self.layout.check_size(image)?;
        if self.kind == EcuKind::Trionic8Mcp {
            return Err(EcuError::Unsupported {
                operation: "flash",
                kind: self.kind,
            });
        }

        self.loader.bootstrap(ctx).await?;
        let start = Instant::now();

        ctx.message("Comparing MD5's for erase");
        let partitions = self.layout.partition_count();
        ctx.progress(-(partitions as i64));
        ctx.progress(0);
        let mut changed = 0usize;
        for number in 1..=partitions {
            let local = self
                .layout
                .partition(image, number)
                .map(md5)
                .unwrap_or_default();
            let remote = self
                .loader
                .get_md5(ctx, self.md5_command(), number as u16)
                .await?;
            ctx.message(format!("local partition   {}> {}", number, md5_hex(&local)));
            ctx.message(format!("remote partition  {}> {}", number, md5_hex(&remote)));
            if local != remote {
                changed += 1;
            }
            ctx.progress(number as i64);
        }
        info!(changed, "Partitions differing from image");

        ctx.message(format!("Flashing {}", self.layout.name));
        self.loader.write_flash(ctx, self.layout, image).await?;

        ctx.message("Verifying md5..");
        let remote = self.loader.get_md5(ctx, self.md5_command(), 0).await?;
        self.verify(ctx, "image", &remote, &md5(image))?;

        ctx.message(format!("Done, took: {:?}", start.elapsed()));
        Ok(())
    }

    /// Leave the loader if it runs; a no-op otherwise
    pub async fn reset(&self, ctx: &TransferContext) -> Result<(), EcuError> {
        if !self.loader.is_running() {
            return Ok(());
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.loader.exit(ctx).await {
                Ok(()) => return Ok(()),
                Err(e @ (EcuError::Cancelled | EcuError::DeadlineExceeded(_))) => return Err(e),
                Err(e) if attempt >= self.reset_attempts => {
                    return Err(ProtocolError::Loader(format!("failed to exit loader: {}", e)).into())
                }
                Err(_) => ctx.sleep(self.reset_delay).await?,
            }
        }
    }

    fn verify(
        &self,
        ctx: &TransferContext,
        what: &str,
        remote: &[u8; 16],
        local: &[u8; 16],
    ) -> Result<(), EcuError> {
        ctx.message(format!("Remote MD5 : {}", md5_hex(remote)));
        ctx.message(format!("Local MD5  : {}", md5_hex(local)));
        if remote != local {
            return Err(EcuError::Integrity {
                what: what.to_string(),
                remote: md5_hex(remote),
                local: md5_hex(local),
            });
        }
        Ok(())
    }
}
