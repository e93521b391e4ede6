//! Client for the resident flash loader
//!
//! Once bootstrapped the loader answers a small command set on the GMLAN
//! request identifier:
//!
//! | Request                          | Response           |
//! |----------------------------------|--------------------|
//! | `3D cmd wish_hi wish_lo`         | `7D cmd payload…`  |
//! | `23 target addr(4) len(2)`       | `63 data…`         |
//! | `34 target size(4)`              | `74`               |
//! | `36 target addr(4) data…`        | `76`               |
//! | `37 target`                      | `77`               |

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use super::layout::FirmwareLayout;
use super::seed::calculate_key;
use super::TransferContext;
use crate::config::EcuKind;
use crate::error::EcuError;
use crate::protocol::{DiagClient, DriverOptions, ProtocolError};
use crate::transport::{AddressInfo, CanTransport};

/// Loader demand commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LoaderCommand {
    Ping = 0x00,
    /// Wish 0 digests the whole image, 1..=9 a single partition
    GetTrionic8Md5 = 0x02,
    GetTrionic8McpMd5 = 0x03,
    StartSecondaryBootloader = 0x04,
    Exit = 0xFF,
}

const DEMAND: u8 = 0x3D;
const READ_MEMORY: u8 = 0x23;
const REQUEST_DOWNLOAD: u8 = 0x34;
const TRANSFER_DATA: u8 = 0x36;
const TRANSFER_EXIT: u8 = 0x37;
const DISABLE_NORMAL_COMMUNICATION: u8 = 0x28;
const PROGRAMMING_MODE: u8 = 0xA5;
const PROGRAMMING_MODE_REQUEST: u8 = 0x01;
const PROGRAMMING_MODE_ENABLE: u8 = 0x03;
const SECURITY_ACCESS: u8 = 0x27;

/// Transfer-data sub function that jumps to the given address
const EXECUTE: u8 = 0x80;
/// RAM address the loader is uploaded to and started from
pub const LOADER_ADDRESS: u32 = 0x102400;

const PING_ATTEMPTS: usize = 10;
const PING_INTERVAL: Duration = Duration::from_millis(100);

pub const GMLAN_ADDRESS: AddressInfo = AddressInfo::new(0x7E0, 0x7E8);
/// The Z22SE loader answers on its own identifier
pub const Z22SE_LOADER_ADDRESS: AddressInfo = AddressInfo::new(0x7E0, 0x5E8);

/// Loader session on one ECU
pub struct Loader {
    kind: EcuKind,
    /// Application session, used until the loader runs
    session: DiagClient,
    loader: DiagClient,
    /// Short timeout client for liveness checks
    ping: DiagClient,
    block_size: usize,
    image: Option<Arc<Vec<u8>>>,
    running: AtomicBool,
}

impl Loader {
    pub fn new(kind: EcuKind, transport: Arc<dyn CanTransport>, options: &DriverOptions) -> Self {
        let address = match kind {
            EcuKind::Trionic8Z22se => Z22SE_LOADER_ADDRESS,
            _ => GMLAN_ADDRESS,
        };
        let timeout = options.firmware.request_timeout();
        Self {
            kind,
            session: DiagClient::new(transport.clone(), GMLAN_ADDRESS, timeout),
            loader: DiagClient::new(transport.clone(), address, timeout),
            ping: DiagClient::new(transport, address, options.request_timeout),
            block_size: options.firmware.block_size.max(1),
            image: options.loader_image.clone(),
            running: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Check whether a loader left running by an earlier process answers
    pub async fn probe(&self, ctx: &TransferContext) -> Result<bool, EcuError> {
        if self.is_running() {
            return Ok(true);
        }
        let answered = self.try_ping(ctx).await?;
        self.running.store(answered, Ordering::SeqCst);
        Ok(answered)
    }

    /// Make sure the loader runs, starting it if it does not answer
    #[instrument(skip(self, ctx), fields(kind = %self.kind))]
    pub async fn bootstrap(&self, ctx: &TransferContext) -> Result<(), EcuError> {
        if self.is_running() {
            return Ok(());
        }
        if self.try_ping(ctx).await? {
            info!("Loader already running");
            self.running.store(true, Ordering::SeqCst);
            return Ok(());
        }

        ctx.message("Starting loader");
        ctx.run(self.session.request_positive(&[DISABLE_NORMAL_COMMUNICATION], 0))
            .await?;
        ctx.run(
            self.session
                .request_positive(&[PROGRAMMING_MODE, PROGRAMMING_MODE_REQUEST], 0),
        )
        .await?;
        // Enabling programming mode is never answered
        ctx.run(
            self.session
                .send_only(&[PROGRAMMING_MODE, PROGRAMMING_MODE_ENABLE]),
        )
        .await?;

        self.security_access(ctx).await?;

        if let Some(image) = self.image.clone() {
            self.upload(ctx, &image).await?;
        }

        let [a3, a2, a1, a0] = LOADER_ADDRESS.to_be_bytes();
        ctx.run(
            self.session
                .request_positive(&[TRANSFER_DATA, EXECUTE, a3, a2, a1, a0], 0),
        )
        .await?;

        for attempt in 1..=PING_ATTEMPTS {
            if self.try_ping(ctx).await? {
                self.running.store(true, Ordering::SeqCst);
                ctx.message("Loader started");
                return Ok(());
            }
            debug!(attempt, "Loader not answering yet");
            ctx.sleep(PING_INTERVAL).await?;
        }

        Err(ProtocolError::Loader("loader did not start".to_string()).into())
    }

    async fn security_access(&self, ctx: &TransferContext) -> Result<(), EcuError> {
        let seed = ctx
            .run(self.session.request_positive(&[SECURITY_ACCESS, 0x01], 1))
            .await?;
        let seed = match seed.as_slice() {
            [s1, s0, ..] => u16::from_be_bytes([*s1, *s0]),
            _ => {
                return Err(ProtocolError::SecurityAccessFailed("seed too short".to_string()).into())
            }
        };
        let [k1, k0] = calculate_key(self.kind, seed).to_be_bytes();
        debug!(seed = format!("0x{:04X}", seed), "Sending security key");

        ctx.run(
            self.session
                .request_positive(&[SECURITY_ACCESS, 0x02, k1, k0], 1),
        )
        .await
        .map_err(|e| match e {
            EcuError::Protocol(ProtocolError::NegativeResponse { nrc, .. }) => {
                ProtocolError::SecurityAccessFailed(format!("key rejected: {}", nrc)).into()
            }
            other => other,
        })?;
        Ok(())
    }

    async fn upload(&self, ctx: &TransferContext, image: &[u8]) -> Result<(), EcuError> {
        info!(bytes = image.len(), "Uploading loader");
        let mut request = vec![REQUEST_DOWNLOAD, 0x00];
        request.extend_from_slice(&(image.len() as u32).to_be_bytes());
        ctx.run(self.session.request_positive(&request, 0)).await?;

        for (index, chunk) in image.chunks(self.block_size).enumerate() {
            let address = LOADER_ADDRESS + (index * self.block_size) as u32;
            let mut request = vec![TRANSFER_DATA, 0x00];
            request.extend_from_slice(&address.to_be_bytes());
            request.extend_from_slice(chunk);
            ctx.run(self.session.request_positive(&request, 0)).await?;
        }
        Ok(())
    }

    /// Whether the loader answers a ping; transport silence is not an error
    async fn try_ping(&self, ctx: &TransferContext) -> Result<bool, EcuError> {
        let request = demand_request(LoaderCommand::Ping, 0);
        match ctx.run(self.ping.request_positive(&request, 1)).await {
            Ok(_) => Ok(true),
            Err(e @ (EcuError::Cancelled | EcuError::DeadlineExceeded(_))) => Err(e),
            Err(e) => {
                debug!(error = %e, "Ping failed");
                Ok(false)
            }
        }
    }

    /// Issue a demand and return its payload
    pub async fn demand(
        &self,
        ctx: &TransferContext,
        command: LoaderCommand,
        wish: u16,
    ) -> Result<Vec<u8>, EcuError> {
        let request = demand_request(command, wish);
        ctx.run(self.loader.request_positive(&request, 1)).await
    }

    /// MD5 the loader computes over the whole image (wish 0) or a partition
    pub async fn get_md5(
        &self,
        ctx: &TransferContext,
        command: LoaderCommand,
        wish: u16,
    ) -> Result<[u8; 16], EcuError> {
        let payload = self.demand(ctx, command, wish).await?;
        payload
            .get(..16)
            .and_then(|digest| <[u8; 16]>::try_from(digest).ok())
            .ok_or_else(|| {
                ProtocolError::InvalidResponse(format!(
                    "md5 reply has {} bytes",
                    payload.len()
                ))
                .into()
            })
    }

    /// Read a whole device, reporting progress in bytes
    #[instrument(skip(self, ctx, layout), fields(device = layout.name))]
    pub async fn read_flash(
        &self,
        ctx: &TransferContext,
        layout: &FirmwareLayout,
    ) -> Result<Vec<u8>, EcuError> {
        let mut image = Vec::with_capacity(layout.size);
        ctx.progress(-(layout.size as i64));
        ctx.progress(0);

        while image.len() < layout.size {
            let address = image.len() as u32;
            let length = self.block_size.min(layout.size - image.len());
            let mut request = vec![READ_MEMORY, layout.target];
            request.extend_from_slice(&address.to_be_bytes());
            request.extend_from_slice(&(length as u16).to_be_bytes());

            let data = ctx.run(self.loader.request_positive(&request, 0)).await?;
            if data.len() != length {
                return Err(ProtocolError::InvalidResponse(format!(
                    "read at 0x{:06X} returned {} of {} bytes",
                    address,
                    data.len(),
                    length
                ))
                .into());
            }
            image.extend_from_slice(&data);
            ctx.progress(image.len() as i64);
        }

        Ok(image)
    }

    /// Erase and program a whole device, reporting progress in bytes
    #[instrument(skip(self, ctx, layout, image), fields(device = layout.name))]
    pub async fn write_flash(
        &self,
        ctx: &TransferContext,
        layout: &FirmwareLayout,
        image: &[u8],
    ) -> Result<(), EcuError> {
        let mut request = vec![REQUEST_DOWNLOAD, layout.target];
        request.extend_from_slice(&(image.len() as u32).to_be_bytes());
        // Erase happens here and may keep the loader busy for a while
        ctx.run(self.loader.request_positive(&request, 0)).await?;

        ctx.progress(-(image.len() as i64));
        ctx.progress(0);
        let mut written = 0usize;
        for chunk in image.chunks(self.block_size) {
            let mut request = vec![TRANSFER_DATA, layout.target];
            request.extend_from_slice(&(written as u32).to_be_bytes());
            request.extend_from_slice(chunk);
            ctx.run(self.loader.request_positive(&request, 0)).await?;
            written += chunk.len();
            ctx.progress(written as i64);
        }

        ctx.run(
            self.loader
                .request_positive(&[TRANSFER_EXIT, layout.target], 0),
        )
        .await?;
        Ok(())
    }

    /// Leave the loader; the ECU restarts its application
    pub async fn exit(&self, ctx: &TransferContext) -> Result<(), EcuError> {
        match self.demand(ctx, LoaderCommand::Exit, 0).await {
            Ok(_) => {
                self.running.store(false, Ordering::SeqCst);
                info!("Loader exited");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Loader exit failed");
                Err(e)
            }
        }
    }
}

fn demand_request(command: LoaderCommand, wish: u16) -> Vec<u8> {
    let [w1, w0] = wish.to_be_bytes();
    vec![DEMAND, command as u8, w1, w0]
}
