//! Protocol driver capability trait and variant selection

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ecu_vars::VariableRegistry;

use super::gmlan::GmlanDriver;
use super::kwp2000::Kwp2000Driver;
use super::DriverState;
use crate::config::{EcuKind, FirmwareConfig, SupervisorConfig};
use crate::error::EcuError;
use crate::firmware::TransferContext;
use crate::signals::BroadcastDecoder;
use crate::transport::{AddressInfo, CanTransport};

/// Everything one ECU variant can do over the bus
///
/// Live logging walks the session states (`start_session`,
/// `configure_register`, repeated `read`, `stop_session`); firmware
/// operations run outside a logging session on the same connection.
#[async_trait]
pub trait EcuDriver: Send + Sync {
    fn kind(&self) -> EcuKind;

    fn state(&self) -> DriverState;

    /// Tester/ECU identifiers of the diagnostic session
    fn diag_address(&self) -> AddressInfo;

    /// Perform the session handshake
    async fn start_session(&self) -> Result<(), EcuError>;

    /// Clear the dynamic register and program it with every definition in order
    async fn configure_register(&self, registry: &VariableRegistry) -> Result<(), EcuError>;

    /// Read the dynamic register once, returning the concatenated raw values
    async fn read(&self) -> Result<Vec<u8>, EcuError>;

    /// Leave the diagnostic session; always ends in `Idle`
    async fn stop_session(&self) -> Result<(), EcuError>;

    /// Read the complete firmware image, verified against the ECU's MD5
    async fn dump(&self, ctx: &TransferContext) -> Result<Vec<u8>, EcuError>;

    /// Write a complete firmware image and verify it
    async fn flash(&self, ctx: &TransferContext, image: &[u8]) -> Result<(), EcuError>;

    /// Leave the bootloader so the ECU restarts its application
    async fn reset(&self, ctx: &TransferContext) -> Result<(), EcuError>;

    /// Decoder for the periodic frames this ECU broadcasts, if any
    fn broadcast_decoder(&self) -> Option<Arc<dyn BroadcastDecoder>> {
        None
    }
}

/// Timing and transfer settings shared by all drivers
#[derive(Debug, Clone)]
pub struct DriverOptions {
    pub request_timeout: Duration,
    /// Delay between register definition requests
    pub register_pacing: Duration,
    pub keepalive_interval: Duration,
    pub firmware: FirmwareConfig,
    /// Loader binary uploaded during bootstrap
    pub loader_image: Option<Arc<Vec<u8>>>,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self::from_config(&SupervisorConfig::default(), &FirmwareConfig::default())
    }
}

impl DriverOptions {
    pub fn from_config(supervisor: &SupervisorConfig, firmware: &FirmwareConfig) -> Self {
        Self {
            request_timeout: supervisor.request_timeout(),
            register_pacing: supervisor.register_pacing(),
            keepalive_interval: supervisor.keepalive_interval(),
            firmware: firmware.clone(),
            loader_image: None,
        }
    }

    pub fn with_loader_image(mut self, image: Vec<u8>) -> Self {
        self.loader_image = Some(Arc::new(image));
        self
    }
}

/// Create the driver for an ECU variant
pub fn create_driver(
    kind: EcuKind,
    transport: Arc<dyn CanTransport>,
    options: DriverOptions,
) -> Arc<dyn EcuDriver> {
    match kind {
        EcuKind::Trionic7 => Arc::new(Kwp2000Driver::new(transport, options)),
        EcuKind::Trionic8 | EcuKind::Trionic8Z22se | EcuKind::Trionic8Mcp => {
            Arc::new(GmlanDriver::new(kind, transport, options))
        }
    }
}
