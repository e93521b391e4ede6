//! GMLAN driver for the Trionic 8 family
//!
//! Trionic 8, its Z22SE variant and the MCP co-processor share the live
//! logging services. They differ only in firmware handling, which lives in
//! [`FirmwareEngine`].

use std::sync::Arc;

use async_trait::async_trait;
use ecu_vars::{ReadMethod, VariableDefinition, VariableRegistry};
use tracing::{debug, info, instrument};

use super::{DiagClient, DriverOptions, DriverState, EcuDriver, KeepAlive, StateCell};
use crate::config::EcuKind;
use crate::error::EcuError;
use crate::firmware::{FirmwareEngine, TransferContext};
use crate::transport::{AddressInfo, CanTransport};

pub const DIAG_ADDRESS: AddressInfo = AddressInfo::new(0x7E0, 0x7E8);

const INITIATE_DIAGNOSTIC_OPERATION: u8 = 0x10;
const ENABLE_DIAGNOSTIC_RESPONSES: u8 = 0x03;
const RETURN_TO_NORMAL_MODE: u8 = 0x20;
const WRITE_DATA_BY_ID: u8 = 0x3B;
const READ_DATA_BY_ID: u8 = 0x1A;

/// Identifier the register definitions are written to
const DEFINE_DYNAMIC_REGISTER: u8 = 0x17;
/// Identifier the register contents are read from
const READ_DYNAMIC_REGISTER: u8 = 0x18;
const DYNAMIC_REGISTER: u8 = 0xF0;

const DEFINE_BY_ADDRESS: u8 = 0x03;
const CLEAR_DEFINITION: u8 = 0x04;
const DEFINE_BY_SYMBOL: u8 = 0x80;

/// Trionic 8 family driver
pub struct GmlanDriver {
    kind: EcuKind,
    client: DiagClient,
    options: DriverOptions,
    state: StateCell,
    keepalive: KeepAlive,
    firmware: Option<FirmwareEngine>,
}

impl GmlanDriver {
    pub fn new(kind: EcuKind, transport: Arc<dyn CanTransport>, options: DriverOptions) -> Self {
        let client = DiagClient::new(transport.clone(), DIAG_ADDRESS, options.request_timeout);
        let firmware = FirmwareEngine::new(kind, transport, &options);
        Self {
            kind,
            client,
            options,
            state: StateCell::default(),
            keepalive: KeepAlive::default(),
            firmware,
        }
    }

    fn firmware(&self, operation: &'static str) -> Result<&FirmwareEngine, EcuError> {
        self.firmware.as_ref().ok_or(EcuError::Unsupported {
            operation,
            kind: self.kind,
        })
    }
}

/// Build the definition request for one variable
fn define_request(def: &VariableDefinition) -> Result<Vec<u8>, EcuError> {
    let mut request = vec![WRITE_DATA_BY_ID, DEFINE_DYNAMIC_REGISTER, DYNAMIC_REGISTER];
    match def.method {
        ReadMethod::Symbol => {
            let [_, _, s1, s0] = def.source.to_be_bytes();
            request.extend_from_slice(&[DEFINE_BY_SYMBOL, 0x00, 0x00, 0x00, s1, s0]);
        }
        ReadMethod::Address => {
            let [_, a2, a1, a0] = def.source.to_be_bytes();
            request.extend_from_slice(&[DEFINE_BY_ADDRESS, a2, a1, a0, def.width() as u8]);
        }
        ReadMethod::LocalIdentifier => {
            return Err(EcuError::Configuration(format!(
                "{}: local identifier reads are not available over GMLAN",
                def.name
            )))
        }
    }
    Ok(request)
}

#[async_trait]
impl EcuDriver for GmlanDriver {
    fn kind(&self) -> EcuKind {
        self.kind
    }

    fn state(&self) -> DriverState {
        self.state.get()
    }

    fn diag_address(&self) -> AddressInfo {
        DIAG_ADDRESS
    }

    #[instrument(skip(self), fields(kind = %self.kind))]
    async fn start_session(&self) -> Result<(), EcuError> {
        self.state.require("start_session", &[DriverState::Idle])?;
        self.client
            .request_positive(
                &[INITIATE_DIAGNOSTIC_OPERATION, ENABLE_DIAGNOSTIC_RESPONSES],
                0,
            )
            .await?;
        self.keepalive
            .start(self.client.clone(), self.options.keepalive_interval);
        self.state.set(DriverState::SessionActive);
        info!("GMLAN session started");
        Ok(())
    }

    async fn configure_register(&self, registry: &VariableRegistry) -> Result<(), EcuError> {
        self.state.require(
            "configure_register",
            &[DriverState::SessionActive, DriverState::Configured],
        )?;

        // Reject the whole set before touching the ECU
        let requests = registry
            .definitions()
            .iter()
            .map(define_request)
            .collect::<Result<Vec<_>, _>>()?;

        self.client
            .request_positive(
                &[
                    WRITE_DATA_BY_ID,
                    DEFINE_DYNAMIC_REGISTER,
                    DYNAMIC_REGISTER,
                    CLEAR_DEFINITION,
                ],
                1,
            )
            .await?;

        for (def, request) in registry.definitions().iter().zip(&requests) {
            debug!(name = %def.name, request = %hex::encode_upper(request), "Define register entry");
            self.client.request_positive(request, 1).await?;
            tokio::time::sleep(self.options.register_pacing).await;
        }

        self.state.set(DriverState::Configured);
        Ok(())
    }

    async fn read(&self) -> Result<Vec<u8>, EcuError> {
        self.state
            .require("read", &[DriverState::Configured, DriverState::Polling])?;
        let data = self
            .client
            .request_positive(&[READ_DATA_BY_ID, READ_DYNAMIC_REGISTER], 1)
            .await?;
        self.state.set(DriverState::Polling);
        Ok(data)
    }

    async fn stop_session(&self) -> Result<(), EcuError> {
        self.keepalive.stop();
        if self.state.get() == DriverState::Idle {
            return Ok(());
        }
        let result = self
            .client
            .request_positive(&[RETURN_TO_NORMAL_MODE], 0)
            .await;
        self.state.set(DriverState::Idle);
        result?;
        info!("GMLAN session stopped");
        Ok(())
    }

    async fn dump(&self, ctx: &TransferContext) -> Result<Vec<u8>, EcuError> {
        self.firmware("dump")?.dump(ctx).await
    }

    async fn flash(&self, ctx: &TransferContext, image: &[u8]) -> Result<(), EcuError> {
        self.firmware("flash")?.flash(ctx, image).await
    }

    async fn reset(&self, ctx: &TransferContext) -> Result<(), EcuError> {
        self.firmware("reset")?.reset(ctx).await
    }
}
