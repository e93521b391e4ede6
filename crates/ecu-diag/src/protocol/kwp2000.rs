//! KWP2000-on-CAN driver (Trionic 7)

use std::sync::Arc;

use async_trait::async_trait;
use ecu_vars::{ReadMethod, VariableDefinition, VariableRegistry};
use tracing::{debug, info, instrument};

use super::{DiagClient, DriverOptions, DriverState, EcuDriver, ProtocolError, StateCell};
use crate::config::EcuKind;
use crate::error::EcuError;
use crate::firmware::TransferContext;
use crate::signals::{BroadcastDecoder, Trionic7Broadcast};
use crate::transport::{AddressInfo, CanFrame, CanTransport, FrameSubscription};

/// Handshake frame identifiers
pub const INIT_MSG_ID: u32 = 0x220;
pub const INIT_RESP_ID: u32 = 0x238;

/// Diagnostic request/response identifiers once the session is up
pub const DIAG_ADDRESS: AddressInfo = AddressInfo::new(0x240, 0x258);

/// StartCommunication frame sent on [`INIT_MSG_ID`]
const START_COMMUNICATION: [u8; 8] = [0x3F, 0x81, 0x00, 0x11, 0x02, 0x40, 0x00, 0x00];
/// Positive StartCommunication response, fourth byte of the reply frame
const START_COMMUNICATION_OK: u8 = 0xC1;

const STOP_COMMUNICATION: u8 = 0x82;
const DYNAMICALLY_DEFINE_LOCAL_ID: u8 = 0x2C;
const READ_DATA_BY_LOCAL_ID: u8 = 0x21;

/// Local identifier of the dynamic register
const DYNAMIC_REGISTER: u8 = 0xF0;

const DEFINE_BY_LOCAL_ID: u8 = 0x01;
const DEFINE_BY_ADDRESS: u8 = 0x03;
const CLEAR_DEFINITION: u8 = 0x04;
/// Address high byte marking a symbol number instead of a memory address
const SYMBOL_MARKER: u8 = 0x80;
/// Register positions are one byte, 1-based
const MAX_REGISTER_SLOTS: usize = u8::MAX as usize;

/// Trionic 7 driver
pub struct Kwp2000Driver {
    transport: Arc<dyn CanTransport>,
    client: DiagClient,
    options: DriverOptions,
    state: StateCell,
    broadcast: Arc<Trionic7Broadcast>,
}

impl Kwp2000Driver {
    pub fn new(transport: Arc<dyn CanTransport>, options: DriverOptions) -> Self {
        let client = DiagClient::new(transport.clone(), DIAG_ADDRESS, options.request_timeout);
        Self {
            transport,
            client,
            options,
            state: StateCell::default(),
            broadcast: Arc::new(Trionic7Broadcast),
        }
    }

    async fn handshake(&self) -> Result<(), ProtocolError> {
        // Subscribe before sending so the reply cannot be missed
        let mut replies = FrameSubscription::new(self.transport.subscribe(), &[INIT_RESP_ID]);
        self.transport
            .send_frame(CanFrame::new(INIT_MSG_ID, START_COMMUNICATION.to_vec()))
            .await?;

        let reply = replies.recv_timeout(self.options.request_timeout).await?;
        match reply.frame.data.get(3) {
            Some(&START_COMMUNICATION_OK) => Ok(()),
            _ => Err(ProtocolError::HandshakeFailed(format!(
                "unexpected reply {}",
                hex::encode_upper(&reply.frame.data)
            ))),
        }
    }

    async fn define(&self, position: u8, def: &VariableDefinition) -> Result<(), ProtocolError> {
        let request = define_request(position, def);
        debug!(name = %def.name, request = %hex::encode_upper(&request), "Define local id");
        self.client.request_positive(&request, 1).await?;
        Ok(())
    }
}

/// Build the DynamicallyDefineLocalIdentifier request for one variable
fn define_request(position: u8, def: &VariableDefinition) -> Vec<u8> {
    let width = def.width() as u8;
    match def.method {
        ReadMethod::LocalIdentifier => vec![
            DYNAMICALLY_DEFINE_LOCAL_ID,
            DYNAMIC_REGISTER,
            DEFINE_BY_LOCAL_ID,
            position,
            width,
            def.source as u8,
            0x00,
        ],
        ReadMethod::Address => {
            let [_, a2, a1, a0] = def.source.to_be_bytes();
            vec![
                DYNAMICALLY_DEFINE_LOCAL_ID,
                DYNAMIC_REGISTER,
                DEFINE_BY_ADDRESS,
                position,
                width,
                a2,
                a1,
                a0,
            ]
        }
        ReadMethod::Symbol => {
            let [_, _, s1, s0] = def.source.to_be_bytes();
            vec![
                DYNAMICALLY_DEFINE_LOCAL_ID,
                DYNAMIC_REGISTER,
                DEFINE_BY_ADDRESS,
                position,
                0x00,
                SYMBOL_MARKER,
                s1,
                s0,
            ]
        }
    }
}

#[async_trait]
impl EcuDriver for Kwp2000Driver {
    fn kind(&self) -> EcuKind {
        EcuKind::Trionic7
    }

    fn state(&self) -> DriverState {
        self.state.get()
    }

    fn diag_address(&self) -> AddressInfo {
        DIAG_ADDRESS
    }

    #[instrument(skip(self))]
    async fn start_session(&self) -> Result<(), EcuError> {
        self.state.require("start_session", &[DriverState::Idle])?;
        self.handshake().await?;
        self.state.set(DriverState::SessionActive);
        info!("KWP2000 session started");
        Ok(())
    }

    async fn configure_register(&self, registry: &VariableRegistry) -> Result<(), EcuError> {
        self.state.require(
            "configure_register",
            &[DriverState::SessionActive, DriverState::Configured],
        )?;

        let definitions = registry.definitions();
        if definitions.len() > MAX_REGISTER_SLOTS {
            return Err(EcuError::Configuration(format!(
                "{} variables do not fit the {} register slots",
                definitions.len(),
                MAX_REGISTER_SLOTS
            )));
        }

        self.client
            .request_positive(
                &[DYNAMICALLY_DEFINE_LOCAL_ID, DYNAMIC_REGISTER, CLEAR_DEFINITION],
                1,
            )
            .await?;

        for (position, def) in (1..=u8::MAX).zip(definitions) {
            self.define(position, def).await?;
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
            .request_positive(&[READ_DATA_BY_LOCAL_ID, DYNAMIC_REGISTER], 1)
            .await?;
        self.state.set(DriverState::Polling);
        Ok(data)
    }

    async fn stop_session(&self) -> Result<(), EcuError> {
        if self.state.get() == DriverState::Idle {
            return Ok(());
        }
        let result = self.client.request_positive(&[STOP_COMMUNICATION], 0).await;
        self.state.set(DriverState::Idle);
        result?;
        info!("KWP2000 session stopped");
        Ok(())
    }

    async fn dump(&self, _ctx: &TransferContext) -> Result<Vec<u8>, EcuError> {
        Err(EcuError::Unsupported {
            operation: "dump",
            kind: EcuKind::Trionic7,
        })
    }

    async fn flash(&self, _ctx: &TransferContext, _image: &[u8]) -> Result<(), EcuError> {
        Err(EcuError::Unsupported {
            operation: "flash",
            kind: EcuKind::Trionic7,
        })
    }

    async fn reset(&self, _ctx: &TransferContext) -> Result<(), EcuError> {
        Err(EcuError::Unsupported {
            operation: "reset",
            kind: EcuKind::Trionic7,
        })
    }

    fn broadcast_decoder(&self) -> Option<Arc<dyn BroadcastDecoder>> {
        Some(self.broadcast.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MockConfig;
    use crate::transport::MockTransport;
    use ecu_vars::DataType;

    fn setup() -> (Arc<MockTransport>, Kwp2000Driver) {
        let mock = Arc::new(MockTransport::new(&MockConfig::default()));
        mock.add_frame_reply(
            INIT_MSG_ID,
            CanFrame::new(INIT_RESP_ID, vec![0x40, 0xBF, 0x21, 0xC1, 0x00, 0x11, 0x02, 0x58]),
        );
        let driver = Kwp2000Driver::new(mock.clone(), DriverOptions::default());
        (mock, driver)
    }

    #[test]
    fn test_define_requests() {
        let def = VariableDefinition::symbol("ActualIn.n_Engine", 0x0123, DataType::Uint16);
        assert_eq!(
            define_request(1, &def),
            vec![0x2C, 0xF0, 0x03, 0x01, 0x00, 0x80, 0x01, 0x23]
        );

        let def = VariableDefinition::address("Out.M_Engine", 0xF04A2C, DataType::Int16);
        assert_eq!(
            define_request(3, &def),
            vec![0x2C, 0xF0, 0x03, 0x03, 0x02, 0xF0, 0x4A, 0x2C]
        );

        let def = VariableDefinition::local_id("Lambda", 0x12, DataType::Uint8);
        assert_eq!(
            define_request(2, &def),
            vec![0x2C, 0xF0, 0x01, 0x02, 0x01, 0x12, 0x00]
        );
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let (mock, driver) = setup();
        mock.add_response(vec![0x2C, 0xF0], vec![0x6C, 0xF0]);
        mock.add_response(vec![0x21, 0xF0], vec![0x61, 0xF0, 0x0B, 0xB8]);

        let registry = VariableRegistry::new(vec![VariableDefinition::symbol(
            "ActualIn.n_Engine",
            1,
            DataType::Uint16,
        )])
        .unwrap();

        driver.start_session().await.unwrap();
        assert_eq!(driver.state(), DriverState::SessionActive);
        assert_eq!(mock.sent_frames()[0].id, INIT_MSG_ID);

        driver.configure_register(&registry).await.unwrap();
        assert_eq!(driver.state(), DriverState::Configured);
        // One clear plus one definition
        assert_eq!(mock.count_requests(&[0x2C, 0xF0]), 2);

        assert_eq!(driver.read().await.unwrap(), vec![0x0B, 0xB8]);
        assert_eq!(driver.state(), DriverState::Polling);

        driver.stop_session().await.unwrap();
        assert_eq!(driver.state(), DriverState::Idle);
    }

    #[tokio::test]
    async fn test_register_slot_limit() {
        let (mock, driver) = setup();
        mock.add_response(vec![0x2C, 0xF0], vec![0x6C, 0xF0]);
        driver.start_session().await.unwrap();

        let too_many = (0..300u16)
            .map(|n| VariableDefinition::symbol(format!("Sym.{}", n), n + 1, DataType::Uint8))
            .collect();
        let registry = VariableRegistry::new(too_many).unwrap();
        let err = driver.configure_register(&registry).await.unwrap_err();
        assert!(matches!(err, EcuError::Configuration(_)));
        assert_eq!(mock.count_requests(&[0x2C, 0xF0]), 0);
        assert_eq!(driver.state(), DriverState::SessionActive);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_register_uses_last_slot() {
        let (mock, driver) = setup();
        mock.add_response(vec![0x2C, 0xF0], vec![0x6C, 0xF0]);
        driver.start_session().await.unwrap();

        let full = (0..255u16)
            .map(|n| VariableDefinition::symbol(format!("Sym.{}", n), n + 1, DataType::Uint8))
            .collect();
        let registry = VariableRegistry::new(full).unwrap();
        driver.configure_register(&registry).await.unwrap();
        assert_eq!(mock.count_requests(&[0x2C, 0xF0, 0x03, 0xFF]), 1);
        assert_eq!(mock.count_requests(&[0x2C, 0xF0, 0x03, 0x00]), 0);
    }

    #[tokio::test]
    async fn test_read_before_configure_rejected() {
        let (_mock, driver) = setup();
        let err = driver.read().await.unwrap_err();
        assert!(matches!(
            err,
            EcuError::Protocol(ProtocolError::InvalidState { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_without_reply_times_out() {
        let mock = Arc::new(MockTransport::new(&MockConfig::default()));
        let driver = Kwp2000Driver::new(mock, DriverOptions::default());
        let err = driver.start_session().await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(driver.state(), DriverState::Idle);
    }

    #[tokio::test]
    async fn test_handshake_rejected() {
        let mock = Arc::new(MockTransport::new(&MockConfig::default()));
        mock.add_frame_reply(INIT_MSG_ID, CanFrame::new(INIT_RESP_ID, vec![0x40, 0xBF, 0x21, 0x7F]));
        let driver = Kwp2000Driver::new(mock, DriverOptions::default());
        assert!(matches!(
            driver.start_session().await,
            Err(EcuError::Protocol(ProtocolError::HandshakeFailed(_)))
        ));
    }

    #[tokio::test]
    async fn test_firmware_unsupported() {
        let (_mock, driver) = setup();
        let ctx = TransferContext::new(std::time::Duration::from_secs(1));
        assert!(matches!(
            driver.dump(&ctx).await,
            Err(EcuError::Unsupported { .. })
        ));
        assert!(driver.broadcast_decoder().is_some());
    }
}
