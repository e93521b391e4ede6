//! Failures of a single diagnostic exchange

use thiserror::Error;

use super::{DriverState, NegativeResponseCode};
use crate::transport::TransportError;

#[derive(Debug, Error, Clone)]
pub enum ProtocolError {
    /// The ECU answered `7F <sid> <nrc>`
    #[error("ECU refused service 0x{service_id:02X}: {nrc} (0x{nrc:02X})")]
    NegativeResponse {
        service_id: u8,
        nrc: NegativeResponseCode,
    },

    #[error("malformed reply: {0}")]
    InvalidResponse(String),

    #[error("reply 0x{actual:02X} does not echo request 0x{expected:02X}")]
    UnexpectedResponse { expected: u8, actual: u8 },

    /// Response-pending replies kept coming past the patience window
    #[error("ECU kept the request pending too long")]
    Timeout,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("cannot {operation} while {state:?}")]
    InvalidState {
        operation: &'static str,
        state: DriverState,
    },

    #[error("security access refused: {0}")]
    SecurityAccessFailed(String),

    #[error("could not open a diagnostic session: {0}")]
    HandshakeFailed(String),

    #[error("loader: {0}")]
    Loader(String),
}
