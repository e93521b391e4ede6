//! Errors raised below the diagnostic protocol layer

use thiserror::Error;

/// Failure of a CAN exchange, independent of the ECU's answer
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("cannot open CAN interface: {0}")]
    ConnectionFailed(String),

    #[error("CAN transport closed")]
    ConnectionClosed,

    #[error("CAN send failed: {0}")]
    SendFailed(String),

    #[error("CAN receive failed: {0}")]
    ReceiveFailed(String),

    /// The ECU stayed silent for the whole reply window
    #[error("no reply: {0}")]
    Timeout(String),

    #[error("invalid transport configuration: {0}")]
    InvalidConfig(String),

    #[error("transport not available: {0}")]
    Unsupported(String),
}
