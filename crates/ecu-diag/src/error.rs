//! Top-level error type

use std::time::Duration;

use ecu_vars::VarError;
use thiserror::Error;

use crate::config::EcuKind;
use crate::logfile::LogParseError;
use crate::protocol::ProtocolError;
use crate::transport::TransportError;

/// Errors surfaced by sessions and firmware operations
#[derive(Debug, Error)]
pub enum EcuError {
    /// Bus-level failure (no response, adapter gone)
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The ECU answered, but not the way the protocol expects
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Invalid configuration or variable definitions
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// MD5 of data on the ECU differs from the local copy
    #[error("{what} md5 verification failed: ecu {remote}, local {local}")]
    Integrity {
        what: String,
        remote: String,
        local: String,
    },

    /// Firmware image has the wrong length for the target
    #[error("invalid image size: expected {expected} bytes, got {actual}")]
    Size { expected: usize, actual: usize },

    /// The watchdog saw more read failures per second than allowed
    #[error("too many errors ({count} in one second)")]
    TooManyErrors { count: u64 },

    #[error("{operation} is not supported on {kind}")]
    Unsupported {
        operation: &'static str,
        kind: EcuKind,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    #[error("malformed log line {line}: {source}")]
    LogFormat {
        line: usize,
        #[source]
        source: LogParseError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<VarError> for EcuError {
    fn from(err: VarError) -> Self {
        match err {
            VarError::IoError(e) => EcuError::Io(e),
            other => EcuError::Configuration(other.to_string()),
        }
    }
}

impl EcuError {
    /// Whether a whole-session retry may clear this failure
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EcuError::Transport(_) | EcuError::Protocol(_) | EcuError::TooManyErrors { .. }
        )
    }
}
