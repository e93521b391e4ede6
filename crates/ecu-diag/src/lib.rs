//! ecu-diag - live logging and firmware transfer for Trionic ECUs
//!
//! This crate talks to Saab Trionic 7 (KWP2000 over CAN) and Trionic 8
//! family (GMLAN) engine control units: it programs their dynamic register,
//! polls and decodes it into a pipe-delimited log, and dumps or flashes
//! firmware through the resident loader.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       LogSession                            │
//! │  retry policy, watchdog + poll loop, broadcast listener     │
//! │                                                             │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//! │  │VariableReg. │  │ SignalMap / │  │ LogWriter           │  │
//! │  │ (decode)    │  │ SignalHub   │  │ (.t7l / .t8l)       │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────┘  │
//! │                          │                                  │
//! │                 ┌────────┴────────┐   ┌────────────────┐    │
//! │                 │   EcuDriver     │───│ FirmwareEngine │    │
//! │                 │ (KWP2000/GMLAN) │   │ (loader, MD5)  │    │
//! │                 └────────┬────────┘   └────────────────┘    │
//! │                          │                                  │
//! │                 ┌────────┴────────┐                         │
//! │                 │  CanTransport   │                         │
//! │                 │(SocketCAN/mock) │                         │
//! │                 └─────────────────┘                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod firmware;
pub mod logfile;
pub mod protocol;
pub mod session;
pub mod signals;
pub mod transport;

pub use config::{EcuKind, FirmwareConfig, LoggerConfig, SupervisorConfig, TransportConfig};
pub use error::EcuError;
pub use events::{EventSink, NullSink, TracingSink};
pub use firmware::{FirmwareEngine, TransferContext};
pub use logfile::{LogReader, LogRecord, LogSummary, LogWriter};
pub use protocol::{create_driver, DriverOptions, DriverState, EcuDriver, ProtocolError};
pub use session::{LogSession, SessionConfig, StopHandle};
pub use signals::{SignalHub, SignalMap, SignalUpdate};
pub use transport::{create_transport, AddressInfo, CanTransport, MockTransport, TransportError};

// Re-export the variable definitions this crate decodes with
pub use ecu_vars;
