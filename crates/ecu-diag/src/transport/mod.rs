//! CAN access for the protocol drivers
//!
//! Drivers see the bus through [`CanTransport`]: request/reply exchanges on
//! an ISO-TP address pair, raw frame writes for the T7 broadcast handshake,
//! and a frame broadcast for listeners. SocketCAN backs it on Linux,
//! [`MockTransport`] everywhere else.
//!
//! ```ignore
//! let transport = create_transport(&config.transport).await?;
//! let reply = transport
//!     .send_receive(AddressInfo::new(0x7E0, 0x7E8), &[0x1A, 0x90], Duration::from_millis(150))
//!     .await?;
//! ```

mod adapter;
pub mod error;
pub mod mock;

#[cfg(all(target_os = "linux", feature = "socketcan"))]
pub mod socketcan;

pub use adapter::{AddressInfo, CanFrame, CanTransport, FrameSubscription, IncomingFrame};
pub use error::TransportError;
pub use mock::{MockHandler, MockReply, MockTransport};

use std::sync::Arc;

use crate::config::TransportConfig;

/// Open the configured transport
pub async fn create_transport(
    config: &TransportConfig,
) -> Result<Arc<dyn CanTransport>, TransportError> {
    match config {
        #[cfg(all(target_os = "linux", feature = "socketcan"))]
        TransportConfig::SocketCan(cfg) => {
            Ok(Arc::new(socketcan::SocketCanTransport::new(cfg).await?))
        }
        #[cfg(not(all(target_os = "linux", feature = "socketcan")))]
        TransportConfig::SocketCan(cfg) => Err(TransportError::Unsupported(format!(
            "{} needs a Linux build with the socketcan feature",
            cfg.interface
        ))),
        TransportConfig::Mock(cfg) => Ok(Arc::new(MockTransport::new(cfg))),
    }
}
