//! Transport adapter trait and types

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::broadcast::{self, error::RecvError};

use super::TransportError;

/// A raw CAN frame as seen on the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanFrame {
    /// 11-bit or 29-bit identifier
    pub id: u32,
    /// Payload, at most 8 bytes on classic CAN
    pub data: Vec<u8>,
}

impl CanFrame {
    pub fn new(id: u32, data: impl Into<Vec<u8>>) -> Self {
        Self {
            id,
            data: data.into(),
        }
    }
}

/// A frame received from the bus, stamped on arrival
#[derive(Debug, Clone)]
pub struct IncomingFrame {
    pub timestamp: Instant,
    pub frame: CanFrame,
}

/// Diagnostic addressing for one request/response channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct AddressInfo {
    /// Transmit ID (tester -> ECU)
    pub tx_id: u32,
    /// Receive ID (ECU -> tester)
    pub rx_id: u32,
}

impl AddressInfo {
    pub const fn new(tx_id: u32, rx_id: u32) -> Self {
        Self { tx_id, rx_id }
    }
}

impl std::fmt::Display for AddressInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:03X}/0x{:03X}", self.tx_id, self.rx_id)
    }
}

/// Transport-agnostic interface to the CAN bus
///
/// Two kinds of traffic share one connection: segmented diagnostic
/// request/response exchanges on an address pair, and raw single frames
/// (session handshakes and the ECU's periodic broadcast frames). Framing of
/// multi-frame diagnostic messages is the adapter's job.
#[async_trait]
pub trait CanTransport: Send + Sync {
    /// Send a diagnostic request and wait for the response
    ///
    /// # Arguments
    /// * `address` - Request/response identifier pair
    /// * `request` - The raw diagnostic request bytes
    /// * `timeout` - Maximum time to wait for a response
    async fn send_receive(
        &self,
        address: AddressInfo,
        request: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError>;

    /// Send a diagnostic request without waiting for a response
    async fn send(&self, address: AddressInfo, request: &[u8]) -> Result<(), TransportError>;

    /// Put a single raw frame on the bus
    async fn send_frame(&self, frame: CanFrame) -> Result<(), TransportError>;

    /// Subscribe to every raw frame received on the bus
    fn subscribe(&self) -> broadcast::Receiver<IncomingFrame>;

    /// Check if the transport is connected
    async fn is_connected(&self) -> bool;
}

/// Receiver that only yields frames with one of the given identifiers
pub struct FrameSubscription {
    rx: broadcast::Receiver<IncomingFrame>,
    ids: Vec<u32>,
}

impl FrameSubscription {
    pub fn new(rx: broadcast::Receiver<IncomingFrame>, ids: &[u32]) -> Self {
        Self {
            rx,
            ids: ids.to_vec(),
        }
    }

    /// Wait for the next matching frame
    ///
    /// Lagging behind the bus drops frames but never ends the subscription.
    pub async fn recv(&mut self) -> Result<IncomingFrame, TransportError> {
        loop {
            match self.rx.recv().await {
                Ok(msg) if self.ids.contains(&msg.frame.id) => return Ok(msg),
                Ok(_) => continue,
                Err(RecvError::Lagged(n)) => {
                    tracing::debug!(skipped = n, "Frame subscription lagged");
                    continue;
                }
                Err(RecvError::Closed) => return Err(TransportError::ConnectionClosed),
            }
        }
    }

    /// Wait for the next matching frame, up to `timeout`
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Result<IncomingFrame, TransportError> {
        tokio::time::timeout(timeout, self.recv())
            .await
            .map_err(|_| TransportError::Timeout(format!("no frame on {:X?}", self.ids)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscription_filters_ids() {
        let (tx, rx) = broadcast::channel(16);
        let mut sub = FrameSubscription::new(rx, &[0x238]);

        for id in [0x1A0, 0x238] {
            tx.send(IncomingFrame {
                timestamp: Instant::now(),
                frame: CanFrame::new(id, vec![0x40, 0xBF]),
            })
            .unwrap();
        }

        let msg = sub.recv().await.unwrap();
        assert_eq!(msg.frame.id, 0x238);
    }

    #[tokio::test]
    async fn test_subscription_closed() {
        let (tx, rx) = broadcast::channel::<IncomingFrame>(4);
        let mut sub = FrameSubscription::new(rx, &[0x238]);
        drop(tx);
        assert_eq!(
            sub.recv().await.unwrap_err(),
            TransportError::ConnectionClosed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscription_timeout() {
        let (_tx, rx) = broadcast::channel::<IncomingFrame>(4);
        let mut sub = FrameSubscription::new(rx, &[0x238]);
        let err = sub
            .recv_timeout(Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Timeout(_)));
    }

    #[test]
    fn test_address_display() {
        assert_eq!(AddressInfo::new(0x7E0, 0x7E8).to_string(), "0x7E0/0x7E8");
    }
}
