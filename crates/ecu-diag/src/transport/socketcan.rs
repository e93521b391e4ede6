//! SocketCAN transport (Linux only)
//!
//! Raw frames go through one CAN socket whose receive side feeds the frame
//! broadcast. Diagnostic exchanges use one ISO-TP socket per address pair,
//! opened on first use.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use socketcan::{CanFrame as RawFrame, CanSocket, EmbeddedFrame, Id, Socket, StandardId};
use socketcan_isotp::IsoTpSocket;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use super::{AddressInfo, CanFrame, CanTransport, IncomingFrame, TransportError};
use crate::config::SocketCanConfig;

/// Poll interval of the non-blocking sockets
const POLL_INTERVAL: Duration = Duration::from_millis(1);

type SharedIsoTp = Arc<Mutex<IsoTpSocket>>;

pub struct SocketCanTransport {
    config: SocketCanConfig,
    raw: Arc<CanSocket>,
    channels: Mutex<HashMap<AddressInfo, SharedIsoTp>>,
    running: Arc<AtomicBool>,
    incoming_tx: broadcast::Sender<IncomingFrame>,
}

impl SocketCanTransport {
    pub async fn new(config: &SocketCanConfig) -> Result<Self, TransportError> {
        let raw = CanSocket::open(&config.interface).map_err(|e| {
            TransportError::ConnectionFailed(format!("{}: {}", config.interface, e))
        })?;
        raw.set_nonblocking(true).map_err(|e| {
            TransportError::InvalidConfig(format!("non-blocking mode: {}", e))
        })?;

        let (incoming_tx, _) = broadcast::channel(1024);
        let transport = Self {
            config: config.clone(),
            raw: Arc::new(raw),
            channels: Mutex::new(HashMap::new()),
            running: Arc::new(AtomicBool::new(true)),
            incoming_tx,
        };
        transport.start_listener();

        info!(
            interface = %config.interface,
            bitrate = config.bitrate,
            "SocketCAN transport opened"
        );
        Ok(transport)
    }

    fn start_listener(&self) {
        let socket = self.raw.clone();
        let running = self.running.clone();
        let incoming_tx = self.incoming_tx.clone();

        tokio::task::spawn_blocking(move || {
            while running.load(Ordering::SeqCst) {
                match socket.read_frame() {
                    Ok(RawFrame::Data(frame)) => {
                        let msg = IncomingFrame {
                            timestamp: Instant::now(),
                            frame: CanFrame::new(raw_id(frame.id()), frame.data()),
                        };
                        // No receivers is fine
                        let _ = incoming_tx.send(msg);
                    }
                    Ok(_) => {}
                    Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        std::thread::sleep(POLL_INTERVAL);
                    }
                    Err(e) => {
                        error!(?e, "CAN read error");
                        std::thread::sleep(Duration::from_millis(100));
                    }
                }
            }
            debug!("CAN listener stopped");
        });
    }

    /// ISO-TP socket for an address pair, opened on first use
    fn channel(&self, address: AddressInfo) -> Result<SharedIsoTp, TransportError> {
        let mut channels = self.channels.lock();
        if let Some(socket) = channels.get(&address) {
            return Ok(socket.clone());
        }

        let rx_id = standard_id(address.rx_id)?;
        let tx_id = standard_id(address.tx_id)?;
        let socket = IsoTpSocket::open(&self.config.interface, rx_id, tx_id).map_err(|e| {
            TransportError::ConnectionFailed(format!("ISO-TP on {}: {}", self.config.interface, e))
        })?;
        socket.set_nonblocking(true).map_err(|e| {
            TransportError::InvalidConfig(format!("non-blocking mode: {}", e))
        })?;

        debug!(%address, "ISO-TP channel opened");
        let socket = Arc::new(Mutex::new(socket));
        channels.insert(address, socket.clone());
        Ok(socket)
    }
}

fn standard_id(id: u32) -> Result<StandardId, TransportError> {
    u16::try_from(id)
        .ok()
        .and_then(StandardId::new)
        .ok_or_else(|| TransportError::InvalidConfig(format!("0x{:X} is not an 11-bit CAN id", id)))
}

fn raw_id(id: Id) -> u32 {
    match id {
        Id::Standard(id) => id.as_raw() as u32,
        Id::Extended(id) => id.as_raw(),
    }
}

fn write_isotp(socket: &IsoTpSocket, request: &[u8]) -> Result<(), TransportError> {
    socket
        .write(request)
        .map_err(|e| TransportError::SendFailed(e.to_string()))
}

#[async_trait]
impl CanTransport for SocketCanTransport {
    async fn send_receive(
        &self,
        address: AddressInfo,
        request: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }
        let socket = self.channel(address)?;
        let request = request.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut socket = socket.lock();

            // Late replies to an exchange that already timed out
            while let Ok(data) = socket.read() {
                if data.is_empty() {
                    break;
                }
                debug!(%address, data = ?data, "Drained stale message");
            }
            write_isotp(&socket, &request)?;

            let deadline = Instant::now() + timeout;
            loop {
                match socket.read() {
                    Ok(data) if !data.is_empty() => return Ok(data.to_vec()),
                    Ok(_) => {}
                    Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                    Err(e) => return Err(TransportError::ReceiveFailed(e.to_string())),
                }
                if Instant::now() >= deadline {
                    return Err(TransportError::Timeout(format!("no response on {}", address)));
                }
                std::thread::sleep(POLL_INTERVAL);
            }
        })
        .await
        .map_err(|e| TransportError::ReceiveFailed(format!("worker task: {}", e)))?
    }

    async fn send(&self, address: AddressInfo, request: &[u8]) -> Result<(), TransportError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }
        let socket = self.channel(address)?;
        let request = request.to_vec();

        tokio::task::spawn_blocking(move || write_isotp(&socket.lock(), &request))
            .await
            .map_err(|e| TransportError::SendFailed(format!("worker task: {}", e)))?
    }

    async fn send_frame(&self, frame: CanFrame) -> Result<(), TransportError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }
        let raw = RawFrame::new(standard_id(frame.id)?, &frame.data).ok_or_else(|| {
            TransportError::SendFailed(format!("{} bytes do not fit a CAN frame", frame.data.len()))
        })?;
        let socket = self.raw.clone();

        tokio::task::spawn_blocking(move || {
            socket
                .write_frame(&raw)
                .map_err(|e| TransportError::SendFailed(e.to_string()))
        })
        .await
        .map_err(|e| TransportError::SendFailed(format!("worker task: {}", e)))?
    }

    fn subscribe(&self) -> broadcast::Receiver<IncomingFrame> {
        self.incoming_tx.subscribe()
    }

    async fn is_connected(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for SocketCanTransport {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}
