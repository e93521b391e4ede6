//! Mock transport adapter for testing

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;

use super::{AddressInfo, CanFrame, CanTransport, IncomingFrame, TransportError};
use crate::config::MockConfig;

/// What the mock ECU does with a diagnostic request
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Answer with these bytes
    Respond(Vec<u8>),
    /// Fail the exchange at the transport level
    Fail(TransportError),
}

/// Dynamic responder, consulted before the static response table
pub type MockHandler = Arc<dyn Fn(AddressInfo, &[u8]) -> Option<MockReply> + Send + Sync>;

/// Mock transport adapter for testing
pub struct MockTransport {
    config: MockConfig,
    connected: AtomicBool,
    incoming_tx: broadcast::Sender<IncomingFrame>,
    /// Predefined responses (request prefix -> reply)
    responses: RwLock<Vec<(Vec<u8>, MockReply)>>,
    handler: RwLock<Option<MockHandler>>,
    /// Raw frame replies (sent on id -> reply frame)
    frame_replies: RwLock<Vec<(u32, CanFrame)>>,
    requests: Mutex<Vec<(AddressInfo, Vec<u8>)>>,
    sent_frames: Mutex<Vec<CanFrame>>,
}

impl MockTransport {
    pub fn new(config: &MockConfig) -> Self {
        let (incoming_tx, _) = broadcast::channel(256);
        Self {
            config: config.clone(),
            connected: AtomicBool::new(true),
            incoming_tx,
            responses: RwLock::new(Vec::new()),
            handler: RwLock::new(None),
            frame_replies: RwLock::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            sent_frames: Mutex::new(Vec::new()),
        }
    }

    /// Add a mock response for a given request
    pub fn add_response(&self, request: Vec<u8>, response: Vec<u8>) {
        self.responses
            .write()
            .push((request, MockReply::Respond(response)));
    }

    /// Make every request starting with `request` fail
    pub fn add_failure(&self, request: Vec<u8>, error: TransportError) {
        self.responses.write().push((request, MockReply::Fail(error)));
    }

    /// Remove all static responses and failures
    pub fn clear_responses(&self) {
        self.responses.write().clear();
    }

    /// Install a dynamic responder (simulated ECU)
    pub fn set_handler(&self, handler: MockHandler) {
        *self.handler.write() = Some(handler);
    }

    /// Answer a raw frame sent on `id` with `reply`
    pub fn add_frame_reply(&self, id: u32, reply: CanFrame) {
        self.frame_replies.write().push((id, reply));
    }

    /// Inject a raw frame (simulates ECU broadcast traffic)
    pub fn inject_frame(&self, frame: CanFrame) {
        let msg = IncomingFrame {
            timestamp: Instant::now(),
            frame,
        };
        let _ = self.incoming_tx.send(msg);
    }

    /// Set connection state
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Every diagnostic request seen so far
    pub fn requests(&self) -> Vec<(AddressInfo, Vec<u8>)> {
        self.requests.lock().clone()
    }

    /// Number of requests starting with `prefix`
    pub fn count_requests(&self, prefix: &[u8]) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|(_, req)| req.starts_with(prefix))
            .count()
    }

    /// Every raw frame sent so far
    pub fn sent_frames(&self) -> Vec<CanFrame> {
        self.sent_frames.lock().clone()
    }

    fn find_reply(&self, address: AddressInfo, request: &[u8]) -> Option<MockReply> {
        let handler = self.handler.read().clone();
        if let Some(handler) = handler {
            if let Some(reply) = handler(address, request) {
                return Some(reply);
            }
        }

        let responses = self.responses.read();

        // First try exact match
        for (req, reply) in responses.iter() {
            if req == request {
                return Some(reply.clone());
            }
        }

        // Then try prefix match for variable-length requests
        for (req, reply) in responses.iter() {
            if request.starts_with(req) {
                return Some(reply.clone());
            }
        }

        // Generate default positive response based on service ID
        request
            .first()
            .map(|sid| MockReply::Respond(vec![sid.wrapping_add(0x40)]))
    }

    async fn simulate_latency(&self) {
        if self.config.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.latency_ms)).await;
        }
    }
}

#[async_trait]
impl CanTransport for MockTransport {
    async fn send_receive(
        &self,
        address: AddressInfo,
        request: &[u8],
        _timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }

        self.requests.lock().push((address, request.to_vec()));
        self.simulate_latency().await;

        match self.find_reply(address, request) {
            Some(MockReply::Respond(data)) => Ok(data),
            Some(MockReply::Fail(e)) => Err(e),
            None => Err(TransportError::ReceiveFailed(
                "No mock response configured".to_string(),
            )),
        }
    }

    async fn send(&self, address: AddressInfo, request: &[u8]) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }

        self.requests.lock().push((address, request.to_vec()));
        self.simulate_latency().await;

        tracing::debug!(?request, %address, "Mock transport: sent message");
        Ok(())
    }

    async fn send_frame(&self, frame: CanFrame) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }

        self.simulate_latency().await;

        let replies: Vec<CanFrame> = self
            .frame_replies
            .read()
            .iter()
            .filter(|(id, _)| *id == frame.id)
            .map(|(_, reply)| reply.clone())
            .collect();
        self.sent_frames.lock().push(frame);

        for reply in replies {
            self.inject_frame(reply);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<IncomingFrame> {
        self.incoming_tx.subscribe()
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
