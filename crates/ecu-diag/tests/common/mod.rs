//! Simulated Trionic ECUs on top of the mock transport

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};

use ecu_diag::config::MockConfig;
use ecu_diag::events::EventSink;
use ecu_diag::firmware::layout::md5;
use ecu_diag::firmware::{TRIONIC8, TRIONIC8_MCP};
use ecu_diag::transport::{AddressInfo, CanFrame, MockReply, MockTransport, TransportError};
use parking_lot::Mutex;

/// State behind a simulated ECU, adjustable while a test runs
#[derive(Default)]
pub struct SimState {
    /// Flash contents per loader target
    pub flash: Mutex<HashMap<u8, Vec<u8>>>,
    /// Payload returned by register reads
    pub register: Mutex<Vec<u8>>,
    pub loader_running: AtomicBool,
    pub fail_start: AtomicBool,
    pub fail_reads: AtomicBool,
    /// Reads since the last handshake
    pub reads: AtomicU32,
    /// At 20 Hz, fail this many reads of every second, starting at the
    /// sixth so no failure sits on a watchdog tick
    pub failures_per_second: AtomicU32,
    /// Wall-clock time each register read takes
    pub read_delay_ms: AtomicU64,
    /// Wall-clock time each register read arrived
    pub read_times: Mutex<Vec<DateTime<Local>>>,
    /// Flip a byte of whole-image digests
    pub corrupt_md5: AtomicBool,
    /// Exit demands to fail before one succeeds
    pub exit_failures: AtomicU32,
}

pub struct SimEcu {
    pub mock: Arc<MockTransport>,
    pub state: Arc<SimState>,
}

fn timeout(what: &str) -> MockReply {
    MockReply::Fail(TransportError::Timeout(what.to_string()))
}

fn respond(bytes: Vec<u8>) -> Option<MockReply> {
    Some(MockReply::Respond(bytes))
}

impl SimEcu {
    /// Trionic 8 with a patterned main flash and MCP flash
    pub fn trionic8() -> Self {
        let state = Arc::new(SimState::default());
        {
            let mut flash = state.flash.lock();
            flash.insert(TRIONIC8.target, pattern(TRIONIC8.size, 7));
            flash.insert(TRIONIC8_MCP.target, pattern(TRIONIC8_MCP.size, 3));
        }
        let mock = Arc::new(MockTransport::new(&MockConfig::default()));
        let handler_state = state.clone();
        mock.set_handler(Arc::new(move |_: AddressInfo, req: &[u8]| {
            gmlan_reply(&handler_state, req)
        }));
        Self { mock, state }
    }

    /// Trionic 7 answering the handshake and register services
    pub fn trionic7() -> Self {
        let state = Arc::new(SimState::default());
        let mock = Arc::new(MockTransport::new(&MockConfig::default()));
        mock.add_frame_reply(
            0x220,
            CanFrame::new(0x238, vec![0x40, 0xBF, 0x21, 0xC1, 0x00, 0x11, 0x02, 0x58]),
        );
        let handler_state = state.clone();
        mock.set_handler(Arc::new(move |_: AddressInfo, req: &[u8]| {
            kwp_reply(&handler_state, req)
        }));
        Self { mock, state }
    }

    pub fn set_register(&self, data: Vec<u8>) {
        *self.state.register.lock() = data;
    }

    pub fn flash(&self, target: u8) -> Vec<u8> {
        self.state
            .flash
            .lock()
            .get(&target)
            .cloned()
            .unwrap_or_default()
    }
}

pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(seed).wrapping_add((i >> 8) as u8))
        .collect()
}

fn gmlan_reply(state: &SimState, req: &[u8]) -> Option<MockReply> {
    match req {
        [0x10, 0x03] if state.fail_start.load(Ordering::SeqCst) => Some(timeout("start")),
        [0x10, 0x03] => {
            state.reads.store(0, Ordering::SeqCst);
            respond(vec![0x50])
        }
        [0x3B, 0x17, ..] => respond(vec![0x7B, 0x17]),
        [0x1A, 0x18] => register_reply(state, vec![0x5A, 0x18]),
        [0x20] => respond(vec![0x60]),

        // Programming entry
        [0x28] => respond(vec![0x68]),
        [0xA5, 0x01] => respond(vec![0xE5]),
        [0x27, 0x01] => respond(vec![0x67, 0x01, 0x12, 0x34]),
        [0x27, 0x02, 0x5A, 0x19] => respond(vec![0x67, 0x02]),
        [0x27, 0x02, ..] => respond(vec![0x7F, 0x27, 0x35]),
        [0x36, 0x80, ..] => {
            state.loader_running.store(true, Ordering::SeqCst);
            respond(vec![0x76])
        }

        // Loader
        _ if !state.loader_running.load(Ordering::SeqCst) => match req.first() {
            Some(0x3D | 0x23 | 0x34 | 0x36 | 0x37) => Some(timeout("loader")),
            _ => None,
        },
        [0x3D, 0x00, ..] => respond(vec![0x7D, 0x00]),
        [0x3D, cmd @ (0x02 | 0x03), w1, w0] => {
            let target = if *cmd == 0x02 { TRIONIC8.target } else { TRIONIC8_MCP.target };
            let wish = u16::from_be_bytes([*w1, *w0]) as usize;
            let flash = state.flash.lock();
            let image = flash.get(&target)?;
            let mut digest = if wish == 0 {
                md5(image)
            } else {
                md5(TRIONIC8.partition(image, wish)?)
            };
            if wish == 0 && state.corrupt_md5.load(Ordering::SeqCst) {
                digest[0] ^= 0xFF;
            }
            let mut reply = vec![0x7D, *cmd];
            reply.extend_from_slice(&digest);
            respond(reply)
        }
        [0x3D, 0x04, ..] => respond(vec![0x7D, 0x04]),
        [0x3D, 0xFF, ..] => {
            let pending = state.exit_failures.load(Ordering::SeqCst);
            if pending > 0 {
                state.exit_failures.store(pending - 1, Ordering::SeqCst);
                return Some(timeout("exit"));
            }
            state.loader_running.store(false, Ordering::SeqCst);
            respond(vec![0x7D, 0xFF])
        }
        [0x23, target, a3, a2, a1, a0, l1, l0] => {
            let address = u32::from_be_bytes([*a3, *a2, *a1, *a0]) as usize;
            let len = u16::from_be_bytes([*l1, *l0]) as usize;
            let flash = state.flash.lock();
            let data = flash.get(target)?.get(address..address + len)?;
            let mut reply = vec![0x63];
            reply.extend_from_slice(data);
            respond(reply)
        }
        [0x34, _, ..] => respond(vec![0x74]),
        [0x36, target, a3, a2, a1, a0, data @ ..] => {
            let address = u32::from_be_bytes([*a3, *a2, *a1, *a0]) as usize;
            let mut flash = state.flash.lock();
            let image = flash.get_mut(target)?;
            image.get_mut(address..address + data.len())?.copy_from_slice(data);
            respond(vec![0x76])
        }
        [0x37, _] => respond(vec![0x77]),
        _ => None,
    }
}

fn register_reply(state: &SimState, mut reply: Vec<u8>) -> Option<MockReply> {
    state.read_times.lock().push(Local::now());
    let index = state.reads.fetch_add(1, Ordering::SeqCst);
    if state.fail_reads.load(Ordering::SeqCst) {
        return Some(timeout("read"));
    }
    let failing = state.failures_per_second.load(Ordering::SeqCst);
    if (5..5 + failing).contains(&(index % 20)) {
        return Some(timeout("read"));
    }
    let delay = state.read_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        std::thread::sleep(Duration::from_millis(delay));
    }
    reply.extend_from_slice(&state.register.lock());
    respond(reply)
}

fn kwp_reply(state: &SimState, req: &[u8]) -> Option<MockReply> {
    match req {
        [0x2C, 0xF0, ..] => respond(vec![0x6C, 0xF0]),
        [0x21, 0xF0] => register_reply(state, vec![0x61, 0xF0]),
        [0x82] => respond(vec![0xC2]),
        _ => None,
    }
}

/// Sink remembering every event
#[derive(Default)]
pub struct RecordingSink {
    pub messages: Mutex<Vec<String>>,
    pub progress: Mutex<Vec<i64>>,
    pub values: Mutex<Vec<(String, f64)>>,
    pub capture_counts: Mutex<Vec<u64>>,
    events: AtomicUsize,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }

    pub fn has_message(&self, prefix: &str) -> bool {
        self.messages.lock().iter().any(|m| m.starts_with(prefix))
    }

    pub fn count_messages(&self, prefix: &str) -> usize {
        self.messages
            .lock()
            .iter()
            .filter(|m| m.starts_with(prefix))
            .count()
    }

    /// Callbacks received so far
    pub fn events(&self) -> usize {
        self.events.load(Ordering::SeqCst)
    }

    fn bump(&self) {
        self.events.fetch_add(1, Ordering::SeqCst);
    }
}

impl EventSink for RecordingSink {
    fn on_message(&self, message: &str) {
        self.bump();
        self.messages.lock().push(message.to_string());
    }

    fn on_progress(&self, value: i64) {
        self.bump();
        self.progress.lock().push(value);
    }

    fn set_value(&self, name: &str, value: f64) {
        self.bump();
        self.values.lock().push((name.to_string(), value));
    }

    fn set_capture_count(&self, count: u64) {
        self.bump();
        self.capture_counts.lock().push(count);
    }

    fn set_error_count(&self, _count: u64) {
        self.bump();
    }

    fn set_errors_per_second(&self, _count: u64) {
        self.bump();
    }
}
