//! Decoding of periodic broadcast frames
//!
//! Trionic 7 puts a few engine values on the bus by itself. They are logged
//! alongside the polled register without costing any diagnostic bandwidth.

use crate::transport::CanFrame;

/// One value decoded from a broadcast frame
#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastSignal {
    pub name: &'static str,
    pub value: f64,
    /// Text stored in the shared signal map; `None` for observer-only flags
    pub text: Option<String>,
}

impl BroadcastSignal {
    fn logged(name: &'static str, value: f64, text: String) -> Self {
        Self {
            name,
            value,
            text: Some(text),
        }
    }

    fn flag(name: &'static str, set: bool) -> Self {
        Self {
            name,
            value: if set { 1.0 } else { 0.0 },
            text: None,
        }
    }
}

/// Decoder for the broadcast frames of one ECU family
pub trait BroadcastDecoder: Send + Sync {
    /// Frame identifiers to subscribe to
    fn frame_ids(&self) -> &[u32];

    /// Signals present in the shared map before the first frame arrives
    fn initial_signals(&self) -> Vec<(String, String)>;

    /// Decode one frame; frames too short for their layout yield nothing
    fn decode(&self, frame: &CanFrame) -> Vec<BroadcastSignal>;
}

pub const ENGINE_SPEED: &str = "ActualIn.n_Engine";
pub const ACCELERATOR_PEDAL: &str = "Out.X_AccPedal";
pub const VEHICLE_SPEED: &str = "In.v_Vehicle";
pub const LIMP_HOME: &str = "Out.ST_LimpHome";

const ENGINE_FRAME: u32 = 0x1A0;
const STATUS_FRAME: u32 = 0x280;
const SPEED_FRAME: u32 = 0x3A0;

/// Trionic 7 P-bus broadcast frames
#[derive(Debug, Default)]
pub struct Trionic7Broadcast;

impl BroadcastDecoder for Trionic7Broadcast {
    fn frame_ids(&self) -> &[u32] {
        &[ENGINE_FRAME, STATUS_FRAME, SPEED_FRAME]
    }

    fn initial_signals(&self) -> Vec<(String, String)> {
        [
            (ENGINE_SPEED, "0"),
            (ACCELERATOR_PEDAL, "0.0"),
            (VEHICLE_SPEED, "0.0"),
            (LIMP_HOME, "0"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    fn decode(&self, frame: &CanFrame) -> Vec<BroadcastSignal> {
        let data = &frame.data;
        match frame.id {
            ENGINE_FRAME if data.len() >= 6 => {
                let rpm = u16::from_be_bytes([data[1], data[2]]);
                let pedal = data[5];
                vec![
                    BroadcastSignal::logged(ENGINE_SPEED, rpm as f64, rpm.to_string()),
                    BroadcastSignal::logged(
                        ACCELERATOR_PEDAL,
                        pedal as f64,
                        format!("{}.0", pedal),
                    ),
                ]
            }
            STATUS_FRAME if data.len() >= 5 => {
                let limp = data[3] & 0x01 == 0x01;
                let mut signals = vec![
                    BroadcastSignal::flag("CRUISE", data[4] & 0x20 == 0x20),
                    BroadcastSignal::flag("CEL", data[4] & 0x80 == 0x80),
                    BroadcastSignal::flag("LIMP", limp),
                ];
                let limp_value = if limp { 1.0 } else { 0.0 };
                signals.push(BroadcastSignal::logged(
                    LIMP_HOME,
                    limp_value,
                    format!("{}", limp_value as u8),
                ));
                signals
            }
            SPEED_FRAME if data.len() >= 5 => {
                let speed = u16::from_be_bytes([data[3], data[4]]) as f64 / 10.0;
                vec![BroadcastSignal::logged(
                    VEHICLE_SPEED,
                    speed,
                    format!("{:.1}", speed),
                )]
            }
            id => {
                tracing::debug!(id = format!("0x{:03X}", id), len = data.len(), "Ignoring broadcast frame");
                Vec::new()
            }
        }
    }
}
