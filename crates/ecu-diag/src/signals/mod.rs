//! Signal distribution
//!
//! Intrinsic values from broadcast frames live in a shared [`SignalMap`]
//! that every log line snapshots; every decoded value, polled or broadcast,
//! is also fanned out to live observers through the [`SignalHub`].

mod broadcast;
mod hub;
mod map;

pub use broadcast::{BroadcastDecoder, BroadcastSignal, Trionic7Broadcast};
pub use hub::{SignalHub, SignalUpdate, Subscription};
pub use map::SignalMap;
