//! Firmware dump, flash and reset for the Trionic 8 family
//!
//! All transfers go through the resident loader ([`Loader`]) and are
//! verified with MD5 digests the loader computes on the ECU.

mod context;
mod engine;
pub mod layout;
mod loader;
mod seed;

pub use context::TransferContext;
pub use engine::FirmwareEngine;
pub use layout::{FirmwareLayout, TRIONIC8, TRIONIC8_MCP};
pub use loader::{Loader, LoaderCommand, LOADER_ADDRESS};
pub use seed::calculate_key;
