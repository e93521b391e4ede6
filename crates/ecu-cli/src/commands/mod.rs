//! Command implementations for ecu-logger

pub mod firmware;
pub mod log;
pub mod replay;

pub use firmware::{dump, flash, reset};
pub use log::log;
pub use replay::replay;
