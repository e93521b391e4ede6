//! Diagnostic protocol drivers
//!
//! - [`Kwp2000Driver`]: Trionic 7
//! - [`GmlanDriver`]: Trionic 8, Trionic 8 Z22SE, Trionic 8 MCP
//!
//! Both speak through a [`DiagClient`] and are used behind the
//! [`EcuDriver`] trait, selected with [`create_driver`].

mod client;
mod driver;
mod error;
pub mod gmlan;
mod keepalive;
pub mod kwp2000;
mod nrc;
mod state;

pub use client::{DiagClient, NEGATIVE_RESPONSE};
pub use driver::{create_driver, DriverOptions, EcuDriver};
pub use error::ProtocolError;
pub use gmlan::GmlanDriver;
pub use keepalive::KeepAlive;
pub use kwp2000::Kwp2000Driver;
pub use nrc::NegativeResponseCode;
pub use state::{DriverState, StateCell};
