//! ecu-vars - register variable definitions for ECU live logging
//!
//! The ECU's dynamic register is programmed with an ordered list of
//! variables. Every read returns their raw values back to back; this crate
//! owns the definitions and slices those buffers into physical values.
//!
//! # Quick Start
//!
//! ```rust
//! use ecu_vars::{DataType, VariableDefinition, VariableRegistry};
//!
//! let registry = VariableRegistry::new(vec![
//!     VariableDefinition::symbol("ActualIn.n_Engine", 1023, DataType::Uint16),
//!     VariableDefinition::symbol("In.v_Vehicle", 1200, DataType::Uint16)
//!         .with_scale(0.1, 0.0),
//! ])
//! .unwrap();
//!
//! let report = registry.decode(&[0x0B, 0xB8, 0x03, 0xE9, 0x55]);
//! assert_eq!(report.values[0].value, 3000.0);
//! assert_eq!(report.values[1].value, 100.1);
//! assert_eq!(report.leftovers, vec![0x55]);
//! ```
//!
//! # Definition Files
//!
//! ```yaml
//! meta:
//!   name: Trionic 7 basic
//!
//! variables:
//!   - name: ActualIn.T_Engine
//!     method: symbol        # symbol | address | local_identifier
//!     source: "0x0400"
//!     type: int16
//!     scale: 0.1
//!     unit: "°C"
//! ```

pub mod decode;
pub mod definition;
pub mod error;
pub mod precision;
pub mod registry;
pub mod types;

pub use decode::{decode_register, DecodeReport, DecodedValue};
pub use definition::VariableDefinition;
pub use error::{VarError, VarResult};
pub use precision::{default_decimals, round_to};
pub use registry::{RegistryMeta, VariableRegistry};
pub use types::{DataType, ReadMethod};
