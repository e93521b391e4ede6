//! Decoding the raw register buffer
//!
//! The ECU answers a register read with the values of every programmed
//! variable concatenated in registration order. A single cursor walks the
//! buffer and each definition consumes exactly its own width.

use crate::definition::VariableDefinition;
use crate::error::{VarError, VarResult};
use crate::precision::round_to;
use crate::types::DataType;

/// One decoded register slot
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedValue {
    /// Position of the definition in the registry
    pub index: usize,
    pub name: String,
    /// Raw integer value after bit masking
    pub raw: f64,
    /// Physical value (raw * scale + offset), rounded to the variable precision
    pub value: f64,
}

/// Outcome of decoding one register buffer
#[derive(Debug, Default)]
pub struct DecodeReport {
    /// Values decoded before the cursor stopped, in registration order
    pub values: Vec<DecodedValue>,
    /// Bytes left after every definition was satisfied
    pub leftovers: Vec<u8>,
    /// Set when the buffer ran out before the last definition
    pub error: Option<VarError>,
}

impl DecodeReport {
    /// True when every definition produced a value
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    /// Leftover bytes as uppercase hex, for diagnostics
    pub fn leftovers_hex(&self) -> String {
        hex::encode_upper(&self.leftovers)
    }
}

/// Decode a register buffer against an ordered list of definitions
///
/// Decoding stops at the first definition the remaining bytes cannot
/// satisfy; nothing after it is decoded.
pub fn decode_register(defs: &[VariableDefinition], data: &[u8]) -> DecodeReport {
    let mut report = DecodeReport {
        values: Vec::with_capacity(defs.len()),
        ..Default::default()
    };
    let mut cursor = 0usize;

    for (index, def) in defs.iter().enumerate() {
        match decode_value(def, data, cursor) {
            Ok((raw, value)) => {
                report.values.push(DecodedValue {
                    index,
                    name: def.name.clone(),
                    raw,
                    value,
                });
                cursor += def.width();
            }
            Err(e) => {
                report.error = Some(e);
                return report;
            }
        }
    }

    report.leftovers = data[cursor..].to_vec();
    report
}

/// Decode a single variable at `offset`, returning (raw, physical)
pub fn decode_value(def: &VariableDefinition, data: &[u8], offset: usize) -> VarResult<(f64, f64)> {
    let raw = read_raw_value(def, data, offset)?;
    let physical = raw * def.scale + def.offset;
    Ok((raw, round_to(physical, def.get_precision())))
}

/// Read raw value from bytes at offset
fn read_raw_value(def: &VariableDefinition, data: &[u8], offset: usize) -> VarResult<f64> {
    check_length(def, data, offset)?;
    let bytes = &data[offset..offset + def.width()];

    let raw = match def.data_type {
        DataType::Uint8 => apply_bits(def, bytes[0] as u32) as f64,
        DataType::Uint16 => apply_bits(def, u16::from_be_bytes([bytes[0], bytes[1]]) as u32) as f64,
        DataType::Uint32 => {
            apply_bits(def, u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])) as f64
        }
        DataType::Int8 => bytes[0] as i8 as f64,
        DataType::Int16 => i16::from_be_bytes([bytes[0], bytes[1]]) as f64,
        DataType::Int32 => i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64,
    };

    Ok(raw)
}

fn apply_bits(def: &VariableDefinition, mut raw: u32) -> u32 {
    if let Some(mask) = def.bit_mask {
        raw &= mask;
    }
    if let Some(shift) = def.bit_shift {
        raw >>= shift;
    }
    raw
}

fn check_length(def: &VariableDefinition, data: &[u8], offset: usize) -> VarResult<()> {
    let available = data.len().saturating_sub(offset);
    if def.width() > available {
        Err(VarError::DataTooShort {
            name: def.name.clone(),
            expected: def.width(),
            available,
        })
    } else {
        Ok(())
    }
}
