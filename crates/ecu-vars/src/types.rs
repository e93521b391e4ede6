//! Core types for register variables

use serde::{Deserialize, Serialize};

/// Primitive data type for raw register bytes
///
/// All multi-byte values are big-endian, as both Trionic families send them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// Unsigned 8-bit integer (1 byte)
    #[default]
    Uint8,
    /// Unsigned 16-bit integer (2 bytes)
    Uint16,
    /// Unsigned 32-bit integer (4 bytes)
    Uint32,
    /// Signed 8-bit integer (1 byte)
    Int8,
    /// Signed 16-bit integer (2 bytes)
    Int16,
    /// Signed 32-bit integer (4 bytes)
    Int32,
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DataType::Uint8 => "uint8",
            DataType::Uint16 => "uint16",
            DataType::Uint32 => "uint32",
            DataType::Int8 => "int8",
            DataType::Int16 => "int16",
            DataType::Int32 => "int32",
        };
        f.write_str(s)
    }
}

impl DataType {
    /// Number of register bytes consumed by one value of this type
    pub fn byte_size(&self) -> usize {
        match self {
            DataType::Uint8 | DataType::Int8 => 1,
            DataType::Uint16 | DataType::Int16 => 2,
            DataType::Uint32 | DataType::Int32 => 4,
        }
    }

    /// Check if this type is signed
    pub fn is_signed(&self) -> bool {
        matches!(self, DataType::Int8 | DataType::Int16 | DataType::Int32)
    }
}

/// How the ECU locates a variable when the dynamic register is programmed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadMethod {
    /// KWP2000 local identifier (source is 8 bits)
    LocalIdentifier,
    /// Absolute memory address (source is 24 bits)
    Address,
    /// Symbol table index (source is 16 bits)
    #[default]
    Symbol,
}

impl ReadMethod {
    /// Largest source value this method can address
    pub fn max_source(&self) -> u32 {
        match self {
            ReadMethod::LocalIdentifier => 0xFF,
            ReadMethod::Address => 0xFF_FFFF,
            ReadMethod::Symbol => 0xFFFF,
        }
    }
}

impl std::fmt::Display for ReadMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReadMethod::LocalIdentifier => "local_identifier",
            ReadMethod::Address => "address",
            ReadMethod::Symbol => "symbol",
        };
        f.write_str(s)
    }
}
