//! Variable definition structures
//!
//! One definition describes one slot of the ECU's dynamic register.

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{parse_source, VarError, VarResult};
use crate::precision::default_decimals;
use crate::types::{DataType, ReadMethod};

/// Complete definition for a single logged variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDefinition {
    /// Signal name as it appears in the log (e.g., "ActualIn.T_Engine")
    pub name: String,

    /// How the ECU resolves this variable
    #[serde(default)]
    pub method: ReadMethod,

    /// Local identifier, address or symbol number depending on `method`
    #[serde(deserialize_with = "deserialize_source")]
    pub source: u32,

    /// Primitive data type
    #[serde(rename = "type", default)]
    pub data_type: DataType,

    /// Scale factor: physical = raw * scale + offset
    #[serde(default = "default_scale")]
    pub scale: f64,

    /// Offset: physical = raw * scale + offset
    #[serde(default)]
    pub offset: f64,

    /// Unit string (e.g., "°C", "rpm", "kPa")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Explicit precision override (decimal places)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precision: Option<u8>,

    /// Bit mask to apply before scaling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bit_mask: Option<u32>,

    /// Bit shift to apply after masking (right shift)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bit_shift: Option<u8>,
}

fn default_scale() -> f64 {
    1.0
}

fn deserialize_source<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(u32),
        Text(String),
    }

    match Repr::deserialize(deserializer)? {
        Repr::Number(n) => Ok(n),
        Repr::Text(s) => parse_source(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid source '{}'", s))),
    }
}

impl VariableDefinition {
    /// Create a symbol-based definition
    pub fn symbol(name: impl Into<String>, symbol: u16, data_type: DataType) -> Self {
        Self::new(name, ReadMethod::Symbol, symbol as u32, data_type)
    }

    /// Create an address-based definition
    pub fn address(name: impl Into<String>, address: u32, data_type: DataType) -> Self {
        Self::new(name, ReadMethod::Address, address, data_type)
    }

    /// Create a local-identifier definition
    pub fn local_id(name: impl Into<String>, id: u8, data_type: DataType) -> Self {
        Self::new(name, ReadMethod::LocalIdentifier, id as u32, data_type)
    }

    fn new(name: impl Into<String>, method: ReadMethod, source: u32, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            method,
            source,
            data_type,
            scale: 1.0,
            offset: 0.0,
            unit: None,
            description: None,
            precision: None,
            bit_mask: None,
            bit_shift: None,
        }
    }

    pub fn with_scale(mut self, scale: f64, offset: f64) -> Self {
        self.scale = scale;
        self.offset = offset;
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_precision(mut self, precision: u8) -> Self {
        self.precision = Some(precision);
        self
    }

    pub fn with_bits(mut self, mask: u32, shift: u8) -> Self {
        self.bit_mask = Some(mask);
        self.bit_shift = Some(shift);
        self
    }

    /// Number of register bytes this variable occupies
    pub fn width(&self) -> usize {
        self.data_type.byte_size()
    }

    /// Check if this is a bit field
    pub fn is_bitfield(&self) -> bool {
        self.bit_mask.is_some()
    }

    /// Decimal places used when rendering the physical value
    pub fn get_precision(&self) -> u8 {
        self.precision
            .unwrap_or_else(|| default_decimals(self.scale, self.offset))
    }

    /// Render a physical value at this variable's precision
    pub fn format_value(&self, value: f64) -> String {
        format!("{:.*}", self.get_precision() as usize, value)
    }

    /// Reject definitions the ECU could never be programmed with
    pub fn validate(&self) -> VarResult<()> {
        if self.name.trim().is_empty() {
            return Err(VarError::invalid(&self.name, "name must not be empty"));
        }
        if self.name.contains('|') || self.name.contains('=') {
            return Err(VarError::invalid(
                &self.name,
                "name must not contain '|' or '='",
            ));
        }
        if self.source > self.method.max_source() {
            return Err(VarError::invalid(
                &self.name,
                format!(
                    "source 0x{:X} out of range for {} (max 0x{:X})",
                    self.source,
                    self.method,
                    self.method.max_source()
                ),
            ));
        }
        if self.is_bitfield() && self.data_type.is_signed() {
            return Err(VarError::invalid(
                &self.name,
                "bit mask is only valid on unsigned types",
            ));
        }
        if let Some(shift) = self.bit_shift {
            if shift as usize >= self.width() * 8 {
                return Err(VarError::invalid(
                    &self.name,
                    format!("bit shift {} exceeds {} width", shift, self.data_type),
                ));
            }
        }
        if self.scale == 0.0 || !self.scale.is_finite() {
            return Err(VarError::invalid(&self.name, "scale must be non-zero"));
        }
        Ok(())
    }
}
