//! Error types for variable definitions and decoding

use thiserror::Error;

/// Errors that can occur while loading or decoding variables
#[derive(Debug, Error)]
pub enum VarError {
    /// Not enough bytes left in the register buffer for this variable
    #[error("data too short for {name}: need {expected} bytes, {available} left")]
    DataTooShort {
        name: String,
        expected: usize,
        available: usize,
    },

    /// Definition rejected at load time
    #[error("invalid definition for {name}: {reason}")]
    InvalidDefinition { name: String, reason: String },

    /// Two definitions share a name
    #[error("duplicate variable name: {0}")]
    DuplicateName(String),

    /// YAML parsing error
    #[error("YAML parse error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl VarError {
    pub(crate) fn invalid(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type for variable operations
pub type VarResult<T> = Result<T, VarError>;

/// Parse a numeric source field (decimal or hex with 0x prefix)
pub fn parse_source(s: &str) -> Option<u32> {
    let s = s.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_source() {
        assert_eq!(parse_source("0x1A2B"), Some(0x1A2B));
        assert_eq!(parse_source("0X1a2b"), Some(0x1A2B));
        assert_eq!(parse_source(" 42 "), Some(42));
        assert_eq!(parse_source("zz"), None);
        assert_eq!(parse_source("0x"), None);
    }

    #[test]
    fn test_data_too_short_message() {
        let err = VarError::DataTooShort {
            name: "In.v_Vehicle".to_string(),
            expected: 2,
            available: 1,
        };
        assert_eq!(
            err.to_string(),
            "data too short for In.v_Vehicle: need 2 bytes, 1 left"
        );
    }
}
