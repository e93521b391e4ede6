//! Logger configuration
//!
//! This module contains configuration types for the logger: target ECU,
//! transport, supervisor tuning and firmware transfer settings.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::EcuError;

/// Supported engine control units
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EcuKind {
    /// Trionic 7, KWP2000 over CAN
    Trionic7,
    /// Trionic 8, GMLAN
    #[default]
    Trionic8,
    /// Trionic 8 on the Z22SE engine (different loader addressing and key)
    Trionic8Z22se,
    /// Trionic 8 MCP co-processor
    Trionic8Mcp,
}

/// Diagnostic protocol family spoken by an ECU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolFamily {
    Kwp2000,
    Gmlan,
}

impl EcuKind {
    pub fn family(&self) -> ProtocolFamily {
        match self {
            EcuKind::Trionic7 => ProtocolFamily::Kwp2000,
            EcuKind::Trionic8 | EcuKind::Trionic8Z22se | EcuKind::Trionic8Mcp => {
                ProtocolFamily::Gmlan
            }
        }
    }

    /// Extension used for log files of this ECU family
    pub fn log_extension(&self) -> &'static str {
        match self.family() {
            ProtocolFamily::Kwp2000 => "t7l",
            ProtocolFamily::Gmlan => "t8l",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EcuKind::Trionic7 => "trionic7",
            EcuKind::Trionic8 => "trionic8",
            EcuKind::Trionic8Z22se => "trionic8_z22se",
            EcuKind::Trionic8Mcp => "trionic8_mcp",
        }
    }
}

impl std::fmt::Display for EcuKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EcuKind {
    type Err = EcuError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "trionic7" | "t7" => Ok(EcuKind::Trionic7),
            "trionic8" | "t8" => Ok(EcuKind::Trionic8),
            "trionic8_z22se" | "t8_z22se" | "z22se" => Ok(EcuKind::Trionic8Z22se),
            "trionic8_mcp" | "t8_mcp" | "mcp" => Ok(EcuKind::Trionic8Mcp),
            other => Err(EcuError::Configuration(format!("unknown ECU kind: {}", other))),
        }
    }
}

// =============================================================================
// Transport Configuration
// =============================================================================

/// Transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// SocketCAN (Linux only)
    SocketCan(SocketCanConfig),
    /// Mock transport for testing
    Mock(MockConfig),
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::Mock(MockConfig::default())
    }
}

/// SocketCAN configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketCanConfig {
    /// CAN interface name (e.g., "can0")
    pub interface: String,
    /// CAN bus bitrate (the interface must already be configured for it)
    #[serde(default = "default_bitrate")]
    pub bitrate: u32,
}

fn default_bitrate() -> u32 {
    500000
}

/// Mock transport configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MockConfig {
    /// Simulated latency in milliseconds
    #[serde(default)]
    pub latency_ms: u64,
}

// =============================================================================
// Supervisor Configuration
// =============================================================================

/// Tuning of the polling supervisor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Errors within one second that trip the watchdog (strictly more than)
    #[serde(default = "default_max_errors_per_second")]
    pub max_errors_per_second: u64,
    /// Whole-session attempts, including the first
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Delay between session attempts
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Delay between register definition requests
    #[serde(default = "default_register_pacing_ms")]
    pub register_pacing_ms: u64,
    /// Publish the capture counter every N successful ticks
    #[serde(default = "default_capture_report_interval")]
    pub capture_report_interval: u64,
    /// Timeout for a single diagnostic request
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Tester present interval for GMLAN sessions
    #[serde(default = "default_keepalive_interval_ms")]
    pub keepalive_interval_ms: u64,
    /// Capacity of each observer channel
    #[serde(default = "default_observer_capacity")]
    pub observer_capacity: usize,
}

fn default_max_errors_per_second() -> u64 {
    10
}

fn default_retry_attempts() -> u32 {
    4
}

fn default_retry_delay_ms() -> u64 {
    1500
}

fn default_register_pacing_ms() -> u64 {
    5
}

fn default_capture_report_interval() -> u64 {
    10
}

fn default_request_timeout_ms() -> u64 {
    1000
}

fn default_keepalive_interval_ms() -> u64 {
    2000
}

fn default_observer_capacity() -> usize {
    256
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_errors_per_second: default_max_errors_per_second(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            register_pacing_ms: default_register_pacing_ms(),
            capture_report_interval: default_capture_report_interval(),
            request_timeout_ms: default_request_timeout_ms(),
            keepalive_interval_ms: default_keepalive_interval_ms(),
            observer_capacity: default_observer_capacity(),
        }
    }
}

impl SupervisorConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn register_pacing(&self) -> Duration {
        Duration::from_millis(self.register_pacing_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms)
    }
}

// =============================================================================
// Firmware Configuration
// =============================================================================

/// Firmware transfer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirmwareConfig {
    /// Overall deadline for one dump or flash
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
    /// Bytes per read/transfer request
    #[serde(default = "default_block_size")]
    pub block_size: usize,
    /// Timeout for a single loader request (erase and MD5 can be slow)
    #[serde(default = "default_loader_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Attempts to exit the loader on reset
    #[serde(default = "default_reset_attempts")]
    pub reset_attempts: u32,
    /// Delay between loader exit attempts
    #[serde(default = "default_reset_delay_ms")]
    pub reset_delay_ms: u64,
    /// Loader binary uploaded during bootstrap; none means ROM resident
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loader_image: Option<PathBuf>,
}

fn default_deadline_secs() -> u64 {
    1800
}

fn default_block_size() -> usize {
    0x80
}

fn default_loader_timeout_ms() -> u64 {
    5000
}

fn default_reset_attempts() -> u32 {
    3
}

fn default_reset_delay_ms() -> u64 {
    400
}

impl Default for FirmwareConfig {
    fn default() -> Self {
        Self {
            deadline_secs: default_deadline_secs(),
            block_size: default_block_size(),
            request_timeout_ms: default_loader_timeout_ms(),
            reset_attempts: default_reset_attempts(),
            reset_delay_ms: default_reset_delay_ms(),
            loader_image: None,
        }
    }
}

impl FirmwareConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn reset_delay(&self) -> Duration {
        Duration::from_millis(self.reset_delay_ms)
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggerConfig {
    #[serde(default)]
    pub ecu: EcuKind,
    #[serde(default)]
    pub transport: TransportConfig,
    /// Polling frequency in Hz
    #[serde(default = "default_frequency_hz")]
    pub frequency_hz: u32,
    /// Variable definition file (YAML or JSON)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<PathBuf>,
    /// Directory log files are created in
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub firmware: FirmwareConfig,
}

fn default_frequency_hz() -> u32 {
    20
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            ecu: EcuKind::default(),
            transport: TransportConfig::default(),
            frequency_hz: default_frequency_hz(),
            variables: None,
            log_dir: default_log_dir(),
            supervisor: SupervisorConfig::default(),
            firmware: FirmwareConfig::default(),
        }
    }
}

impl LoggerConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, EcuError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            EcuError::Configuration(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, EcuError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| EcuError::Configuration(format!("invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EcuError> {
        validate_frequency(self.frequency_hz)?;
        if self.supervisor.retry_attempts == 0 {
            return Err(EcuError::Configuration(
                "retry_attempts must be at least 1".to_string(),
            ));
        }
        if self.firmware.block_size == 0 || self.firmware.block_size > 0xFF0 {
            return Err(EcuError::Configuration(format!(
                "firmware block_size {} out of range",
                self.firmware.block_size
            )));
        }
        Ok(())
    }
}

/// Polling frequency must be positive and at most 1 kHz
pub fn validate_frequency(frequency_hz: u32) -> Result<(), EcuError> {
    if frequency_hz == 0 || frequency_hz > 1000 {
        return Err(EcuError::Configuration(format!(
            "frequency {} Hz out of range (1-1000)",
            frequency_hz
        )));
    }
    Ok(())
}
