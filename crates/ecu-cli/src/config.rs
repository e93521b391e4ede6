//! Configuration handling for ecu-logger

use anyhow::{Context, Result};
use ecu_diag::config::{SocketCanConfig, TransportConfig};
use ecu_diag::protocol::DriverOptions;
use ecu_diag::{EcuKind, LoggerConfig};
use std::path::{Path, PathBuf};

/// Command-line values that take precedence over the config file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub ecu: Option<EcuKind>,
    pub interface: Option<String>,
    pub frequency_hz: Option<u32>,
    pub variables: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
}

impl Overrides {
    fn apply(&self, config: &mut LoggerConfig) {
        if let Some(ecu) = self.ecu {
            config.ecu = ecu;
        }
        if let Some(interface) = &self.interface {
            config.transport = TransportConfig::SocketCan(SocketCanConfig {
                interface: interface.clone(),
                bitrate: match &config.transport {
                    TransportConfig::SocketCan(current) => current.bitrate,
                    TransportConfig::Mock(_) => 500_000,
                },
            });
        }
        if let Some(frequency_hz) = self.frequency_hz {
            config.frequency_hz = frequency_hz;
        }
        if let Some(variables) = &self.variables {
            config.variables = Some(variables.clone());
        }
        if let Some(log_dir) = &self.log_dir {
            config.log_dir = log_dir.clone();
        }
    }
}

/// Load the config file (or defaults) and merge command-line overrides
pub fn load(path: Option<&Path>, overrides: &Overrides) -> Result<LoggerConfig> {
    let mut config = match path {
        Some(path) => LoggerConfig::from_file(path)
            .with_context(|| format!("Failed to load config file: {}", path.display()))?,
        None => LoggerConfig::default(),
    };
    overrides.apply(&mut config);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Driver options for firmware work, including the loader binary if one is
/// configured
pub fn driver_options(config: &LoggerConfig) -> Result<DriverOptions> {
    let options = DriverOptions::from_config(&config.supervisor, &config.firmware);
    match &config.firmware.loader_image {
        Some(path) => {
            let image = std::fs::read(path)
                .with_context(|| format!("Failed to read loader image: {}", path.display()))?;
            Ok(options.with_loader_image(image))
        }
        None => Ok(options),
    }
}
