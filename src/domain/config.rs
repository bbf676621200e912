use crate::domain::error::{AtPortError, AtPortResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// AtPort configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AtPortConfig {
    /// Global configuration
    #[serde(default)]
    pub global: GlobalConfig,
    /// Device configurations
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

/// Global configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Default log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Caller-side deadline for a single exchange, 0 disables it
    #[serde(default)]
    pub deadline_ms: u64,
}

/// Named device entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device name
    pub name: String,
    /// Device description
    #[serde(default)]
    pub description: String,
    /// Serial interface path, e.g. `/dev/ttyUSB3` or `COM3`
    pub port: String,
    /// Line settings used for the session
    #[serde(default)]
    pub session: SessionConfig,
}

/// Immutable line settings of one session.
///
/// Every field has a default, so a partial table in a config file only
/// overrides what it names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    #[serde(default)]
    pub parity: ParityConfig,
    #[serde(default)]
    pub flow_control: FlowControlConfig,
    /// Appended to every command and used to split the reply into lines
    #[serde(default = "default_line_terminator")]
    pub line_terminator: String,
    /// Inactivity window that ends a reply when no terminator is given
    #[serde(default = "default_quiet_timeout_ms")]
    pub quiet_timeout_ms: u64,
}

/// Parity configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParityConfig {
    #[default]
    None,
    Odd,
    Even,
}

/// Flow control configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowControlConfig {
    #[default]
    None,
    Hardware,
    Software,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_baud_rate() -> u32 {
    115_200
}

fn default_data_bits() -> u8 {
    8
}

fn default_stop_bits() -> u8 {
    1
}

fn default_line_terminator() -> String {
    "\r\n".to_string()
}

fn default_quiet_timeout_ms() -> u64 {
    1000
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            deadline_ms: 0,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            baud_rate: default_baud_rate(),
            data_bits: default_data_bits(),
            stop_bits: default_stop_bits(),
            parity: ParityConfig::default(),
            flow_control: FlowControlConfig::default(),
            line_terminator: default_line_terminator(),
            quiet_timeout_ms: default_quiet_timeout_ms(),
        }
    }
}

impl SessionConfig {
    pub fn quiet_timeout(&self) -> Duration {
        Duration::from_millis(self.quiet_timeout_ms)
    }

    /// Reject settings no transport can honour.
    pub fn validate(&self) -> AtPortResult<()> {
        if !(5..=8).contains(&self.data_bits) {
            return Err(AtPortError::Config {
                message: format!("Invalid data bits: {}", self.data_bits),
            });
        }
        if !(1..=2).contains(&self.stop_bits) {
            return Err(AtPortError::Config {
                message: format!("Invalid stop bits: {}", self.stop_bits),
            });
        }
        if self.line_terminator.is_empty() {
            return Err(AtPortError::Config {
                message: "Line terminator must not be empty".to_string(),
            });
        }
        if self.quiet_timeout_ms == 0 {
            return Err(AtPortError::Config {
                message: "Quiet timeout must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

impl AtPortConfig {
    pub fn find_device(&self, name: &str) -> Option<&DeviceConfig> {
        self.devices.iter().find(|device| device.name == name)
    }
}
