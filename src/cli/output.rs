use crate::cli::args::OutputFormat;
use crate::core::session::SessionState;
use crate::domain::config::{AtPortConfig, DeviceConfig};
use crate::infrastructure::serial::PortInfo;
use serde::Serialize;
use std::io;
use tabled::{Table, Tabled};

/// One finished exchange as reported to the user
#[derive(Debug, Clone, Serialize)]
pub struct ExchangeReport {
    pub command: String,
    pub terminator: Option<String>,
    pub response: String,
    pub duration_ms: u64,
}

/// Output writer trait for different formats
pub trait OutputWriter {
    fn write_exchanges(&self, exchanges: &[ExchangeReport]) -> Result<(), OutputError>;
    fn write_session_summary(&self, session: &SessionState) -> Result<(), OutputError>;
    fn write_ports(&self, ports: &[PortInfo]) -> Result<(), OutputError>;
    fn write_config(&self, config: &AtPortConfig) -> Result<(), OutputError>;
    fn write_devices(&self, devices: &[DeviceConfig]) -> Result<(), OutputError>;
    fn write_message(&self, message: &str) -> Result<(), OutputError>;
    fn write_error(&self, error: &str) -> Result<(), OutputError>;
}

/// Output formatting errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

impl From<OutputError> for crate::domain::error::AtPortError {
    fn from(err: OutputError) -> Self {
        Self::Output(err.to_string())
    }
}

/// Console output writer
pub struct ConsoleWriter {
    format: OutputFormat,
}

impl ConsoleWriter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }
}

impl OutputWriter for ConsoleWriter {
    fn write_exchanges(&self, exchanges: &[ExchangeReport]) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Text => {
                for exchange in exchanges {
                    println!("{}", exchange.response);
                }
            }
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(exchanges)?);
            }
            OutputFormat::Table => {
                if !exchanges.is_empty() {
                    let rows: Vec<ExchangeTableRow> = exchanges.iter().map(ExchangeTableRow::from).collect();
                    println!("{}", Table::new(rows));
                }
            }
        }
        Ok(())
    }

    fn write_session_summary(&self, session: &SessionState) -> Result<(), OutputError> {
        let stats = &session.statistics;
        match self.format {
            OutputFormat::Json => {
                eprintln!("{}", serde_json::to_string_pretty(session)?);
            }
            _ => {
                eprintln!(
                    "{}: {} exchange(s) ok, {} failed, {} bytes out, {} bytes in, {} unsolicited line(s)",
                    session.path,
                    stats.exchanges_completed,
                    stats.exchanges_failed,
                    stats.bytes_written,
                    stats.bytes_received,
                    stats.lines_unsolicited
                );
            }
        }
        Ok(())
    }

    fn write_ports(&self, ports: &[PortInfo]) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Text => {
                if ports.is_empty() {
                    println!("No serial ports found");
                }
                for port in ports {
                    println!("{}  {}", port.name, port.kind);
                }
            }
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(ports)?);
            }
            OutputFormat::Table => {
                if !ports.is_empty() {
                    let rows: Vec<PortTableRow> = ports.iter().map(PortTableRow::from).collect();
                    println!("{}", Table::new(rows));
                }
            }
        }
        Ok(())
    }

    fn write_config(&self, config: &AtPortConfig) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Text => {
                println!("AtPort Configuration:");
                println!("  Log level: {}", config.global.log_level);
                if config.global.deadline_ms > 0 {
                    println!("  Exchange deadline: {}ms", config.global.deadline_ms);
                } else {
                    println!("  Exchange deadline: none");
                }

                if !config.devices.is_empty() {
                    println!("  Devices:");
                    for device in &config.devices {
                        println!("    {}: {}", device.name, device.port);
                    }
                }
            }
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(config)?);
            }
            OutputFormat::Table => {
                self.write_devices(&config.devices)?;
            }
        }
        Ok(())
    }

    fn write_devices(&self, devices: &[DeviceConfig]) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Text => {
                for device in devices {
                    let session = &device.session;
                    println!("Device: {}", device.name);
                    let desc = if device.description.is_empty() { "No description" } else { &device.description };
                    println!("  Description: {}", desc);
                    println!("  Port: {}", device.port);
                    println!(
                        "  Line: {} {}{}{}",
                        session.baud_rate,
                        session.data_bits,
                        parity_letter(session),
                        session.stop_bits
                    );
                    println!("  Terminator: {:?}", session.line_terminator);
                    println!("  Quiet timeout: {}ms", session.quiet_timeout_ms);
                    println!();
                }
            }
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(devices)?);
            }
            OutputFormat::Table => {
                if !devices.is_empty() {
                    let rows: Vec<DeviceTableRow> = devices.iter().map(DeviceTableRow::from).collect();
                    println!("{}", Table::new(rows));
                }
            }
        }
        Ok(())
    }

    fn write_message(&self, message: &str) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "message": message,
                    "level": "info"
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            _ => {
                println!("{}", message);
            }
        }
        Ok(())
    }

    fn write_error(&self, error: &str) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "error": error,
                    "level": "error"
                });
                eprintln!("{}", serde_json::to_string_pretty(&output)?);
            }
            _ => {
                eprintln!("Error: {}", error);
            }
        }
        Ok(())
    }
}

fn parity_letter(session: &crate::domain::config::SessionConfig) -> char {
    use crate::domain::config::ParityConfig;
    match session.parity {
        ParityConfig::None => 'N',
        ParityConfig::Even => 'E',
        ParityConfig::Odd => 'O',
    }
}

/// Table row for an exchange
#[derive(Tabled)]
struct ExchangeTableRow {
    command: String,
    until: String,
    ms: u64,
    response: String,
}

impl From<&ExchangeReport> for ExchangeTableRow {
    fn from(exchange: &ExchangeReport) -> Self {
        Self {
            command: exchange.command.clone(),
            until: exchange.terminator.clone().unwrap_or_else(|| "(quiet)".to_string()),
            ms: exchange.duration_ms,
            response: exchange.response.clone(),
        }
    }
}

/// Table row for a serial port
#[derive(Tabled)]
struct PortTableRow {
    port: String,
    kind: String,
}

impl From<&PortInfo> for PortTableRow {
    fn from(port: &PortInfo) -> Self {
        Self {
            port: port.name.clone(),
            kind: port.kind.clone(),
        }
    }
}

/// Table row for device configuration
#[derive(Tabled)]
struct DeviceTableRow {
    name: String,
    port: String,
    baud: u32,
    terminator: String,
    quiet_ms: u64,
}

impl From<&DeviceConfig> for DeviceTableRow {
    fn from(device: &DeviceConfig) -> Self {
        Self {
            name: device.name.clone(),
            port: device.port.clone(),
            baud: device.session.baud_rate,
            terminator: format!("{:?}", device.session.line_terminator),
            quiet_ms: device.session.quiet_timeout_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::SessionConfig;

    #[test]
    fn test_exchange_row_marks_quiet_mode() {
        let report = ExchangeReport {
            command: "ATI".to_string(),
            terminator: None,
            response: "Quectel\nEC25".to_string(),
            duration_ms: 1012,
        };

        let row = ExchangeTableRow::from(&report);
        assert_eq!(row.until, "(quiet)");
        assert_eq!(row.ms, 1012);
    }

    #[test]
    fn test_device_row_escapes_terminator() {
        let device = DeviceConfig {
            name: "modem".to_string(),
            description: String::new(),
            port: "/dev/ttyACM0".to_string(),
            session: SessionConfig::default(),
        };

        let row = DeviceTableRow::from(&device);
        assert_eq!(row.terminator, "\"\\r\\n\"");
        assert_eq!(parity_letter(&device.session), 'N');
    }

    #[test]
    fn test_exchange_report_serializes() {
        let report = ExchangeReport {
            command: "AT".to_string(),
            terminator: Some("OK".to_string()),
            response: "OK".to_string(),
            duration_ms: 3,
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["terminator"], "OK");
        assert_eq!(json["response"], "OK");
    }
}
