// Serial module - Serial port transport implementation
pub mod transport;

pub use transport::{port_builder, SerialTransport};

use crate::domain::error::AtPortResult;
use serde::Serialize;

/// A serial port the operating system reports
#[derive(Debug, Clone, Serialize)]
pub struct PortInfo {
    pub name: String,
    pub kind: String,
}

/// List serial ports present on this machine
pub fn available_ports() -> AtPortResult<Vec<PortInfo>> {
    let ports = serialport::available_ports()?;

    Ok(ports
        .into_iter()
        .map(|port| PortInfo {
            kind: match port.port_type {
                serialport::SerialPortType::UsbPort(usb) => match usb.product {
                    Some(product) => format!("usb ({})", product),
                    None => format!("usb {:04x}:{:04x}", usb.vid, usb.pid),
                },
                serialport::SerialPortType::PciPort => "pci".to_string(),
                serialport::SerialPortType::BluetoothPort => "bluetooth".to_string(),
                serialport::SerialPortType::Unknown => "unknown".to_string(),
            },
            name: port.port_name,
        })
        .collect())
}
