use crate::core::communication::transport::{Connection, InboundBytes, Transport, TransportType};
use crate::domain::{
    config::{FlowControlConfig, ParityConfig, SessionConfig},
    error::{TransportError, TransportResult},
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serialport::{SerialPort, SerialPortBuilder};
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

const READ_TIMEOUT: Duration = Duration::from_millis(100);
const READ_BUFFER_SIZE: usize = 1024;

type SharedPort = Arc<Mutex<Box<dyn SerialPort>>>;

/// Opens serial devices through the `serialport` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialTransport;

impl SerialTransport {
    pub fn new() -> Self {
        Self
    }
}

/// Translate line settings into a port builder.
pub fn port_builder(path: &str, config: &SessionConfig) -> TransportResult<SerialPortBuilder> {
    let invalid = |message: String| TransportError::OpenFailed {
        path: path.to_string(),
        message,
    };

    let data_bits = match config.data_bits {
        5 => serialport::DataBits::Five,
        6 => serialport::DataBits::Six,
        7 => serialport::DataBits::Seven,
        8 => serialport::DataBits::Eight,
        other => return Err(invalid(format!("Invalid data bits: {}", other))),
    };

    let stop_bits = match config.stop_bits {
        1 => serialport::StopBits::One,
        2 => serialport::StopBits::Two,
        other => return Err(invalid(format!("Invalid stop bits: {}", other))),
    };

    let parity = match config.parity {
        ParityConfig::None => serialport::Parity::None,
        ParityConfig::Even => serialport::Parity::Even,
        ParityConfig::Odd => serialport::Parity::Odd,
    };

    let flow_control = match config.flow_control {
        FlowControlConfig::None => serialport::FlowControl::None,
        FlowControlConfig::Software => serialport::FlowControl::Software,
        FlowControlConfig::Hardware => serialport::FlowControl::Hardware,
    };

    Ok(serialport::new(path, config.baud_rate)
        .data_bits(data_bits)
        .stop_bits(stop_bits)
        .parity(parity)
        .flow_control(flow_control)
        .timeout(READ_TIMEOUT))
}

#[async_trait]
impl Transport for SerialTransport {
    fn transport_type(&self) -> TransportType {
        TransportType::Serial
    }

    async fn open(&self, path: &str, config: &SessionConfig) -> TransportResult<Box<dyn Connection>> {
        let builder = port_builder(path, config)?;
        let open_failed = |message: String| TransportError::OpenFailed {
            path: path.to_string(),
            message,
        };

        let port = tokio::task::spawn_blocking(move || builder.open())
            .await
            .map_err(|e| open_failed(format!("open task failed: {}", e)))?
            .map_err(|e| open_failed(e.to_string()))?;

        let reader = port
            .try_clone()
            .map_err(|e| open_failed(format!("Failed to clone port handle: {}", e)))?;

        let (sender, inbound) = mpsc::unbounded_channel();
        let stop = Arc::new(AtomicBool::new(false));
        let reader_stop = Arc::clone(&stop);
        let reader_thread = std::thread::Builder::new()
            .name(format!("atport-rx-{}", path))
            .spawn(move || read_loop(reader, sender, reader_stop))
            .map_err(|e| open_failed(format!("Failed to start reader thread: {}", e)))?;

        info!("Serial port '{}' opened at {} baud", path, config.baud_rate);

        Ok(Box::new(SerialConnection {
            port: Arc::new(Mutex::new(port)),
            inbound: Some(inbound),
            stop,
            reader_thread: Some(reader_thread),
        }))
    }
}

/// RX loop - forwards raw chunks until stopped, the receiver goes away, or
/// the port fails
fn read_loop(mut port: Box<dyn SerialPort>, sender: mpsc::UnboundedSender<Vec<u8>>, stop: Arc<AtomicBool>) {
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];

    while !stop.load(Ordering::Relaxed) && !sender.is_closed() {
        match port.read(&mut buffer) {
            Ok(0) => continue,
            Ok(n) => {
                debug!("Received {} bytes over serial", n);
                if sender.send(buffer[..n].to_vec()).is_err() {
                    break;
                }
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
            Err(e) => {
                error!("Failed to read from serial port: {}", e);
                break;
            }
        }
    }
}

struct SerialConnection {
    port: SharedPort,
    inbound: Option<InboundBytes>,
    stop: Arc<AtomicBool>,
    reader_thread: Option<JoinHandle<()>>,
}

impl SerialConnection {
    async fn with_port<T, F>(&self, op: F) -> std::io::Result<T>
    where
        F: FnOnce(&mut dyn SerialPort) -> std::io::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let port = Arc::clone(&self.port);
        tokio::task::spawn_blocking(move || {
            let mut port = port.lock();
            op(&mut **port)
        })
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?
    }
}

#[async_trait]
impl Connection for SerialConnection {
    fn take_inbound(&mut self) -> Option<InboundBytes> {
        self.inbound.take()
    }

    async fn write(&mut self, bytes: &[u8]) -> TransportResult<()> {
        let data = bytes.to_vec();
        let len = data.len();
        self.with_port(move |port| port.write_all(&data))
            .await
            .map_err(|e| TransportError::WriteFailed { message: e.to_string() })?;

        debug!("Sent {} bytes over serial", len);
        Ok(())
    }

    async fn drain(&mut self) -> TransportResult<()> {
        // On unix `flush` blocks in tcdrain until the UART shifted every byte out.
        self.with_port(|port| port.flush())
            .await
            .map_err(|e| TransportError::DrainFailed { message: e.to_string() })
    }

    async fn close(mut self: Box<Self>) -> TransportResult<()> {
        self.stop.store(true, Ordering::Relaxed);

        if let Some(handle) = self.reader_thread.take() {
            let joined = tokio::task::spawn_blocking(move || handle.join())
                .await
                .map_err(|e| TransportError::CloseFailed { message: e.to_string() })?;
            if joined.is_err() {
                warn!("Serial reader thread panicked");
                return Err(TransportError::CloseFailed {
                    message: "reader thread panicked".to_string(),
                });
            }
        }

        info!("Serial connection closed");
        Ok(())
    }
}

impl Drop for SerialConnection {
    fn drop(&mut self) {
        // The reader thread notices within one read timeout and releases its handle
        self.stop.store(true, Ordering::Relaxed);
    }
}
