use crate::domain::{config::SessionConfig, error::TransportResult};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Raw inbound bytes as the device produced them, chunked arbitrarily.
pub type InboundBytes = mpsc::UnboundedReceiver<Vec<u8>>;

/// Transport type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportType {
    Serial,
    Loopback,
}

impl std::fmt::Display for TransportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportType::Serial => write!(f, "serial"),
            TransportType::Loopback => write!(f, "loopback"),
        }
    }
}

/// Opens byte-stream connections to devices
#[async_trait]
pub trait Transport: Send + Sync {
    /// Get the transport type
    fn transport_type(&self) -> TransportType;

    /// Open the device at `path` with the given line settings
    async fn open(&self, path: &str, config: &SessionConfig) -> TransportResult<Box<dyn Connection>>;
}

/// One open device handle
#[async_trait]
pub trait Connection: Send {
    /// Hand out the inbound byte channel. Only the first call returns `Some`.
    fn take_inbound(&mut self) -> Option<InboundBytes>;

    /// Queue all of `bytes` for transmission
    async fn write(&mut self, bytes: &[u8]) -> TransportResult<()>;

    /// Wait until everything written so far has left the device buffer
    async fn drain(&mut self) -> TransportResult<()>;

    /// Release the device
    async fn close(self: Box<Self>) -> TransportResult<()>;
}
