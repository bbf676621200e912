//! In-process transport pair for tests and dry runs.
//!
//! [`LoopbackTransport`] is what a [`Session`](crate::core::session::Session)
//! opens; [`LoopbackDevice`] is the far end, which sees every written byte and
//! decides what the "device" answers.

use crate::core::communication::transport::{Connection, InboundBytes, Transport, TransportType};
use crate::domain::{
    config::SessionConfig,
    error::{TransportError, TransportResult},
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Default)]
struct Faults {
    open: bool,
    write: bool,
    drain: bool,
    close: bool,
}

#[derive(Debug, Default)]
struct Shared {
    inbound: Option<mpsc::UnboundedSender<Vec<u8>>>,
    line_terminator: String,
    drain_delay: Duration,
    faults: Faults,
    opened: u64,
}

/// Transport half handed to a session
#[derive(Debug, Clone)]
pub struct LoopbackTransport {
    shared: Arc<Mutex<Shared>>,
    written: mpsc::UnboundedSender<Vec<u8>>,
}

/// Device half driven by the test or demo
#[derive(Debug)]
pub struct LoopbackDevice {
    shared: Arc<Mutex<Shared>>,
    written: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl LoopbackTransport {
    pub fn pair() -> (LoopbackTransport, LoopbackDevice) {
        let shared = Arc::new(Mutex::new(Shared::default()));
        let (written_tx, written_rx) = mpsc::unbounded_channel();

        (
            LoopbackTransport {
                shared: Arc::clone(&shared),
                written: written_tx,
            },
            LoopbackDevice {
                shared,
                written: tokio::sync::Mutex::new(written_rx),
            },
        )
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    fn transport_type(&self) -> TransportType {
        TransportType::Loopback
    }

    async fn open(&self, path: &str, config: &SessionConfig) -> TransportResult<Box<dyn Connection>> {
        let mut shared = self.shared.lock();
        if shared.faults.open {
            return Err(TransportError::OpenFailed {
                path: path.to_string(),
                message: "loopback device refused to open".to_string(),
            });
        }

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        shared.inbound = Some(inbound_tx);
        shared.line_terminator = config.line_terminator.clone();
        shared.opened += 1;
        debug!("Loopback '{}' opened", path);

        Ok(Box::new(LoopbackConnection {
            shared: Arc::clone(&self.shared),
            inbound: Some(inbound_rx),
            written: self.written.clone(),
            generation: shared.opened,
        }))
    }
}

struct LoopbackConnection {
    shared: Arc<Mutex<Shared>>,
    inbound: Option<InboundBytes>,
    written: mpsc::UnboundedSender<Vec<u8>>,
    /// Value of `opened` when this connection was made
    generation: u64,
}

impl LoopbackConnection {
    /// Disconnect the device, unless a newer open already replaced us
    fn release(&self, shared: &mut Shared) {
        if shared.opened == self.generation {
            shared.inbound = None;
        }
    }
}

impl Drop for LoopbackConnection {
    fn drop(&mut self) {
        let mut shared = self.shared.lock();
        self.release(&mut shared);
    }
}

#[async_trait]
impl Connection for LoopbackConnection {
    fn take_inbound(&mut self) -> Option<InboundBytes> {
        self.inbound.take()
    }

    async fn write(&mut self, bytes: &[u8]) -> TransportResult<()> {
        if self.shared.lock().faults.write {
            return Err(TransportError::WriteFailed {
                message: "loopback write fault".to_string(),
            });
        }
        self.written
            .send(bytes.to_vec())
            .map_err(|_| TransportError::WriteFailed {
                message: "loopback device dropped".to_string(),
            })
    }

    async fn drain(&mut self) -> TransportResult<()> {
        let delay = self.shared.lock().drain_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.shared.lock().faults.drain {
            return Err(TransportError::DrainFailed {
                message: "loopback drain fault".to_string(),
            });
        }
        Ok(())
    }

    async fn close(self: Box<Self>) -> TransportResult<()> {
        let mut shared = self.shared.lock();
        self.release(&mut shared);
        if shared.faults.close {
            return Err(TransportError::CloseFailed {
                message: "loopback close fault".to_string(),
            });
        }
        Ok(())
    }
}

impl LoopbackDevice {
    /// Push raw bytes towards the session. False when nothing is connected.
    pub fn send(&self, bytes: impl AsRef<[u8]>) -> bool {
        let shared = self.shared.lock();
        match &shared.inbound {
            Some(inbound) => inbound.send(bytes.as_ref().to_vec()).is_ok(),
            None => false,
        }
    }

    /// Push `text` followed by the session's line terminator
    pub fn send_line(&self, text: &str) -> bool {
        let terminator = self.shared.lock().line_terminator.clone();
        self.send(format!("{text}{terminator}"))
    }

    /// Terminator of the session that last opened the transport
    pub fn line_terminator(&self) -> String {
        self.shared.lock().line_terminator.clone()
    }

    /// Next chunk the session wrote, in write order
    pub async fn next_write(&self) -> Option<Vec<u8>> {
        self.written.lock().await.recv().await
    }

    /// Drop the inbound side as if the cable was pulled
    pub fn hang_up(&self) {
        self.shared.lock().inbound = None;
    }

    pub fn is_connected(&self) -> bool {
        self.shared.lock().inbound.is_some()
    }

    /// How many times the transport was opened
    pub fn open_count(&self) -> u64 {
        self.shared.lock().opened
    }

    pub fn set_drain_delay(&self, delay: Duration) {
        self.shared.lock().drain_delay = delay;
    }

    pub fn fail_open(&self, fail: bool) {
        self.shared.lock().faults.open = fail;
    }

    pub fn fail_write(&self, fail: bool) {
        self.shared.lock().faults.write = fail;
    }

    pub fn fail_drain(&self, fail: bool) {
        self.shared.lock().faults.drain = fail;
    }

    pub fn fail_close(&self, fail: bool) {
        self.shared.lock().faults.close = fail;
    }
}
