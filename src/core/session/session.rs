use crate::core::communication::{
    executor::CommandExecutor,
    lines::LineSplitter,
    transport::{Connection, InboundBytes, Transport},
};
use crate::core::session::{
    state::SessionState,
    subscription::{LineStream, SubscriberSlot},
};
use crate::domain::{
    config::SessionConfig,
    error::{ExecutorError, TransportError, TransportResult},
};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Held for the whole lifetime of one exchange
pub(crate) type ExchangeGuard<'a> = MutexGuard<'a, ()>;

/// An open connection plus the task splitting its output into lines
struct OpenLink {
    connection: Box<dyn Connection>,
    pump: JoinHandle<()>,
}

/// Transport session for one device.
///
/// Owns the connection handle, turns the inbound byte stream into lines for
/// whoever is subscribed, and serializes command exchanges: only one
/// [`Session::execute`] may be in flight at a time.
pub struct Session {
    path: String,
    config: Arc<SessionConfig>,
    transport: Arc<dyn Transport>,
    link: Mutex<Option<OpenLink>>,
    subscribers: Arc<SubscriberSlot>,
    exchange: Mutex<()>,
    state: Arc<RwLock<SessionState>>,
}

impl Session {
    /// Create a closed session. Nothing touches the device until [`Session::open`].
    pub fn new(path: impl Into<String>, config: SessionConfig, transport: Arc<dyn Transport>) -> Self {
        let path = path.into();
        let state = SessionState::new(path.clone(), transport.transport_type().to_string());

        Self {
            path,
            config: Arc::new(config),
            transport,
            link: Mutex::new(None),
            subscribers: Arc::new(SubscriberSlot::new()),
            exchange: Mutex::new(()),
            state: Arc::new(RwLock::new(state)),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn config(&self) -> &Arc<SessionConfig> {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.state.read().is_open()
    }

    /// Copy of the current lifecycle state and counters
    pub fn state(&self) -> SessionState {
        let mut state = self.state.read().clone();
        state.statistics.reclassify_unread(self.subscribers.discarded());
        state
    }

    /// Open the device with the configured line settings
    pub async fn open(&self) -> TransportResult<()> {
        let mut link = self.link.lock().await;
        if link.is_some() {
            return Err(TransportError::AlreadyOpen);
        }

        let mut connection = self.transport.open(&self.path, &self.config).await?;
        let Some(inbound) = connection.take_inbound() else {
            if let Err(e) = connection.close().await {
                warn!("Failed to release connection without inbound stream: {}", e);
            }
            return Err(TransportError::OpenFailed {
                path: self.path.clone(),
                message: "transport provided no inbound byte stream".to_string(),
            });
        };

        self.subscribers.open();
        let pump = tokio::spawn(pump_lines(
            inbound,
            LineSplitter::new(&self.config.line_terminator),
            Arc::clone(&self.subscribers),
            Arc::clone(&self.state),
        ));

        *link = Some(OpenLink { connection, pump });
        self.state.write().mark_open();

        info!(
            "Opened {} session on '{}' at {} baud",
            self.transport.transport_type(),
            self.path,
            self.config.baud_rate
        );
        Ok(())
    }

    /// Release the device.
    ///
    /// The session is marked closed and any live line stream ends even when
    /// the transport reports a close failure.
    pub async fn close(&self) -> TransportResult<()> {
        let mut link = self.link.lock().await;
        let Some(open) = link.take() else {
            return Err(TransportError::NotOpen);
        };

        self.state.write().mark_closed();
        open.pump.abort();
        self.subscribers.close();

        let result = open.connection.close().await;
        match &result {
            Ok(()) => info!("Closed session on '{}'", self.path),
            Err(e) => warn!("Session on '{}' closed with error: {}", self.path, e),
        }
        result
    }

    /// Write `text` plus the line terminator and wait for the drain.
    pub async fn write_line(&self, text: &str) -> TransportResult<()> {
        let mut link = self.link.lock().await;
        let open = link.as_mut().ok_or(TransportError::NotOpen)?;

        let mut bytes = Vec::with_capacity(text.len() + self.config.line_terminator.len());
        bytes.extend_from_slice(text.as_bytes());
        bytes.extend_from_slice(self.config.line_terminator.as_bytes());

        trace!(bytes = %hex::encode(&bytes), "writing");
        open.connection.write(&bytes).await?;
        open.connection.drain().await?;

        self.state.write().statistics.bytes_written += bytes.len() as u64;
        debug!("Wrote and drained {} bytes to '{}'", bytes.len(), self.path);
        Ok(())
    }

    /// Start receiving lines. Replaces any earlier subscription.
    ///
    /// While an exchange is in flight the returned stream is already ended
    /// and the exchange keeps receiving every line.
    pub fn subscribe_lines(&self) -> LineStream {
        match self.exchange.try_lock() {
            Ok(_idle) => self.subscribers.subscribe(),
            Err(_) => {
                debug!("Exchange in progress on '{}', handing out an ended stream", self.path);
                self.subscribers.ended()
            }
        }
    }

    /// Subscription owned by the exchange holding `_guard`
    pub(crate) fn subscribe_exchange(&self, _guard: &ExchangeGuard<'_>) -> LineStream {
        self.subscribers.subscribe()
    }

    /// Send `command` and collect the reply.
    ///
    /// With a terminator the reply ends at the first line equal to it after
    /// trimming. Without one it ends once the device has been quiet for
    /// `quiet_timeout` after at least one line. Neither mode has an upper
    /// bound; see [`Session::execute_within`].
    pub async fn execute(&self, command: &str, terminator: Option<&str>) -> Result<String, ExecutorError> {
        CommandExecutor::new(self).execute(command, terminator).await
    }

    /// [`Session::execute`] bounded by a caller-side deadline.
    ///
    /// When the deadline passes the exchange is dropped, which releases its
    /// subscription and the in-progress guard.
    pub async fn execute_within(
        &self,
        command: &str,
        terminator: Option<&str>,
        deadline: Duration,
    ) -> Result<String, ExecutorError> {
        match tokio::time::timeout(deadline, self.execute(command, terminator)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Exchange for '{}' abandoned after {:?}", command, deadline);
                Err(ExecutorError::ExchangeNeverTerminated {
                    terminator: terminator.map(str::to_string),
                    waited: deadline,
                })
            }
        }
    }

    pub(crate) fn begin_exchange(&self) -> Result<ExchangeGuard<'_>, ExecutorError> {
        self.exchange
            .try_lock()
            .map_err(|_| ExecutorError::ExchangeInProgress)
    }

    /// `None` marks a failed exchange
    pub(crate) fn record_exchange(&self, completed_in: Option<Duration>) {
        let mut state = self.state.write();
        match completed_in {
            Some(duration) => state.record_exchange_completed(duration),
            None => state.record_exchange_failed(),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(open) = self.link.get_mut().take() {
            open.pump.abort();
            self.subscribers.close();
            warn!("Session on '{}' dropped while open", self.path);
        }
    }
}

/// Split inbound bytes into lines and hand each to the current subscriber.
async fn pump_lines(
    mut inbound: InboundBytes,
    mut splitter: LineSplitter,
    subscribers: Arc<SubscriberSlot>,
    state: Arc<RwLock<SessionState>>,
) {
    while let Some(chunk) = inbound.recv().await {
        trace!(bytes = %hex::encode(&chunk), "received");
        state.write().statistics.bytes_received += chunk.len() as u64;

        for line in splitter.push(&chunk) {
            match subscribers.deliver(line) {
                Ok(()) => state.write().statistics.lines_delivered += 1,
                Err(line) => {
                    trace!("Unsolicited line: {}", line);
                    state.write().statistics.lines_unsolicited += 1;
                }
            }
        }
    }

    if let Some(tail) = splitter.finish() {
        debug!("Discarding unterminated output: {:?}", tail.as_str());
    }
    warn!("Inbound byte stream ended");
    subscribers.close();
}
