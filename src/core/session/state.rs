use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

/// Snapshot of a session's lifecycle and counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    /// Device path the session talks to
    pub path: String,
    /// Transport type name
    pub transport_type: String,
    /// Current status
    pub status: SessionStatus,
    /// When the current connection was opened
    pub opened_at: Option<SystemTime>,
    /// Session statistics
    pub statistics: SessionStatistics,
}

/// Session status enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SessionStatus {
    /// No connection held
    Closed,
    /// Connection open, exchanges allowed
    Open,
}

/// Session statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionStatistics {
    /// Bytes written, terminators included
    pub bytes_written: u64,
    /// Raw bytes received from the device
    pub bytes_received: u64,
    /// Lines read by an exchange
    pub lines_delivered: u64,
    /// Lines no exchange read, including those left unread after a terminator
    pub lines_unsolicited: u64,
    /// Exchanges that resolved with a response
    pub exchanges_completed: u64,
    /// Exchanges that ended with an error
    pub exchanges_failed: u64,
    /// Average response time in milliseconds
    pub avg_response_time_ms: f64,
    /// Last response time in milliseconds
    pub last_response_time_ms: Option<u64>,
}

impl SessionState {
    pub fn new(path: String, transport_type: String) -> Self {
        Self {
            path,
            transport_type,
            status: SessionStatus::Closed,
            opened_at: None,
            statistics: SessionStatistics::default(),
        }
    }

    pub fn mark_open(&mut self) {
        self.status = SessionStatus::Open;
        self.opened_at = Some(SystemTime::now());
    }

    pub fn mark_closed(&mut self) {
        self.status = SessionStatus::Closed;
        self.opened_at = None;
    }

    pub fn is_open(&self) -> bool {
        self.status == SessionStatus::Open
    }

    /// Time since the connection was opened
    pub fn get_uptime(&self) -> Duration {
        self.opened_at
            .and_then(|opened| SystemTime::now().duration_since(opened).ok())
            .unwrap_or_default()
    }

    pub fn record_exchange_completed(&mut self, duration: Duration) {
        let stats = &mut self.statistics;
        stats.exchanges_completed += 1;

        let duration_ms = duration.as_millis() as u64;
        stats.last_response_time_ms = Some(duration_ms);

        let total = stats.exchanges_completed;
        if total > 1 {
            stats.avg_response_time_ms =
                (stats.avg_response_time_ms * (total - 1) as f64 + duration_ms as f64) / total as f64;
        } else {
            stats.avg_response_time_ms = duration_ms as f64;
        }
    }

    pub fn record_exchange_failed(&mut self) {
        self.statistics.exchanges_failed += 1;
    }
}

impl SessionStatistics {
    /// Move lines that reached a stream but were never read from
    /// `lines_delivered` to `lines_unsolicited`.
    pub fn reclassify_unread(&mut self, unread: u64) {
        let unread = unread.min(self.lines_delivered);
        self.lines_delivered -= unread;
        self.lines_unsolicited += unread;
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Closed => write!(f, "Closed"),
            SessionStatus::Open => write!(f, "Open"),
        }
    }
}
