use std::time::Duration;
use thiserror::Error;

/// Failures of the byte-stream transport underneath a session
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to open '{path}': {message}")]
    OpenFailed { path: String, message: String },

    #[error("Failed to close connection: {message}")]
    CloseFailed { message: String },

    #[error("Write failed: {message}")]
    WriteFailed { message: String },

    #[error("Drain failed: {message}")]
    DrainFailed { message: String },

    #[error("Session is already open")]
    AlreadyOpen,

    #[error("Session is not open")]
    NotOpen,
}

/// Failures of a single command exchange
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Command write failed: {0}")]
    WriteFailed(#[source] TransportError),

    #[error("Another exchange is already in progress on this session")]
    ExchangeInProgress,

    #[error("Line stream closed before the response completed")]
    StreamClosed,

    #[error("No terminal condition observed within {waited:?} (terminator: {terminator:?})")]
    ExchangeNeverTerminated {
        terminator: Option<String>,
        waited: Duration,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// AtPort unified error type
#[derive(Error, Debug)]
pub enum AtPortError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Output error: {0}")]
    Output(String),
}

pub type AtPortResult<T> = Result<T, AtPortError>;
pub type TransportResult<T> = Result<T, TransportError>;
